use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn bento(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bento").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("bento").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("module bundler"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("bento").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    bento(&temp_dir)
        .arg("init")
        .arg("--output-dir")
        .arg(temp_dir.path())
        .assert()
        .success();

    // Check that config file was created
    let config_path = temp_dir.path().join("bento.toml");
    assert!(config_path.exists());
}

#[test]
fn test_classify_command() {
    let temp_dir = TempDir::new().unwrap();

    bento(&temp_dir)
        .args(["classify", "/app/node_modules/@expo/vector-icons/index.js"])
        .assert()
        .success()
        .stdout(predicate::str::contains("framework (@expo/vector-icons)"));

    bento(&temp_dir)
        .args(["classify", "/app/src/App.tsx"])
        .assert()
        .success()
        .stdout(predicate::str::diff("app\n"));
}

#[test]
fn test_transform_command() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("node_modules/react-native/index.js");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, "import View from './View';\nexport default View;\n").unwrap();

    bento(&temp_dir)
        .arg("transform")
        .arg(&file)
        .arg("--project-root")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rule\": \"framework-runtime\""))
        .stdout(predicate::str::contains("\"strategy\": \"light-resyntax\""))
        .stdout(predicate::str::contains("require(\\\"./View\\\")"));
}

#[test]
fn test_transform_syntax_error_fails() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("src/broken.js");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, "const = ;\n").unwrap();

    bento(&temp_dir)
        .arg("transform")
        .arg(&file)
        .arg("--project-root")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.js"));
}

#[test]
fn test_patches_command() {
    let temp_dir = TempDir::new().unwrap();
    let patch = temp_dir.path().join("patches/react-native/Libraries/Text/Text.js");
    fs::create_dir_all(patch.parent().unwrap()).unwrap();
    fs::write(&patch, "// patched").unwrap();

    bento(&temp_dir)
        .arg("patches")
        .arg("--project-root")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Text\\.js$"))
        .stdout(predicate::str::contains("Text.js\n"));
}

#[test]
fn test_define_command() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("bento.toml"),
        "[define]\n__DEV__ = false\nlarge = { \"$bigint\" = \"1\" }\n",
    )
    .unwrap();

    bento(&temp_dir)
        .arg("define")
        .assert()
        .success()
        .stdout(predicate::str::contains("// __generated__/"))
        .stdout(predicate::str::contains("const __DEV__ = false;"))
        .stdout(predicate::str::contains("const large = BigInt(\"1\");"));

    bento(&temp_dir)
        .args(["define", "--bigint-literal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("const large = 1n;"));
}
