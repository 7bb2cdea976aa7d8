use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Bento
#[derive(Error, Debug)]
pub enum BentoError {
    #[error("No transform rule matched module: {}", file.display())]
    NoRuleMatched { file: PathBuf },

    #[error("Parse error in file {}: {message}", file.display())]
    ParseError {
        file: PathBuf,
        message: String,
        location: Option<CodeLocation>,
    },

    #[error("Compile failure in file {}: {message}", file.display())]
    CompileFailure {
        file: PathBuf,
        message: String,
        location: Option<CodeLocation>,
    },

    #[error("Invalid pattern: {pattern}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid define value for '{key}': {message}")]
    InvalidDefine { key: String, message: String },

    #[error("File system error: {message}")]
    FileSystemError {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Bundle error: {message}")]
    BundleError { message: String },
}

/// Represents a location in source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub file: PathBuf,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BentoError>;

impl BentoError {
    pub fn no_rule_matched(file: impl Into<PathBuf>) -> Self {
        Self::NoRuleMatched { file: file.into() }
    }

    pub fn parse_error(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn compile_failure(
        file: impl Into<PathBuf>,
        message: impl Into<String>,
        location: Option<CodeLocation>,
    ) -> Self {
        Self::CompileFailure {
            file: file.into(),
            message: message.into(),
            location,
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn invalid_define(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefine {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn file_system_error(
        message: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystemError {
            message: message.into(),
            path: path.into(),
            source,
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source: None,
        }
    }

    /// The module this error is attributed to, when there is one
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            Self::NoRuleMatched { file }
            | Self::ParseError { file, .. }
            | Self::CompileFailure { file, .. } => Some(file),
            Self::FileSystemError { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Source location of a syntax or compile diagnostic
    pub fn location(&self) -> Option<&CodeLocation> {
        match self {
            Self::ParseError { location, .. } | Self::CompileFailure { location, .. } => {
                location.as_ref()
            }
            _ => None,
        }
    }

    /// Fatal errors abort the current module's transform
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::FileSystemError { .. } | Self::BundleError { .. })
    }

    /// Get error category for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoRuleMatched { .. } => ErrorCategory::Dispatch,

            Self::ParseError { .. } | Self::CompileFailure { .. } => ErrorCategory::Parsing,

            Self::InvalidPattern { .. } | Self::InvalidDefine { .. } | Self::ConfigError { .. } => {
                ErrorCategory::Configuration
            }

            Self::FileSystemError { .. } => ErrorCategory::FileSystem,

            Self::BundleError { .. } => ErrorCategory::Bundle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    Dispatch,
    Parsing,
    Configuration,
    FileSystem,
    Bundle,
}

impl From<std::io::Error> for BentoError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystemError {
            message: err.to_string(),
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for BentoError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl CodeLocation {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

impl std::fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}
