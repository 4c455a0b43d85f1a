use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GocovError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Syntax error in {path} at line {line}, column {column}")]
    Syntax {
        path: String,
        line: usize,
        column: usize,
    },

    #[error("Coverage profile error at line {line}: {message}")]
    Profile { line: usize, message: String },

    #[error("Invalid ignore annotation in {path}:{line}: {text}")]
    Annotation {
        path: String,
        line: u32,
        text: String,
    },

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Module resolution error: {0}")]
    Module(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl GocovError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GocovError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GocovError>;
