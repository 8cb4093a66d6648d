// src/errors.rs

//! Crate-wide error type and helpers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Command '{argv}' returned non-zero exit status {code}.")]
    Process { argv: String, code: i32 },

    #[error("Failed to read requirements file {}: {source}", path.display())]
    RequirementsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Did not find the '{tool}' binary in path. {hint}")]
    MissingTool { tool: String, hint: String },

    #[error("Failed to create virtualenv({name}): {source}")]
    VenvCreation {
        name: String,
        #[source]
        source: Box<ToolsError>,
    },

    #[error("Timed out after {timeout_secs}s waiting for the lock of virtualenv({name})")]
    LockTimeout { name: String, timeout_secs: u64 },

    #[error("Failed to get the site packages of virtualenv({name}): {message}")]
    SitePackages { name: String, message: String },

    #[error("{}", message.as_deref().unwrap_or("exit requested"))]
    Exit { code: i32, message: Option<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolsError {
    /// Process exit code this error should terminate the program with.
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolsError::Process { code, .. } if *code > 0 => *code,
            ToolsError::Exit { code, .. } => *code,
            ToolsError::VenvCreation { source, .. } => match source.as_ref() {
                ToolsError::Process { code, .. } if *code > 0 => *code,
                _ => 1,
            },
            _ => 1,
        }
    }

    /// True for "a file we expected is not there" failures.
    ///
    /// Provisioning treats these as a sign of a half-broken environment and
    /// recreates it once before giving up.
    pub fn is_missing_file(&self) -> bool {
        match self {
            ToolsError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            ToolsError::Spawn { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ToolsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_errors_exit_with_their_return_code() {
        let err = ToolsError::Process {
            argv: "false".to_string(),
            code: 3,
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.to_string(),
            "Command 'false' returned non-zero exit status 3."
        );

        let signalled = ToolsError::Process {
            argv: "sleep 10".to_string(),
            code: -15,
        };
        assert_eq!(signalled.exit_code(), 1);
    }

    #[test]
    fn missing_program_counts_as_missing_file() {
        let err = ToolsError::Spawn {
            program: "/nope/python".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.is_missing_file());
        assert!(!ToolsError::Config("x".into()).is_missing_file());
    }
}
