use std::path::PathBuf;

use thiserror::Error;

use crate::sys::jvmti::jvmtiError;

/// Errors produced by the agent.
///
/// None of these ever cross back into the VM: event handlers log them and
/// carry on, only agent load turns them into a non-zero status.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("JVMTI {operation} failed with error {}", .code.0)]
    Jvmti {
        operation: &'static str,
        code: jvmtiError,
    },

    #[error("JNI {0} failed")]
    Jni(&'static str),

    #[error("GetEnv returned {0}; a JVMTI 1.0 or newer VM is required")]
    NoJvmtiEnv(i32),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("error while parsing option '{key}': {reason}")]
    InvalidOption { key: String, reason: &'static str },

    #[error("can not read configuration file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can not create output file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("equality test threw an exception")]
    EqualityCheck,

    #[error("report rejected by {destination}: {reason}")]
    Rejected {
        destination: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn jvmti(operation: &'static str, code: jvmtiError) -> Self {
        AgentError::Jvmti { operation, code }
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
