use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by [`crate::runtime::Supervisor::start`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start critical process `{name}`: {source}")]
    CriticalStart {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("supervisor already started")]
    AlreadyStarted,
    #[error("supervisor is shutting down")]
    ShuttingDown,
}

/// Failures while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config declares no processes")]
    Empty,
    #[error("process #{0} has an empty name")]
    EmptyName(usize),
    #[error("process `{0}` is declared more than once")]
    DuplicateName(String),
    #[error("process `{0}` has an empty cmd")]
    EmptyCommand(String),
}
