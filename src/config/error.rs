use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing 'name' for profile #{index}")]
    MissingProfileName { index: usize },
    #[error("duplicate profile name '{name}'")]
    DuplicateProfile { name: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
