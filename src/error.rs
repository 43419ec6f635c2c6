//! Error handling for the ayaye daemon.
//!
//! The taxonomy mirrors the operational split the processing loop cares
//! about:
//! - *fatal* errors (queue or registry transport, configuration) crash the
//!   process so the orchestrator restarts it; the unacknowledged entry is
//!   redelivered,
//! - *handler* errors (generation call failures, missing arguments) are
//!   logged and the entry is acknowledged anyway,
//! - *decode* errors identify a poison entry by stream and id.

use std::borrow::Cow;

use thiserror::Error;

/// A specialized Result type for ayaye operations.
pub type Result<T> = std::result::Result<T, AyayeError>;

/// The main error type for the daemon.
#[derive(Error, Debug)]
pub enum AyayeError {
    /// Queue transport failure (Redis unreachable, command failed).
    #[error("queue error: {0}")]
    Queue(#[from] redis::RedisError),

    /// Registry (entity/record store) transport or protocol failure.
    #[error("registry error: {message}")]
    Registry {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Text-generation service failure. Never retried by the loop.
    #[error("generation error: {message}")]
    Generation {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A stream entry whose payload could not be decoded into an event.
    #[error("poison entry {entry_id} on {stream}: {source}")]
    Decode {
        stream: String,
        entry_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A recognized command was invoked without a required argument.
    #[error("command `{command}` missing required argument `{argument}`")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// JSON (de)serialization failure outside of entry decoding.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(Cow<'static, str>),

    /// I/O failure (credential file, sockets).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AyayeError {
    /// Create a registry error from a message.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            source: None,
        }
    }

    /// Create a registry error wrapping a transport failure.
    pub fn registry_transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Registry {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a generation error from a message.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            source: None,
        }
    }

    /// Create a generation error wrapping a transport failure.
    pub fn generation_transport(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Generation {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error should take the process down.
    ///
    /// Queue and registry transport failures mean the environment is broken
    /// and an external restart (with redelivery of the unacked entry) is the
    /// recovery path. Generation and per-entry failures are not fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Queue(_) | Self::Registry { .. } | Self::Config(_) | Self::Io(_)
        )
    }

    /// Stable label for the failure, used on metrics counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Queue(_) => "queue",
            Self::Registry { .. } => "registry",
            Self::Generation { .. } => "generation",
            Self::Decode { .. } => "decode",
            Self::MissingArgument { .. } => "missing_argument",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<config::ConfigError> for AyayeError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string().into())
    }
}
