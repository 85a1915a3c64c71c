use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while injecting sidecars or reconciling resources.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot decode admission object: {0}")]
    Decode(String),

    #[error("cannot parse {what}: {source}")]
    ConfigParse {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),

    #[error("object store error: {0}")]
    Store(#[from] kube::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl Error {
    pub fn serialize(err: impl std::fmt::Display) -> Self {
        Error::Serialize(err.to_string())
    }

    pub fn config_parse(what: &'static str, source: serde_yaml::Error) -> Self {
        Error::ConfigParse { what, source }
    }

    /// Only failures talking to the object store are worth retrying; every
    /// other error needs the source object to change first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}
