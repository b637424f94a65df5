use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The database-backed provider was selected but no model identifier
    /// could be resolved from configuration.
    #[error("no model is configured; a model is required to use the `{provider}` user provider")]
    MissingModel { provider: String },

    #[error("unknown user provider kind `{name}`")]
    UnknownProvider { name: String },

    #[error("unknown authentication event `{name}`")]
    UnknownEvent { name: String },

    #[error("unknown event listener `{name}`")]
    UnknownListener { name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration file error: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    #[error("directory error: {0}")]
    Directory(#[from] ldap3::LdapError),

    #[error("identity store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a configuration fault rather than a runtime
    /// failure of a collaborator. Configuration faults are fatal at startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingModel { .. }
                | Error::UnknownProvider { .. }
                | Error::UnknownEvent { .. }
                | Error::UnknownListener { .. }
                | Error::Config(_)
                | Error::ConfigFile(_)
        )
    }
}
