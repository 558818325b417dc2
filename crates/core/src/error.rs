use thiserror::Error;

/// Error taxonomy from spec §7, one variant per error kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal-only signal raised during the configuration build-then-freeze
    /// phase (spec §7's "recoverable resolution failure"). A `StatementRegistryBuilder`
    /// catches this itself during its retry pass; it must never escape `freeze()`.
    #[error("incomplete: unresolved reference {0}")]
    Incomplete(String),

    #[error("binding error: {0}")]
    Binding(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("execution error in statement {statement_id}: {message}")]
    Execution {
        statement_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl Error {
    pub fn execution(statement_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            statement_id: statement_id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Incomplete(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
