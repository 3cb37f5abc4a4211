//! Error types shared by the query compiler and the workflow chain.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A condition, sort or update references a field the object does not define.
    #[error("unknown field `{field}` on object `{object}`")]
    UnknownField { object: String, field: String },

    #[error("condition compile error: {0}")]
    ConditionCompile(String),

    #[error("storage error: {message}")]
    Storage {
        message: String,
        sql: Option<String>,
        transient: bool,
    },

    /// The post-update round trip failed. The write itself is not rolled back.
    #[error("notification error on `{topic}`: {message}")]
    Notification { topic: String, message: String },

    #[error("chain state error: {0}")]
    ChainState(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Annotation carrying the literal query text that was being built or run.
    #[error("{source} [sql: {sql}]")]
    WithQuery { source: Box<Error>, sql: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            sql: None,
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
            sql: None,
            transient: true,
        }
    }

    pub fn unknown_field(object: &str, field: &str) -> Self {
        Error::UnknownField {
            object: object.to_string(),
            field: field.to_string(),
        }
    }

    /// Attach the diagnostic query text. Storage errors carry it inline, every
    /// other kind is wrapped. Text that is already attached is kept.
    pub fn with_sql(self, text: impl Into<String>) -> Self {
        match self {
            Error::Storage {
                message,
                sql: None,
                transient,
            } => Error::Storage {
                message,
                sql: Some(text.into()),
                transient,
            },
            e @ (Error::Storage { .. } | Error::WithQuery { .. }) => e,
            other => Error::WithQuery {
                source: Box::new(other),
                sql: text.into(),
            },
        }
    }

    /// The most specific error, with query annotations peeled off.
    pub fn kind(&self) -> &Error {
        match self {
            Error::WithQuery { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Storage { sql, .. } => sql.as_deref(),
            Error::WithQuery { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), Error::Storage { transient: true, .. })
    }
}
