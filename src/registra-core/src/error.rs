use thiserror::Error;

/// Errors surfaced by the registry and by gateway publishers.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required field was missing or blank on create/update.
    #[error("validation error: {0}")]
    Validation(String),

    /// An entity the operation depends on does not exist.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"api"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// A route with the same key is already active on the gateway.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Failure reported by the storage collaborator, propagated as is.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RegistryError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable machine-readable kind, paired with `Display` for the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
