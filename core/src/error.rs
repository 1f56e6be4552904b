use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} '{id}' not found in tenant '{tenant}'")]
    NotFound {
        kind: &'static str,
        id: String,
        tenant: String,
    },

    #[error("Invalid {what}: '{value}'")]
    InvalidValue { what: &'static str, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    pub fn not_found(kind: &'static str, tenant: &str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
            tenant: tenant.to_string(),
        }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
