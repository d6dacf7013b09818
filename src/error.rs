use config::ConfigError;
use maxminddb::MaxMindDbError;
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MaxMindDbError: {0}")]
    Database(#[from] MaxMindDbError),
    #[error("invalid network or address {input:?}: {reason}")]
    InvalidInput { input: String, reason: String },
    #[error("record for {input:?} could not be converted to a map, found {found}")]
    UnexpectedShape { input: String, found: &'static str },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ConfigError: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error("-db is required")]
    MissingDatabase,
}

impl Error {
    pub fn invalid_input(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidInput {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unexpected_shape(input: impl Into<String>, value: &serde_json::Value) -> Self {
        let found = match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "map",
        };
        Self::UnexpectedShape {
            input: input.into(),
            found,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "database_error",
            Error::InvalidInput { .. } => "invalid_input",
            Error::UnexpectedShape { .. } => "unexpected_shape",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Config(_) => "config_error",
            Error::Validation(_) => "invalid_config",
            Error::MissingDatabase => "missing_database",
        }
    }
}
