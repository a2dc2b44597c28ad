use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetailMetricsError {
    #[error("Malformed order line {order_id}/{line_no}: {reason}")]
    MalformedLine {
        order_id: u64,
        line_no: u32,
        reason: String,
    },

    #[error("Unmapped dimension: {dimension} key {key} has no matching reference row")]
    UnmappedDimension { dimension: String, key: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RetailMetricsError {
    fn from(e: serde_json::Error) -> Self {
        RetailMetricsError::SerializationError(e.to_string())
    }
}
