//! # Error Types
//!
//! Error types for the connection backplane using `thiserror`.

/// Custom result type for backplane operations
pub type Result<T> = std::result::Result<T, BackplaneError>;

/// Main error type for the connection backplane
#[derive(thiserror::Error, Debug)]
pub enum BackplaneError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Ciphertext could not be opened (wrong or rotated key, truncated or tampered input)
    #[error("Decryption error: {message}")]
    Decryption { message: String },

    /// Ciphertext opened but the plaintext is not a usable credential envelope
    #[error("Malformed credential payload: {message}")]
    MalformedPayload {
        message: String,
        provider: Option<String>,
    },

    /// Provider tag is not registered with the client factory
    #[error("Unknown provider '{provider}'")]
    UnknownProvider { provider: String },

    /// Backend could not be reached or refused the connection
    #[error("Connectivity error ({backend}): {message}")]
    Connectivity { backend: String, message: String },

    /// A backend-native operation failed; carries the backend's error text
    #[error("Query execution failed ({backend}): {message}")]
    QueryExecution { backend: String, message: String },

    /// Record-store errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// A concurrent operation already changed the state this one was based on
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BackplaneError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a decryption error
    pub fn decryption<S: Into<String>>(message: S) -> Self {
        Self::Decryption { message: message.into() }
    }

    /// Create a malformed payload error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedPayload { message: message.into(), provider: None }
    }

    /// Create a malformed payload error attributed to a provider
    pub fn malformed_for<P: Into<String>, S: Into<String>>(provider: P, message: S) -> Self {
        Self::MalformedPayload { message: message.into(), provider: Some(provider.into()) }
    }

    /// Create an unknown provider error
    pub fn unknown_provider<S: Into<String>>(provider: S) -> Self {
        Self::UnknownProvider { provider: provider.into() }
    }

    /// Create a connectivity error
    pub fn connectivity<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::Connectivity { backend: backend.into(), message: message.into() }
    }

    /// Create a query execution error
    pub fn query<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::QueryExecution { backend: backend.into(), message: message.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Decryption { .. } => "decryption",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::UnknownProvider { .. } => "unknown_provider",
            Self::Connectivity { .. } => "connectivity",
            Self::QueryExecution { .. } => "query_execution",
            Self::Database { .. } => "database",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. }
                | Self::Database { .. }
                | Self::Io { .. }
                | Self::Timeout { .. }
                | Self::Conflict { .. }
        )
    }
}

impl From<sqlx::Error> for BackplaneError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for BackplaneError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for BackplaneError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for BackplaneError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decryption_and_malformed_are_distinct() {
        let decrypt = BackplaneError::decryption("authentication failed");
        let malformed = BackplaneError::malformed("expected a JSON object");

        assert!(matches!(decrypt, BackplaneError::Decryption { .. }));
        assert!(matches!(malformed, BackplaneError::MalformedPayload { .. }));
        assert_ne!(decrypt.kind(), malformed.kind());
    }

    #[test]
    fn test_malformed_for_provider() {
        let error = BackplaneError::malformed_for("http-api", "missing base_url");
        if let BackplaneError::MalformedPayload { provider, .. } = &error {
            assert_eq!(provider.as_deref(), Some("http-api"));
        } else {
            panic!("expected malformed payload error");
        }
        assert_eq!(error.to_string(), "Malformed credential payload: missing base_url");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            BackplaneError::unknown_provider("mongo").to_string(),
            "Unknown provider 'mongo'"
        );
        assert_eq!(
            BackplaneError::query("file-relational", "no such table: trades").to_string(),
            "Query execution failed (file-relational): no such table: trades"
        );
        assert_eq!(
            BackplaneError::not_found("connection", "42").to_string(),
            "Resource not found: connection with ID '42'"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(BackplaneError::connectivity("http-api", "refused").is_retryable());
        assert!(BackplaneError::timeout("probe", 1000).is_retryable());
        assert!(BackplaneError::conflict("lost race").is_retryable());
        assert!(!BackplaneError::decryption("bad key").is_retryable());
        assert!(!BackplaneError::unknown_provider("x").is_retryable());
        assert!(!BackplaneError::validation("disabled").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: BackplaneError = io_error.into();
        assert!(matches!(error, BackplaneError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: BackplaneError = json_error.into();
        assert!(matches!(error, BackplaneError::Serialization { .. }));
    }
}
