//! Connector framework error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error that can occur while resolving or provisioning directory objects.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Directory availability (usually transient)
    /// The underlying directory session failed or is unreachable.
    #[error("directory unavailable: {message}")]
    DirectoryUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to establish a connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A per-call timeout elapsed.
    #[error("operation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    // Identity decoding (permanent for the offending value)
    /// A binary identifier (SID, GUID, security descriptor) could not be
    /// decoded from the directory-returned bytes.
    #[error("malformed identifier: {message}")]
    MalformedIdentifier { message: String },

    // Lookup failures (permanent)
    /// An identifier-based lookup yielded no entry.
    #[error("entry not found: {identifier}")]
    EntryNotFound { identifier: String },

    /// An attribute could not be resolved the way the directory promised,
    /// e.g. a range-paging protocol violation.
    #[error("attribute '{attribute}' unsupported: {message}")]
    AttributeUnsupported { attribute: String, message: String },

    // Configuration errors (permanent)
    /// The engine configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The requested object class is not known to the schema mapping.
    #[error("object class '{object_class}' not found in schema")]
    ObjectClassNotFound { object_class: String },

    // Operation errors
    /// A directory operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The supplied data cannot be turned into a directory value.
    #[error("invalid data: {message}")]
    InvalidData { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may be retried.
    ///
    /// Retry policy itself belongs to the session collaborator; this
    /// classification only feeds it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::DirectoryUnavailable { .. }
                | ConnectorError::ConnectionFailed { .. }
                | ConnectorError::Timeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get a stable error code for classification and logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::DirectoryUnavailable { .. } => "DIRECTORY_UNAVAILABLE",
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::Timeout { .. } => "TIMEOUT",
            ConnectorError::MalformedIdentifier { .. } => "MALFORMED_IDENTIFIER",
            ConnectorError::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            ConnectorError::AttributeUnsupported { .. } => "ATTRIBUTE_UNSUPPORTED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::ObjectClassNotFound { .. } => "OBJECT_CLASS_NOT_FOUND",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
        }
    }

    // Convenience constructors

    /// Create a directory-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ConnectorError::DirectoryUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a directory-unavailable error with source.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::DirectoryUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed-identifier error.
    pub fn malformed(message: impl Into<String>) -> Self {
        ConnectorError::MalformedIdentifier {
            message: message.into(),
        }
    }

    /// Create an entry-not-found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::EntryNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an attribute-unsupported error.
    pub fn attribute_unsupported(
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ConnectorError::AttributeUnsupported {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create an operation-failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation-failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
