//! Error types for the shared-service operator

use thiserror::Error;

/// Main error type for shared-service operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource spec or provisioning input that can never succeed as-is
    #[error("validation error: {message}")]
    Validation {
        /// What was rejected
        message: String,
    },

    /// Failure expected to clear on a later delivery of the same event
    #[error("transient error during {operation}: {message}")]
    Transient {
        /// Operation that failed
        operation: String,
        /// Failure detail
        message: String,
    },

    /// A referenced object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// No shared instance of the requested type has free capacity
    #[error("no shared instance of type '{service_type}' has free capacity")]
    CapacityExhausted {
        /// Requested service type
        service_type: String,
    },

    /// Broker request for an instance ID that was never created
    #[error("no such instance with ID {instance_id}")]
    NoSuchInstance {
        /// Broker-issued instance ID
        instance_id: String,
    },

    /// Broker instance re-created with different credentials
    #[error("instance {instance_id} already exists with different credentials")]
    InstanceConflict {
        /// Broker-issued instance ID
        instance_id: String,
    },

    /// Operation not implemented by this backend
    #[error("{operation} is not implemented")]
    Unimplemented {
        /// Operation name
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a transient error for the named operation
    pub fn transient(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a capacity-exhausted error for a service type
    pub fn capacity_exhausted(service_type: impl Into<String>) -> Self {
        Self::CapacityExhausted {
            service_type: service_type.into(),
        }
    }

    /// Create a broker no-such-instance error
    pub fn no_such_instance(instance_id: impl Into<String>) -> Self {
        Self::NoSuchInstance {
            instance_id: instance_id.into(),
        }
    }

    /// Create a broker instance conflict error
    pub fn instance_conflict(instance_id: impl Into<String>) -> Self {
        Self::InstanceConflict {
            instance_id: instance_id.into(),
        }
    }

    /// Create an unimplemented-operation error
    pub fn unimplemented(operation: impl Into<String>) -> Self {
        Self::Unimplemented {
            operation: operation.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether a later re-delivery of the same event may succeed
    ///
    /// Kubernetes 4xx responses (other than 404, 409 and 429) are client
    /// errors and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(ae)) => {
                !(400..500).contains(&ae.code) || matches!(ae.code, 404 | 409 | 429)
            }
            Error::Kube(_) => true,
            Error::Transient { .. } | Error::NotFound { .. } | Error::CapacityExhausted { .. } => {
                true
            }
            Error::Validation { .. }
            | Error::NoSuchInstance { .. }
            | Error::InstanceConflict { .. }
            | Error::Unimplemented { .. }
            | Error::Serialization(_) => false,
        }
    }

    /// Whether the error should move the owning resource to Failed
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Whether the error means the target object is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
