use thiserror::Error;

/// Result type for classlift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the lowering pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported construct in {method}: {message}")]
    Unsupported { method: String, message: String },

    #[error("Malformed method body in {method}: {message}")]
    MalformedBody { method: String, message: String },

    #[error("Invalid descriptor '{descriptor}': {message}")]
    Descriptor { descriptor: String, message: String },

    #[error("Internal consistency failure in {method}: {message}")]
    Internal { method: String, message: String },
}

impl Error {
    /// Create an unsupported-construct error
    pub fn unsupported(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported { method: method.into(), message: message.into() }
    }

    /// Create a malformed-body error
    pub fn malformed(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedBody { method: method.into(), message: message.into() }
    }

    /// Create a descriptor parse error
    pub fn descriptor(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Descriptor { descriptor: descriptor.into(), message: message.into() }
    }

    /// Create an internal-consistency error.
    ///
    /// These indicate that the frame oracle or a prior pass produced state the
    /// engine cannot reconcile; they are never recoverable by the caller.
    pub fn internal(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { method: method.into(), message: message.into() }
    }
}
