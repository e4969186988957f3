use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Embedding error: {provider} - {message}")]
    Embedding { provider: String, message: String },

    #[error("Compression error: {message}")]
    Compression { message: String },

    #[error("Decompression error: {message}")]
    Decompression { message: String },

    #[error("Disk read error: {message}")]
    DiskRead { message: String },

    #[error("Disk write error: {message}")]
    DiskWrite { message: String },

    #[error("Capacity exceeded: {message}")]
    CapacityExceeded { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    pub fn decompression(message: impl Into<String>) -> Self {
        Self::Decompression {
            message: message.into(),
        }
    }

    pub fn disk_read(message: impl Into<String>) -> Self {
        Self::DiskRead {
            message: message.into(),
        }
    }

    pub fn disk_write(message: impl Into<String>) -> Self {
        Self::DiskWrite {
            message: message.into(),
        }
    }

    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::CapacityExceeded {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Errors the read path downgrades to a cache miss
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Decompression { .. } | Self::DiskRead { .. })
    }
}
