//! Terminal error type for conversion tasks. Implements Display and Serialize
//! so event consumers can render it directly.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("Cannot read {path}: {detail}")]
    SourceUnreadable { path: String, detail: String },

    #[error("Invalid video properties in {path}")]
    InvalidMetadata { path: String },

    #[error("Cannot open {path}: {detail}")]
    DestinationUnopenable { path: String, detail: String },

    #[error("Conversion aborted by user")]
    Aborted,

    #[error("A conversion is already running")]
    Busy,
}

impl ConvertError {
    pub fn source_unreadable(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn destination_unopenable(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DestinationUnopenable {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

impl serde::Serialize for ConvertError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
