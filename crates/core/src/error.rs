/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// Rejected analyzer or engine configuration. Nothing from the rejected
    /// request has been applied when this is returned.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The capture device is missing, busy or access was denied.
    #[error("audio capture unavailable: {0}")]
    Capture(String),
    /// Encoded audio could not be turned into samples.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// A single frame failed to draw.
    #[error("draw failed: {0}")]
    Draw(String),
    /// Lookup of a registered visualization by name failed.
    #[error("no visualization registered as `{0}`")]
    NotFound(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn decode<T: Into<String>>(msg: T) -> Self {
        Self::Decode(msg.into())
    }

    pub fn draw<T: Into<String>>(msg: T) -> Self {
        Self::Draw(msg.into())
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
