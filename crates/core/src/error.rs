/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
///
/// Only `BlockedByPolicy` and `LoadFailure` are meant to reach the user;
/// `InvalidSeekTarget` is produced internally and absorbed by the controller.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// Audio graph construction or playback was attempted outside of a user
    /// gesture. Hosts should surface this as "tap to play".
    #[error("playback is awaiting user interaction")]
    BlockedByPolicy,
    /// The media source failed to load or decode.
    #[error("failed to load media: {0}")]
    LoadFailure(String),
    /// A seek was requested while the media duration is unknown.
    #[error("seek target is not valid while the duration is unknown")]
    InvalidSeekTarget,
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Wrapper around FFT planning and processing failures.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Whether the error should be presented to the user as a prompt to
    /// interact with the page before playback can continue.
    pub fn awaits_user_interaction(&self) -> bool {
        matches!(self, Self::BlockedByPolicy)
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
