//! Error taxonomy for device operations.

/// Errors that can occur during device operations
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// No device matching the vendor/product identity was found
    #[error("device not found")]
    DeviceNotFound,

    /// The device was found, but the transport could not be opened
    #[error("failed to open transport: {0}")]
    TransportOpenFailed(String),

    /// Key index outside of the device's key range
    #[error("invalid key index: {0}")]
    InvalidKeyIndex(u8),

    /// Raw pixel buffer did not have the exact expected length
    #[error("pixel buffer must be exactly {expected} bytes, got {actual}")]
    PixelBufferSizeMismatch { expected: usize, actual: usize },

    /// Fatal input read failure, ie the device was unplugged
    #[error("read failed: {0}")]
    ReadFailure(String),

    /// Output or feature report could not be written
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// Source media could not be decoded
    #[error("invalid media: {0}")]
    InvalidMedia(String),

    /// A subscriber panicked on the poller thread
    #[error("key poller panicked")]
    PollerPanicked,

    /// HID communication error
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeckError>;
