//! HID transport capability consumed by device crates.

use crate::Result;

/// Static information about a device type for detection and CLI
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub num_keys: usize,
    pub icon_size: u32,
}

/// Result of a single blocking input read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were written into the buffer. May be zero for spurious reads.
    Data(usize),
    /// The read timed out without data; callers should retry.
    Timeout,
    /// The transport was closed locally; no further reads will succeed.
    Closed,
}

/// Key transition produced by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEvent {
    Pressed(u8),
    Released(u8),
}

impl KeyEvent {
    pub fn key(&self) -> u8 {
        match self {
            KeyEvent::Pressed(k) | KeyEvent::Released(k) => *k,
        }
    }
}

/// Open HID stream to a single device.
///
/// The read direction and the write/feature direction are independent: one
/// thread may block in `read` while others write. Implementations do not
/// serialize writes; the device session does.
pub trait Transport: Send + Sync {
    /// Maximum input report length declared by the device
    fn max_input_report_length(&self) -> usize;

    /// Blocking read of a single input report into `buf`
    fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Write an output report, returning the number of bytes written
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Send a feature report
    fn send_feature_report(&self, data: &[u8]) -> Result<()>;

    /// Close the transport, unblocking any pending `read` with `ReadOutcome::Closed`.
    ///
    /// Backends whose reads cannot be interrupted must bound the wait with a
    /// short read timeout and report `Closed` on the next tick.
    fn close(&self);
}
