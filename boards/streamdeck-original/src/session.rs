//! Device session and hidapi transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, RwLock};

use deck_sync_core::{DeckError, ReadOutcome, Result, Transport};
use hidapi::{HidApi, HidDevice};
use tracing::{debug, info};

use crate::consts::INPUT_REPORT_LEN;
use crate::INFO;

/// Poll interval for the reader handle. hidapi cannot interrupt a blocking read
/// from another thread, so `close` takes effect on the next tick.
const READ_TIMEOUT_MS: i32 = 50;

/// Lazy handle to hidapi
static API: LazyLock<RwLock<Option<HidApi>>> = LazyLock::new(|| RwLock::new(None));

/// hidapi backed transport.
///
/// The device is opened twice: one handle for the poller's reads and one for
/// writes and feature reports, so neither direction waits on the other.
///
/// `close` cannot interrupt a read already blocked inside hidapi. A pending
/// `read` observes the close and returns [`ReadOutcome::Closed`] within one
/// read tick of 50ms.
pub struct HidTransport {
    reader: Mutex<Option<HidDevice>>,
    writer: Mutex<Option<HidDevice>>,
    closed: AtomicBool,
}

impl HidTransport {
    /// Find the device by vendor and product id, and open it
    pub fn open() -> Result<Self> {
        let mut guard = API.write().map_err(|_| hid_poisoned())?;
        match guard.as_mut() {
            Some(api) => api.refresh_devices()?,
            None => *guard = Some(HidApi::new()?),
        }
        let api = guard.as_ref().ok_or_else(hid_poisoned)?;
        share_device(api);

        let device = api
            .device_list()
            .find(|d| d.vendor_id() == INFO.vendor_id && d.product_id() == INFO.product_id)
            .ok_or(DeckError::DeviceNotFound)?;
        debug!(
            path = ?device.path(),
            serial = device.serial_number().unwrap_or_default(),
            "found device"
        );

        let open = || {
            device
                .open_device(api)
                .map_err(|e| DeckError::TransportOpenFailed(e.to_string()))
        };
        let reader = open()?;
        let writer = open()?;

        Ok(Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }
}

/// Both handles open the same path, which macOS refuses in its default
/// exclusive mode
#[cfg(target_os = "macos")]
fn share_device(api: &HidApi) {
    api.set_open_exclusive(false);
}

#[cfg(not(target_os = "macos"))]
fn share_device(_api: &HidApi) {}

fn hid_poisoned() -> DeckError {
    DeckError::TransportOpenFailed("hidapi lock poisoned".into())
}

impl Transport for HidTransport {
    fn max_input_report_length(&self) -> usize {
        INPUT_REPORT_LEN
    }

    fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(ReadOutcome::Closed);
        }
        let reader = self
            .reader
            .lock()
            .map_err(|_| DeckError::ReadFailure("reader lock poisoned".into()))?;
        let Some(device) = reader.as_ref() else {
            return Ok(ReadOutcome::Closed);
        };
        match device.read_timeout(buf, READ_TIMEOUT_MS) {
            Ok(0) if self.closed.load(Ordering::Acquire) => Ok(ReadOutcome::Closed),
            Ok(0) => Ok(ReadOutcome::Timeout),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) => Err(DeckError::ReadFailure(e.to_string())),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| DeckError::WriteFailure("writer lock poisoned".into()))?;
        let device = writer
            .as_ref()
            .ok_or_else(|| DeckError::WriteFailure("transport closed".into()))?;
        device
            .write(data)
            .map_err(|e| DeckError::WriteFailure(e.to_string()))
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| DeckError::WriteFailure("writer lock poisoned".into()))?;
        let device = writer
            .as_ref()
            .ok_or_else(|| DeckError::WriteFailure("transport closed".into()))?;
        device
            .send_feature_report(data)
            .map_err(|e| DeckError::WriteFailure(e.to_string()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the handles closes them. The reader is released once the
        // poller returns from its current read.
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if let Ok(mut reader) = self.reader.lock() {
            reader.take();
        }
    }
}

/// Owned handle to an open device.
///
/// All writes and feature reports go through a single lock so fixed size
/// packets are never interleaved on the wire.
pub struct Session {
    transport: Box<dyn Transport>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Session {
    /// Discover and open the device over hidapi
    pub fn open() -> Result<Self> {
        let transport = HidTransport::open()?;
        info!("connected to {}", INFO.name);
        Ok(Self::new(Box::new(transport)))
    }

    /// Wrap an already open transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_input_report_length(&self) -> usize {
        self.transport.max_input_report_length()
    }

    /// Blocking read of the next input report
    pub fn read_input_report(&self, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.transport.read(buf)
    }

    /// Write a single output report
    pub fn write(&self, packet: &[u8]) -> Result<()> {
        self.write_all(&[packet])
    }

    /// Write several output reports without any other write in between
    pub fn write_all(&self, packets: &[&[u8]]) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DeckError::WriteFailure("write lock poisoned".into()))?;
        for packet in packets {
            self.ensure_open()?;
            let written = self.transport.write(packet)?;
            if written != packet.len() {
                return Err(DeckError::WriteFailure(format!(
                    "short write: {written} of {} bytes",
                    packet.len()
                )));
            }
        }
        Ok(())
    }

    /// Send a feature report
    pub fn send_feature_report(&self, report: &[u8]) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DeckError::WriteFailure("write lock poisoned".into()))?;
        self.ensure_open()?;
        self.transport.send_feature_report(report)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DeckError::WriteFailure("transport closed".into()));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the transport. Only the first call has any effect.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing transport");
            self.transport.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "macos")]
    #[test]
    fn macos_opens_shared() {
        let api = HidApi::new().unwrap();
        share_device(&api);
        assert!(!api.get_open_exclusive());
    }

    #[test]
    fn writes_after_close_fail() {
        struct Sink;
        impl Transport for Sink {
            fn max_input_report_length(&self) -> usize {
                INPUT_REPORT_LEN
            }
            fn read(&self, _buf: &mut [u8]) -> Result<ReadOutcome> {
                Ok(ReadOutcome::Closed)
            }
            fn write(&self, data: &[u8]) -> Result<usize> {
                Ok(data.len())
            }
            fn send_feature_report(&self, _data: &[u8]) -> Result<()> {
                Ok(())
            }
            fn close(&self) {}
        }

        let session = Session::new(Box::new(Sink));
        session.write(&[0; 4]).unwrap();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(session.write(&[0; 4]), Err(DeckError::WriteFailure(_))));
    }
}
