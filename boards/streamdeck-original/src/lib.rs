//! High level hidapi abstraction for interacting with the original 15 key stream deck.
//!
//! Keys are 72x72 pixel displays addressed 0-14, left to right and top to bottom.
//! A background thread polls the key states and fans transitions out to
//! registered callbacks.

use std::path::Path;
use std::sync::Arc;

use deck_sync_core::{Colour, DeckError, DeviceInfo, Result, Transport};
use tracing::{debug, warn};

pub mod abi;
pub mod codec;
pub mod media;
pub mod poller;
pub mod session;

pub use poller::{PollerState, SubscriptionId};

use poller::{KeyPoller, Subscribers};
use session::Session;

pub mod consts {
    pub const VENDOR_ID: u16 = 0x0FD9;
    pub const PRODUCT_ID: u16 = 0x0060;

    pub const NUM_KEYS: usize = 15;
    pub const ICON_SIZE: usize = 72;

    /// Size of every image output report, including header and padding
    pub const PAGE_PACKET_SIZE: usize = 8191;
    pub const PAGE_1_PIXELS: usize = 2583;
    pub const PAGE_2_PIXELS: usize = 2601;
    pub const PAGE_1_BYTES: usize = PAGE_1_PIXELS * 3;
    pub const PAGE_2_BYTES: usize = PAGE_2_PIXELS * 3;

    /// Length of a raw 72x72 RGB key buffer
    pub const PIXEL_BUFFER_LEN: usize = ICON_SIZE * ICON_SIZE * 3;

    pub const BRIGHTNESS_REPORT_LEN: usize = 17;

    /// Report id, one byte per key, one trailing byte
    pub const INPUT_REPORT_LEN: usize = NUM_KEYS + 2;

    const _: () = assert!(PAGE_1_PIXELS + PAGE_2_PIXELS == ICON_SIZE * ICON_SIZE);
}

/// Static device info for detection
pub static INFO: DeviceInfo = DeviceInfo {
    name: "Stream Deck",
    vendor_id: consts::VENDOR_ID,
    product_id: consts::PRODUCT_ID,
    num_keys: consts::NUM_KEYS,
    icon_size: consts::ICON_SIZE as u32,
};

/// Cloneable handle that can close the device from another thread, ie a
/// signal handler. The poller stops and [`StreamDeck::wait`] returns `Ok`.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Session>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.close();
    }
}

/// Open session with a stream deck
pub struct StreamDeck {
    session: Arc<Session>,
    subscribers: Arc<Subscribers>,
    poller: KeyPoller,
}

impl StreamDeck {
    /// Find and open the device, and start polling keys
    pub fn open() -> Result<Self> {
        Self::from_session(Session::open()?)
    }

    /// Start a session over an already open transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Result<Self> {
        Self::from_session(Session::new(transport))
    }

    fn from_session(session: Session) -> Result<Self> {
        let session = Arc::new(session);
        let subscribers = Arc::new(Subscribers::default());
        let poller = KeyPoller::spawn(session.clone(), subscribers.clone())?;
        Ok(Self {
            session,
            subscribers,
            poller,
        })
    }

    /// Returns false and logs if the key is out of range
    fn check_key(&self, key: u8) -> bool {
        if (key as usize) < consts::NUM_KEYS {
            true
        } else {
            warn!("{}", DeckError::InvalidKeyIndex(key));
            false
        }
    }

    fn write_pages(&self, key: u8, page_1: &[u8], page_2: &[u8]) -> Result<()> {
        let page_1 = abi::page_1(key, page_1);
        let page_2 = abi::page_2(key, page_2);
        self.session.write_all(&[&page_1, &page_2])
    }

    /// Fill a key with a solid colour
    pub fn fill_colour(&self, key: u8, colour: Colour) -> Result<()> {
        if !self.check_key(key) {
            return Ok(());
        }
        debug!("filling key {key} with {colour}");
        let (page_1, page_2) = codec::encode_colour(colour);
        self.write_pages(key, &page_1, &page_2)
    }

    /// Fill a key with a raw 72x72 RGB buffer. Buffers of any other length are
    /// logged and ignored.
    pub fn fill_image(&self, key: u8, pixels: &[u8]) -> Result<()> {
        if !self.check_key(key) {
            return Ok(());
        }
        let (page_1, page_2) = match codec::encode_image(pixels) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("ignoring image for key {key}: {e}");
                return Ok(());
            },
        };
        debug!("filling key {key} with image");
        self.write_pages(key, &page_1, &page_2)
    }

    /// Decode an image file, resize it to fill the key, and upload it.
    /// Transparent pixels are mixed against black.
    pub fn fill_image_from_path(&self, key: u8, path: impl AsRef<Path>) -> Result<()> {
        self.fill_image_from_path_with(key, path, Colour::BLACK, false)
    }

    /// [`Self::fill_image_from_path`] with an explicit background and filter
    pub fn fill_image_from_path_with(
        &self,
        key: u8,
        path: impl AsRef<Path>,
        background: Colour,
        nearest: bool,
    ) -> Result<()> {
        if !self.check_key(key) {
            return Ok(());
        }
        let pixels = media::load_key_image(path, background, nearest)?;
        self.fill_image(key, &pixels)
    }

    /// Reset a key to black
    pub fn clear(&self, key: u8) -> Result<()> {
        self.fill_colour(key, Colour::BLACK)
    }

    /// Reset every key to black
    pub fn clear_all(&self) -> Result<()> {
        for key in 0..consts::NUM_KEYS as u8 {
            self.clear(key)?;
        }
        Ok(())
    }

    /// Set the backlight brightness, clamped to 0-100 percent
    pub fn set_brightness(&self, percentage: i32) -> Result<()> {
        self.session.send_feature_report(&abi::brightness(percentage))
    }

    /// Register a callback for key presses. Callbacks run on the poller thread
    /// and must not block, or every following event is delayed.
    pub fn on_press(&self, cb: impl Fn(u8) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.on_press(cb)
    }

    /// Register a callback for key releases. See [`Self::on_press`].
    pub fn on_release(&self, cb: impl Fn(u8) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.on_release(cb)
    }

    /// Remove a press or release callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.session.clone())
    }

    /// Block until the poller stops. Returns the read failure that stopped it,
    /// or `Ok` after a shutdown.
    pub fn wait(&self) -> Result<()> {
        self.poller.join()
    }

    /// Close the transport and wait for the poller to exit
    pub fn shutdown(self) -> Result<()> {
        self.session.close();
        self.wait()
    }
}

impl Drop for StreamDeck {
    fn drop(&mut self) {
        self.session.close();
        if let Err(e) = self.poller.join() {
            debug!("poller exited with error: {e}");
        }
    }
}

#[cfg(test)]
mod tests;
