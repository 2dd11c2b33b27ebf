//! Background key poller and subscriber registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use deck_sync_core::{DeckError, KeyEvent, ReadOutcome, Result};
use tracing::{debug, error, trace};

use crate::consts::NUM_KEYS;
use crate::session::Session;

/// Callback invoked with the 0-indexed key on the poller thread
pub type KeyCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Handle returned when registering a callback, used to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Poller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Running,
    Stopped,
}

/// Explicit observer lists for press and release events
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    press: Mutex<BTreeMap<SubscriptionId, KeyCallback>>,
    release: Mutex<BTreeMap<SubscriptionId, KeyCallback>>,
}

impl Subscribers {
    fn insert(
        &self,
        list: &Mutex<BTreeMap<SubscriptionId, KeyCallback>>,
        cb: KeyCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut list) = list.lock() {
            list.insert(id, cb);
        }
        id
    }

    pub fn on_press(&self, cb: impl Fn(u8) + Send + Sync + 'static) -> SubscriptionId {
        self.insert(&self.press, Arc::new(cb))
    }

    pub fn on_release(&self, cb: impl Fn(u8) + Send + Sync + 'static) -> SubscriptionId {
        self.insert(&self.release, Arc::new(cb))
    }

    /// Remove a callback from whichever list holds it
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        [&self.press, &self.release]
            .into_iter()
            .any(|list| list.lock().is_ok_and(|mut list| list.remove(&id).is_some()))
    }

    /// Invoke every current subscriber for the event, in registration order.
    ///
    /// Callbacks are cloned out of the list first, so a subscriber may
    /// register or unregister without deadlocking.
    pub fn dispatch(&self, event: KeyEvent) {
        let list = match event {
            KeyEvent::Pressed(_) => &self.press,
            KeyEvent::Released(_) => &self.release,
        };
        let callbacks = match list.lock() {
            Ok(list) => list.values().cloned().collect::<Vec<_>>(),
            Err(_) => return,
        };
        for cb in callbacks {
            cb(event.key());
        }
    }
}

/// Last known pressed state of every key
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyState([bool; NUM_KEYS]);

impl KeyState {
    /// Diff an input report against the stored state, emitting a transition for
    /// each changed key in index order. Byte 0 is the report id.
    pub fn update(&mut self, report: &[u8], mut emit: impl FnMut(KeyEvent)) {
        let keys = report.iter().skip(1).take(NUM_KEYS);
        for (i, (stored, byte)) in self.0.iter_mut().zip(keys).enumerate() {
            let pressed = *byte != 0;
            if pressed != *stored {
                let key = i as u8;
                emit(if pressed {
                    KeyEvent::Pressed(key)
                } else {
                    KeyEvent::Released(key)
                });
                *stored = pressed;
            }
        }
    }
}

/// Clears the running flag when the reader thread exits, unwinding included
struct StopOnExit(Arc<AtomicBool>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Dedicated reader thread turning input reports into key events
pub struct KeyPoller {
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    running: Arc<AtomicBool>,
}

impl KeyPoller {
    /// Spawn the reader thread. The poller is `Running` on return.
    pub fn spawn(session: Arc<Session>, subscribers: Arc<Subscribers>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stop = StopOnExit(running.clone());
        let handle = std::thread::Builder::new()
            .name("key-poller".into())
            .spawn(move || {
                let _stop = stop;
                run_poller(&session, &subscribers)
            })?;
        Ok(Self {
            handle: Mutex::new(Some(handle)),
            running,
        })
    }

    pub fn state(&self) -> PollerState {
        if self.running.load(Ordering::Acquire) {
            PollerState::Running
        } else {
            PollerState::Stopped
        }
    }

    /// Block until the reader thread exits, returning its fatal error if any.
    /// Returns immediately if already joined.
    pub fn join(&self) -> Result<()> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| DeckError::PollerPanicked)?
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| DeckError::PollerPanicked)?,
            None => Ok(()),
        }
    }
}

fn run_poller(session: &Session, subscribers: &Subscribers) -> Result<()> {
    debug!("key poller started");
    let mut state = KeyState::default();
    let mut buf = vec![0u8; session.max_input_report_length()];

    loop {
        match session.read_input_report(&mut buf) {
            Ok(ReadOutcome::Data(0)) => trace!("ignoring empty input report"),
            Ok(ReadOutcome::Data(n)) => {
                trace!("input report: {:02X?}", &buf[..n]);
                state.update(&buf[..n], |event| {
                    // no events once shutdown has begun
                    if !session.is_closed() {
                        subscribers.dispatch(event)
                    }
                });
            },
            Ok(ReadOutcome::Timeout) => {},
            Ok(ReadOutcome::Closed) => break,
            Err(_) if session.is_closed() => break,
            Err(e) => {
                error!("key poller stopped: {e}");
                return Err(e);
            },
        }
    }

    debug!("key poller exiting");
    Ok(())
}
