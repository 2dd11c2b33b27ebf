use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use deck_sync_core::{Colour, DeckError, KeyEvent, ReadOutcome, Result, Transport};

use crate::abi::{PAGE_1_HEADER_LEN, PAGE_2_HEADER_LEN};
use crate::consts::*;
use crate::{codec, PollerState, StreamDeck};

const TIMEOUT: Duration = Duration::from_secs(5);

enum Input {
    Report(Vec<u8>),
    Timeout,
    Fail,
}

#[derive(Default)]
struct Fake {
    inputs: Mutex<(VecDeque<Input>, bool)>,
    ready: Condvar,
    writes: Mutex<Vec<Vec<u8>>>,
    features: Mutex<Vec<Vec<u8>>>,
    closes: AtomicUsize,
}

impl Fake {
    fn push(&self, input: Input) {
        self.inputs.lock().unwrap().0.push_back(input);
        self.ready.notify_all();
    }

    fn press(&self, pressed: &[usize]) {
        let mut report = vec![0u8; INPUT_REPORT_LEN];
        report[0] = 0x01;
        for k in pressed {
            report[k + 1] = 1;
        }
        self.push(Input::Report(report));
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    fn features(&self) -> Vec<Vec<u8>> {
        self.features.lock().unwrap().clone()
    }
}

struct FakeTransport(Arc<Fake>);

impl Transport for FakeTransport {
    fn max_input_report_length(&self) -> usize {
        INPUT_REPORT_LEN
    }

    fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let mut inputs = self.0.inputs.lock().unwrap();
        loop {
            if inputs.1 {
                return Ok(ReadOutcome::Closed);
            }
            match inputs.0.pop_front() {
                Some(Input::Report(report)) => {
                    buf[..report.len()].copy_from_slice(&report);
                    return Ok(ReadOutcome::Data(report.len()));
                },
                Some(Input::Timeout) => return Ok(ReadOutcome::Timeout),
                Some(Input::Fail) => return Err(DeckError::ReadFailure("unplugged".into())),
                None => inputs = self.0.ready.wait(inputs).unwrap(),
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        self.0.writes.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        self.0.features.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        self.0.inputs.lock().unwrap().1 = true;
        self.0.ready.notify_all();
    }
}

fn open() -> (StreamDeck, Arc<Fake>) {
    let fake = Arc::new(Fake::default());
    let deck = StreamDeck::with_transport(Box::new(FakeTransport(fake.clone()))).unwrap();
    (deck, fake)
}

fn events(deck: &StreamDeck) -> Receiver<KeyEvent> {
    let (tx, rx) = mpsc::channel();
    let press = tx.clone();
    deck.on_press(move |k| press.send(KeyEvent::Pressed(k)).unwrap());
    deck.on_release(move |k| tx.send(KeyEvent::Released(k)).unwrap());
    rx
}

fn solid_pixels(colour: Colour) -> Vec<u8> {
    colour.to_rgb().repeat(ICON_SIZE * ICON_SIZE)
}

#[test]
fn invalid_keys_are_noops() {
    let (deck, fake) = open();
    for key in [15, 16, 200, 255] {
        deck.fill_colour(key, Colour::WHITE).unwrap();
        deck.fill_image(key, &solid_pixels(Colour::WHITE)).unwrap();
        deck.fill_image_from_path(key, "/nonexistent/icon.png").unwrap();
        deck.clear(key).unwrap();
    }
    assert!(fake.writes().is_empty());
}

#[test]
fn fill_colour_writes_both_pages() {
    let (deck, fake) = open();
    deck.fill_colour(2, Colour::new(10, 20, 30)).unwrap();

    let writes = fake.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.len() == PAGE_PACKET_SIZE));

    let (p1, p2) = (&writes[0], &writes[1]);
    assert_eq!(&p1[..6], &[0x02, 0x01, 0x01, 0x00, 0x00, 3]);
    assert_eq!(&p2[..6], &[0x02, 0x01, 0x02, 0x00, 0x01, 3]);
    let payload_1 = &p1[PAGE_1_HEADER_LEN..PAGE_1_HEADER_LEN + PAGE_1_BYTES];
    let payload_2 = &p2[PAGE_2_HEADER_LEN..PAGE_2_HEADER_LEN + PAGE_2_BYTES];
    assert!(payload_1.chunks(3).all(|c| c == [30, 20, 10]));
    assert!(payload_2.chunks(3).all(|c| c == [30, 20, 10]));
}

#[test]
fn clear_fills_black() {
    let (deck, fake) = open();
    deck.clear(0).unwrap();
    let writes = fake.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[0][PAGE_1_HEADER_LEN..].iter().all(|b| *b == 0));
    assert!(writes[1][PAGE_2_HEADER_LEN..].iter().all(|b| *b == 0));
}

#[test]
fn clear_all_touches_every_key() {
    let (deck, fake) = open();
    deck.clear_all().unwrap();
    let keys = fake.writes().iter().map(|w| w[5]).collect::<Vec<_>>();
    let expected = (1..=NUM_KEYS as u8).flat_map(|k| [k, k]).collect::<Vec<_>>();
    assert_eq!(keys, expected);
}

#[test]
fn fill_image_rejects_wrong_size() {
    let (deck, fake) = open();
    deck.fill_image(0, &[0u8; 100]).unwrap();
    deck.fill_image(0, &vec![0u8; PIXEL_BUFFER_LEN + 3]).unwrap();
    assert!(fake.writes().is_empty());
}

#[test]
fn fill_image_writes_encoded_pages() {
    let (deck, fake) = open();
    let pixels = (0..PIXEL_BUFFER_LEN)
        .map(|i| (i % 253) as u8)
        .collect::<Vec<_>>();
    deck.fill_image(14, &pixels).unwrap();

    let (page_1, page_2) = codec::encode_image(&pixels).unwrap();
    let writes = fake.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0][5], 15);
    assert_eq!(&writes[0][PAGE_1_HEADER_LEN..PAGE_1_HEADER_LEN + PAGE_1_BYTES], &page_1[..]);
    assert_eq!(&writes[1][PAGE_2_HEADER_LEN..PAGE_2_HEADER_LEN + PAGE_2_BYTES], &page_2[..]);
}

#[test]
fn brightness_is_clamped_feature_report() {
    let (deck, fake) = open();
    deck.set_brightness(-5).unwrap();
    deck.set_brightness(150).unwrap();
    deck.set_brightness(60).unwrap();

    let features = fake.features();
    assert!(features.iter().all(|f| f.len() == BRIGHTNESS_REPORT_LEN));
    assert_eq!(features.iter().map(|f| f[5]).collect::<Vec<_>>(), vec![0, 100, 60]);
    assert!(fake.writes().is_empty());
}

#[test]
fn poller_emits_transitions() {
    let (deck, fake) = open();
    let rx = events(&deck);
    assert_eq!(deck.poller_state(), PollerState::Running);

    fake.press(&[4]);
    fake.press(&[4]);
    fake.push(Input::Timeout);
    fake.push(Input::Report(vec![]));
    fake.press(&[1, 4]);
    fake.press(&[]);

    let received = (0..4)
        .map(|_| rx.recv_timeout(TIMEOUT).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        received,
        vec![
            KeyEvent::Pressed(4),
            KeyEvent::Pressed(1),
            KeyEvent::Released(1),
            KeyEvent::Released(4),
        ]
    );

    deck.shutdown().unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn unsubscribed_callback_is_not_called() {
    let (deck, fake) = open();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    let id = deck.on_press(move |_| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert!(deck.unsubscribe(id));
    let rx = events(&deck);

    fake.press(&[0]);
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), KeyEvent::Pressed(0));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn read_failure_stops_poller() {
    let (deck, fake) = open();
    fake.push(Input::Fail);
    assert!(matches!(deck.wait(), Err(DeckError::ReadFailure(_))));
    assert_eq!(deck.poller_state(), PollerState::Stopped);

    // the write direction is independent of the poller
    deck.fill_colour(0, Colour::WHITE).unwrap();
    assert_eq!(fake.writes().len(), 2);
}

#[test]
fn panicking_subscriber_stops_poller() {
    let (deck, fake) = open();
    deck.on_press(|_| panic!("subscriber failed"));
    fake.press(&[0]);

    assert!(matches!(deck.wait(), Err(DeckError::PollerPanicked)));
    assert_eq!(deck.poller_state(), PollerState::Stopped);
    // joined already
    deck.wait().unwrap();
}

#[test]
fn close_from_callback_drops_rest_of_report() {
    let (deck, fake) = open();
    let handle = deck.shutdown_handle();
    let (tx, rx) = mpsc::channel();
    deck.on_press(move |k| {
        tx.send(k).unwrap();
        handle.shutdown();
    });

    // both presses arrive in a single report
    fake.press(&[0, 3]);
    deck.wait().unwrap();
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0]);
    assert_eq!(fake.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_closes_once_and_stops_writes() {
    let (deck, fake) = open();
    let handle = deck.shutdown_handle();
    handle.shutdown();
    handle.shutdown();

    deck.wait().unwrap();
    assert_eq!(deck.poller_state(), PollerState::Stopped);
    assert!(matches!(
        deck.fill_colour(0, Colour::WHITE),
        Err(DeckError::WriteFailure(_))
    ));
    assert!(matches!(deck.set_brightness(50), Err(DeckError::WriteFailure(_))));

    drop(deck);
    assert_eq!(fake.closes.load(Ordering::SeqCst), 1);
    assert!(fake.writes().is_empty());
}

#[test]
fn concurrent_fills_do_not_interleave() {
    let (deck, fake) = open();
    let deck = Arc::new(deck);
    let threads = (0..NUM_KEYS as u8)
        .map(|key| {
            let deck = deck.clone();
            std::thread::spawn(move || {
                for _ in 0..4 {
                    deck.fill_colour(key, Colour::new(key, key, key)).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for t in threads {
        t.join().unwrap();
    }

    let writes = fake.writes();
    assert_eq!(writes.len(), NUM_KEYS * 4 * 2);
    for pair in writes.chunks_exact(2) {
        assert_eq!(pair[0][2], 0x01);
        assert_eq!(pair[1][2], 0x02);
        assert_eq!(pair[0][5], pair[1][5]);
    }
}
