use std::error::Error;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bpaf::{Bpaf, Parser};
use deck_sync_core::Colour;
use streamdeck_original::{ShutdownHandle, StreamDeck, INFO};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, KeyContent};

mod config;

fn key() -> impl Parser<u8> {
    bpaf::positional::<u8>("KEY")
        .help("Key index, counted from 0 left to right and top to bottom")
        .guard(|k| (*k as usize) < INFO.num_keys, "key is out of range")
}

#[derive(Clone, Debug, Bpaf)]
enum Command {
    /// Apply the config and log key presses until interrupted (default)
    #[bpaf(command)]
    Watch,
    /// Fill a key with a solid color
    #[bpaf(command)]
    Fill {
        #[bpaf(external(key))]
        key: u8,
        /// Hex color (#RRGGBB or #RGB)
        #[bpaf(positional("COLOR"))]
        color: Colour,
    },
    /// Upload an image to a key
    #[bpaf(command, fallback_to_usage)]
    Image {
        /// Use nearest neighbor interpolation when resizing, otherwise uses gaussian
        #[bpaf(short('n'), long("nearest"))]
        nearest: bool,
        /// Background color for transparent images, defaults to the config value
        #[bpaf(short, long, argument("COLOR"))]
        bg: Option<Colour>,
        #[bpaf(external(key))]
        key: u8,
        /// Path to image to re-encode and upload
        #[bpaf(positional("PATH"), guard(|p| p.exists(), "file not found"))]
        path: PathBuf,
    },
    /// Reset a key to black, or every key if none is given
    #[bpaf(command)]
    Clear {
        #[bpaf(external(key), optional)]
        key: Option<u8>,
    },
    /// Set the backlight brightness in percent, clamped to 0-100
    #[bpaf(command)]
    Brightness {
        #[bpaf(positional("PERCENT"))]
        percent: i32,
    },
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    #[bpaf(external(command), fallback(Command::Watch))]
    command: Command,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Apply brightness and key contents from the config
fn apply_config(deck: &StreamDeck, config: &Config) -> Result<(), Box<dyn Error>> {
    deck.set_brightness(config.general.brightness.into())?;
    let background = config.media.background()?;
    for (key, content) in config.key_contents()? {
        match content {
            KeyContent::Colour(colour) => deck.fill_colour(key, colour)?,
            KeyContent::Image(path) => {
                let res = deck.fill_image_from_path_with(
                    key,
                    &path,
                    background,
                    config.media.use_nearest_neighbor,
                );
                // a broken icon should not keep the rest of the deck blank
                if let Err(e) = res {
                    warn!("failed to load {} for key {key}: {e}", path.display());
                }
            },
        }
    }
    Ok(())
}

/// Sleep for the retry interval, returning early on quit
fn wait_retry(retry: Duration, quit: &AtomicBool) {
    let deadline = Instant::now() + retry;
    while !quit.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Run until ctrl-c, reconnecting when the device goes away
fn watch(config: &Config) -> Result<(), Box<dyn Error>> {
    let quit = Arc::new(AtomicBool::new(false));
    let current = Arc::new(Mutex::new(None::<ShutdownHandle>));
    {
        let quit = quit.clone();
        let current = current.clone();
        ctrlc::set_handler(move || {
            quit.store(true, Ordering::SeqCst);
            if let Some(handle) = current.lock().ok().and_then(|h| h.clone()) {
                handle.shutdown();
            }
        })?;
    }

    // A missing device is fatal on startup, later disconnects are retried
    let mut deck = Some(StreamDeck::open()?);
    loop {
        if let Some(deck) = deck.take() {
            *current.lock().map_err(|_| "shutdown handle poisoned")? =
                Some(deck.shutdown_handle());
            if quit.load(Ordering::SeqCst) {
                deck.shutdown_handle().shutdown();
            }

            if let Err(e) = apply_config(&deck, config) {
                error!("failed to apply config: {e}");
            }
            deck.on_press(|key| info!("key {key} pressed"));
            deck.on_release(|key| info!("key {key} released"));
            println!("watching for key presses, ctrl-c to exit");

            let res = deck.wait();
            current.lock().map_err(|_| "shutdown handle poisoned")?.take();
            match res {
                Ok(()) => deck.shutdown()?,
                Err(e) => error!("device disconnected: {e}"),
            }
        }

        if quit.load(Ordering::SeqCst) {
            return Ok(());
        }

        wait_retry(config.refresh.retry, &quit);
        if quit.load(Ordering::SeqCst) {
            return Ok(());
        }
        match StreamDeck::open() {
            Ok(d) => deck = Some(d),
            Err(e) => warn!("failed to reconnect: {e}"),
        }
    }
}

/// Open the device, run a single command, and close it again
fn with_deck(
    f: impl FnOnce(&StreamDeck) -> Result<(), Box<dyn Error>>,
) -> Result<(), Box<dyn Error>> {
    let deck = StreamDeck::open()?;
    f(&deck)?;
    deck.shutdown()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli().run();
    let config = Config::load_or_create().unwrap_or_else(|e| {
        eprintln!("failed to load config, using defaults: {e}");
        Config::default()
    });
    init_logging(&config);

    match cli.command {
        Command::Watch => watch(&config),
        Command::Fill { key, color } => with_deck(|deck| {
            deck.fill_colour(key, color)?;
            println!("filled key {key} with {color}");
            Ok(())
        }),
        Command::Image {
            nearest,
            bg,
            key,
            path,
        } => with_deck(|deck| {
            let background = match bg {
                Some(bg) => bg,
                None => config.media.background()?,
            };
            print!("uploading {} to key {key} ... ", path.display());
            stdout().flush()?;
            deck.fill_image_from_path_with(key, &path, background, nearest)?;
            println!("done");
            Ok(())
        }),
        Command::Clear { key: Some(key) } => with_deck(|deck| {
            deck.clear(key)?;
            println!("cleared key {key}");
            Ok(())
        }),
        Command::Clear { key: None } => with_deck(|deck| {
            deck.clear_all()?;
            println!("cleared all keys");
            Ok(())
        }),
        Command::Brightness { percent } => with_deck(|deck| {
            deck.set_brightness(percent)?;
            println!("set brightness to {}%", percent.clamp(0, 100));
            Ok(())
        }),
    }
}
