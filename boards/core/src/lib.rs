//! Core traits and types for deck-sync device abstraction.
//!
//! This crate provides:
//! - The `Transport` trait, the only HID capability device crates consume
//! - The `DeckError` taxonomy shared by every layer
//! - Common types like `Colour`, `DeviceInfo`, and `KeyEvent`

mod colour;
mod error;
mod transport;

pub use colour::Colour;
pub use error::{DeckError, Result};
pub use transport::{DeviceInfo, KeyEvent, ReadOutcome, Transport};
