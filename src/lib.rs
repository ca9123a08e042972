//! Control surface engine
//!
//! Turns raw MIDI from hardware controllers into debounced button events,
//! pad-grid events and continuous values, routes them through the active
//! mode and view, and keeps the hardware's lights and motors in sync
//! through a write-through output cache.

pub mod command;
pub mod config;
pub mod control_mapping;
pub mod device;
pub mod drivers;
pub mod error;
pub mod midi;
pub mod modes;
pub mod runtime;
pub mod sniffer;
pub mod surface;

pub use error::SurfaceError;
