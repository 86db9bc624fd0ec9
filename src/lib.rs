//! # sx127x-rs - Control Core for Semtech SX127x LoRa/FSK Transceivers
//!
//! The sx127x-rs crate drives the control plane of an SX1272/SX1276-class
//! transceiver: it tracks the chip's operating state, turns DIO interrupt
//! edges and software timeouts into high-level radio events, and provides
//! the setup-time utilities around them.
//!
//! ## Features
//!
//! - Mode controller over `RegOpMode` with state tracking
//! - Interrupt-safe dispatch of DIO0..DIO3 edges to normal context
//! - Event resolution by a fixed `(input, state, modem)` transition table
//! - TX/RX software timeouts that can never fire on a newer operation
//! - Reset pulse, presence test, receiver chain calibration
//! - Wideband RSSI entropy harvesting
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! sx127x-rs = "0.1.0"
//! ```
//!
//! ```rust
//! use sx127x_rs::{Sx127x, Sx127xParams, RadioEvent, RadioState, init_logger};
//! ```
//!
//! The platform supplies implementations of [`Hal`], [`InterruptRegistry`]
//! and [`TimeoutScheduler`]; everything above register access lives here.

pub mod config;
pub mod error;
pub mod logging;
pub mod radio;
pub mod util;

pub use crate::config::{RadioSettings, Sx127xParams};
pub use crate::error::{InitError, Sx127xError};
pub use crate::logging::init_logger;

pub use radio::{
    ChipVersion, DioHandler, DioLine, EdgeType, Hal, HalError, InterruptRegistry, IrqDispatcher,
    Modem, OpMode, RadioEvent, RadioState, ResetLevel, ResolverInput, Sx127x, TimeoutAlarm,
    TimeoutKind, TimeoutScheduler, TimerId,
};
