//! # Hardware Abstraction Layer for the SX127x
//!
//! The control core never touches a bus, a pin or a clock directly. Three
//! collaborator traits describe what it needs from the platform:
//!
//! - [`Hal`]: single-register access over SPI, reset line control and
//!   busy-wait delays
//! - [`InterruptRegistry`]: rising-edge registration of the four DIO lines
//! - [`TimeoutScheduler`]: one-shot deferred callbacks bounding TX/RX
//!
//! Interrupt and timer callbacks are plain values ([`DioHandler`],
//! [`TimeoutAlarm`]) that carry the driver's shared dispatcher explicitly, so
//! no global state is needed to route an edge back to its device.

use std::time::Duration;
use thiserror::Error;

use crate::radio::irq::{DioLine, IrqDispatcher};
use crate::radio::timer::{TimeoutAlarm, TimerId};

/// Errors that can occur during HAL operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HalError {
    #[error("SPI communication error")]
    Spi,

    #[error("GPIO operation error")]
    Gpio,

    #[error("Timer service error")]
    Timer,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Level driven on the reset line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetLevel {
    /// Pull NRESET low
    Low,
    /// Release NRESET to high impedance
    Floating,
}

/// GPIO edge detection types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    /// Trigger on rising edge (low to high). DIO lines are active high.
    Rising,
}

/// Hardware Abstraction Layer trait for SX127x register access
///
/// Register access is synchronous and non-reentrant per device instance.
pub trait Hal {
    /// Bring up the SPI bus and the chip select line
    fn init_peripherals(&mut self, spi: u8, nss_pin: u8) -> Result<(), HalError>;

    /// Read a single register
    fn read_register(&mut self, addr: u8) -> Result<u8, HalError>;

    /// Write a single register
    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), HalError>;

    /// Drive the reset line
    fn set_reset(&mut self, pin: u8, level: ResetLevel) -> Result<(), HalError>;

    /// Busy/cooperative wait
    fn delay_us(&mut self, us: u32);
}

/// Edge-triggered interrupt line registration
pub trait InterruptRegistry {
    /// Associate `edge` on `pin` with `handler`. The platform calls
    /// [`DioHandler::on_edge`] from interrupt context on every matching edge.
    fn register(&mut self, pin: u8, edge: EdgeType, handler: DioHandler) -> Result<(), HalError>;
}

/// One-shot timer service
pub trait TimeoutScheduler {
    /// Call [`TimeoutAlarm::fire`] once after `after` has elapsed.
    fn schedule(&mut self, after: Duration, alarm: TimeoutAlarm) -> Result<TimerId, HalError>;

    /// Cancel a pending alarm. Unknown or already fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

/// Interrupt handler bound to one DIO line of one device
#[derive(Debug, Clone)]
pub struct DioHandler {
    line: DioLine,
    dispatcher: std::sync::Arc<IrqDispatcher>,
}

impl DioHandler {
    pub(crate) fn new(line: DioLine, dispatcher: std::sync::Arc<IrqDispatcher>) -> Self {
        Self { line, dispatcher }
    }

    /// Line this handler serves
    pub fn line(&self) -> DioLine {
        self.line
    }

    /// Interrupt-context entry point. Never blocks, never touches the bus.
    pub fn on_edge(&self) {
        self.dispatcher.on_line_edge(self.line);
    }
}
