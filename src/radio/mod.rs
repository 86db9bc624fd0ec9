//! # SX127x Radio Control Core
//!
//! Mode sequencing, interrupt dispatch and event resolution for the Semtech
//! SX127x family. Platform access goes through the traits in [`hal`].

pub mod calib;
pub mod driver;
pub mod hal;
pub mod irq;
pub mod mode;
pub mod random;
pub mod registers;
pub mod resolver;
pub mod state;
pub mod timer;

pub use driver::{ChipVersion, EventCallback, Sx127x, RESET_ASSERT_US, RESET_SETTLE_US};
pub use hal::{DioHandler, EdgeType, Hal, HalError, InterruptRegistry, ResetLevel, TimeoutScheduler};
pub use irq::{DioLine, IrqDispatcher, IrqFlags, LoRaIrqFlags, PendingWork};
pub use mode::OpMode;
pub use random::MAX_RANDOM_SAMPLES;
pub use resolver::{transition, IgnoreReason, ResolverInput, Transition};
pub use state::{Modem, RadioEvent, RadioState};
pub use timer::{TimeoutAlarm, TimeoutKind, TimerId};
