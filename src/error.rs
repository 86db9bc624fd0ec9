//! # SX127x Error Handling
//!
//! This module defines the error types surfaced by the driver core: transport
//! failures from the register bus, initialization status codes, and misuse of
//! the driver before it is ready.

use thiserror::Error;

use crate::radio::hal::HalError;
use crate::radio::irq::DioLine;

/// Initialization failures, each with a distinct status code
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InitError {
    /// SPI bus or chip select could not be brought up
    #[error("Peripheral setup failed: {0}")]
    Peripherals(HalError),

    /// The version register did not identify an SX127x
    #[error("Presence test failed: version register reads 0x{version:02X}")]
    TestFailed { version: u8 },

    /// A DIO line could not be registered with the interrupt subsystem
    #[error("Cannot register interrupt line {line:?}: {source}")]
    InterruptLine { line: DioLine, source: HalError },
}

impl InitError {
    /// Numeric status code reported to the setup caller
    pub fn code(&self) -> i32 {
        match self {
            InitError::Peripherals(_) => -1,
            InitError::TestFailed { .. } => -2,
            InitError::InterruptLine { .. } => -3,
        }
    }
}

/// Represents the different error types that can occur in the SX127x driver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Sx127xError {
    /// Register read/write failed; the in-progress operation was abandoned
    #[error("Register transport error: {0}")]
    Transport(#[from] HalError),

    /// The setup sequence did not complete
    #[error("Initialization failed: {0}")]
    Init(#[from] InitError),

    /// A command was issued before a successful `init` or after `shutdown`
    #[error("Driver not initialized")]
    NotInitialized,

    /// Image calibration never reported completion
    #[error("Image calibration did not complete")]
    CalibrationTimeout,

    /// Entropy harvest sample count outside 1..=32
    #[error("Invalid sample count: {0} (expected 1..=32)")]
    InvalidSampleCount(u32),

    /// The interrupt notifier can only be installed once
    #[error("Interrupt notifier already registered")]
    NotifierAlreadySet,
}
