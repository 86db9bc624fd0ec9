//! # Device Parameters
//!
//! Static description of how an SX127x is wired to the host, plus the radio
//! settings applied at the end of initialization.
//!
//! The parameters load from JSON:
//! ```json
//! {
//!   "spi": 0,
//!   "nss_pin": 8,
//!   "reset_pin": 17,
//!   "dio_pins": [22, 23, 24, 25],
//!   "settings": { "modem": "LoRa", "freq_hop": false, "tx_timeout_ms": 30000 }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::radio::state::Modem;

/// Default software TX timeout (30 s)
pub const DEFAULT_TX_TIMEOUT_MS: u32 = 30_000;

/// Wiring of one SX127x
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sx127xParams {
    /// SPI bus index
    pub spi: u8,
    /// Chip select line
    pub nss_pin: u8,
    /// NRESET line
    pub reset_pin: u8,
    /// DIO0..DIO3 interrupt lines
    pub dio_pins: [u8; 4],
    /// Radio settings applied after init
    #[serde(default)]
    pub settings: RadioSettings,
}

impl Default for Sx127xParams {
    fn default() -> Self {
        Self {
            spi: 0,
            nss_pin: 8,
            reset_pin: 17,
            dio_pins: [22, 23, 24, 25],
            settings: RadioSettings::default(),
        }
    }
}

impl Sx127xParams {
    /// Parse parameters from a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Operation policy: modem, hopping and timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    pub modem: Modem,
    /// Enable LoRa frequency hopping
    pub freq_hop: bool,
    /// Symbol periods between hops
    pub hop_period: u8,
    pub tx_timeout_ms: u32,
    /// `None` keeps the receiver open until a packet or explicit abort
    pub rx_timeout_ms: Option<u32>,
    /// Single receive instead of continuous
    pub rx_single: bool,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            modem: Modem::LoRa,
            freq_hop: false,
            hop_period: 0,
            tx_timeout_ms: DEFAULT_TX_TIMEOUT_MS,
            rx_timeout_ms: None,
            rx_single: false,
        }
    }
}

impl RadioSettings {
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.tx_timeout_ms))
    }

    pub fn rx_timeout(&self) -> Option<Duration> {
        self.rx_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }
}
