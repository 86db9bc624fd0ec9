//! Device state record and the semantic events emitted to the upper layer.

use serde::{Deserialize, Serialize};

use crate::radio::timer::{TimeoutKind, TimeoutSlot};

/// Active physical-layer protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Modem {
    #[default]
    LoRa,
    Fsk,
}

/// Operating state tracked by the driver
///
/// Consistent with the last mode written to `RegOpMode`: `TxRunning` and
/// `RxRunning` follow a transmitter/receiver write, `Idle` means the chip is
/// awake with nothing in flight (after completion, a timeout, or CAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    TxRunning,
    RxRunning,
    Sleep,
    Standby,
}

impl RadioState {
    /// Running state guarded by a timeout of `kind`
    pub fn running(kind: TimeoutKind) -> Self {
        match kind {
            TimeoutKind::Tx => RadioState::TxRunning,
            TimeoutKind::Rx => RadioState::RxRunning,
        }
    }
}

/// High-level event delivered once per resolver pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioEvent {
    /// Transmission finished
    DataSent,
    /// A packet is waiting in the FIFO
    DataReceived,
    /// Software TX timeout expired
    TxTimeout,
    /// Receive window closed without a packet
    RxTimeout,
    /// Frequency hopping moved to a new channel, see `last_channel`
    ChannelHop,
    /// Channel activity detection finished, see `last_cad_detected`
    CadDone,
}

/// The single mutable record owned by a driver instance
#[derive(Debug)]
pub struct DeviceState {
    pub(crate) modem: Modem,
    pub(crate) state: RadioState,
    pub(crate) freq_hop: bool,
    pub(crate) channel_hz: Option<u32>,
    pub(crate) last_channel: Option<u8>,
    pub(crate) last_cad_detected: Option<bool>,
    pub(crate) tx_timeout: TimeoutSlot,
    pub(crate) rx_timeout: TimeoutSlot,
}

impl DeviceState {
    pub(crate) fn new(modem: Modem) -> Self {
        Self {
            modem,
            state: RadioState::Sleep,
            freq_hop: false,
            channel_hz: None,
            last_channel: None,
            last_cad_detected: None,
            tx_timeout: TimeoutSlot::new(TimeoutKind::Tx),
            rx_timeout: TimeoutSlot::new(TimeoutKind::Rx),
        }
    }

    pub(crate) fn slot(&self, kind: TimeoutKind) -> &TimeoutSlot {
        match kind {
            TimeoutKind::Tx => &self.tx_timeout,
            TimeoutKind::Rx => &self.rx_timeout,
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: TimeoutKind) -> &mut TimeoutSlot {
        match kind {
            TimeoutKind::Tx => &mut self.tx_timeout,
            TimeoutKind::Rx => &mut self.rx_timeout,
        }
    }
}
