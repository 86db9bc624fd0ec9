//! # Event Resolver Transition Table
//!
//! The state machine proper, kept as a pure function of
//! `(input, operating state, modem, hopping)` so the driver and the test
//! suites consult the same table.
//!
//! | Input       | State            | Modem        | Transition          |
//! |-------------|------------------|--------------|---------------------|
//! | DIO0        | RxRunning        | any          | `DataReceived`      |
//! | DIO0        | TxRunning        | any          | `TxDone`            |
//! | DIO0        | Idle             | any          | `Anomaly`           |
//! | DIO1        | RxRunning        | LoRa         | `RxTimeoutIrq`      |
//! | DIO1        | RxRunning        | FSK          | `Ignore`            |
//! | DIO1        | TxRunning        | any          | `Ignore`            |
//! | DIO2        | Rx/TxRunning     | LoRa + hop   | `ChannelHop`        |
//! | DIO2        | other            | any          | `Ignore`            |
//! | DIO3        | any              | LoRa         | `CadDone`           |
//! | DIO3        | any              | FSK          | `Ignore`            |
//! | timeout(tx) | TxRunning        | any          | `TimeoutExpired`    |
//! | timeout(rx) | RxRunning        | any          | `TimeoutExpired`    |
//!
//! Every other combination is `Unrecognized`: logged, no event, no state
//! change.

use crate::radio::irq::DioLine;
use crate::radio::state::{Modem, RadioEvent, RadioState};
use crate::radio::timer::TimeoutKind;

/// One resolver input: an interrupt line or a fired software timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverInput {
    Line(DioLine),
    Timeout(TimeoutKind),
}

/// Why a known combination has nothing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// FSK fine-grained RX/TX events are not handled by this core
    FskDeferred,
    /// DIO1 during TX is reserved for FSK FIFO events
    TxReserved,
    /// Hop edge outside a running LoRa operation with hopping enabled
    HopInactive,
    /// CAD done has no meaning for the FSK modem
    NoFskCad,
}

/// Outcome selected by the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Packet ready; stay in RX
    DataReceived,
    /// TX finished: cancel the tx timeout, clear the device flag on LoRa, go Idle
    TxDone { clear_device_flag: bool },
    /// LoRa RX window closed: cancel the rx timeout, clear the device flag, go Idle
    RxTimeoutIrq,
    /// Clear the hop flag and record the new channel
    ChannelHop,
    /// Clear the CAD flags and record the detection result
    CadDone,
    /// Software timeout accepted: park the radio, go Idle
    TimeoutExpired(TimeoutKind),
    /// TX done edge while nothing was in flight
    Anomaly,
    /// Defined no-op
    Ignore(IgnoreReason),
    /// Combination outside the table
    Unrecognized,
}

impl Transition {
    /// Event emitted when this transition is applied
    pub fn event(self) -> Option<RadioEvent> {
        match self {
            Transition::DataReceived => Some(RadioEvent::DataReceived),
            Transition::TxDone { .. } => Some(RadioEvent::DataSent),
            Transition::RxTimeoutIrq => Some(RadioEvent::RxTimeout),
            Transition::ChannelHop => Some(RadioEvent::ChannelHop),
            Transition::CadDone => Some(RadioEvent::CadDone),
            Transition::TimeoutExpired(TimeoutKind::Tx) => Some(RadioEvent::TxTimeout),
            Transition::TimeoutExpired(TimeoutKind::Rx) => Some(RadioEvent::RxTimeout),
            Transition::Anomaly | Transition::Ignore(_) | Transition::Unrecognized => None,
        }
    }

    /// State after this transition is applied to `current`
    pub fn next_state(self, current: RadioState) -> RadioState {
        match self {
            Transition::TxDone { .. }
            | Transition::RxTimeoutIrq
            | Transition::TimeoutExpired(_) => RadioState::Idle,
            _ => current,
        }
    }
}

/// Look up the transition for `input` in `(state, modem)`.
pub fn transition(
    input: ResolverInput,
    state: RadioState,
    modem: Modem,
    freq_hop: bool,
) -> Transition {
    use RadioState::*;

    match input {
        ResolverInput::Line(DioLine::Dio0) => match state {
            RxRunning => Transition::DataReceived,
            TxRunning => Transition::TxDone {
                clear_device_flag: modem == Modem::LoRa,
            },
            Idle => Transition::Anomaly,
            Sleep | Standby => Transition::Unrecognized,
        },
        ResolverInput::Line(DioLine::Dio1) => match (state, modem) {
            (RxRunning, Modem::LoRa) => Transition::RxTimeoutIrq,
            (RxRunning, Modem::Fsk) => Transition::Ignore(IgnoreReason::FskDeferred),
            (TxRunning, _) => Transition::Ignore(IgnoreReason::TxReserved),
            _ => Transition::Unrecognized,
        },
        ResolverInput::Line(DioLine::Dio2) => match (state, modem) {
            (RxRunning | TxRunning, Modem::LoRa) if freq_hop => Transition::ChannelHop,
            _ => Transition::Ignore(IgnoreReason::HopInactive),
        },
        ResolverInput::Line(DioLine::Dio3) => match modem {
            Modem::LoRa => Transition::CadDone,
            Modem::Fsk => Transition::Ignore(IgnoreReason::NoFskCad),
        },
        ResolverInput::Timeout(kind) => {
            if state == RadioState::running(kind) {
                Transition::TimeoutExpired(kind)
            } else {
                Transition::Unrecognized
            }
        }
    }
}
