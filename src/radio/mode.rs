//! Mode controller: `RegOpMode` writes and the matching state bookkeeping.

use crate::error::Sx127xError;
use crate::radio::driver::Sx127x;
use crate::radio::hal::{Hal, TimeoutScheduler};
use crate::radio::registers::*;
use crate::radio::state::RadioState;
use crate::radio::timer::TimeoutKind;

/// Chip operating modes reachable through the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    Sleep,
    Standby,
    Transmitter,
    /// Continuous receive
    Receiver,
    ReceiverSingle,
    /// Channel activity detection
    Cad,
}

impl OpMode {
    /// Mode bits of `RegOpMode`
    pub fn bits(self) -> u8 {
        match self {
            OpMode::Sleep => RF_OPMODE_SLEEP,
            OpMode::Standby => RF_OPMODE_STANDBY,
            OpMode::Transmitter => RF_OPMODE_TRANSMITTER,
            OpMode::Receiver => RF_OPMODE_RECEIVER,
            OpMode::ReceiverSingle => RF_OPMODE_RECEIVER_SINGLE,
            OpMode::Cad => RF_OPMODE_CAD,
        }
    }

    /// Operating state recorded after entering this mode
    pub fn target_state(self) -> RadioState {
        match self {
            OpMode::Sleep => RadioState::Sleep,
            OpMode::Standby => RadioState::Standby,
            OpMode::Transmitter => RadioState::TxRunning,
            OpMode::Receiver | OpMode::ReceiverSingle => RadioState::RxRunning,
            OpMode::Cad => RadioState::Idle,
        }
    }
}

impl<H: Hal, T: TimeoutScheduler> Sx127x<H, T> {
    /// Enter `mode` and record the matching operating state.
    ///
    /// Leaving `TxRunning`/`RxRunning` cancels that state's timeout. Arming a
    /// timeout for a running state is left to the caller. On a transport
    /// error nothing is recorded.
    pub(crate) fn set_op_mode(&mut self, mode: OpMode) -> Result<(), Sx127xError> {
        self.write_op_mode(mode)?;
        self.set_state(mode.target_state());
        Ok(())
    }

    /// Write the mode bits only, preserving modem and band bits.
    pub(crate) fn write_op_mode(&mut self, mode: OpMode) -> Result<(), Sx127xError> {
        let opmode = self.hal.read_register(REG_OPMODE)?;
        self.hal
            .write_register(REG_OPMODE, (opmode & RF_OPMODE_MASK) | mode.bits())?;
        Ok(())
    }

    /// Record `next` as the operating state.
    pub(crate) fn set_state(&mut self, next: RadioState) {
        let prev = self.device.state;
        for kind in [TimeoutKind::Tx, TimeoutKind::Rx] {
            if prev == RadioState::running(kind) && next != prev {
                self.device.slot_mut(kind).cancel(&mut self.timers);
            }
        }
        if prev != next {
            log::debug!("State changed: {prev:?} -> {next:?}");
        }
        self.device.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_modes_share_running_state() {
        assert_eq!(OpMode::Receiver.target_state(), RadioState::RxRunning);
        assert_eq!(OpMode::ReceiverSingle.target_state(), RadioState::RxRunning);
        assert_ne!(OpMode::Receiver.bits(), OpMode::ReceiverSingle.bits());
    }

    #[test]
    fn test_mode_bits_fit_mask() {
        for mode in [
            OpMode::Sleep,
            OpMode::Standby,
            OpMode::Transmitter,
            OpMode::Receiver,
            OpMode::ReceiverSingle,
            OpMode::Cad,
        ] {
            assert_eq!(mode.bits() & RF_OPMODE_MASK, 0, "{mode:?}");
        }
        assert_eq!(OpMode::Cad.target_state(), RadioState::Idle);
    }
}
