//! # Receiver Chain Calibration
//!
//! Image and RSSI calibration of the receive path, run once during setup.
//! Calibration runs at the current carrier and again at the 868 MHz
//! reference so both the low- and high-frequency bands are covered. The
//! power amplifier is switched off for the duration, and the saved PA
//! configuration and carrier are restored even when a step fails.

use log::{debug, info, warn};

use crate::error::Sx127xError;
use crate::radio::driver::Sx127x;
use crate::radio::hal::{Hal, TimeoutScheduler};
use crate::radio::mode::OpMode;
use crate::radio::registers::*;

/// Poll attempts before giving up on an image calibration run
const IMAGECAL_POLL_LIMIT: u32 = 1_000;

/// Wait between `RegImageCal` polls
const IMAGECAL_POLL_INTERVAL_US: u32 = 10;

impl<H: Hal, T: TimeoutScheduler> Sx127x<H, T> {
    /// Calibrate the receiver chain. Leaves the chip in standby.
    pub fn calibrate_rx_chain(&mut self) -> Result<(), Sx127xError> {
        info!("Calibrating receiver chain");
        self.set_op_mode(OpMode::Standby)?;

        let pa_config = self.hal.read_register(REG_PACONFIG)?;
        let frf = self.read_frf()?;
        self.hal.write_register(REG_PACONFIG, 0x00)?;

        let calibrated = self.calibrate_both_bands();

        let restored = self
            .hal
            .write_register(REG_PACONFIG, pa_config)
            .map_err(Sx127xError::from)
            .and_then(|_| self.write_frf(frf));
        if let Err(e) = &restored {
            warn!("Cannot restore PA/carrier after calibration: {e}");
        }

        calibrated.and(restored)
    }

    fn calibrate_both_bands(&mut self) -> Result<(), Sx127xError> {
        self.run_image_calibration()?;
        self.write_frf(frf_bytes(frf_from_hz(HF_CHANNEL_REF_HZ)))?;
        self.run_image_calibration()
    }

    fn run_image_calibration(&mut self) -> Result<(), Sx127xError> {
        let imagecal = self.hal.read_register(REG_IMAGECAL)?;
        self.hal.write_register(
            REG_IMAGECAL,
            (imagecal & RF_IMAGECAL_IMAGECAL_MASK) | RF_IMAGECAL_IMAGECAL_START,
        )?;

        for attempt in 0..IMAGECAL_POLL_LIMIT {
            if self.hal.read_register(REG_IMAGECAL)? & RF_IMAGECAL_IMAGECAL_RUNNING == 0 {
                debug!("Image calibration done after {attempt} polls");
                return Ok(());
            }
            self.hal.delay_us(IMAGECAL_POLL_INTERVAL_US);
        }

        Err(Sx127xError::CalibrationTimeout)
    }

    fn read_frf(&mut self) -> Result<[u8; 3], Sx127xError> {
        Ok([
            self.hal.read_register(REG_FRFMSB)?,
            self.hal.read_register(REG_FRFMID)?,
            self.hal.read_register(REG_FRFLSB)?,
        ])
    }

    pub(crate) fn write_frf(&mut self, frf: [u8; 3]) -> Result<(), Sx127xError> {
        self.hal.write_register(REG_FRFMSB, frf[0])?;
        self.hal.write_register(REG_FRFMID, frf[1])?;
        self.hal.write_register(REG_FRFLSB, frf[2])?;
        Ok(())
    }
}
