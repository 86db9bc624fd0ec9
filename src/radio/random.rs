//! Entropy harvesting from wideband RSSI noise.
//!
//! With the LoRa receiver open and every interrupt source masked, the least
//! significant bit of `RegRssiWideband` tracks thermal noise. Sampling it
//! once per millisecond yields up to 32 bits. The output is raw noise and
//! not suitable as key material without conditioning.

use std::ops::{Deref, DerefMut};

use log::{debug, error};

use crate::error::Sx127xError;
use crate::radio::driver::Sx127x;
use crate::radio::hal::{Hal, TimeoutScheduler};
use crate::radio::mode::OpMode;
use crate::radio::registers::*;
use crate::radio::state::Modem;

/// Largest number of bits a single harvest can produce
pub const MAX_RANDOM_SAMPLES: u32 = 32;

/// Spacing between RSSI samples
const RSSI_SAMPLE_INTERVAL_US: u32 = 1_000;

impl<H: Hal, T: TimeoutScheduler> Sx127x<H, T> {
    /// Harvest `sample_count` (1..=32) noise bits, bit `i` from sample `i`.
    ///
    /// Switches to the LoRa modem, masks every LoRa interrupt while sampling
    /// and leaves the chip asleep. The previous interrupt mask is restored
    /// whether or not sampling succeeds.
    pub fn harvest_random(&mut self, sample_count: u32) -> Result<u32, Sx127xError> {
        self.ensure_initialized()?;
        if sample_count == 0 || sample_count > MAX_RANDOM_SAMPLES {
            return Err(Sx127xError::InvalidSampleCount(sample_count));
        }

        self.configure_modem(Modem::LoRa)?;

        let mut masked = IrqMaskGuard::mask_all(self)?;
        let sampled = masked
            .set_op_mode(OpMode::Receiver)
            .and_then(|_| masked.sample_wideband_rssi(sample_count));
        let parked = masked.set_op_mode(OpMode::Sleep);
        drop(masked);

        let bits = sampled?;
        parked?;
        debug!("Harvested {sample_count} noise bits");
        Ok(bits)
    }

    fn sample_wideband_rssi(&mut self, sample_count: u32) -> Result<u32, Sx127xError> {
        let mut bits = 0u32;
        for i in 0..sample_count {
            self.hal.delay_us(RSSI_SAMPLE_INTERVAL_US);
            let rssi = self.hal.read_register(REG_LR_RSSIWIDEBAND)?;
            bits |= u32::from(rssi & 0x01) << i;
        }
        Ok(bits)
    }
}

/// Masks all LoRa interrupt sources while alive
struct IrqMaskGuard<'a, H: Hal, T: TimeoutScheduler> {
    radio: &'a mut Sx127x<H, T>,
    saved: u8,
}

impl<'a, H: Hal, T: TimeoutScheduler> IrqMaskGuard<'a, H, T> {
    fn mask_all(radio: &'a mut Sx127x<H, T>) -> Result<Self, Sx127xError> {
        let saved = radio.hal.read_register(REG_LR_IRQFLAGSMASK)?;
        radio.hal.write_register(REG_LR_IRQFLAGSMASK, 0xFF)?;
        Ok(Self { radio, saved })
    }
}

impl<H: Hal, T: TimeoutScheduler> Deref for IrqMaskGuard<'_, H, T> {
    type Target = Sx127x<H, T>;

    fn deref(&self) -> &Self::Target {
        self.radio
    }
}

impl<H: Hal, T: TimeoutScheduler> DerefMut for IrqMaskGuard<'_, H, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.radio
    }
}

impl<H: Hal, T: TimeoutScheduler> Drop for IrqMaskGuard<'_, H, T> {
    fn drop(&mut self) {
        if let Err(e) = self.radio.hal.write_register(REG_LR_IRQFLAGSMASK, self.saved) {
            error!("Cannot restore LoRa IRQ mask 0x{:02X}: {e}", self.saved);
        }
    }
}
