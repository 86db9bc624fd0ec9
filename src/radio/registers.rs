//! # SX127x Register Definitions and Constants
//!
//! Register addresses and bit fields for the Semtech SX1272/73/76/77/78/79
//! transceivers used by the control core. Only the registers touched by mode
//! sequencing, interrupt routing, calibration and entropy harvesting are
//! listed here; modulation and packet-engine registers live with the upper
//! layer that configures them.
//!
//! ## Register Map (subset)
//!
//! - 0x01: Operating mode and modem (long range) selection
//! - 0x06-0x09: Carrier frequency and PA configuration
//! - 0x11-0x12: LoRa interrupt mask and interrupt flags
//! - 0x1C, 0x24: Frequency hopping channel and period
//! - 0x2C: Wideband RSSI (entropy source)
//! - 0x3B: Image calibration
//! - 0x40-0x44: DIO mapping, silicon version, PLL hop

// =============================================================================
// Register Addresses
// =============================================================================

/// Operating mode and long range (LoRa) selection
pub const REG_OPMODE: u8 = 0x01;

/// RF carrier frequency (MSB)
pub const REG_FRFMSB: u8 = 0x06;

/// RF carrier frequency (MID)
pub const REG_FRFMID: u8 = 0x07;

/// RF carrier frequency (LSB)
pub const REG_FRFLSB: u8 = 0x08;

/// Power amplifier selection and output power
pub const REG_PACONFIG: u8 = 0x09;

/// LoRa interrupt mask (a set bit disables the source)
pub const REG_LR_IRQFLAGSMASK: u8 = 0x11;

/// LoRa interrupt flags (write one to clear)
pub const REG_LR_IRQFLAGS: u8 = 0x12;

/// Current frequency hopping channel
pub const REG_LR_HOPCHANNEL: u8 = 0x1C;

/// Symbol periods between frequency hops (0 disables hopping)
pub const REG_LR_HOPPERIOD: u8 = 0x24;

/// Wideband RSSI measurement, LSB used as an entropy source
pub const REG_LR_RSSIWIDEBAND: u8 = 0x2C;

/// Image calibration control
pub const REG_IMAGECAL: u8 = 0x3B;

/// Mapping of DIO0..DIO3
pub const REG_DIOMAPPING1: u8 = 0x40;

/// Mapping of DIO4..DIO5 and ClkOut
pub const REG_DIOMAPPING2: u8 = 0x41;

/// Silicon revision
pub const REG_VERSION: u8 = 0x42;

/// PLL hop control (fast frequency hopping)
pub const REG_LR_PLLHOP: u8 = 0x44;

// =============================================================================
// Silicon Versions
// =============================================================================

/// Version register value of SX1276/77/78/79
pub const VERSION_SX1276: u8 = 0x12;

/// Version register value of SX1272/73
pub const VERSION_SX1272: u8 = 0x22;

// =============================================================================
// Operating Mode Register
// =============================================================================

/// Mask preserving everything but the mode bits
pub const RF_OPMODE_MASK: u8 = 0xF8;
pub const RF_OPMODE_SLEEP: u8 = 0x00;
pub const RF_OPMODE_STANDBY: u8 = 0x01;
pub const RF_OPMODE_TRANSMITTER: u8 = 0x03;
pub const RF_OPMODE_RECEIVER: u8 = 0x05;
pub const RF_OPMODE_RECEIVER_SINGLE: u8 = 0x06;
pub const RF_OPMODE_CAD: u8 = 0x07;

/// Mask preserving everything but the long range bit
pub const RF_LORA_OPMODE_LONGRANGEMODE_MASK: u8 = 0x7F;
pub const RF_LORA_OPMODE_LONGRANGEMODE_OFF: u8 = 0x00;
pub const RF_LORA_OPMODE_LONGRANGEMODE_ON: u8 = 0x80;

// =============================================================================
// Frequency Hopping
// =============================================================================

/// Channel index bits of `REG_LR_HOPCHANNEL`
pub const RF_LORA_HOPCHANNEL_CHANNEL_MASK: u8 = 0x3F;

pub const RF_LORA_PLLHOP_FASTHOP_MASK: u8 = 0x7F;
pub const RF_LORA_PLLHOP_FASTHOP_ON: u8 = 0x80;
pub const RF_LORA_PLLHOP_FASTHOP_OFF: u8 = 0x00;

// =============================================================================
// Image Calibration
// =============================================================================

pub const RF_IMAGECAL_IMAGECAL_MASK: u8 = 0xBF;
pub const RF_IMAGECAL_IMAGECAL_START: u8 = 0x40;
pub const RF_IMAGECAL_IMAGECAL_RUNNING: u8 = 0x20;

// =============================================================================
// DIO Mapping (LoRa)
// =============================================================================

pub const RF_LORA_DIOMAPPING1_DIO0_MASK: u8 = 0x3F;
/// DIO0 = RxDone
pub const RF_LORA_DIOMAPPING1_DIO0_00: u8 = 0x00;
/// DIO0 = TxDone
pub const RF_LORA_DIOMAPPING1_DIO0_01: u8 = 0x40;

pub const RF_LORA_DIOMAPPING1_DIO1_MASK: u8 = 0xCF;
/// DIO1 = RxTimeout
pub const RF_LORA_DIOMAPPING1_DIO1_00: u8 = 0x00;

pub const RF_LORA_DIOMAPPING1_DIO2_MASK: u8 = 0xF3;
/// DIO2 = FhssChangeChannel
pub const RF_LORA_DIOMAPPING1_DIO2_00: u8 = 0x00;

pub const RF_LORA_DIOMAPPING1_DIO3_MASK: u8 = 0xFC;
/// DIO3 = CadDone
pub const RF_LORA_DIOMAPPING1_DIO3_00: u8 = 0x00;

/// FSK: DIO5 = ModeReady
pub const RF_DIOMAPPING2_DIO5_MODEREADY: u8 = 0x30;

// =============================================================================
// Frequency Synthesis
// =============================================================================

/// Crystal oscillator frequency
pub const XTAL_FREQ_HZ: u64 = 32_000_000;

/// Reference channel used for the HF band image calibration
pub const HF_CHANNEL_REF_HZ: u32 = 868_000_000;

/// Convert a carrier frequency to the 24-bit FRF register word.
///
/// `Frf = Fcarrier * 2^19 / Fxosc`
pub fn frf_from_hz(freq_hz: u32) -> u32 {
    ((u64::from(freq_hz) << 19) / XTAL_FREQ_HZ) as u32
}

/// Split an FRF word into the MSB/MID/LSB register bytes.
pub fn frf_bytes(frf: u32) -> [u8; 3] {
    [(frf >> 16) as u8, (frf >> 8) as u8, frf as u8]
}
