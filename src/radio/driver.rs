//! # SX127x Driver
//!
//! [`Sx127x`] owns one transceiver: its HAL, its timeout scheduler, the
//! shared interrupt dispatcher and the device state record. It provides:
//!
//! - the setup sequence (peripherals, presence test, reset, calibration,
//!   interrupt registration, modem and hopping settings)
//! - operation commands (sleep, standby, TX, RX, CAD, modem, hopping)
//! - the resolver pass that turns pending interrupt flags and fired
//!   timeouts into [`RadioEvent`]s
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let mut radio = Sx127x::new(hal, scheduler, Sx127xParams::default());
//! radio.set_isr_notifier(move || wake_radio_task())?;
//! radio.on_event(|event| log::info!("radio event: {event:?}"));
//! radio.init(&mut interrupts)?;
//!
//! radio.start_rx()?;
//! // later, in the task woken by the notifier:
//! for event in radio.process_pending()? {
//!     handle(event);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::Sx127xParams;
use crate::error::{InitError, Sx127xError};
use crate::radio::hal::{DioHandler, EdgeType, Hal, InterruptRegistry, ResetLevel, TimeoutScheduler};
use crate::radio::irq::{DioLine, IrqDispatcher, LoRaIrqFlags, PendingWork};
use crate::radio::mode::OpMode;
use crate::radio::registers::*;
use crate::radio::resolver::{transition, ResolverInput, Transition};
use crate::radio::state::{DeviceState, Modem, RadioEvent, RadioState};
use crate::radio::timer::TimeoutKind;
use crate::util::logging::{span_resolver_pass, LogThrottle, ThrottleStats};

/// Reset line held low for at least this long
pub const RESET_ASSERT_US: u32 = 1_000;

/// Settle time after releasing reset before the chip is addressed
pub const RESET_SETTLE_US: u32 = 10_000;

/// Pause between a passed presence test and the reset pulse
const POST_TEST_DELAY_US: u32 = 1_000;

/// Upper-layer event sink
pub type EventCallback = Box<dyn FnMut(RadioEvent) + Send>;

/// Silicon family identified by the presence test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    Sx1272,
    Sx1276,
}

impl ChipVersion {
    pub fn from_register(version: u8) -> Option<Self> {
        match version {
            VERSION_SX1272 => Some(ChipVersion::Sx1272),
            VERSION_SX1276 => Some(ChipVersion::Sx1276),
            _ => None,
        }
    }
}

/// SX127x control core generic over the platform collaborators
pub struct Sx127x<H: Hal, T: TimeoutScheduler> {
    pub(crate) hal: H,
    pub(crate) timers: T,
    pub(crate) params: Sx127xParams,
    pub(crate) dispatcher: Arc<IrqDispatcher>,
    pub(crate) device: DeviceState,
    chip: Option<ChipVersion>,
    initialized: bool,
    event_callback: Option<EventCallback>,
    /// Unexpected-edge warnings can fire at interrupt rate
    unexpected_log: LogThrottle,
}

impl<H: Hal, T: TimeoutScheduler> std::fmt::Debug for Sx127x<H, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sx127x")
            .field("params", &self.params)
            .field("device", &self.device)
            .field("chip", &self.chip)
            .field("initialized", &self.initialized)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<H: Hal, T: TimeoutScheduler> Sx127x<H, T> {
    /// Create a driver instance. Nothing touches the hardware until [`init`].
    ///
    /// [`init`]: Sx127x::init
    pub fn new(hal: H, timers: T, params: Sx127xParams) -> Self {
        let modem = params.settings.modem;
        Self {
            hal,
            timers,
            params,
            dispatcher: Arc::new(IrqDispatcher::new()),
            device: DeviceState::new(modem),
            chip: None,
            initialized: false,
            event_callback: None,
            unexpected_log: LogThrottle::new(1000, 5),
        }
    }

    /// Bring the device up and apply the configured settings.
    ///
    /// Sequence: peripherals, presence test, reset pulse, receiver chain
    /// calibration, sleep, DIO0..DIO3 registration, modem and hopping.
    pub fn init<R: InterruptRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
    ) -> Result<(), Sx127xError> {
        info!(
            "Initializing SX127x on SPI{} (NSS pin {})",
            self.params.spi, self.params.nss_pin
        );
        self.initialized = false;

        self.hal
            .init_peripherals(self.params.spi, self.params.nss_pin)
            .map_err(InitError::Peripherals)?;

        let chip = self.test()?;
        self.hal.delay_us(POST_TEST_DELAY_US);

        if let Err(e) = self.bring_up(registry) {
            warn!("SX127x setup failed: {e}");
            self.park_asleep();
            return Err(e);
        }

        self.initialized = true;
        info!("{chip:?} ready, modem {:?}", self.device.modem);
        Ok(())
    }

    /// Everything after the presence test. Any failure here is fatal.
    fn bring_up<R: InterruptRegistry + ?Sized>(&mut self, registry: &mut R) -> Result<(), Sx127xError> {
        self.reset()?;
        self.calibrate_rx_chain()?;
        self.set_op_mode(OpMode::Sleep)?;
        self.register_interrupts(registry)?;

        let settings = self.params.settings.clone();
        self.configure_modem(settings.modem)?;
        self.configure_freq_hop(settings.freq_hop, settings.hop_period)
    }

    /// Best-effort sleep after a fatal failure. `Sleep` is recorded whether
    /// or not the chip accepted the write.
    fn park_asleep(&mut self) {
        if let Err(e) = self.write_op_mode(OpMode::Sleep) {
            warn!("Cannot put SX127x to sleep: {e}");
        }
        self.set_state(RadioState::Sleep);
    }

    /// Presence test: the version register must identify an SX1272 or SX1276
    pub fn test(&mut self) -> Result<ChipVersion, Sx127xError> {
        let version = self.hal.read_register(REG_VERSION)?;
        match ChipVersion::from_register(version) {
            Some(chip) => {
                debug!("Version register 0x{version:02X}: {chip:?}");
                self.chip = Some(chip);
                Ok(chip)
            }
            None => {
                warn!("Unexpected version register value 0x{version:02X}");
                Err(InitError::TestFailed { version }.into())
            }
        }
    }

    /// Pulse the reset line: low for [`RESET_ASSERT_US`], then released and
    /// left to settle for [`RESET_SETTLE_US`].
    ///
    /// The chip comes back in FSK standby, which is what gets recorded.
    pub fn reset(&mut self) -> Result<(), Sx127xError> {
        let pin = self.params.reset_pin;
        debug!("Resetting SX127x (reset pin {pin})");

        self.hal.set_reset(pin, ResetLevel::Low)?;
        self.hal.delay_us(RESET_ASSERT_US);
        self.hal.set_reset(pin, ResetLevel::Floating)?;
        self.hal.delay_us(RESET_SETTLE_US);

        self.set_state(RadioState::Standby);
        self.device.modem = Modem::Fsk;
        Ok(())
    }

    fn register_interrupts<R: InterruptRegistry + ?Sized>(
        &mut self,
        registry: &mut R,
    ) -> Result<(), Sx127xError> {
        for line in DioLine::ALL {
            let pin = self.params.dio_pins[line.index()];
            let handler = DioHandler::new(line, Arc::clone(&self.dispatcher));
            registry
                .register(pin, EdgeType::Rising, handler)
                .map_err(|source| InitError::InterruptLine { line, source })?;
            debug!("{line:?} registered on pin {pin}");
        }
        Ok(())
    }

    /// Install the upper layer's "an interrupt occurred" callback.
    ///
    /// Runs in interrupt or timer context once per edge or expiry.
    pub fn set_isr_notifier<F>(&self, notifier: F) -> Result<(), Sx127xError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.dispatcher.set_notifier(notifier) {
            Ok(())
        } else {
            Err(Sx127xError::NotifierAlreadySet)
        }
    }

    /// Install the event sink, replacing any previous one.
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(RadioEvent) + Send + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Enter `mode` directly.
    pub fn set_mode(&mut self, mode: OpMode) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        self.set_op_mode(mode)
    }

    pub fn set_sleep(&mut self) -> Result<(), Sx127xError> {
        self.set_mode(OpMode::Sleep)
    }

    pub fn set_standby(&mut self) -> Result<(), Sx127xError> {
        self.set_mode(OpMode::Standby)
    }

    /// Start transmitting whatever the upper layer placed in the FIFO and arm
    /// the TX timeout.
    pub fn start_tx(&mut self) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;

        if self.device.modem == Modem::LoRa {
            let mut enabled = LoRaIrqFlags::TX_DONE;
            let mut mapping = self.hal.read_register(REG_DIOMAPPING1)?;
            mapping = (mapping & RF_LORA_DIOMAPPING1_DIO0_MASK) | RF_LORA_DIOMAPPING1_DIO0_01;
            if self.device.freq_hop {
                enabled |= LoRaIrqFlags::FHSS_CHANGE_CHANNEL;
                mapping = (mapping & RF_LORA_DIOMAPPING1_DIO2_MASK) | RF_LORA_DIOMAPPING1_DIO2_00;
            }
            self.hal
                .write_register(REG_LR_IRQFLAGSMASK, LoRaIrqFlags::mask_all_except(enabled))?;
            self.hal.write_register(REG_DIOMAPPING1, mapping)?;
        }

        self.set_op_mode(OpMode::Transmitter)?;
        let after = self.params.settings.tx_timeout();
        self.arm_timeout(TimeoutKind::Tx, after)
    }

    /// Open the receiver, single or continuous per the settings, and arm the
    /// RX timeout when one is configured.
    pub fn start_rx(&mut self) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;

        if self.device.modem == Modem::LoRa {
            let mut enabled = LoRaIrqFlags::RX_DONE
                | LoRaIrqFlags::PAYLOAD_CRC_ERROR
                | LoRaIrqFlags::RX_TIMEOUT;
            let mut mapping = self.hal.read_register(REG_DIOMAPPING1)?;
            mapping &= RF_LORA_DIOMAPPING1_DIO0_MASK & RF_LORA_DIOMAPPING1_DIO1_MASK;
            mapping |= RF_LORA_DIOMAPPING1_DIO0_00 | RF_LORA_DIOMAPPING1_DIO1_00;
            if self.device.freq_hop {
                enabled |= LoRaIrqFlags::FHSS_CHANGE_CHANNEL;
                mapping = (mapping & RF_LORA_DIOMAPPING1_DIO2_MASK) | RF_LORA_DIOMAPPING1_DIO2_00;
            }
            self.hal
                .write_register(REG_LR_IRQFLAGSMASK, LoRaIrqFlags::mask_all_except(enabled))?;
            self.hal.write_register(REG_DIOMAPPING1, mapping)?;
        }

        let mode = if self.params.settings.rx_single {
            OpMode::ReceiverSingle
        } else {
            OpMode::Receiver
        };
        self.set_op_mode(mode)?;

        match self.params.settings.rx_timeout() {
            Some(after) => self.arm_timeout(TimeoutKind::Rx, after),
            None => Ok(()),
        }
    }

    /// Start channel activity detection. LoRa only; a no-op on FSK.
    pub fn start_cad(&mut self) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;

        if self.device.modem != Modem::LoRa {
            debug!("CAD requested on FSK modem, ignoring");
            return Ok(());
        }

        let enabled = LoRaIrqFlags::CAD_DONE | LoRaIrqFlags::CAD_DETECTED;
        let mapping = self.hal.read_register(REG_DIOMAPPING1)?;
        self.hal
            .write_register(REG_LR_IRQFLAGSMASK, LoRaIrqFlags::mask_all_except(enabled))?;
        self.hal.write_register(
            REG_DIOMAPPING1,
            (mapping & RF_LORA_DIOMAPPING1_DIO3_MASK) | RF_LORA_DIOMAPPING1_DIO3_00,
        )?;
        self.set_op_mode(OpMode::Cad)
    }

    /// Switch the modem family. The chip is put to sleep first if a switch
    /// is needed.
    pub fn set_modem(&mut self, modem: Modem) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        self.configure_modem(modem)
    }

    /// Enable or disable LoRa frequency hopping with `period` symbols between
    /// hops.
    pub fn set_freq_hop(&mut self, enabled: bool, period: u8) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        self.configure_freq_hop(enabled, period)
    }

    /// Tune the carrier to `freq_hz`.
    pub fn set_channel(&mut self, freq_hz: u32) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        self.write_frf(frf_bytes(frf_from_hz(freq_hz)))?;
        self.device.channel_hz = Some(freq_hz);
        debug!("Channel set to {freq_hz} Hz");
        Ok(())
    }

    /// Cancel outstanding timeouts, put the chip to sleep and mark the driver
    /// uninitialized. The state is recorded as `Sleep` even if the final
    /// register write fails; that failure is still returned.
    pub fn shutdown(&mut self) -> Result<(), Sx127xError> {
        for kind in [TimeoutKind::Tx, TimeoutKind::Rx] {
            self.device.slot_mut(kind).cancel(&mut self.timers);
        }
        let result = self.write_op_mode(OpMode::Sleep);
        self.device.state = RadioState::Sleep;
        self.initialized = false;
        info!("SX127x shut down");
        result
    }

    pub(crate) fn configure_modem(&mut self, modem: Modem) -> Result<(), Sx127xError> {
        let opmode = self.hal.read_register(REG_OPMODE)?;
        self.device.modem = if opmode & RF_LORA_OPMODE_LONGRANGEMODE_ON != 0 {
            Modem::LoRa
        } else {
            Modem::Fsk
        };
        if self.device.modem == modem {
            return Ok(());
        }

        // The long range bit can only change in sleep
        self.set_op_mode(OpMode::Sleep)?;
        let opmode = self.hal.read_register(REG_OPMODE)?;
        let (long_range, dio_mapping2) = match modem {
            Modem::LoRa => (RF_LORA_OPMODE_LONGRANGEMODE_ON, 0x00),
            Modem::Fsk => (RF_LORA_OPMODE_LONGRANGEMODE_OFF, RF_DIOMAPPING2_DIO5_MODEREADY),
        };
        self.hal.write_register(
            REG_OPMODE,
            (opmode & RF_LORA_OPMODE_LONGRANGEMODE_MASK) | long_range,
        )?;
        self.device.modem = modem;

        self.hal.write_register(REG_DIOMAPPING1, 0x00)?;
        self.hal.write_register(REG_DIOMAPPING2, dio_mapping2)?;
        info!("Modem switched to {modem:?}");
        Ok(())
    }

    /// Program LoRa fast hopping. On FSK only the setting is recorded, since
    /// the hop registers alias FSK registers there (0x24 is `RegOsc`).
    pub(crate) fn configure_freq_hop(&mut self, enabled: bool, period: u8) -> Result<(), Sx127xError> {
        if self.device.modem != Modem::LoRa {
            self.device.freq_hop = enabled;
            debug!("Frequency hopping recorded as {enabled} on FSK, registers untouched");
            return Ok(());
        }

        let pll_hop = self.hal.read_register(REG_LR_PLLHOP)?;
        let fast_hop = if enabled {
            RF_LORA_PLLHOP_FASTHOP_ON
        } else {
            RF_LORA_PLLHOP_FASTHOP_OFF
        };
        self.hal
            .write_register(REG_LR_PLLHOP, (pll_hop & RF_LORA_PLLHOP_FASTHOP_MASK) | fast_hop)?;
        self.hal
            .write_register(REG_LR_HOPPERIOD, if enabled { period } else { 0 })?;
        self.device.freq_hop = enabled;
        debug!("Frequency hopping {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    fn arm_timeout(&mut self, kind: TimeoutKind, after: Duration) -> Result<(), Sx127xError> {
        let armed = self
            .device
            .slot_mut(kind)
            .arm(&mut self.timers, after, &self.dispatcher);
        if let Err(e) = armed {
            warn!("Cannot arm {kind:?} timeout: {e}, parking radio in standby");
            if let Err(park) = self.set_op_mode(OpMode::Standby) {
                warn!("Standby after failed arm also failed: {park}");
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), Sx127xError> {
        if self.initialized {
            Ok(())
        } else {
            Err(Sx127xError::NotInitialized)
        }
    }

    // ---------------------------------------------------------------------
    // Resolver
    // ---------------------------------------------------------------------

    /// Drain the dispatcher and resolve everything pending.
    ///
    /// Lines are serviced DIO0 to DIO3, then the TX and RX timeouts. If a
    /// register access fails, the failing input and everything not yet
    /// serviced are merged back into the dispatcher before the error is
    /// returned, so a later pass retries them.
    ///
    /// Returns an empty list when another pass already holds the resolver.
    pub fn process_pending(&mut self) -> Result<Vec<RadioEvent>, Sx127xError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let Some(_guard) = dispatcher.try_begin_service() else {
            debug!("Resolver pass already in progress");
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        loop {
            let work = dispatcher.take_pending();
            if work.is_empty() {
                break;
            }
            if let Err(e) = self.service(work, &mut events) {
                // Events resolved before the failure were already delivered
                // through the callback.
                warn!("Resolver pass aborted: {e}");
                return Err(e);
            }
        }
        Ok(events)
    }

    fn service(&mut self, mut work: PendingWork, events: &mut Vec<RadioEvent>) -> Result<(), Sx127xError> {
        for line in DioLine::ALL {
            if !work.lines.contains(line.flag()) {
                continue;
            }
            match self.resolve(ResolverInput::Line(line)) {
                Ok(event) => {
                    work.lines.remove(line.flag());
                    events.extend(event);
                }
                Err(e) => {
                    self.dispatcher.restore(work);
                    return Err(e);
                }
            }
        }

        for kind in [TimeoutKind::Tx, TimeoutKind::Rx] {
            let Some(generation) = work.timeout(kind) else {
                continue;
            };
            if !self.device.slot(kind).accepts(generation) {
                debug!("Stale {kind:?} timeout (generation {generation}) ignored");
                work.clear_timeout(kind);
                continue;
            }
            match self.resolve(ResolverInput::Timeout(kind)) {
                Ok(event) => {
                    work.clear_timeout(kind);
                    events.extend(event);
                }
                Err(e) => {
                    self.dispatcher.restore(work);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolve a single input against the current state and deliver the
    /// resulting event, if any.
    ///
    /// A timeout input stands for expiry of the live timeout of that kind and
    /// is ignored when none is armed. Register work happens before any state
    /// change, so on a transport error the state is unchanged.
    pub fn resolve(&mut self, input: ResolverInput) -> Result<Option<RadioEvent>, Sx127xError> {
        let _span = span_resolver_pass(&input);

        if let ResolverInput::Timeout(kind) = input {
            if !self.device.slot(kind).is_live() {
                debug!("{kind:?} timeout with no live arming ignored");
                return Ok(None);
            }
        }

        let state = self.device.state;
        let step = transition(input, state, self.device.modem, self.device.freq_hop);
        self.apply(input, step)?;

        let event = step.event();
        if let Some(event) = event {
            debug!("{input:?} in {state:?}: {event:?}");
            if let Some(callback) = self.event_callback.as_mut() {
                callback(event);
            }
        }
        Ok(event)
    }

    fn apply(&mut self, input: ResolverInput, step: Transition) -> Result<(), Sx127xError> {
        match step {
            Transition::DataReceived => {}
            Transition::TxDone { clear_device_flag } => {
                if clear_device_flag {
                    self.clear_irq_flags(LoRaIrqFlags::TX_DONE)?;
                }
            }
            Transition::RxTimeoutIrq => {
                self.clear_irq_flags(LoRaIrqFlags::RX_TIMEOUT)?;
            }
            Transition::ChannelHop => {
                self.clear_irq_flags(LoRaIrqFlags::FHSS_CHANGE_CHANNEL)?;
                let channel = self.hal.read_register(REG_LR_HOPCHANNEL)? & RF_LORA_HOPCHANNEL_CHANNEL_MASK;
                self.device.last_channel = Some(channel);
            }
            Transition::CadDone => {
                let flags = LoRaIrqFlags::from_bits_truncate(self.hal.read_register(REG_LR_IRQFLAGS)?);
                self.clear_irq_flags(LoRaIrqFlags::CAD_DETECTED | LoRaIrqFlags::CAD_DONE)?;
                self.device.last_cad_detected = Some(flags.contains(LoRaIrqFlags::CAD_DETECTED));
            }
            Transition::TimeoutExpired(kind) => {
                warn!("{kind:?} timeout expired, parking radio in standby");
                self.write_op_mode(OpMode::Standby)?;
            }
            Transition::Anomaly => {
                crate::log_warn_throttled!(
                    self.unexpected_log,
                    "{input:?} while idle: TX done without a transmission in flight"
                );
            }
            Transition::Ignore(reason) => {
                debug!("{input:?} in {:?} ignored ({reason:?})", self.device.state);
            }
            Transition::Unrecognized => {
                crate::log_warn_throttled!(
                    self.unexpected_log,
                    "Unexpected {input:?} in {:?} ({:?} modem)",
                    self.device.state,
                    self.device.modem
                );
            }
        }

        let next = step.next_state(self.device.state);
        self.set_state(next);
        Ok(())
    }

    fn clear_irq_flags(&mut self, flags: LoRaIrqFlags) -> Result<(), Sx127xError> {
        self.hal.write_register(REG_LR_IRQFLAGS, flags.bits())?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn state(&self) -> RadioState {
        self.device.state
    }

    pub fn modem(&self) -> Modem {
        self.device.modem
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_freq_hop_enabled(&self) -> bool {
        self.device.freq_hop
    }

    /// Silicon identified by the last presence test
    pub fn chip(&self) -> Option<ChipVersion> {
        self.chip
    }

    /// Carrier frequency last set through [`Sx127x::set_channel`]
    pub fn channel_hz(&self) -> Option<u32> {
        self.device.channel_hz
    }

    /// Hop channel read on the last channel-hop event
    pub fn last_channel(&self) -> Option<u8> {
        self.device.last_channel
    }

    /// Detection result of the last completed CAD
    pub fn last_cad_detected(&self) -> Option<bool> {
        self.device.last_cad_detected
    }

    /// Counters of the rate-limited warnings for unexpected or anomalous
    /// interrupts
    pub fn anomaly_stats(&self) -> ThrottleStats {
        self.unexpected_log.stats()
    }

    /// Whether a timeout of `kind` is currently armed
    pub fn timeout_armed(&self, kind: TimeoutKind) -> bool {
        self.device.slot(kind).is_live()
    }

    pub fn params(&self) -> &Sx127xParams {
        &self.params
    }

    /// Shared dispatcher, for platforms that route edges by hand
    pub fn dispatcher(&self) -> &Arc<IrqDispatcher> {
        &self.dispatcher
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }
}
