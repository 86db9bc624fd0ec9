//! Mock platform for driver integration tests
//!
//! - `MockHal`: register file with write-one-to-clear IRQ flags, scripted
//!   wideband RSSI, a fake microsecond clock and failure injection
//! - `ManualScheduler`: timeouts fire only when a test says so
//! - `RecordingRegistry`: keeps the DIO handlers so tests can raise edges

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sx127x_rs::radio::registers::*;
use sx127x_rs::radio::LoRaIrqFlags;
use sx127x_rs::{
    DioHandler, DioLine, EdgeType, Hal, HalError, InterruptRegistry, RadioEvent, ResetLevel,
    Sx127x, Sx127xParams, TimeoutAlarm, TimeoutKind, TimeoutScheduler, TimerId,
};

/// One observed HAL call, stamped with the fake clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalOp {
    Read { addr: u8, at_us: u64 },
    Write { addr: u8, value: u8, at_us: u64 },
    Reset { level: ResetLevel, at_us: u64 },
    Delay { us: u32, at_us: u64 },
}

#[derive(Debug)]
pub struct MockHal {
    regs: HashMap<u8, u8>,
    rssi: VecDeque<u8>,
    clock_us: u64,
    ops: Vec<HalOp>,
    fail_peripherals: bool,
    fail_reads: HashSet<u8>,
    fail_writes: HashSet<u8>,
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHal {
    /// Freshly reset SX1276: FSK standby, nothing pending
    pub fn new() -> Self {
        let mut regs = HashMap::new();
        regs.insert(REG_VERSION, VERSION_SX1276);
        regs.insert(REG_OPMODE, 0x09);
        regs.insert(REG_PACONFIG, 0x4F);
        regs.insert(REG_FRFMSB, 0x6C);
        regs.insert(REG_FRFMID, 0x80);
        regs.insert(REG_FRFLSB, 0x00);
        Self {
            regs,
            rssi: VecDeque::new(),
            clock_us: 0,
            ops: Vec::new(),
            fail_peripherals: false,
            fail_reads: HashSet::new(),
            fail_writes: HashSet::new(),
        }
    }

    pub fn reg(&self, addr: u8) -> u8 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    /// Set a register as the chip would, bypassing write semantics
    pub fn poke(&mut self, addr: u8, value: u8) {
        self.regs.insert(addr, value);
    }

    /// Raise device IRQ flags
    pub fn raise_irq(&mut self, flags: LoRaIrqFlags) {
        let current = self.reg(REG_LR_IRQFLAGS);
        self.poke(REG_LR_IRQFLAGS, current | flags.bits());
    }

    pub fn script_rssi(&mut self, samples: &[u8]) {
        self.rssi.extend(samples.iter().copied());
    }

    pub fn fail_peripherals(&mut self) {
        self.fail_peripherals = true;
    }

    pub fn fail_reads_of(&mut self, addr: u8) {
        self.fail_reads.insert(addr);
    }

    pub fn fail_writes_to(&mut self, addr: u8) {
        self.fail_writes.insert(addr);
    }

    pub fn heal(&mut self) {
        self.fail_reads.clear();
        self.fail_writes.clear();
    }

    pub fn ops(&self) -> &[HalOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Values written to `addr`, oldest first
    pub fn writes_to(&self, addr: u8) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                HalOp::Write { addr: a, value, .. } if a == addr => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn reads_of(&self, addr: u8) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, HalOp::Read { addr: a, .. } if *a == addr))
            .count()
    }

    /// Mode bits currently in `RegOpMode`
    pub fn op_mode_bits(&self) -> u8 {
        self.reg(REG_OPMODE) & !RF_OPMODE_MASK
    }
}

impl Hal for MockHal {
    fn init_peripherals(&mut self, _spi: u8, _nss_pin: u8) -> Result<(), HalError> {
        if self.fail_peripherals {
            Err(HalError::Spi)
        } else {
            Ok(())
        }
    }

    fn read_register(&mut self, addr: u8) -> Result<u8, HalError> {
        self.ops.push(HalOp::Read { addr, at_us: self.clock_us });
        if self.fail_reads.contains(&addr) {
            return Err(HalError::Spi);
        }
        if addr == REG_LR_RSSIWIDEBAND {
            return Ok(self.rssi.pop_front().unwrap_or(0));
        }
        Ok(self.reg(addr))
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), HalError> {
        self.ops.push(HalOp::Write { addr, value, at_us: self.clock_us });
        if self.fail_writes.contains(&addr) {
            return Err(HalError::Spi);
        }
        match addr {
            // Write one to clear
            REG_LR_IRQFLAGS => {
                let current = self.reg(addr);
                self.regs.insert(addr, current & !value);
            }
            // Image calibration completes instantly
            REG_IMAGECAL => {
                self.regs.insert(addr, value & !RF_IMAGECAL_IMAGECAL_RUNNING);
            }
            _ => {
                self.regs.insert(addr, value);
            }
        }
        Ok(())
    }

    fn set_reset(&mut self, _pin: u8, level: ResetLevel) -> Result<(), HalError> {
        self.ops.push(HalOp::Reset { level, at_us: self.clock_us });
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.ops.push(HalOp::Delay { us, at_us: self.clock_us });
        self.clock_us += u64::from(us);
    }
}

#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u32,
    history: Vec<(TimerId, TimeoutAlarm)>,
    live: Vec<TimerId>,
    pub cancelled: Vec<TimerId>,
    pub fail_next: bool,
}

impl ManualScheduler {
    /// Every alarm of `kind` ever scheduled, oldest first
    pub fn alarms(&self, kind: TimeoutKind) -> Vec<TimeoutAlarm> {
        self.history
            .iter()
            .filter(|(_, alarm)| alarm.kind() == kind)
            .map(|(_, alarm)| alarm.clone())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Expire the live alarm of `kind`. Returns false if none is live.
    pub fn expire(&mut self, kind: TimeoutKind) -> bool {
        let found = self
            .history
            .iter()
            .rev()
            .find(|(id, alarm)| alarm.kind() == kind && self.live.contains(id))
            .cloned();
        match found {
            Some((id, alarm)) => {
                self.live.retain(|live| *live != id);
                alarm.fire();
                true
            }
            None => false,
        }
    }
}

impl TimeoutScheduler for ManualScheduler {
    fn schedule(&mut self, _after: Duration, alarm: TimeoutAlarm) -> Result<TimerId, HalError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(HalError::Timer);
        }
        self.next_id += 1;
        let id = TimerId::new(self.next_id);
        self.history.push((id, alarm));
        self.live.push(id);
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        self.live.retain(|live| *live != id);
        self.cancelled.push(id);
    }
}

#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pub handlers: Vec<(u8, EdgeType, DioHandler)>,
    pub fail_on_pin: Option<u8>,
}

impl RecordingRegistry {
    /// Raise a rising edge on `line`, as the platform ISR would
    pub fn edge(&self, line: DioLine) {
        for (_, _, handler) in &self.handlers {
            if handler.line() == line {
                handler.on_edge();
            }
        }
    }
}

impl InterruptRegistry for RecordingRegistry {
    fn register(&mut self, pin: u8, edge: EdgeType, handler: DioHandler) -> Result<(), HalError> {
        if self.fail_on_pin == Some(pin) {
            return Err(HalError::Gpio);
        }
        self.handlers.push((pin, edge, handler));
        Ok(())
    }
}

pub type TestRadio = Sx127x<MockHal, ManualScheduler>;

/// Initialized radio plus its registry and an event log
pub struct Rig {
    pub radio: TestRadio,
    pub registry: RecordingRegistry,
    pub events: Arc<Mutex<Vec<RadioEvent>>>,
}

impl Rig {
    pub fn new(params: Sx127xParams) -> Self {
        sx127x_rs::logging::init_test_logger();

        let mut radio = Sx127x::new(MockHal::new(), ManualScheduler::default(), params);
        let mut registry = RecordingRegistry::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        radio.on_event(move |event| sink.lock().unwrap().push(event));
        radio.init(&mut registry).expect("init");
        radio.hal_mut().clear_ops();

        Self { radio, registry, events }
    }

    pub fn lora() -> Self {
        Self::new(Sx127xParams::default())
    }

    pub fn edge(&self, line: DioLine) {
        self.registry.edge(line);
    }

    pub fn delivered(&self) -> Vec<RadioEvent> {
        self.events.lock().unwrap().clone()
    }
}
