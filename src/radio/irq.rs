//! # SX127x Interrupt Handling
//!
//! This module covers both sides of the SX127x interrupt path:
//!
//! - **Device side**: [`LoRaIrqFlags`], the bit layout of the LoRa interrupt
//!   flag and mask registers (`RegIrqFlags`, `RegIrqFlagsMask`).
//! - **Host side**: [`IrqDispatcher`], which turns rising edges on the four
//!   DIO lines into bits of a pending-interrupt record and notifies the upper
//!   layer that work is waiting.
//!
//! ## DIO Line Mapping
//!
//! The line-to-flag table is fixed for the device family and independent of
//! modem or state; interpretation happens later in the resolver.
//!
//! | Line | Flag  | LoRa meaning                  |
//! |------|-------|-------------------------------|
//! | DIO0 | DIO0  | RxDone / TxDone               |
//! | DIO1 | DIO1  | RxTimeout                     |
//! | DIO2 | DIO2  | FhssChangeChannel             |
//! | DIO3 | DIO3  | CadDone / CadDetected         |
//!
//! ## Usage Pattern
//!
//! 1. The platform calls [`IrqDispatcher::on_line_edge`] from interrupt context
//! 2. The dispatcher ORs the line's flag into the pending record
//! 3. The registered notifier runs once per edge
//! 4. Normal context calls `Sx127x::process_pending`, which drains the record

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::radio::timer::TimeoutKind;

bitflags! {
    /// LoRa interrupt sources as laid out in `RegIrqFlags` / `RegIrqFlagsMask`
    ///
    /// ```text
    /// Bit 7: RxTimeout
    /// Bit 6: RxDone
    /// Bit 5: PayloadCrcError
    /// Bit 4: ValidHeader
    /// Bit 3: TxDone
    /// Bit 2: CadDone
    /// Bit 1: FhssChangeChannel
    /// Bit 0: CadDetected
    /// ```
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LoRaIrqFlags: u8 {
        const RX_TIMEOUT          = 0b1000_0000;
        const RX_DONE             = 0b0100_0000;
        const PAYLOAD_CRC_ERROR   = 0b0010_0000;
        const VALID_HEADER        = 0b0001_0000;
        const TX_DONE             = 0b0000_1000;
        const CAD_DONE            = 0b0000_0100;
        const FHSS_CHANGE_CHANNEL = 0b0000_0010;
        const CAD_DETECTED        = 0b0000_0001;
    }
}

impl LoRaIrqFlags {
    /// Mask register value that leaves only `enabled` sources active
    pub fn mask_all_except(enabled: LoRaIrqFlags) -> u8 {
        (!enabled).bits()
    }
}

bitflags! {
    /// Logical interrupt flags, one per DIO line
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct IrqFlags: u8 {
        /// DIO0: data done (rx done / tx done)
        const DIO0 = 0b0001;
        /// DIO1: receive timeout
        const DIO1 = 0b0010;
        /// DIO2: frequency hop channel change
        const DIO2 = 0b0100;
        /// DIO3: channel activity detection done
        const DIO3 = 0b1000;
    }
}

/// One of the four DIO interrupt lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DioLine {
    Dio0 = 0,
    Dio1 = 1,
    Dio2 = 2,
    Dio3 = 3,
}

/// Fixed line-to-flag table, indexed by line number
const LINE_FLAGS: [IrqFlags; 4] = [IrqFlags::DIO0, IrqFlags::DIO1, IrqFlags::DIO2, IrqFlags::DIO3];

impl DioLine {
    /// All lines in service order
    pub const ALL: [DioLine; 4] = [DioLine::Dio0, DioLine::Dio1, DioLine::Dio2, DioLine::Dio3];

    /// Line for a numeric index (0..=3)
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Logical flag raised by an edge on this line
    pub fn flag(self) -> IrqFlags {
        LINE_FLAGS[self.index()]
    }
}

/// Work drained from the dispatcher in one resolver pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWork {
    /// Lines that saw at least one edge
    pub lines: IrqFlags,
    /// Generation of the newest fired TX alarm, if any
    pub tx_timeout: Option<u32>,
    /// Generation of the newest fired RX alarm, if any
    pub rx_timeout: Option<u32>,
}

impl PendingWork {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.tx_timeout.is_none() && self.rx_timeout.is_none()
    }

    /// Fired generation of `kind`, if any
    pub fn timeout(&self, kind: TimeoutKind) -> Option<u32> {
        match kind {
            TimeoutKind::Tx => self.tx_timeout,
            TimeoutKind::Rx => self.rx_timeout,
        }
    }

    pub(crate) fn clear_timeout(&mut self, kind: TimeoutKind) {
        match kind {
            TimeoutKind::Tx => self.tx_timeout = None,
            TimeoutKind::Rx => self.rx_timeout = None,
        }
    }
}

type Notifier = Box<dyn Fn() + Send + Sync>;

/// Interrupt-context to normal-context handoff for one device
///
/// All writers use atomic read-modify-write, so edges and timer expiries that
/// race a drain are never lost: they land either in the drained snapshot or
/// in the record left for the next pass.
pub struct IrqDispatcher {
    pending: AtomicU8,
    tx_timeout: AtomicU32,
    rx_timeout: AtomicU32,
    servicing: AtomicBool,
    edge_counts: [AtomicU32; 4],
    notifier: OnceCell<Notifier>,
}

impl std::fmt::Debug for IrqDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrqDispatcher")
            .field("pending", &self.pending_flags())
            .field("servicing", &self.servicing.load(Ordering::Relaxed))
            .field("notifier", &self.notifier.get().is_some())
            .finish()
    }
}

impl Default for IrqDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqDispatcher {
    pub fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            tx_timeout: AtomicU32::new(0),
            rx_timeout: AtomicU32::new(0),
            servicing: AtomicBool::new(false),
            edge_counts: Default::default(),
            notifier: OnceCell::new(),
        }
    }

    /// Install the "an interrupt occurred" callback. Can be set once.
    pub fn set_notifier<F>(&self, notifier: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.set(Box::new(notifier)).is_ok()
    }

    /// Interrupt-context entry point for a rising edge on `line`
    pub fn on_line_edge(&self, line: DioLine) {
        self.pending.fetch_or(line.flag().bits(), Ordering::AcqRel);
        self.edge_counts[line.index()].fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    /// Timer-context entry point for an expired alarm
    pub(crate) fn on_timeout(&self, kind: TimeoutKind, generation: u32) {
        merge_generation(self.timeout_slot(kind), generation);
        self.notify();
    }

    /// Atomically take everything recorded so far
    pub fn take_pending(&self) -> PendingWork {
        let lines = IrqFlags::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel));
        let tx = self.tx_timeout.swap(0, Ordering::AcqRel);
        let rx = self.rx_timeout.swap(0, Ordering::AcqRel);
        PendingWork {
            lines,
            tx_timeout: (tx != 0).then_some(tx),
            rx_timeout: (rx != 0).then_some(rx),
        }
    }

    /// Merge unprocessed work back into the record without notifying
    pub fn restore(&self, work: PendingWork) {
        self.pending.fetch_or(work.lines.bits(), Ordering::AcqRel);
        if let Some(generation) = work.tx_timeout {
            merge_generation(&self.tx_timeout, generation);
        }
        if let Some(generation) = work.rx_timeout {
            merge_generation(&self.rx_timeout, generation);
        }
    }

    /// Snapshot of the pending line flags
    pub fn pending_flags(&self) -> IrqFlags {
        IrqFlags::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    /// Whether any line or timeout is waiting for a resolver pass
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
            || self.tx_timeout.load(Ordering::Acquire) != 0
            || self.rx_timeout.load(Ordering::Acquire) != 0
    }

    /// Total rising edges seen on `line`
    pub fn edge_count(&self, line: DioLine) -> u32 {
        self.edge_counts[line.index()].load(Ordering::Relaxed)
    }

    /// Claim the single resolver slot. Returns `None` while another pass
    /// holds it; that pass picks up anything recorded in the meantime.
    pub fn try_begin_service(&self) -> Option<ServiceGuard<'_>> {
        self.servicing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ServiceGuard { dispatcher: self })
    }

    fn timeout_slot(&self, kind: TimeoutKind) -> &AtomicU32 {
        match kind {
            TimeoutKind::Tx => &self.tx_timeout,
            TimeoutKind::Rx => &self.rx_timeout,
        }
    }

    fn notify(&self) {
        if let Some(notifier) = self.notifier.get() {
            notifier();
        }
    }
}

/// Holds the resolver slot until dropped
#[derive(Debug)]
pub struct ServiceGuard<'a> {
    dispatcher: &'a IrqDispatcher,
}

impl Drop for ServiceGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.servicing.store(false, Ordering::Release);
    }
}

/// Keep the newer of the recorded and incoming generation.
///
/// Generations are compared in wrapping serial order, so generation 1 right
/// after a wrap still supersedes `u32::MAX`. Zero means nothing recorded.
fn merge_generation(slot: &AtomicU32, generation: u32) {
    let _ = slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        let newer = current == 0 || (generation.wrapping_sub(current) as i32) > 0;
        newer.then_some(generation)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_line_flag_table() {
        assert_eq!(DioLine::Dio0.flag(), IrqFlags::DIO0);
        assert_eq!(DioLine::Dio3.flag(), IrqFlags::DIO3);
        assert_eq!(DioLine::from_index(2), Some(DioLine::Dio2));
        assert_eq!(DioLine::from_index(4), None);
    }

    #[test]
    fn test_edges_accumulate_until_drained() {
        let dispatcher = IrqDispatcher::new();
        dispatcher.on_line_edge(DioLine::Dio0);
        dispatcher.on_line_edge(DioLine::Dio0);
        dispatcher.on_line_edge(DioLine::Dio2);

        let work = dispatcher.take_pending();
        assert_eq!(work.lines, IrqFlags::DIO0 | IrqFlags::DIO2);
        assert_eq!(dispatcher.edge_count(DioLine::Dio0), 2);
        assert!(dispatcher.take_pending().is_empty());
    }

    #[test]
    fn test_notifier_runs_once_per_edge() {
        let dispatcher = IrqDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        assert!(dispatcher.set_notifier(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!dispatcher.set_notifier(|| {}));

        dispatcher.on_line_edge(DioLine::Dio1);
        dispatcher.on_line_edge(DioLine::Dio1);
        dispatcher.on_timeout(TimeoutKind::Tx, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_newest_timeout_generation_wins() {
        let dispatcher = IrqDispatcher::new();
        dispatcher.on_timeout(TimeoutKind::Rx, 5);
        dispatcher.on_timeout(TimeoutKind::Rx, 4);
        let work = dispatcher.take_pending();
        assert_eq!(work.rx_timeout, Some(5));
        assert_eq!(work.tx_timeout, None);
    }

    #[test]
    fn test_generation_after_wrap_supersedes_max() {
        let dispatcher = IrqDispatcher::new();
        dispatcher.on_timeout(TimeoutKind::Tx, u32::MAX);
        dispatcher.on_timeout(TimeoutKind::Tx, 1);
        assert_eq!(dispatcher.take_pending().tx_timeout, Some(1));

        dispatcher.on_timeout(TimeoutKind::Rx, 1);
        dispatcher.on_timeout(TimeoutKind::Rx, u32::MAX);
        assert_eq!(dispatcher.take_pending().rx_timeout, Some(1));
    }

    #[test]
    fn test_restore_merges_with_new_edges() {
        let dispatcher = IrqDispatcher::new();
        dispatcher.on_line_edge(DioLine::Dio3);
        let work = dispatcher.take_pending();
        dispatcher.on_line_edge(DioLine::Dio1);
        dispatcher.restore(work);
        assert_eq!(dispatcher.pending_flags(), IrqFlags::DIO1 | IrqFlags::DIO3);
    }

    #[test]
    fn test_single_service_slot() {
        let dispatcher = IrqDispatcher::new();
        let guard = dispatcher.try_begin_service();
        assert!(guard.is_some());
        assert!(dispatcher.try_begin_service().is_none());
        drop(guard);
        assert!(dispatcher.try_begin_service().is_some());
    }

    #[test]
    fn test_mask_all_except() {
        let mask = LoRaIrqFlags::mask_all_except(LoRaIrqFlags::TX_DONE);
        assert_eq!(mask, 0xF7);
    }
}
