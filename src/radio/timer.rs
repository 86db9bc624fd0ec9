//! Software timeouts bounding TX and RX operations.
//!
//! Each running state owns one [`TimeoutSlot`]. Arming bumps the slot's
//! generation and hands the scheduler a [`TimeoutAlarm`] stamped with it; an
//! alarm is honored by the resolver only while its generation is the slot's
//! current, live one. Cancelled or superseded alarms that still fire are
//! therefore inert.

use std::sync::Arc;
use std::time::Duration;

use crate::radio::hal::{HalError, TimeoutScheduler};
use crate::radio::irq::IrqDispatcher;

/// Which operation a timeout bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    Tx,
    Rx,
}

/// Opaque handle returned by a [`TimeoutScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

impl TimerId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Callback payload handed to the scheduler
#[derive(Debug, Clone)]
pub struct TimeoutAlarm {
    kind: TimeoutKind,
    generation: u32,
    dispatcher: Arc<IrqDispatcher>,
}

impl TimeoutAlarm {
    pub fn kind(&self) -> TimeoutKind {
        self.kind
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Called by the scheduler on expiry. Safe from any context.
    pub fn fire(&self) {
        self.dispatcher.on_timeout(self.kind, self.generation);
    }
}

/// At most one live timeout of a given kind
#[derive(Debug)]
pub struct TimeoutSlot {
    kind: TimeoutKind,
    generation: u32,
    live: Option<TimerId>,
}

impl TimeoutSlot {
    pub fn new(kind: TimeoutKind) -> Self {
        Self {
            kind,
            generation: 0,
            live: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Cancel any live alarm, then schedule a fresh one.
    pub fn arm<S: TimeoutScheduler + ?Sized>(
        &mut self,
        scheduler: &mut S,
        after: Duration,
        dispatcher: &Arc<IrqDispatcher>,
    ) -> Result<TimerId, HalError> {
        self.cancel(scheduler);

        // 0 is reserved for "nothing fired" in the dispatcher
        self.generation = self.generation.wrapping_add(1).max(1);
        let alarm = TimeoutAlarm {
            kind: self.kind,
            generation: self.generation,
            dispatcher: Arc::clone(dispatcher),
        };
        let id = scheduler.schedule(after, alarm)?;
        self.live = Some(id);
        log::debug!(
            "{:?} timeout armed for {:?} (generation {})",
            self.kind,
            after,
            self.generation
        );
        Ok(id)
    }

    /// Cancel the live alarm, if any.
    pub fn cancel<S: TimeoutScheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(id) = self.live.take() {
            scheduler.cancel(id);
            log::debug!("{:?} timeout cancelled", self.kind);
        }
    }

    /// Whether a fired alarm belongs to the live arming. Leaving the running
    /// state cancels the slot, so each arming is honored at most once.
    pub fn accepts(&self, generation: u32) -> bool {
        self.live.is_some() && generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingScheduler {
        next: u32,
        scheduled: Vec<TimeoutAlarm>,
        cancelled: Vec<TimerId>,
    }

    impl TimeoutScheduler for RecordingScheduler {
        fn schedule(&mut self, _after: Duration, alarm: TimeoutAlarm) -> Result<TimerId, HalError> {
            self.next += 1;
            self.scheduled.push(alarm);
            Ok(TimerId::new(self.next))
        }

        fn cancel(&mut self, id: TimerId) {
            self.cancelled.push(id);
        }
    }

    #[test]
    fn test_rearm_cancels_previous() {
        let dispatcher = Arc::new(IrqDispatcher::new());
        let mut scheduler = RecordingScheduler::default();
        let mut slot = TimeoutSlot::new(TimeoutKind::Tx);

        let first = slot.arm(&mut scheduler, Duration::from_millis(10), &dispatcher).unwrap();
        let second = slot.arm(&mut scheduler, Duration::from_millis(10), &dispatcher).unwrap();

        assert_eq!(scheduler.cancelled, vec![first]);
        assert_ne!(first, second);
        assert!(!slot.accepts(scheduler.scheduled[0].generation()));
        assert!(slot.accepts(scheduler.scheduled[1].generation()));
    }

    #[test]
    fn test_generation_skips_zero_on_wrap() {
        let dispatcher = Arc::new(IrqDispatcher::new());
        let mut scheduler = RecordingScheduler::default();
        let mut slot = TimeoutSlot::new(TimeoutKind::Rx);
        slot.generation = u32::MAX;

        slot.arm(&mut scheduler, Duration::from_millis(5), &dispatcher).unwrap();
        assert_eq!(slot.generation(), 1);
        assert!(slot.accepts(1));
        assert!(!slot.accepts(0));
    }

    #[test]
    fn test_cancelled_alarm_is_stale() {
        let dispatcher = Arc::new(IrqDispatcher::new());
        let mut scheduler = RecordingScheduler::default();
        let mut slot = TimeoutSlot::new(TimeoutKind::Tx);

        slot.arm(&mut scheduler, Duration::from_millis(5), &dispatcher).unwrap();
        slot.cancel(&mut scheduler);
        slot.cancel(&mut scheduler);

        assert_eq!(scheduler.cancelled.len(), 1);
        assert!(!slot.accepts(scheduler.scheduled[0].generation()));
    }

    #[test]
    fn test_fire_reaches_dispatcher() {
        let dispatcher = Arc::new(IrqDispatcher::new());
        let mut scheduler = RecordingScheduler::default();
        let mut slot = TimeoutSlot::new(TimeoutKind::Rx);

        slot.arm(&mut scheduler, Duration::from_millis(5), &dispatcher).unwrap();
        scheduler.scheduled[0].fire();
        assert_eq!(dispatcher.take_pending().rx_timeout, Some(slot.generation()));
    }
}
