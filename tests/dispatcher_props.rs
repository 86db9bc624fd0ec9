//! Property tests for interrupt accumulation and the transition table

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use sx127x_rs::radio::{transition, DioLine, IrqDispatcher, IrqFlags, ResolverInput};
use sx127x_rs::{Modem, RadioState, TimeoutKind};

const STATES: [RadioState; 5] = [
    RadioState::Idle,
    RadioState::TxRunning,
    RadioState::RxRunning,
    RadioState::Sleep,
    RadioState::Standby,
];

fn inputs() -> Vec<ResolverInput> {
    DioLine::ALL
        .into_iter()
        .map(ResolverInput::Line)
        .chain([TimeoutKind::Tx, TimeoutKind::Rx].map(ResolverInput::Timeout))
        .collect()
}

fn line(index: u8) -> DioLine {
    DioLine::from_index(index).unwrap()
}

proptest! {
    #[test]
    fn prop_pending_is_or_of_edges(lines in prop::collection::vec(0u8..4, 0..64)) {
        let dispatcher = IrqDispatcher::new();
        let mut expected = IrqFlags::empty();
        for &i in &lines {
            dispatcher.on_line_edge(line(i));
            expected |= line(i).flag();
        }

        prop_assert_eq!(dispatcher.take_pending().lines, expected);
        prop_assert!(dispatcher.take_pending().is_empty());
        for l in DioLine::ALL {
            let seen = lines.iter().filter(|&&i| usize::from(i) == l.index()).count();
            prop_assert_eq!(dispatcher.edge_count(l) as usize, seen);
        }
    }

    #[test]
    fn prop_restore_loses_nothing(
        before in prop::collection::vec(0u8..4, 0..16),
        during in prop::collection::vec(0u8..4, 0..16),
    ) {
        let dispatcher = IrqDispatcher::new();
        let mut expected = IrqFlags::empty();
        for &i in before.iter().chain(during.iter()) {
            expected |= line(i).flag();
        }

        for &i in &before {
            dispatcher.on_line_edge(line(i));
        }
        let drained = dispatcher.take_pending();
        for &i in &during {
            dispatcher.on_line_edge(line(i));
        }
        dispatcher.restore(drained);

        prop_assert_eq!(dispatcher.pending_flags(), expected);
    }

    #[test]
    fn prop_transitions_only_settle_to_idle(
        input in 0usize..6,
        state in 0usize..5,
        lora in any::<bool>(),
        hop in any::<bool>(),
    ) {
        let input = inputs()[input];
        let state = STATES[state];
        let modem = if lora { Modem::LoRa } else { Modem::Fsk };

        let step = transition(input, state, modem, hop);
        let next = step.next_state(state);
        prop_assert!(next == state || next == RadioState::Idle);
        if step.event().is_none() {
            prop_assert_eq!(next, state);
        }
    }
}

#[test]
fn test_concurrent_edges_are_never_lost() {
    let dispatcher = Arc::new(IrqDispatcher::new());
    let workers: Vec<_> = DioLine::ALL
        .into_iter()
        .map(|l| {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    dispatcher.on_line_edge(l);
                }
            })
        })
        .collect();

    let mut seen = IrqFlags::empty();
    while workers.iter().any(|w| !w.is_finished()) {
        seen |= dispatcher.take_pending().lines;
    }
    for worker in workers {
        worker.join().unwrap();
    }
    seen |= dispatcher.take_pending().lines;

    assert_eq!(seen, IrqFlags::all());
    for l in DioLine::ALL {
        assert_eq!(dispatcher.edge_count(l), 1_000);
    }
}
