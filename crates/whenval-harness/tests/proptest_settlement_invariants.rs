//! Property-based invariant tests for wait settlement.
//!
//! Random firing scripts with random cancel points, run under both the eager
//! and the lazy firing convention:
//!
//! 1. Exactly one registration per wait
//! 2. Exactly one disposal once settled, none while pending
//! 3. The outcome matches a direct model of the script
//! 4. Dropping a pending wait disposes exactly once
//! 5. Nothing is delivered to a settled wait

use futures::FutureExt;
use proptest::prelude::*;
use whenval_core::{Rejection, WaitState, WhenValue, when_value, when_value_matching};
use whenval_harness::{ManualReactor, Source};

// ── Helpers ──────────────────────────────────────────────────────────

/// What the watched source holds at one point of the script.
type Reading = Result<Option<u8>, u8>;

#[derive(Debug, Clone)]
enum Step {
    Write(Reading),
    Cancel,
}

fn arb_reading() -> impl Strategy<Value = Reading> {
    prop_oneof![
        4 => Just::<Reading>(Ok(None)),
        4 => (0u8..10).prop_map(|v| -> Reading { Ok(Some(v)) }),
        1 => (0u8..10).prop_map(|e| -> Reading { Err(e) }),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        8 => arb_reading().prop_map(Step::Write),
        1 => Just(Step::Cancel),
    ]
}

fn arb_script() -> impl Strategy<Value = (Reading, Vec<Step>)> {
    (arb_reading(), proptest::collection::vec(arb_step(), 0..=20))
}

fn reactor(eager: bool) -> ManualReactor {
    if eager {
        ManualReactor::eager()
    } else {
        ManualReactor::lazy()
    }
}

/// Settlement of `when_value` as a pure function of the script.
fn model(eager: bool, initial: Reading, steps: &[Step]) -> Option<Result<u8, Rejection<u8>>> {
    fn evaluate(reading: Reading) -> Option<Result<u8, Rejection<u8>>> {
        match reading {
            Ok(None) => None,
            Ok(Some(v)) => Some(Ok(v)),
            Err(e) => Some(Err(Rejection::Failed(e))),
        }
    }

    if eager {
        if let Some(outcome) = evaluate(initial) {
            return Some(outcome);
        }
    }
    for step in steps {
        let outcome = match *step {
            Step::Write(reading) => evaluate(reading),
            Step::Cancel => Some(Err(Rejection::Cancelled)),
        };
        if outcome.is_some() {
            return outcome;
        }
    }
    None
}

fn drive(
    reactor: &ManualReactor,
    source: &Source<Reading>,
    wait: &WhenValue<u8, u8>,
    steps: &[Step],
) {
    for step in steps {
        match *step {
            Step::Write(reading) => {
                source.set(reading);
                reactor.notify();
            }
            Step::Cancel => wait.cancel(),
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1–3. Registration, disposal and outcome
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn settles_like_the_model(eager in any::<bool>(), (initial, steps) in arb_script()) {
        let reactor = reactor(eager);
        let source = Source::new(initial);
        let read = source.clone();
        let mut wait = when_value(&reactor, move || read.get());

        drive(&reactor, &source, &wait, &steps);

        let expected = model(eager, initial, &steps);
        prop_assert_eq!(reactor.registrations(), 1);
        prop_assert_eq!(reactor.dispose_calls(), usize::from(expected.is_some()));
        prop_assert_eq!(reactor.live(), usize::from(expected.is_none()));

        let outcome = (&mut wait).now_or_never();
        prop_assert_eq!(outcome, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Drop while pending
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn drop_disposes_exactly_once(eager in any::<bool>(), (initial, steps) in arb_script()) {
        let reactor = reactor(eager);
        let source = Source::new(initial);
        let read = source.clone();
        let wait = when_value(&reactor, move || read.get());

        drive(&reactor, &source, &wait, &steps);
        drop(wait);

        prop_assert_eq!(reactor.registrations(), 1);
        prop_assert_eq!(reactor.dispose_calls(), 1);
        prop_assert_eq!(reactor.live(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Late firings
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn predicate_sees_nothing_after_settlement(
        eager in any::<bool>(),
        values in proptest::collection::vec(0u8..20, 1..=20),
    ) {
        let reactor = reactor(eager);
        let source = Source::new(values[0]);
        let read = source.clone();
        let checked = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log = std::rc::Rc::clone(&checked);
        let mut wait = when_value_matching(
            &reactor,
            move || Ok::<_, u8>(read.get()),
            move |v: &u8| {
                log.borrow_mut().push(*v);
                Ok(*v % 5 == 0)
            },
        );

        let rest = if eager { &values[1..] } else { &values[..] };
        for &v in rest {
            source.set(v);
            reactor.notify();
        }

        let first_match = values.iter().position(|v| v % 5 == 0);
        let checked = checked.borrow().clone();
        match first_match {
            Some(idx) => {
                prop_assert_eq!(&checked[..], &values[..=idx]);
                prop_assert_eq!(wait.state(), WaitState::Resolved);
                prop_assert_eq!((&mut wait).now_or_never(), Some(Ok(values[idx])));
            }
            None => {
                prop_assert_eq!(&checked[..], &values[..]);
                prop_assert!(wait.is_pending());
            }
        }
    }
}
