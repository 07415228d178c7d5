//! Synchronous draining of the Completion port on the caller's thread.
//!
//! Every primitive dispatches one item at a time and re-polls the port in
//! between, so completions queued by completions are picked up by the same
//! call. A stop request is honored between two dispatches, never during one.

use crate::queue::{DispatchMode, Port, TaskQueue};
use crate::runtime::PumpState;
use std::time::{Duration, Instant};

fn is_drainable(queue: &TaskQueue) -> bool {
    queue.dispatch_mode(Port::Completion) == DispatchMode::Manual
}

fn dispatch_one(queue: &TaskQueue) -> bool {
    queue.dispatch(Port::Completion, Duration::ZERO)
}

/// Dispatches at most `max_items` completions. Returns whether the last
/// attempt found one.
pub(crate) fn drain_up_to(queue: &TaskQueue, state: &PumpState, max_items: u32) -> bool {
    if !is_drainable(queue) {
        return false;
    }

    let mut found = false;
    for _ in 0..max_items {
        if state.is_stop_requested() {
            break;
        }

        found = dispatch_one(queue);
        if !found {
            break;
        }
    }

    found
}

/// Dispatches completions until the port is empty or `budget` is spent.
/// Returns whether the last attempt found one.
///
/// The budget is checked after each dispatch: a slow callback overruns it,
/// and a zero budget still runs one ready completion.
pub(crate) fn drain_with_timeout(queue: &TaskQueue, state: &PumpState, budget: Duration) -> bool {
    if !is_drainable(queue) {
        return false;
    }

    let mut remaining = budget;
    let mut found = false;

    while !state.is_stop_requested() {
        let started = Instant::now();

        found = dispatch_one(queue);
        if !found {
            break;
        }

        match remaining.checked_sub(started.elapsed()) {
            Some(left) => remaining = left,
            None => break,
        }
    }

    found
}

pub(crate) fn drain_until_empty(queue: &TaskQueue, state: &PumpState) {
    if !is_drainable(queue) {
        return;
    }

    while !state.is_stop_requested() && dispatch_one(queue) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use anyhow::Result;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;

    fn manual_queue() -> Result<TaskQueue> {
        Ok(TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual)?)
    }

    fn fill(queue: &TaskQueue, recorder: &Recorder<usize>, n: usize) -> Result<()> {
        for i in 0..n {
            let r = recorder.clone();
            queue.submit_callback(Port::Completion, move || r.record(i))?;
        }
        Ok(())
    }

    #[rstest]
    #[case::zero(0, 0, false)]
    #[case::fewer_than_queued(3, 3, true)]
    #[case::exactly_queued(5, 5, true)]
    #[case::more_than_queued(8, 5, false)]
    fn test_drain_up_to(
        #[case] max_items: u32,
        #[case] expected_runs: usize,
        #[case] expected_found: bool,
    ) -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();
        fill(&queue, &recorder, 5)?;

        assert_eq!(drain_up_to(&queue, &state, max_items), expected_found);
        assert_eq!(recorder.events(), (0..expected_runs).collect::<Vec<_>>());
        assert_eq!(queue.len(Port::Completion), 5 - expected_runs);
        Ok(())
    }

    #[test]
    fn test_drain_picks_up_reentrant_completions() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();

        let q = queue.duplicate();
        let r = recorder.clone();
        queue.submit_callback(Port::Completion, move || {
            r.record("outer");
            let r = r.clone();
            q.submit_callback(Port::Completion, move || r.record("inner"))
                .expect("queue is alive");
        })?;

        drain_until_empty(&queue, &state);
        assert_eq!(recorder.events(), vec!["outer", "inner"]);
        Ok(())
    }

    #[test]
    fn test_stop_request_halts_every_drain() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();
        fill(&queue, &recorder, 3)?;

        state.request_stop();

        assert!(!drain_up_to(&queue, &state, 3));
        assert!(!drain_with_timeout(&queue, &state, Duration::from_secs(1)));
        drain_until_empty(&queue, &state);

        assert_eq!(recorder.len(), 0);
        assert_eq!(queue.len(Port::Completion), 3);
        Ok(())
    }

    #[test]
    fn test_stop_requested_by_completion() -> Result<()> {
        let queue = manual_queue()?;
        let state = Arc::new(PumpState::new());
        let recorder = Recorder::new();

        let s = Arc::clone(&state);
        let r = recorder.clone();
        queue.submit_callback(Port::Completion, move || {
            r.record(0);
            s.request_stop();
        })?;
        fill(&queue, &recorder, 2)?;

        drain_until_empty(&queue, &state);

        // The running completion finishes, nothing after it is dispatched.
        assert_eq!(recorder.events(), vec![0]);
        assert_eq!(queue.len(Port::Completion), 2);
        Ok(())
    }

    #[test]
    fn test_timeout_overrun_by_slow_callback() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();

        for i in 0..3 {
            let r = recorder.clone();
            queue.submit_callback(Port::Completion, move || {
                thread::sleep(Duration::from_millis(20));
                r.record(i);
            })?;
        }

        assert!(drain_with_timeout(&queue, &state, Duration::from_millis(5)));
        assert_eq!(recorder.events(), vec![0]);
        Ok(())
    }

    #[test]
    fn test_zero_budget_still_dispatches() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();
        fill(&queue, &recorder, 3)?;

        drain_with_timeout(&queue, &state, Duration::ZERO);
        assert!(recorder.len() >= 1);
        Ok(())
    }

    #[test]
    fn test_generous_budget_drains_everything() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();
        let recorder = Recorder::new();
        fill(&queue, &recorder, 5)?;

        assert!(!drain_with_timeout(&queue, &state, TEST_TIMEOUT));
        assert_eq!(recorder.events(), (0..5).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_empty_port() -> Result<()> {
        let queue = manual_queue()?;
        let state = PumpState::new();

        assert!(!drain_up_to(&queue, &state, 10));
        assert!(!drain_with_timeout(&queue, &state, Duration::from_millis(1)));
        drain_until_empty(&queue, &state);
        Ok(())
    }
}
