use super::*;
use crate::queue::DispatchMode;
use crate::test_utils::*;
use anyhow::Result;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

assert_impl_all!(AsyncHandle: Send, Sync, Clone);
assert_impl_all!(AsyncError: Send, Sync);

fn manual_queue() -> Result<TaskQueue> {
    Ok(TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual)?)
}

#[test]
fn test_work_then_completion() -> Result<()> {
    let queue = manual_queue()?;
    let recorder = Recorder::new();

    let r = recorder.clone();
    let handle = submit(&queue, || 6 * 7, move |res| r.record(res))?;

    assert_eq!(handle.status(), AsyncStatus::Pending);
    assert_eq!(queue.len(Port::Work), 1);
    assert!(queue.is_empty(Port::Completion));

    assert!(queue.dispatch(Port::Work, Duration::ZERO));
    assert_eq!(handle.status(), AsyncStatus::Running);
    assert_eq!(queue.len(Port::Completion), 1);
    assert_eq!(recorder.len(), 0);

    assert!(queue.dispatch(Port::Completion, Duration::ZERO));
    assert_eq!(handle.status(), AsyncStatus::Completed);
    assert!(handle.is_done());
    assert_eq!(recorder.events(), vec![Ok(42)]);
    Ok(())
}

#[test]
fn test_cancel_before_dispatch() -> Result<()> {
    let queue = manual_queue()?;
    let recorder = Recorder::new();
    let work_ran = Arc::new(AtomicBool::new(false));

    let r = recorder.clone();
    let ran = Arc::clone(&work_ran);
    let handle = submit(
        &queue,
        move || ran.store(true, Ordering::SeqCst),
        move |res| r.record(res),
    )?;

    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert_eq!(handle.status(), AsyncStatus::Canceled);

    // Canceled completion is delivered on the Completion port, not inline.
    assert_eq!(recorder.len(), 0);
    assert_eq!(queue.len(Port::Completion), 1);

    while queue.dispatch(Port::Work, Duration::ZERO) {}
    while queue.dispatch(Port::Completion, Duration::ZERO) {}

    assert!(!work_ran.load(Ordering::SeqCst));
    assert_eq!(recorder.events(), vec![Err(AsyncError::Canceled)]);
    assert_eq!(handle.status(), AsyncStatus::Canceled);
    Ok(())
}

#[test]
fn test_cancel_after_start_fails() -> Result<()> {
    let queue = manual_queue()?;
    let recorder = Recorder::new();

    let r = recorder.clone();
    let handle = submit(&queue, || "done", move |res| r.record(res))?;

    assert!(queue.dispatch(Port::Work, Duration::ZERO));
    assert!(!handle.cancel());
    assert_eq!(handle.status(), AsyncStatus::Running);

    assert!(queue.dispatch(Port::Completion, Duration::ZERO));
    assert_eq!(recorder.events(), vec![Ok("done")]);
    Ok(())
}

#[test]
fn test_work_panic_becomes_error() -> Result<()> {
    let queue = manual_queue()?;
    let recorder = Recorder::new();

    let r = recorder.clone();
    submit(
        &queue,
        || -> u32 { panic!("disk on fire") },
        move |res| r.record(res),
    )?;

    assert!(queue.dispatch(Port::Work, Duration::ZERO));
    assert!(queue.dispatch(Port::Completion, Duration::ZERO));

    assert_eq!(
        recorder.events(),
        vec![Err(AsyncError::Panicked("disk on fire".to_string()))]
    );
    Ok(())
}

#[test]
fn test_automatic_ports_complete_inline() -> Result<()> {
    let queue = TaskQueue::new(DispatchMode::Automatic, DispatchMode::Automatic)?;
    let recorder = Recorder::new();

    let r = recorder.clone();
    let handle = submit(&queue, || 1, move |res| r.record(res))?;

    assert_eq!(handle.status(), AsyncStatus::Completed);
    assert_eq!(recorder.events(), vec![Ok(1)]);
    Ok(())
}

#[test]
fn test_completion_can_submit_follow_up() -> Result<()> {
    let queue = manual_queue()?;
    let recorder = Recorder::new();

    let q = queue.duplicate();
    let r = recorder.clone();
    submit(
        &queue,
        || 1,
        move |first: Result<i32, AsyncError>| {
            r.record(first.clone());
            let r = r.clone();
            let next = first.map_or(0, |page| page + 1);
            submit(&q, move || next, move |res| r.record(res)).expect("queue is alive");
        },
    )?;

    while queue.dispatch(Port::Work, Duration::ZERO) {}
    while queue.dispatch(Port::Completion, Duration::ZERO) {}
    assert_eq!(recorder.events(), vec![Ok(1)]);

    // The follow-up was queued on the Work port by the completion.
    while queue.dispatch(Port::Work, Duration::ZERO) {}
    while queue.dispatch(Port::Completion, Duration::ZERO) {}
    assert_eq!(recorder.events(), vec![Ok(1), Ok(2)]);
    Ok(())
}

#[test]
fn test_terminated_queue_drops_pending_operations() -> Result<()> {
    let queue = manual_queue()?;
    let (flag, dropped) = DropFlag::new();

    let handle = submit(&queue, || (), move |_| drop(flag))?;
    queue.close();
    assert_eq!(handle.status(), AsyncStatus::Pending);

    // The handle is the last owner of the operation.
    drop(handle);
    assert!(dropped.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_submit_to_terminated_queue() -> Result<()> {
    let queue = manual_queue()?;
    queue.shared().terminate();

    let err = submit(&queue, || (), |_| {}).unwrap_err();
    assert!(err.is_terminated());
    Ok(())
}
