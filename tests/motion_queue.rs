// Kiki Companion — Action Queue & Executor

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiki_companion::motion::{ActionEntry, ActionKind, ActionQueue, Playback};
use kiki_companion::platform::sim::{Journal, SimBoard, SimPlatform, SimServos};
use kiki_companion::tasks::motion::{ActionCompletion, MotionExecutor, MotionStatus};

#[test]
fn overflow_keeps_the_newest_ten() {
    let queue = ActionQueue::new(10).with_send_timeout(Duration::from_millis(1));
    for steps in 0..15 {
        queue.enqueue(ActionEntry::new(ActionKind::Walk, steps, 1000)).unwrap();
    }
    assert_eq!(queue.len(), 10);
    let kept: Vec<i32> = queue.receiver().try_iter().map(|e| e.steps).collect();
    assert_eq!(kept, (5..15).collect::<Vec<_>>());
}

#[test]
fn executor_reports_completed_actions_in_order() {
    let queue = ActionQueue::new(10);
    let reports = Arc::new(Mutex::new(Vec::<ActionCompletion>::new()));
    let sink = reports.clone();
    let mut exec = MotionExecutor::new(
        &queue,
        Box::new(SimServos::new()),
        Arc::new(SimBoard::new(Journal::new())),
        Arc::new(SimPlatform::virtual_time()),
        MotionStatus::new(60),
    )
    .with_reporter(Box::new(move |done| sink.lock().unwrap().push(*done)))
    .with_poll_interval(Duration::from_millis(1));

    queue.queue_kind(ActionKind::SitDown, 1, 200).unwrap();
    queue.queue_kind(ActionKind::WagTail, 2, 100).unwrap();
    assert!(exec.poll_once());
    assert!(exec.poll_once());

    let reports = reports.lock().unwrap();
    let kinds: Vec<_> = reports.iter().map(|r| r.action).collect();
    assert_eq!(kinds, vec![ActionKind::SitDown, ActionKind::WagTail]);
    assert!(reports.iter().all(|r| r.outcome == Playback::Completed));
    assert_eq!(reports[0].to_notification()["method"], "notifications/action_completed");
    assert!(!exec.status().is_action_in_progress());
}
