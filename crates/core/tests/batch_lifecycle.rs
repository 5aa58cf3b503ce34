//! Batch lifecycle integration tests.
//!
//! These tests drive whole batches through the scheduler with a scripted
//! launcher: pending -> running -> done/error, with ordering, concurrency
//! caps and group roll-ups observed through the event stream.

use std::time::Duration;

use tokio::sync::mpsc;

use mediamux_core::{
    testing::{MockBehavior, MockLauncher},
    BatchEvent, BatchRequest, ConcurrencyMode, GroupId, GroupStatus, JobCommand, JobId, JobSpec,
    JobState, LaunchError, Scheduler, SchedulerError,
};

fn noop_command() -> JobCommand {
    JobCommand::new("true", vec![])
}

fn harness() -> (MockLauncher, Scheduler<MockLauncher>) {
    let launcher = MockLauncher::new();
    let scheduler = Scheduler::new(launcher.clone());
    (launcher, scheduler)
}

/// Collects events until the batch reports completion.
async fn drain_events(mut rx: mpsc::Receiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, BatchEvent::BatchComplete { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

fn terminal_ids(events: &[BatchEvent]) -> Vec<JobId> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::JobTerminal { job_id, .. } => Some(job_id.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_sequential_batch_runs_in_submission_order() {
    let (launcher, scheduler) = harness();
    launcher
        .set_default_behavior(MockBehavior::Succeed {
            progress_steps: vec![50.0],
            step_delay: Duration::from_millis(5),
        })
        .await;

    let jobs: Vec<JobSpec> = (0..5)
        .map(|i| JobSpec::new(format!("job-{i}"), noop_command()))
        .collect();
    let ids: Vec<JobId> = jobs.iter().map(|j| j.id.clone()).collect();

    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(jobs), tx)
        .await
        .expect("submit should succeed");
    let drain = tokio::spawn(drain_events(rx));

    let summary = handle.wait().await.expect("batch should complete");
    assert_eq!(summary.total, 5);
    assert_eq!(summary.done, 5);
    assert_eq!(summary.errored, 0);

    // Never more than one job at a time, started in submission order.
    assert_eq!(launcher.max_concurrent(), 1);
    assert_eq!(launcher.launch_order().await, ids);

    // Terminal events arrive in the same order.
    let events = drain.await.unwrap();
    assert_eq!(terminal_ids(&events), ids);
}

#[tokio::test]
async fn test_parallel_batch_respects_concurrency_cap() {
    let (launcher, scheduler) = harness();
    launcher
        .set_default_behavior(MockBehavior::Succeed {
            progress_steps: vec![50.0],
            step_delay: Duration::from_millis(30),
        })
        .await;

    let jobs: Vec<JobSpec> = (0..5)
        .map(|i| JobSpec::new(format!("job-{i}"), noop_command()))
        .collect();

    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(
            BatchRequest::new(jobs, ConcurrencyMode::Parallel { max_parallel: 2 }),
            tx,
        )
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.done, 5);
    assert_eq!(launcher.max_concurrent(), 2);

    let events = drain.await.unwrap();
    assert_eq!(terminal_ids(&events).len(), 5);
}

#[tokio::test]
async fn test_failed_group_member_does_not_stop_siblings() {
    let (launcher, scheduler) = harness();

    let group = GroupId::from("episode-1");
    let jobs: Vec<JobSpec> = ["video", "audio-eng", "audio-jpn"]
        .iter()
        .map(|label| JobSpec::new(*label, noop_command()).with_group(group.clone()))
        .collect();
    let failing = jobs[1].id.clone();
    launcher
        .set_behavior(&failing, MockBehavior::fail("muxing failed"))
        .await;

    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(jobs), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.done, 2);
    assert_eq!(summary.errored, 1);
    assert_eq!(
        summary.failures.get(&failing).map(String::as_str),
        Some("muxing failed")
    );

    // All three members ran to a terminal state; the group is errored and
    // only the two successful members count as completed.
    let report = &summary.groups[&group];
    assert_eq!(report.status, GroupStatus::Error);
    assert_eq!(report.completed, 2);
    assert_eq!(report.total, 3);

    let events = drain.await.unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        BatchEvent::GroupStatusChanged {
            status: GroupStatus::Error,
            ..
        }
    )));
}

#[tokio::test]
async fn test_each_job_gets_exactly_one_terminal_event() {
    let (launcher, scheduler) = harness();

    let jobs: Vec<JobSpec> = (0..3)
        .map(|i| JobSpec::new(format!("job-{i}"), noop_command()))
        .collect();
    launcher
        .set_behavior(&jobs[1].id, MockBehavior::fail("oops"))
        .await;
    let ids: Vec<JobId> = jobs.iter().map(|j| j.id.clone()).collect();

    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(jobs), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));
    handle.wait().await.unwrap();

    let events = drain.await.unwrap();
    for id in &ids {
        let count = terminal_ids(&events).iter().filter(|t| *t == id).count();
        assert_eq!(count, 1, "job {id} should have exactly one terminal event");
    }
}

#[tokio::test]
async fn test_progress_events_precede_the_terminal_event() {
    let (launcher, scheduler) = harness();

    let job = JobSpec::new("remux", noop_command());
    let id = job.id.clone();
    launcher
        .set_behavior(
            &id,
            MockBehavior::Succeed {
                progress_steps: vec![25.0, 50.0, 75.0],
                step_delay: Duration::from_millis(2),
            },
        )
        .await;

    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(vec![job]), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));
    handle.wait().await.unwrap();

    let events = drain.await.unwrap();
    let terminal_pos = events
        .iter()
        .position(|e| matches!(e, BatchEvent::JobTerminal { .. }))
        .expect("terminal event present");
    let progress_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, BatchEvent::JobProgress { .. }))
        .map(|(i, _)| i)
        .collect();

    assert!(!progress_positions.is_empty());
    assert!(progress_positions.iter().all(|p| *p < terminal_pos));
    match &events[terminal_pos] {
        BatchEvent::JobTerminal { state, .. } => assert_eq!(*state, JobState::Done),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_jobs_can_be_added_while_the_batch_runs() {
    let (launcher, scheduler) = harness();
    launcher
        .set_default_behavior(MockBehavior::Succeed {
            progress_steps: vec![50.0],
            step_delay: Duration::from_millis(20),
        })
        .await;

    let first: Vec<JobSpec> = (0..2)
        .map(|i| JobSpec::new(format!("first-{i}"), noop_command()))
        .collect();
    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(first), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));

    let more: Vec<JobSpec> = (0..2)
        .map(|i| JobSpec::new(format!("late-{i}"), noop_command()))
        .collect();
    handle.add_jobs(more).expect("batch still accepts jobs");

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.done, 4);
    drain.await.unwrap();
}

#[tokio::test]
async fn test_mode_upgrade_takes_effect_for_queued_jobs() {
    let (launcher, scheduler) = harness();
    launcher
        .set_default_behavior(MockBehavior::Succeed {
            progress_steps: vec![50.0],
            step_delay: Duration::from_millis(30),
        })
        .await;

    let jobs: Vec<JobSpec> = (0..4)
        .map(|i| JobSpec::new(format!("job-{i}"), noop_command()))
        .collect();
    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(jobs), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));

    handle
        .set_mode(ConcurrencyMode::Parallel { max_parallel: 2 })
        .unwrap();

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.done, 4);
    assert_eq!(launcher.max_concurrent(), 2);
    drain.await.unwrap();
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let (_launcher, scheduler) = harness();
    let (tx, _rx) = mpsc::channel(16);

    let result = scheduler.submit(BatchRequest::sequential(vec![]), tx).await;
    assert!(matches!(result, Err(SchedulerError::EmptyBatch)));
}

#[tokio::test]
async fn test_duplicate_job_id_is_rejected() {
    let (_launcher, scheduler) = harness();

    let a = JobSpec::new("a", noop_command());
    let mut b = JobSpec::new("b", noop_command());
    b.id = a.id.clone();

    let (tx, _rx) = mpsc::channel(16);
    let result = scheduler
        .submit(BatchRequest::sequential(vec![a, b]), tx)
        .await;
    assert!(matches!(result, Err(SchedulerError::DuplicateJob(_))));
}

#[tokio::test]
async fn test_missing_tool_fails_before_any_job_starts() {
    let (launcher, scheduler) = harness();
    launcher
        .set_validate_error(LaunchError::ToolMissing {
            path: "ffmpeg".into(),
        })
        .await;

    let jobs = vec![JobSpec::new("a", noop_command())];
    let (tx, _rx) = mpsc::channel(16);
    let result = scheduler.submit(BatchRequest::sequential(jobs), tx).await;

    assert!(matches!(
        result,
        Err(SchedulerError::Tool(LaunchError::ToolMissing { .. }))
    ));
    assert_eq!(launcher.launch_count().await, 0);
}

#[tokio::test]
async fn test_overall_progress_reaches_completion() {
    let (_launcher, scheduler) = harness();

    let jobs: Vec<JobSpec> = (0..3)
        .map(|i| JobSpec::new(format!("job-{i}"), noop_command()))
        .collect();
    let (tx, rx) = mpsc::channel(256);
    let handle = scheduler
        .submit(BatchRequest::sequential(jobs), tx)
        .await
        .unwrap();
    let drain = tokio::spawn(drain_events(rx));
    handle.wait().await.unwrap();

    let events = drain.await.unwrap();
    let last_overall = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::OverallProgress { percent } => Some(*percent),
            _ => None,
        })
        .last()
        .expect("overall progress reported");
    assert!((last_overall - 100.0).abs() < 0.01);
}
