mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use supervisor_tree::{
    backoff, close, limit, restart, spawn, task_fn, when, BackoffPolicy, Context, ProcessError,
    ProcessId, ProcessOptions, TaskError,
};
use tokio::time::pause;

use common::{runs, CompletingTask, FailingTask, ObedientTask, PanickingTask};

#[tokio::test]
async fn test_success_closes_without_restart() {
    pause();
    let task = CompletingTask::default();
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new().on_success([close()]),
    );

    let err = process.wait().await;
    assert!(err.is_none());
    assert_eq!(process.restarts(), 0);
    assert_eq!(runs(&task.run_count), 1);

    let current = process.current().unwrap();
    assert_eq!(current.index(), 0);
    assert!(current.started_at().is_some());
    assert!(current.exited_at().is_some());
    assert!(current.is_stopped());
    assert!(process.previous().is_none());
}

#[tokio::test]
async fn test_limit_restarts_then_closes() {
    pause();
    let task = FailingTask::default();
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new().on_error([limit(3), restart()]),
    );

    let err = process.wait().await;
    assert!(matches!(err, Some(ProcessError::RestartLimit { limit: 3 })));
    assert_eq!(process.restarts(), 3);
    assert_eq!(runs(&task.run_count), 4); // Initial + 3 restarts
    assert_eq!(process.previous().unwrap().index(), 2);

    // The incarnation keeps the task's own error; the limit error is terminal only.
    let current = process.current().unwrap();
    assert_eq!(current.error().unwrap().to_string(), "task failed");
}

#[tokio::test]
async fn test_limit_never_exceeded() {
    pause();
    for max in 0..5 {
        let task = FailingTask::default();
        let process = spawn(
            &Context::background(),
            task.clone(),
            ProcessOptions::new().on_error([limit(max), restart()]),
        );

        let err = process.wait().await;
        assert!(
            matches!(err, Some(ProcessError::RestartLimit { limit: reached }) if reached == max),
            "limit {max}: unexpected terminal error {err:?}"
        );
        assert_eq!(process.restarts(), max);
        assert_eq!(runs(&task.run_count), max as usize + 1);
    }
}

#[tokio::test]
async fn test_restart_on_success() {
    pause();
    let task = CompletingTask::default();
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new().on_success([limit(2), restart()]),
    );

    let err = process.wait().await;
    assert!(matches!(err, Some(ProcessError::RestartLimit { limit: 2 })));
    assert_eq!(runs(&task.run_count), 3);
}

#[tokio::test]
async fn test_panic_is_captured() {
    pause();
    let process = spawn(
        &Context::background(),
        PanickingTask { payload: "boom" },
        ProcessOptions::new().on_panic([close()]),
    );

    let err = process.wait().await.unwrap();
    assert!(err.is_panic());
    assert!(err.to_string().contains("boom"));

    let (stopped, err) = process.join().await;
    assert!(stopped);
    assert!(err.unwrap().to_string().contains("boom"));
    assert!(process.current().unwrap().exited_at().is_some());
}

#[tokio::test]
async fn test_when_only_handles_matching_errors() {
    pause();
    let attempts = Arc::new(AtomicUsize::new(0));
    let task = {
        let attempts = attempts.clone();
        task_fn(move |_ctx: Context| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                let reason = if attempt < 2 { "retryable" } else { "fatal" };
                Err::<(), TaskError>(anyhow::anyhow!(reason))
            }
        })
    };

    let process = spawn(
        &Context::background(),
        task,
        ProcessOptions::new().on_error([
            when(
                |_ctx, err| err.is_some_and(|err| err.to_string() == "retryable"),
                [restart()],
            ),
            close(),
        ]),
    );

    let err = process.wait().await;
    assert_eq!(err.unwrap().to_string(), "fatal");
    assert_eq!(process.restarts(), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancellation_routed_to_on_cancel() {
    pause();
    let task = ObedientTask::default();
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new()
            .on_cancel([close()])
            .on_error([restart()]),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!process.is_done());
    process.cancel();

    let err = process.wait().await;
    assert!(err.unwrap().is_cancelled());
    assert_eq!(runs(&task.run_count), 1);

    let (stopped, err) = process.join().await;
    assert!(stopped);
    assert!(err.unwrap().is_cancelled());
}

#[tokio::test]
async fn test_join_waits_for_running_task() {
    pause();
    let process = spawn(
        &Context::background(),
        ObedientTask::default(),
        ProcessOptions::new(),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    let pending = tokio::time::timeout(Duration::from_secs(60), process.join()).await;
    assert!(pending.is_err());

    process.cancel();
    let (stopped, err) = process.join().await;
    assert!(stopped);
    assert!(err.unwrap().is_cancelled());
}

#[tokio::test]
async fn test_cancelling_parent_context_cancels_process() {
    pause();
    let ctx = Context::background();
    let process = spawn(&ctx, ObedientTask::default(), ProcessOptions::new());
    tokio::time::sleep(Duration::from_millis(10)).await;

    ctx.token().cancel();
    let err = process.wait().await;
    assert!(process.is_cancelled());
    assert!(err.unwrap().is_cancelled());
}

#[tokio::test]
async fn test_backoff_closes_once_elapsed_budget_is_spent() {
    pause();
    let task = FailingTask::default();
    let policy = BackoffPolicy::default()
        .with_initial_interval(Duration::from_secs(1))
        .with_randomization_factor(0.0)
        .with_multiplier(2.0)
        .with_max_elapsed_time(Duration::from_secs(10));
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new().on_error([backoff(policy)]),
    );
    let started = tokio::time::Instant::now();

    // Waits of 1s, 2s and 4s fit in the budget; the next 8s would not.
    let err = process.wait().await;
    assert!(matches!(
        err,
        Some(ProcessError::BackoffElapsed { max_elapsed }) if max_elapsed == Duration::from_secs(10)
    ));
    assert_eq!(runs(&task.run_count), 4);
    assert_eq!(process.restarts(), 3);
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test]
async fn test_backoff_interrupted_by_cancellation() {
    pause();
    let task = FailingTask::default();
    let policy = BackoffPolicy::default()
        .with_initial_interval(Duration::from_secs(3600))
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(Duration::ZERO);
    let process = spawn(
        &Context::background(),
        task.clone(),
        ProcessOptions::new().on_error([backoff(policy)]),
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(runs(&task.run_count), 1);
    process.cancel();

    let err = process.wait().await;
    assert!(matches!(err, Some(ProcessError::BackoffInterrupted)));
    assert_eq!(runs(&task.run_count), 1);
}

#[tokio::test]
async fn test_context_exposes_enclosing_process() {
    pause();
    let seen: Arc<Mutex<Vec<(Option<ProcessId>, bool)>>> = Arc::default();
    let task = {
        let seen = seen.clone();
        task_fn(move |ctx: Context| {
            let seen = seen.clone();
            async move {
                let uninterrupted = ctx.sleep(Duration::from_millis(5)).await;
                seen.lock()
                    .unwrap()
                    .push((ctx.process().map(|process| process.id()), uninterrupted));
                Ok::<(), TaskError>(())
            }
        })
    };

    let process = spawn(&Context::background(), task, ProcessOptions::new());
    process.wait().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[(Some(process.id()), true)]);
    assert!(process.supervisor().is_none());
}
