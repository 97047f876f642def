use cooperative_cancel::{
  run_with_timeout, CancellationPolicy, ExecutionError, Executor, TaskError, TimedExecution, WorkerContext,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cooperative_cancel=trace"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn executor(name: &str) -> Arc<Executor> {
  Executor::new(tokio::runtime::Handle::current(), name)
}

#[tokio::test]
async fn test_value_returned_before_deadline() {
  setup_tracing_for_test();
  let executor = executor("test_timed_value");

  let value = run_with_timeout(
    &executor,
    |cx: WorkerContext| async move {
      cx.sleep(Duration::from_millis(10)).await?;
      Ok::<_, TaskError>("fast".to_string())
    },
    Duration::from_millis(500),
  )
  .await
  .unwrap();
  assert_eq!(value, "fast");
}

#[tokio::test]
async fn test_error_returned_before_deadline() {
  setup_tracing_for_test();
  let executor = executor("test_timed_error");

  let err = run_with_timeout(
    &executor,
    |_cx: WorkerContext| async move { Err::<(), _>(TaskError::failed("bad input")) },
    Duration::from_millis(500),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, ExecutionError::Failed { .. }), "got {:?}", err);
  assert_eq!(err.failure_source().unwrap().to_string(), "bad input");
}

#[tokio::test]
async fn test_deadline_interrupts_the_dedicated_unit() {
  setup_tracing_for_test();
  let executor = executor("test_timed_interrupt");
  let interrupted = Arc::new(AtomicBool::new(false));

  let interrupted_in_task = interrupted.clone();
  let started = Instant::now();
  let err = TimedExecution::new(Duration::from_millis(30))
    .with_grace(Duration::from_millis(500))
    .run(&executor, move |cx: WorkerContext| async move {
      if let Err(e) = cx.sleep(Duration::from_secs(10)).await {
        interrupted_in_task.store(true, Ordering::SeqCst);
        return Err(TaskError::from(e));
      }
      Ok::<_, TaskError>(())
    })
    .await
    .unwrap_err();

  assert!(matches!(err, ExecutionError::Timeout(d) if d == Duration::from_millis(30)), "got {:?}", err);
  assert!(started.elapsed() < Duration::from_secs(2));
  assert!(interrupted.load(Ordering::SeqCst));
  assert_eq!(executor.active_unit_count(), 0);
}

#[tokio::test]
async fn test_deadline_does_not_wait_for_uncooperative_task() {
  setup_tracing_for_test();
  let executor = executor("test_timed_uncooperative");

  let started = Instant::now();
  let err = run_with_timeout(
    &executor,
    |_cx: WorkerContext| async move {
      // Ignores the signal entirely.
      sleep(Duration::from_millis(300)).await;
      Ok::<_, TaskError>(1u8)
    },
    Duration::from_millis(20),
  )
  .await
  .unwrap_err();

  assert!(err.is_timeout());
  assert!(started.elapsed() < Duration::from_millis(250));
  assert_eq!(executor.active_unit_count(), 1);
}

#[tokio::test]
async fn test_finished_run_leaves_no_stale_cancellation() {
  setup_tracing_for_test();
  let executor = executor("test_timed_no_stale");

  let first = run_with_timeout(
    &executor,
    |_cx: WorkerContext| async { Ok::<_, TaskError>(1u8) },
    Duration::from_millis(30),
  )
  .await
  .unwrap();
  assert_eq!(first, 1);

  // Outlives the first run's deadline; nothing must interrupt it.
  let handle = executor
    .submit(|cx: WorkerContext| async move {
      cx.sleep(Duration::from_millis(80)).await?;
      Ok::<_, TaskError>(cx.interruption_requested())
    })
    .unwrap();
  assert!(!handle.result(None).await.unwrap());
  assert!(!handle.is_cancel_requested());
}

#[tokio::test]
async fn test_timed_policy_override() {
  setup_tracing_for_test();
  let executor = executor("test_timed_policy");

  // Under a safe-point policy the wait is not cut short; the unit unwinds at its safe point.
  let err = TimedExecution::new(Duration::from_millis(20))
    .with_policy(CancellationPolicy::at_safe_points())
    .with_grace(Duration::from_millis(500))
    .run(&executor, |cx: WorkerContext| async move {
      cx.sleep(Duration::from_millis(60)).await?;
      cx.safe_point()?;
      Ok::<_, TaskError>(())
    })
    .await
    .unwrap_err();

  assert!(err.is_timeout());
  assert_eq!(executor.active_unit_count(), 0);
}
