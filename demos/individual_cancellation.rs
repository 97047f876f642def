use cooperative_cancel::{ExecutionError, Executor, ShutdownMode, TaskError, TaskState, WorkerContext};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

// Works in small steps, checking for interruption between them.
async fn example_task(cx: WorkerContext, name: &'static str, steps: u32) -> Result<String, TaskError> {
  info!("Task ({}) starting, {} steps of 100ms.", name, steps);
  for step in 0..steps {
    cx.sleep(Duration::from_millis(100)).await?;
    cx.cancellation_point()?;
    info!("Task ({}) finished step {}.", name, step);
  }
  Ok(format!("Task ({}) finished normally.", name))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Individual Cancellation Example ---");

  let executor = Executor::new(Handle::current(), "cancellation_executor");

  let to_cancel = executor
    .submit(|cx: WorkerContext| example_task(cx, "to_be_cancelled", 50))
    .expect("Failed to submit task to be cancelled");
  let to_complete = executor
    .submit(|cx: WorkerContext| example_task(cx, "to_complete", 5))
    .expect("Failed to submit task to complete");

  tokio::time::sleep(Duration::from_millis(250)).await;
  info!("Requesting forced cancellation for unit {}.", to_cancel.id());
  let delivered = to_cancel.cancel(true);
  info!("Cancellation delivered: {}", delivered);

  match to_cancel.result(None).await {
    Err(ExecutionError::Cancelled) => info!("Unit {} correctly ended as Cancelled.", to_cancel.id()),
    other => warn!("Unit {} ended unexpectedly: {:?}", to_cancel.id(), other),
  }

  match to_complete.result(None).await {
    Ok(s) => info!("Unit {} completed: {}", to_complete.id(), s),
    Err(e) => warn!("Unit {} failed: {:?}", to_complete.id(), e),
  }

  // Cancelling a finished unit is always harmless.
  assert!(!to_complete.cancel(true));
  assert_eq!(to_complete.state(), TaskState::Completed);

  executor
    .shutdown(ShutdownMode::Graceful)
    .await
    .expect("Executor shutdown failed");
  info!("--- Individual Cancellation Example End ---");
}
