use cooperative_cancel::{ExecutionHandle, Executor, ShutdownMode, TaskError, WorkerContext};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn long_running_interruptible_task(cx: WorkerContext, id: usize, duration_s: u64) -> Result<String, TaskError> {
  info!("Task {} starting (potentially long: {}s).", id, duration_s);
  cx.sleep(Duration::from_secs(duration_s)).await?;
  Ok(format!("Task {} completed NORMALLY after {}s", id, duration_s))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Forceful Shutdown Example ---");

  let executor = Executor::new(Handle::current(), "forceful_shutdown_executor");
  let mut handles: Vec<ExecutionHandle<String>> = Vec::new();

  for i in 0..5 {
    match executor.submit(move |cx: WorkerContext| long_running_interruptible_task(cx, i, 5)) {
      Ok(handle) => handles.push(handle),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  tokio::time::sleep(Duration::from_millis(200)).await;
  info!("Live units: {}. Initiating FORCEFUL shutdown.", executor.active_unit_count());
  executor
    .shutdown(ShutdownMode::ForcefulCancel)
    .await
    .expect("Executor shutdown failed");

  for handle in handles {
    info!("Unit {} ended as {:?}: {:?}", handle.id(), handle.state(), handle.outcome());
  }
  info!("--- Forceful Shutdown Example End ---");
}
