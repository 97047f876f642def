use cooperative_cancel::{ExecutionHandle, Executor, ShutdownMode, TaskError, WorkerContext};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn my_task_fn(cx: WorkerContext, id: usize, delay_ms: u64) -> Result<String, TaskError> {
  info!("Task {} starting in unit {}, will sleep for {}ms", id, cx.id(), delay_ms);
  cx.sleep(Duration::from_millis(delay_ms)).await?;
  let result = format!("Task {} finished successfully after {}ms", id, delay_ms);
  info!("{}", result);
  Ok(result)
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let executor = Executor::new(Handle::current(), "basic_executor");
  let mut handles: Vec<ExecutionHandle<String>> = Vec::new();

  for i in 0..5 {
    let sleep_duration: u64 = 500 + (i as u64 % 3 * 250);
    match executor.submit(move |cx: WorkerContext| my_task_fn(cx, i, sleep_duration)) {
      Ok(handle) => {
        info!("Submitted task {} with handle id {}", i, handle.id());
        handles.push(handle);
      }
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  info!("All tasks submitted. Awaiting results...");

  for handle in handles {
    match handle.result(None).await {
      Ok(result) => info!("Result for unit {}: {}", handle.id(), result),
      Err(e) => info!("Error for unit {}: {:?}", handle.id(), e),
    }
  }

  executor
    .shutdown(ShutdownMode::Graceful)
    .await
    .expect("Executor shutdown failed");
  info!("--- Basic Usage Example End ---");
}
