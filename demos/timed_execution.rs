use cooperative_cancel::{run_with_timeout, Executor, ShutdownMode, TaskError, TimedExecution, WorkerContext};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn crunch(cx: WorkerContext, work_ms: u64) -> Result<u64, TaskError> {
  let mut total = 0u64;
  for i in 0..work_ms {
    cx.sleep(Duration::from_millis(1)).await?;
    total += i;
  }
  Ok(total)
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Timed Execution Example ---");

  let executor = Executor::new(Handle::current(), "timed_executor");

  let quick = run_with_timeout(&executor, |cx: WorkerContext| crunch(cx, 20), Duration::from_secs(1)).await;
  info!("Quick run: {:?}", quick);

  let slow = TimedExecution::new(Duration::from_millis(100))
    .with_grace(Duration::from_millis(200))
    .run(&executor, |cx: WorkerContext| crunch(cx, 5_000))
    .await;
  info!("Slow run: {:?}", slow);
  info!("Live units after timeout: {}", executor.active_unit_count());

  executor
    .shutdown(ShutdownMode::Graceful)
    .await
    .expect("Executor shutdown failed");
  info!("--- Timed Execution Example End ---");
}
