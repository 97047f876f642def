use cooperative_cancel::{Executor, ShutdownMode, TaskError, WorkerContext};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Resource Release Example ---");

  // A peer that accepts and then never writes.
  let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
  let addr = listener.local_addr().expect("no local addr");
  let _peer = tokio::spawn(async move {
    let (socket, _) = listener.accept().await.expect("accept failed");
    tokio::time::sleep(Duration::from_secs(60)).await;
    drop(socket);
  });

  let executor = Executor::new(Handle::current(), "resource_executor");
  let handle = executor
    .submit(move |cx: WorkerContext| async move {
      let stream = TcpStream::connect(addr).await?;
      let mut conn = cx.wrap(stream);
      let mut buf = [0u8; 128];
      info!("Reading from a peer that never answers...");
      let n = conn.read(&mut buf).await?;
      Ok::<_, TaskError>(n)
    })
    .expect("Failed to submit reader");

  tokio::time::sleep(Duration::from_millis(200)).await;
  info!("Cancelling reader; its socket is force-released.");
  handle.cancel(true);
  info!("Reader outcome: {:?}", handle.result(Some(Duration::from_secs(1))).await);

  executor
    .shutdown(ShutdownMode::Graceful)
    .await
    .expect("Executor shutdown failed");
  info!("--- Resource Release Example End ---");
}
