use std::time::Duration;

use pcap_session::{CaptureConfig, PcapHandle, capture_async};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .init();

  let args: Vec<String> = std::env::args().collect();
  let dev = args.get(1).map(String::as_str).unwrap_or("eth0");
  let filter = args.get(2).map(String::as_str).unwrap_or("");

  let config = CaptureConfig::default().snaplen(4096).timeout_ms(200);
  let mut handle = PcapHandle::open_with(dev, &config)?;
  handle.set_filter(filter)?;
  println!("capturing on {dev} (linktype {:?})", handle.datalink());

  let task = capture_async(handle, |packet| {
    println!(
      "time={}.{:06} caplen={} len={}",
      packet.ts_sec(),
      packet.ts_usec(),
      packet.caplen(),
      packet.wire_len()
    );
  });
  tokio::time::sleep(Duration::from_secs(10)).await;
  task.stop();

  let mut outcome = task.join().await?;
  let stats = outcome.handle.stats()?;
  println!(
    "{} packets, received={} dropped={} if_dropped={}",
    outcome.packets, stats.received, stats.dropped, stats.if_dropped
  );
  outcome.handle.close();
  Ok(())
}
