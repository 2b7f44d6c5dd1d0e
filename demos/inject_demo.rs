use std::error::Error;

use pcap_session::PcapHandle;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

const DEFAULT_DEV: &str = "eth0";
const DEFAULT_SRC: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
const BROADCAST: [u8; 6] = [0xff; 6];
// IEEE local experimental ethertype.
const ETHERTYPE: u16 = 0x88b5;

fn ethernet_frame(src: [u8; 6], dst: [u8; 6], payload: &[u8]) -> Vec<u8> {
  let mut frame = Vec::with_capacity(14 + payload.len().max(46));
  frame.extend_from_slice(&dst);
  frame.extend_from_slice(&src);
  frame.extend_from_slice(&ETHERTYPE.to_be_bytes());
  frame.extend_from_slice(payload);
  if frame.len() < 60 {
    frame.resize(60, 0);
  }
  frame
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
    .init();

  let args: Vec<String> = std::env::args().collect();
  let dev = args.get(1).map(String::as_str).unwrap_or(DEFAULT_DEV);

  let mut handle = PcapHandle::open(dev, 4096, false, 1000)?;
  for cnt in 1..=10u32 {
    let payload = format!("Count: {cnt}");
    let frame = ethernet_frame(DEFAULT_SRC, BROADCAST, payload.as_bytes());
    let sent = handle.inject(&frame)?;
    println!("Injected {sent} bytes via {dev}");
    sleep(Duration::from_millis(100)).await;
  }
  handle.close();
  Ok(())
}
