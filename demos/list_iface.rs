use pcap_session::{Linktype, lib_version, list_interfaces};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .init();

  println!("{}", lib_version());
  for iface in list_interfaces()? {
    let state = if iface.is_up() { "up" } else { "down" };
    println!("{} ({state}) {}", iface.name, iface.description);
    for addr in &iface.addresses {
      print!("    {}/{}", addr.ip(), addr.prefix_len());
      if let Some(brd) = addr.broadcast() {
        print!(" brd {brd}");
      }
      if let Some(peer) = addr.destination() {
        print!(" peer {peer}");
      }
      println!();
    }
  }
  println!(
    "default linktype: {}",
    Linktype::ETHERNET.description().unwrap_or_default()
  );
  Ok(())
}
