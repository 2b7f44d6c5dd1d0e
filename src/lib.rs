//! Safe capture sessions over libpcap: open, capture, filter, inject.
//!
//! Modules are organized by responsibility:
//! - `pcap`: the capture session (`PcapHandle`): open live/offline, fetch, datalink, stats.
//! - `filter`: compile-and-install of filter expressions on a session.
//! - `inject`: raw frame transmission through a session.
//! - `device`: device and address enumeration.
//! - `capture`: capture loop on tokio's blocking pool with cooperative stop.
//! - `sockaddr`: `sockaddr` to `IpAddr` conversion.
//! - `packet`, `linktype`, `config`, `error`: value types.
//! - `ffi`: raw ABI of libpcap and the `Backend` seam used by everything above.
//!
//! ```no_run
//! use pcap_session::{Fetch, PcapHandle};
//!
//! # fn main() -> Result<(), pcap_session::PcapError> {
//! let mut handle = PcapHandle::open("eth0", 65535, true, 1000)?;
//! handle.set_filter("udp port 53")?;
//! if let Fetch::Packet(packet) = handle.next_packet()? {
//!   println!("{} bytes", packet.caplen());
//! }
//! handle.close();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod device;
mod errbuf;
pub mod error;
pub mod ffi;
mod filter;
mod inject;
pub mod linktype;
pub mod packet;
pub mod pcap;
pub mod sockaddr;

#[cfg(test)]
mod testing;

pub use capture::{CaptureOutcome, CaptureTask, StopReason, capture_async, capture_channel};
pub use config::CaptureConfig;
pub use device::{IfAddress, Interface, list_interfaces_with};
pub use error::PcapError;
pub use ffi::{Backend, Libpcap};
pub use linktype::Linktype;
pub use packet::{Packet, Stats};
pub use pcap::{Fetch, Packets, PcapHandle, lib_version_with};
pub use sockaddr::AddressError;

#[cfg(feature = "libpcap")]
pub use device::list_interfaces;
#[cfg(feature = "libpcap")]
pub use pcap::lib_version;
