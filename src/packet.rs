//! Owned packet and statistics records produced by a capture session.

use std::{
  slice,
  time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::ffi::{PcapPkthdr, PcapStat};

/// A captured packet, deep-copied out of libpcap's reusable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
  ts_sec: i64,
  ts_usec: i64,
  caplen: u32,
  len: u32,
  data: Vec<u8>,
}

impl Packet {
  /// Copy `header.caplen` bytes starting at `data`.
  ///
  /// # Safety
  ///
  /// `data` must be valid for reads of `header.caplen` bytes unless `caplen`
  /// is zero.
  pub(crate) unsafe fn copy_from_raw(header: &PcapPkthdr, data: *const u8) -> Self {
    let data = if header.caplen == 0 || data.is_null() {
      Vec::new()
    } else {
      unsafe { slice::from_raw_parts(data, header.caplen as usize) }.to_vec()
    };
    Self {
      ts_sec: i64::from(header.ts.tv_sec),
      ts_usec: i64::from(header.ts.tv_usec),
      caplen: data.len() as u32,
      len: header.len,
      data,
    }
  }

  /// Seconds part of the capture timestamp.
  pub fn ts_sec(&self) -> i64 {
    self.ts_sec
  }

  /// Microseconds part of the capture timestamp.
  pub fn ts_usec(&self) -> i64 {
    self.ts_usec
  }

  /// Capture time, or `None` if it predates the Unix epoch.
  pub fn timestamp(&self) -> Option<SystemTime> {
    let secs = u64::try_from(self.ts_sec).ok()?;
    let usecs = u64::try_from(self.ts_usec).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(secs) + Duration::from_micros(usecs))
  }

  /// Number of bytes captured; always equal to `data().len()`.
  pub fn caplen(&self) -> u32 {
    self.caplen
  }

  /// Length of the packet on the wire.
  pub fn wire_len(&self) -> u32 {
    self.len
  }

  /// True if the packet was cut short by the snapshot length.
  pub fn is_truncated(&self) -> bool {
    self.caplen < self.len
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn into_data(self) -> Vec<u8> {
    self.data
  }
}

/// Counter snapshot returned by `pcap_stats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  /// Packets received.
  pub received: u32,
  /// Packets dropped because the capture buffer was full.
  pub dropped: u32,
  /// Packets dropped by the interface or its driver.
  pub if_dropped: u32,
}

impl Stats {
  /// Dropped packets as a percentage of received packets.
  pub fn drop_rate(&self) -> f64 {
    if self.received == 0 {
      return 0.0;
    }
    f64::from(self.dropped) / f64::from(self.received) * 100.0
  }
}

impl From<PcapStat> for Stats {
  fn from(raw: PcapStat) -> Self {
    Self {
      received: raw.ps_recv,
      dropped: raw.ps_drop,
      if_dropped: raw.ps_ifdrop,
    }
  }
}
