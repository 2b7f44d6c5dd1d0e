//! Safe capture session over a native libpcap handle.

use std::{
  fmt,
  os::raw::c_int,
  path::Path,
  ptr::{self, NonNull},
};

use tracing::{debug, info, warn};

use crate::{
  config::CaptureConfig,
  errbuf::{ErrBuf, c_path, c_string, handle_error, owned_c_str},
  error::PcapError,
  ffi::{Backend, Libpcap, PCAP_ERROR_BREAK, PcapPkthdr, PcapRaw, PcapStat},
  linktype::Linktype,
  packet::{Packet, Stats},
};

/// Outcome of a single [`PcapHandle::next_packet`] call.
#[derive(Debug)]
pub enum Fetch {
  /// One packet, owned by the caller.
  Packet(Packet),
  /// The read timeout expired before a packet arrived (live capture only).
  TimedOut,
  /// The savefile has no more records.
  EndOfStream,
}

/// Owns exactly one libpcap handle and closes it exactly once.
///
/// Every operation that touches the handle's buffers takes `&mut self`, so a
/// session can never have two calls in flight. The type is `Send` but not
/// `Sync`: move it to another thread, never share it.
pub struct PcapHandle<B: Backend = Libpcap> {
  raw: NonNull<PcapRaw>,
  backend: B,
  source: String,
}

// libpcap handles may migrate between threads as long as they are not used
// concurrently, which `&mut self` on every fetch already rules out.
unsafe impl<B: Backend + Send> Send for PcapHandle<B> {}

impl<B: Backend> PcapHandle<B> {
  /// Open a live device through `backend`.
  pub fn open_live_with(backend: B, dev: &str, config: &CaptureConfig) -> Result<Self, PcapError> {
    let dev_c = c_string(dev)?;
    let mut errbuf = ErrBuf::new();
    let raw = unsafe {
      backend.open_live(
        dev_c.as_ptr(),
        config.snaplen,
        c_int::from(config.promiscuous),
        config.timeout_ms,
        errbuf.as_mut_ptr(),
      )
    };
    let raw = NonNull::new(raw).ok_or_else(|| PcapError::Open {
      message: errbuf.message(),
    })?;
    if !errbuf.is_empty() {
      warn!(device = dev, warning = %errbuf.message(), "libpcap warning on open");
    }
    info!(
      device = dev,
      snaplen = config.snaplen,
      promiscuous = config.promiscuous,
      timeout_ms = config.timeout_ms,
      "opened live capture"
    );
    Ok(Self {
      raw,
      backend,
      source: dev.to_owned(),
    })
  }

  /// Open a savefile through `backend`.
  pub fn open_offline_with(backend: B, path: impl AsRef<Path>) -> Result<Self, PcapError> {
    let path = path.as_ref();
    let path_c = c_path(path)?;
    let mut errbuf = ErrBuf::new();
    let raw = unsafe { backend.open_offline(path_c.as_ptr(), errbuf.as_mut_ptr()) };
    let raw = NonNull::new(raw).ok_or_else(|| PcapError::Open {
      message: errbuf.message(),
    })?;
    info!(path = %path.display(), "opened savefile");
    Ok(Self {
      raw,
      backend,
      source: path.display().to_string(),
    })
  }

  /// Device name or savefile path this session was opened on.
  pub fn source(&self) -> &str {
    &self.source
  }

  /// Wait for the next packet and copy it out of libpcap's buffer.
  ///
  /// Live sessions return [`Fetch::TimedOut`] when the configured timeout
  /// expires with nothing to deliver; savefiles return
  /// [`Fetch::EndOfStream`] after their last record.
  pub fn next_packet(&mut self) -> Result<Fetch, PcapError> {
    let mut header: *mut PcapPkthdr = ptr::null_mut();
    let mut data: *const u8 = ptr::null();
    let rc = unsafe { self.backend.next_ex(self.raw.as_ptr(), &mut header, &mut data) };
    match rc {
      1 => {
        // The header and buffer are only valid until the next call on this
        // handle, so the packet is copied before anything else runs.
        let header = unsafe { header.as_ref() }.ok_or(PcapError::NullPacket)?;
        if data.is_null() && header.caplen > 0 {
          return Err(PcapError::NullPacket);
        }
        Ok(Fetch::Packet(unsafe { Packet::copy_from_raw(header, data) }))
      }
      0 => Ok(Fetch::TimedOut),
      PCAP_ERROR_BREAK => {
        debug!(source = %self.source, "end of capture");
        Ok(Fetch::EndOfStream)
      }
      _ => Err(PcapError::Fetch {
        message: self.last_error(),
      }),
    }
  }

  /// Iterate over packets until end of stream, skipping timeouts.
  pub fn packets(&mut self) -> Packets<'_, B> {
    Packets { handle: self }
  }

  /// Link-layer header type libpcap currently delivers.
  pub fn datalink(&self) -> Linktype {
    Linktype(unsafe { self.backend.datalink(self.raw.as_ptr()) })
  }

  /// Switch the link-layer header type, if the device supports it.
  pub fn set_datalink(&mut self, linktype: Linktype) -> Result<(), PcapError> {
    let rc = unsafe { self.backend.set_datalink(self.raw.as_ptr(), linktype.0) };
    if rc != 0 {
      return Err(PcapError::Datalink {
        message: self.last_error(),
      });
    }
    debug!(source = %self.source, dlt = linktype.0, "datalink changed");
    Ok(())
  }

  /// Snapshot of libpcap's receive and drop counters.
  pub fn stats(&mut self) -> Result<Stats, PcapError> {
    let mut raw = PcapStat::default();
    let rc = unsafe { self.backend.stats(self.raw.as_ptr(), &mut raw) };
    if rc != 0 {
      return Err(PcapError::Stats {
        message: self.last_error(),
      });
    }
    Ok(raw.into())
  }

  /// Release the handle. Consuming `self` makes any later use a compile error.
  pub fn close(self) {
    drop(self);
  }

  pub(crate) fn backend(&self) -> &B {
    &self.backend
  }

  pub(crate) fn as_raw(&self) -> *mut PcapRaw {
    self.raw.as_ptr()
  }

  /// Copy of the handle's error text; must be read right after the failing call.
  pub(crate) fn last_error(&self) -> String {
    unsafe { handle_error(&self.backend, self.raw.as_ptr()) }
  }
}

#[cfg(feature = "libpcap")]
impl PcapHandle<Libpcap> {
  pub fn open(dev: &str, snaplen: i32, promisc: bool, timeout_ms: i32) -> Result<Self, PcapError> {
    let config = CaptureConfig {
      snaplen,
      promiscuous: promisc,
      timeout_ms,
    };
    Self::open_live_with(Libpcap, dev, &config)
  }

  pub fn open_with(dev: &str, config: &CaptureConfig) -> Result<Self, PcapError> {
    Self::open_live_with(Libpcap, dev, config)
  }

  pub fn open_offline(path: impl AsRef<Path>) -> Result<Self, PcapError> {
    Self::open_offline_with(Libpcap, path)
  }
}

impl<B: Backend> fmt::Debug for PcapHandle<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PcapHandle")
      .field("source", &self.source)
      .finish_non_exhaustive()
  }
}

impl<B: Backend> Drop for PcapHandle<B> {
  fn drop(&mut self) {
    unsafe { self.backend.close(self.raw.as_ptr()) };
    info!(source = %self.source, "closed capture");
  }
}

/// Iterator returned by [`PcapHandle::packets`].
pub struct Packets<'a, B: Backend> {
  handle: &'a mut PcapHandle<B>,
}

impl<B: Backend> Iterator for Packets<'_, B> {
  type Item = Result<Packet, PcapError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      match self.handle.next_packet() {
        Ok(Fetch::Packet(packet)) => return Some(Ok(packet)),
        Ok(Fetch::TimedOut) => continue,
        Ok(Fetch::EndOfStream) => return None,
        Err(err) => return Some(Err(err)),
      }
    }
  }
}

/// Version string of the linked libpcap.
pub fn lib_version_with<B: Backend>(backend: &B) -> String {
  unsafe { owned_c_str(backend.lib_version()) }.unwrap_or_default()
}

#[cfg(feature = "libpcap")]
pub fn lib_version() -> String {
  lib_version_with(&Libpcap)
}
