//! Transmit raw frames through a capture session.

use std::{
  os::raw::c_void,
  ptr::{self, NonNull},
};

use tracing::{debug, warn};

use crate::{error::PcapError, ffi::Backend, pcap::PcapHandle};

/// Transmit memory owned by the backend; freed on drop.
struct TxBuffer<'a, B: Backend> {
  ptr: NonNull<u8>,
  len: usize,
  backend: &'a B,
}

impl<'a, B: Backend> TxBuffer<'a, B> {
  fn copy_from(backend: &'a B, bytes: &[u8]) -> Result<Self, PcapError> {
    let raw = unsafe { backend.alloc_tx(bytes.len().max(1)) };
    let ptr = NonNull::new(raw).ok_or_else(|| PcapError::Inject {
      message: format!("cannot allocate {} byte transmit buffer", bytes.len()),
    })?;
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
    Ok(Self {
      ptr,
      len: bytes.len(),
      backend,
    })
  }
}

impl<B: Backend> Drop for TxBuffer<'_, B> {
  fn drop(&mut self) {
    unsafe { self.backend.free_tx(self.ptr.as_ptr()) };
  }
}

impl<B: Backend> PcapHandle<B> {
  /// Send `bytes` as one raw frame. Returns the number of bytes written.
  pub fn inject(&mut self, bytes: &[u8]) -> Result<usize, PcapError> {
    let tx = TxBuffer::copy_from(self.backend(), bytes)?;
    let ret = unsafe {
      self
        .backend()
        .inject(self.as_raw(), tx.ptr.as_ptr().cast::<c_void>(), tx.len)
    };
    if ret < 0 {
      return Err(PcapError::Inject {
        message: self.last_error(),
      });
    }
    let sent = ret as usize;
    if sent != bytes.len() {
      warn!(source = %self.source(), sent, expected = bytes.len(), "short write");
      return Err(PcapError::ShortWrite {
        sent,
        expected: bytes.len(),
      });
    }
    debug!(source = %self.source(), bytes = sent, "frame injected");
    Ok(sent)
  }
}
