//! Copies libpcap's error text out of its buffers into owned strings.
//!
//! libpcap reports failures either through a caller-supplied errbuf (open and
//! enumerate calls) or through a per-handle buffer read with `pcap_geterr`,
//! which the next call on the handle overwrites. Both are copied out right
//! after the failing call.

use std::{
  ffi::{CStr, CString},
  os::raw::c_char,
  path::Path,
};

use crate::{
  error::PcapError,
  ffi::{Backend, PCAP_ERRBUF_SIZE, PcapRaw},
};

/// Zeroed error buffer handed to libpcap calls that take an `errbuf`.
pub(crate) struct ErrBuf {
  buf: [c_char; PCAP_ERRBUF_SIZE],
}

impl ErrBuf {
  pub(crate) fn new() -> Self {
    Self {
      buf: [0; PCAP_ERRBUF_SIZE],
    }
  }

  pub(crate) fn as_mut_ptr(&mut self) -> *mut c_char {
    self.buf.as_mut_ptr()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.buf[0] == 0
  }

  /// Message up to the first NUL, or the whole buffer if libpcap left none.
  pub(crate) fn message(&self) -> String {
    let bytes = self.buf.map(|c| c as u8);
    message_from_bytes(&bytes)
  }
}

fn message_from_bytes(bytes: &[u8]) -> String {
  let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
  String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy a NUL-terminated C string owned by libpcap. `None` for null.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the call.
pub(crate) unsafe fn owned_c_str(ptr: *const c_char) -> Option<String> {
  if ptr.is_null() {
    return None;
  }
  let s = unsafe { CStr::from_ptr(ptr) };
  Some(s.to_string_lossy().into_owned())
}

/// Current `pcap_geterr` text of `handle`.
///
/// # Safety
///
/// `handle` must be a live handle opened through `backend`.
pub(crate) unsafe fn handle_error<B: Backend>(backend: &B, handle: *mut PcapRaw) -> String {
  unsafe { owned_c_str(backend.geterr(handle)) }.unwrap_or_default()
}

pub(crate) fn c_string(value: &str) -> Result<CString, PcapError> {
  CString::new(value).map_err(|_| PcapError::InvalidString {
    value: value.to_owned(),
  })
}

#[cfg(unix)]
pub(crate) fn c_path(path: &Path) -> Result<CString, PcapError> {
  use std::os::unix::ffi::OsStrExt;

  CString::new(path.as_os_str().as_bytes()).map_err(|_| PcapError::InvalidString {
    value: path.display().to_string(),
  })
}

#[cfg(not(unix))]
pub(crate) fn c_path(path: &Path) -> Result<CString, PcapError> {
  let value = path.to_str().ok_or_else(|| PcapError::InvalidString {
    value: path.display().to_string(),
  })?;
  c_string(value)
}
