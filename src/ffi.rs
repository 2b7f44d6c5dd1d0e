//! Raw ABI of the native capture facility (libpcap).
//!
//! All `unsafe extern` declarations are centralized here to contain the
//! surface area where we cross the FFI boundary. Higher-level modules go
//! through the [`Backend`] trait instead of calling libpcap directly, which
//! also lets tests run the marshalling code against an in-process double.

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Size of the error buffer every open/enumerate call writes into.
pub const PCAP_ERRBUF_SIZE: usize = 256;

/// Generic failure code returned by most libpcap calls.
pub const PCAP_ERROR: c_int = -1;
/// `pcap_next_ex` result when a savefile has no more records.
pub const PCAP_ERROR_BREAK: c_int = -2;

/// Netmask hint for `pcap_compile` when the network is not known.
pub const PCAP_NETMASK_UNKNOWN: u32 = 0xffff_ffff;

/// `pcap_if_t::flags` bits.
pub const PCAP_IF_LOOPBACK: u32 = 0x0000_0001;
pub const PCAP_IF_UP: u32 = 0x0000_0002;
pub const PCAP_IF_RUNNING: u32 = 0x0000_0004;

/// Opaque marker type for the underlying `pcap_t` handle allocated in C.
#[repr(C)]
pub struct PcapRaw {
  _private: [u8; 0],
}

/// `struct pcap_pkthdr`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PcapPkthdr {
  pub ts: libc::timeval,
  pub caplen: u32,
  pub len: u32,
}

/// `struct pcap_stat`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapStat {
  pub ps_recv: c_uint,
  pub ps_drop: c_uint,
  pub ps_ifdrop: c_uint,
}

/// `struct bpf_insn`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BpfInsn {
  pub code: u16,
  pub jt: u8,
  pub jf: u8,
  pub k: u32,
}

/// `struct bpf_program`.
#[repr(C)]
pub struct BpfProgram {
  pub bf_len: c_uint,
  pub bf_insns: *mut BpfInsn,
}

impl Default for BpfProgram {
  fn default() -> Self {
    Self {
      bf_len: 0,
      bf_insns: std::ptr::null_mut(),
    }
  }
}

/// `pcap_if_t`: one node of the device list returned by `pcap_findalldevs`.
#[repr(C)]
pub struct PcapIf {
  pub next: *mut PcapIf,
  pub name: *mut c_char,
  pub description: *mut c_char,
  pub addresses: *mut PcapAddr,
  pub flags: u32,
}

/// `pcap_addr_t`: one node of a device's address list.
#[repr(C)]
pub struct PcapAddr {
  pub next: *mut PcapAddr,
  pub addr: *mut libc::sockaddr,
  pub netmask: *mut libc::sockaddr,
  pub broadaddr: *mut libc::sockaddr,
  pub dstaddr: *mut libc::sockaddr,
}

/// Entry points of the native facility consumed by this crate.
///
/// Each method mirrors the libpcap function of the same name. Implementors
/// must honour libpcap's contracts exactly: returned buffers stay valid until
/// the next call on the same handle, error text is read through `geterr`,
/// and every allocation is released only by its matching free call.
///
/// # Safety
///
/// All methods are `unsafe` because callers pass raw pointers that must be
/// valid for the duration of the call, and handles must come from a prior
/// successful `open_*` on the same backend and must not be closed yet.
pub trait Backend {
  unsafe fn open_live(
    &self,
    device: *const c_char,
    snaplen: c_int,
    promisc: c_int,
    timeout_ms: c_int,
    errbuf: *mut c_char,
  ) -> *mut PcapRaw;

  unsafe fn open_offline(&self, path: *const c_char, errbuf: *mut c_char) -> *mut PcapRaw;

  unsafe fn close(&self, handle: *mut PcapRaw);

  unsafe fn next_ex(
    &self,
    handle: *mut PcapRaw,
    header: *mut *mut PcapPkthdr,
    data: *mut *const u8,
  ) -> c_int;

  unsafe fn geterr(&self, handle: *mut PcapRaw) -> *const c_char;

  unsafe fn stats(&self, handle: *mut PcapRaw, stats: *mut PcapStat) -> c_int;

  unsafe fn compile(
    &self,
    handle: *mut PcapRaw,
    program: *mut BpfProgram,
    expression: *const c_char,
    optimize: c_int,
    netmask: u32,
  ) -> c_int;

  unsafe fn setfilter(&self, handle: *mut PcapRaw, program: *mut BpfProgram) -> c_int;

  unsafe fn freecode(&self, program: *mut BpfProgram);

  unsafe fn datalink(&self, handle: *mut PcapRaw) -> c_int;

  unsafe fn set_datalink(&self, handle: *mut PcapRaw, dlt: c_int) -> c_int;

  unsafe fn datalink_val_to_name(&self, dlt: c_int) -> *const c_char;

  unsafe fn datalink_val_to_description(&self, dlt: c_int) -> *const c_char;

  unsafe fn findalldevs(&self, devices: *mut *mut PcapIf, errbuf: *mut c_char) -> c_int;

  unsafe fn freealldevs(&self, devices: *mut PcapIf);

  unsafe fn inject(&self, handle: *mut PcapRaw, buf: *const c_void, len: usize) -> c_int;

  unsafe fn lib_version(&self) -> *const c_char;

  /// Allocate transmit memory handed to `inject`.
  unsafe fn alloc_tx(&self, len: usize) -> *mut u8 {
    unsafe { libc::malloc(len).cast() }
  }

  /// Release memory obtained from [`Backend::alloc_tx`].
  unsafe fn free_tx(&self, buf: *mut u8) {
    unsafe { libc::free(buf.cast()) }
  }
}

/// The system libpcap.
///
/// Without the `libpcap` feature nothing is linked: opens and enumeration
/// fail with a message saying so, and everything else is unreachable because
/// no handle can exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct Libpcap;

#[cfg(feature = "libpcap")]
mod sys {
  use super::*;

  unsafe extern "C" {
    pub(crate) fn pcap_open_live(
      device: *const c_char,
      snaplen: c_int,
      promisc: c_int,
      to_ms: c_int,
      errbuf: *mut c_char,
    ) -> *mut PcapRaw;
    pub(crate) fn pcap_open_offline(fname: *const c_char, errbuf: *mut c_char) -> *mut PcapRaw;
    pub(crate) fn pcap_close(p: *mut PcapRaw);
    pub(crate) fn pcap_next_ex(
      p: *mut PcapRaw,
      pkt_header: *mut *mut PcapPkthdr,
      pkt_data: *mut *const u8,
    ) -> c_int;
    pub(crate) fn pcap_geterr(p: *mut PcapRaw) -> *mut c_char;
    pub(crate) fn pcap_stats(p: *mut PcapRaw, ps: *mut PcapStat) -> c_int;
    pub(crate) fn pcap_compile(
      p: *mut PcapRaw,
      fp: *mut BpfProgram,
      s: *const c_char,
      optimize: c_int,
      netmask: u32,
    ) -> c_int;
    pub(crate) fn pcap_setfilter(p: *mut PcapRaw, fp: *mut BpfProgram) -> c_int;
    pub(crate) fn pcap_freecode(fp: *mut BpfProgram);
    pub(crate) fn pcap_datalink(p: *mut PcapRaw) -> c_int;
    pub(crate) fn pcap_set_datalink(p: *mut PcapRaw, dlt: c_int) -> c_int;
    pub(crate) fn pcap_datalink_val_to_name(dlt: c_int) -> *const c_char;
    pub(crate) fn pcap_datalink_val_to_description(dlt: c_int) -> *const c_char;
    pub(crate) fn pcap_findalldevs(alldevsp: *mut *mut PcapIf, errbuf: *mut c_char) -> c_int;
    pub(crate) fn pcap_freealldevs(alldevs: *mut PcapIf);
    pub(crate) fn pcap_inject(p: *mut PcapRaw, buf: *const c_void, size: usize) -> c_int;
    pub(crate) fn pcap_lib_version() -> *const c_char;
  }
}

#[cfg(not(feature = "libpcap"))]
mod sys {
  use super::*;

  const DISABLED: &str = "libpcap support was disabled at build time";

  unsafe fn disabled(errbuf: *mut c_char) {
    let n = DISABLED.len().min(PCAP_ERRBUF_SIZE - 1);
    unsafe {
      std::ptr::copy_nonoverlapping(DISABLED.as_ptr().cast::<c_char>(), errbuf, n);
      *errbuf.add(n) = 0;
    }
  }

  pub(crate) unsafe fn pcap_open_live(
    _device: *const c_char,
    _snaplen: c_int,
    _promisc: c_int,
    _to_ms: c_int,
    errbuf: *mut c_char,
  ) -> *mut PcapRaw {
    unsafe { disabled(errbuf) };
    std::ptr::null_mut()
  }

  pub(crate) unsafe fn pcap_open_offline(_fname: *const c_char, errbuf: *mut c_char) -> *mut PcapRaw {
    unsafe { disabled(errbuf) };
    std::ptr::null_mut()
  }

  pub(crate) unsafe fn pcap_close(_p: *mut PcapRaw) {}

  pub(crate) unsafe fn pcap_next_ex(
    _p: *mut PcapRaw,
    _pkt_header: *mut *mut PcapPkthdr,
    _pkt_data: *mut *const u8,
  ) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_geterr(_p: *mut PcapRaw) -> *mut c_char {
    c"libpcap support was disabled at build time".as_ptr().cast_mut()
  }

  pub(crate) unsafe fn pcap_stats(_p: *mut PcapRaw, _ps: *mut PcapStat) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_compile(
    _p: *mut PcapRaw,
    _fp: *mut BpfProgram,
    _s: *const c_char,
    _optimize: c_int,
    _netmask: u32,
  ) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_setfilter(_p: *mut PcapRaw, _fp: *mut BpfProgram) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_freecode(_fp: *mut BpfProgram) {}

  pub(crate) unsafe fn pcap_datalink(_p: *mut PcapRaw) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_set_datalink(_p: *mut PcapRaw, _dlt: c_int) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_datalink_val_to_name(_dlt: c_int) -> *const c_char {
    std::ptr::null()
  }

  pub(crate) unsafe fn pcap_datalink_val_to_description(_dlt: c_int) -> *const c_char {
    std::ptr::null()
  }

  pub(crate) unsafe fn pcap_findalldevs(_alldevsp: *mut *mut PcapIf, errbuf: *mut c_char) -> c_int {
    unsafe { disabled(errbuf) };
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_freealldevs(_alldevs: *mut PcapIf) {}

  pub(crate) unsafe fn pcap_inject(_p: *mut PcapRaw, _buf: *const c_void, _size: usize) -> c_int {
    PCAP_ERROR
  }

  pub(crate) unsafe fn pcap_lib_version() -> *const c_char {
    c"libpcap (not linked)".as_ptr()
  }
}

impl Backend for Libpcap {
  unsafe fn open_live(
    &self,
    device: *const c_char,
    snaplen: c_int,
    promisc: c_int,
    timeout_ms: c_int,
    errbuf: *mut c_char,
  ) -> *mut PcapRaw {
    unsafe { sys::pcap_open_live(device, snaplen, promisc, timeout_ms, errbuf) }
  }

  unsafe fn open_offline(&self, path: *const c_char, errbuf: *mut c_char) -> *mut PcapRaw {
    unsafe { sys::pcap_open_offline(path, errbuf) }
  }

  unsafe fn close(&self, handle: *mut PcapRaw) {
    unsafe { sys::pcap_close(handle) }
  }

  unsafe fn next_ex(
    &self,
    handle: *mut PcapRaw,
    header: *mut *mut PcapPkthdr,
    data: *mut *const u8,
  ) -> c_int {
    unsafe { sys::pcap_next_ex(handle, header, data) }
  }

  unsafe fn geterr(&self, handle: *mut PcapRaw) -> *const c_char {
    unsafe { sys::pcap_geterr(handle) }
  }

  unsafe fn stats(&self, handle: *mut PcapRaw, stats: *mut PcapStat) -> c_int {
    unsafe { sys::pcap_stats(handle, stats) }
  }

  unsafe fn compile(
    &self,
    handle: *mut PcapRaw,
    program: *mut BpfProgram,
    expression: *const c_char,
    optimize: c_int,
    netmask: u32,
  ) -> c_int {
    unsafe { sys::pcap_compile(handle, program, expression, optimize, netmask) }
  }

  unsafe fn setfilter(&self, handle: *mut PcapRaw, program: *mut BpfProgram) -> c_int {
    unsafe { sys::pcap_setfilter(handle, program) }
  }

  unsafe fn freecode(&self, program: *mut BpfProgram) {
    unsafe { sys::pcap_freecode(program) }
  }

  unsafe fn datalink(&self, handle: *mut PcapRaw) -> c_int {
    unsafe { sys::pcap_datalink(handle) }
  }

  unsafe fn set_datalink(&self, handle: *mut PcapRaw, dlt: c_int) -> c_int {
    unsafe { sys::pcap_set_datalink(handle, dlt) }
  }

  unsafe fn datalink_val_to_name(&self, dlt: c_int) -> *const c_char {
    unsafe { sys::pcap_datalink_val_to_name(dlt) }
  }

  unsafe fn datalink_val_to_description(&self, dlt: c_int) -> *const c_char {
    unsafe { sys::pcap_datalink_val_to_description(dlt) }
  }

  unsafe fn findalldevs(&self, devices: *mut *mut PcapIf, errbuf: *mut c_char) -> c_int {
    unsafe { sys::pcap_findalldevs(devices, errbuf) }
  }

  unsafe fn freealldevs(&self, devices: *mut PcapIf) {
    unsafe { sys::pcap_freealldevs(devices) }
  }

  unsafe fn inject(&self, handle: *mut PcapRaw, buf: *const c_void, len: usize) -> c_int {
    unsafe { sys::pcap_inject(handle, buf, len) }
  }

  unsafe fn lib_version(&self) -> *const c_char {
    unsafe { sys::pcap_lib_version() }
  }
}
