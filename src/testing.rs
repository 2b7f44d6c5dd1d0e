//! In-process stand-in for libpcap used by unit tests.
//!
//! It hands out the same C shapes libpcap does (heap handles, a reused packet
//! buffer, `pcap_if_t`/`pcap_addr_t` lists with real sockaddrs) and counts
//! every allocation so tests can assert that nothing leaks.

use std::{
  collections::{HashMap, VecDeque},
  ffi::{CStr, CString},
  mem,
  os::raw::{c_char, c_int, c_void},
  ptr, slice,
  sync::{Arc, Mutex, MutexGuard},
  thread,
  time::Duration,
};

use crate::{
  ffi::{
    Backend, BpfInsn, BpfProgram, PCAP_ERRBUF_SIZE, PCAP_ERROR, PCAP_ERROR_BREAK,
    PCAP_IF_LOOPBACK, PCAP_IF_RUNNING, PCAP_IF_UP, PcapAddr, PcapIf, PcapPkthdr, PcapRaw,
    PcapStat,
  },
  pcap::PcapHandle,
  sockaddr::tests::{sockaddr_family, sockaddr_v4, sockaddr_v4_mask, sockaddr_v6},
};

const BUFFER_CAPACITY: usize = 65536;
const SUPPORTED_DLTS: [c_int; 2] = [1, 127];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Counters {
  pub opens: usize,
  pub closes: usize,
  pub open_handles: usize,
  pub compiled: usize,
  pub live_programs: usize,
  pub live_device_lists: usize,
  pub tx_allocated: usize,
  pub live_tx_buffers: usize,
}

pub(crate) enum LiveEvent {
  Packet(Vec<u8>),
  Timeout,
  Error(String),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SockSpec {
  V4([u8; 4]),
  V6([u8; 16]),
  Family(c_int),
  /// IPv4 mask bytes under an arbitrary family tag and declared length.
  /// Where sockaddrs carry a length, the allocation is exactly `len` bytes.
  ShortV4Mask {
    family: c_int,
    len: usize,
    mask: [u8; 4],
  },
  Null,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeAddr {
  addr: SockSpec,
  netmask: SockSpec,
  broadaddr: SockSpec,
  dstaddr: SockSpec,
}

impl FakeAddr {
  pub(crate) fn new(addr: SockSpec, netmask: SockSpec) -> Self {
    Self {
      addr,
      netmask,
      broadaddr: SockSpec::Null,
      dstaddr: SockSpec::Null,
    }
  }

  pub(crate) fn broadcast(mut self, spec: SockSpec) -> Self {
    self.broadaddr = spec;
    self
  }

  pub(crate) fn destination(mut self, spec: SockSpec) -> Self {
    self.dstaddr = spec;
    self
  }
}

struct FakeDevice {
  name: String,
  description: Option<String>,
  addresses: Vec<FakeAddr>,
  flags: u32,
}

#[derive(Default)]
struct State {
  counters: Counters,
  files: HashMap<String, Vec<Vec<u8>>>,
  devices: Vec<FakeDevice>,
  live_events: VecDeque<LiveEvent>,
  drops: (u32, u32),
  setfilter_error: Option<String>,
  inject_error: Option<String>,
  inject_shortfall: usize,
  findalldevs_error: Option<String>,
  sent: Vec<Vec<u8>>,
  programs: HashMap<usize, String>,
}

enum Source {
  Offline { records: Vec<Vec<u8>>, next: usize },
  Live { snaplen: usize },
}

struct FakeHandle {
  source: Source,
  header: PcapPkthdr,
  buffer: Vec<u8>,
  error: CString,
  datalink: c_int,
  delivered: u32,
  filter: Option<String>,
}

impl FakeHandle {
  fn boxed(source: Source) -> *mut PcapRaw {
    let handle = FakeHandle {
      source,
      header: PcapPkthdr {
        ts: libc::timeval {
          tv_sec: 0,
          tv_usec: 0,
        },
        caplen: 0,
        len: 0,
      },
      buffer: Vec::with_capacity(BUFFER_CAPACITY),
      error: CString::default(),
      datalink: 1,
      delivered: 0,
      filter: None,
    };
    Box::into_raw(Box::new(handle)).cast()
  }

  fn set_error(&mut self, message: &str) {
    self.error = CString::new(message).expect("error text without NUL");
  }
}

unsafe fn fake_handle<'a>(handle: *mut PcapRaw) -> &'a mut FakeHandle {
  unsafe { &mut *handle.cast::<FakeHandle>() }
}

unsafe fn read_str(ptr: *const c_char) -> String {
  unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe fn write_errbuf(errbuf: *mut c_char, message: &str) {
  let bytes = message.as_bytes();
  let n = bytes.len().min(PCAP_ERRBUF_SIZE - 1);
  unsafe {
    ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), errbuf, n);
    *errbuf.add(n) = 0;
  }
}

fn alloc_sockaddr(spec: SockSpec) -> *mut libc::sockaddr {
  let full = mem::size_of::<libc::sockaddr_storage>();
  let (storage, size) = match spec {
    SockSpec::V4(octets) => (sockaddr_v4(octets), full),
    SockSpec::V6(octets) => (sockaddr_v6(octets), full),
    SockSpec::Family(family) => (sockaddr_family(family), full),
    SockSpec::ShortV4Mask { family, len, mask } => {
      let size = if cfg!(sa_len) { len } else { full };
      (sockaddr_v4_mask(family, len, mask), size)
    }
    SockSpec::Null => return ptr::null_mut(),
  };
  let raw = unsafe { libc::malloc(size.max(1)) }.cast::<u8>();
  assert!(!raw.is_null(), "sockaddr allocation");
  unsafe { ptr::copy_nonoverlapping(ptr::from_ref(&storage).cast::<u8>(), raw, size) };
  raw.cast()
}

unsafe fn free_sockaddr(sa: *mut libc::sockaddr) {
  unsafe { libc::free(sa.cast()) };
}

/// Scriptable libpcap double shared between a test and the handles it opens.
#[derive(Clone, Default)]
pub(crate) struct FakePcap {
  state: Arc<Mutex<State>>,
}

impl FakePcap {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().expect("fake state lock")
  }

  pub(crate) fn add_file(&self, path: &str, records: Vec<Vec<u8>>) {
    self.state().files.insert(path.to_owned(), records);
  }

  pub(crate) fn add_device(&self, name: &str, addresses: Vec<FakeAddr>) {
    let mut flags = PCAP_IF_UP | PCAP_IF_RUNNING;
    if name.starts_with("lo") {
      flags |= PCAP_IF_LOOPBACK;
    }
    self.state().devices.push(FakeDevice {
      name: name.to_owned(),
      description: Some(format!("fake {name}")),
      addresses,
      flags,
    });
  }

  /// Device with no description and no flags set.
  pub(crate) fn add_bare_device(&self, name: &str) {
    self.state().devices.push(FakeDevice {
      name: name.to_owned(),
      description: None,
      addresses: Vec::new(),
      flags: 0,
    });
  }

  pub(crate) fn push_live(&self, event: LiveEvent) {
    self.state().live_events.push_back(event);
  }

  pub(crate) fn set_drops(&self, dropped: u32, if_dropped: u32) {
    self.state().drops = (dropped, if_dropped);
  }

  pub(crate) fn fail_setfilter(&self, message: &str) {
    self.state().setfilter_error = Some(message.to_owned());
  }

  pub(crate) fn fail_inject(&self, message: &str) {
    self.state().inject_error = Some(message.to_owned());
  }

  pub(crate) fn short_inject(&self, shortfall: usize) {
    self.state().inject_shortfall = shortfall;
  }

  pub(crate) fn fail_findalldevs(&self, message: &str) {
    self.state().findalldevs_error = Some(message.to_owned());
  }

  pub(crate) fn counters(&self) -> Counters {
    self.state().counters
  }

  pub(crate) fn sent_frames(&self) -> Vec<Vec<u8>> {
    self.state().sent.clone()
  }

  pub(crate) fn active_filter(&self, handle: &PcapHandle<FakePcap>) -> Option<String> {
    unsafe { fake_handle(handle.as_raw()) }.filter.clone()
  }

  fn opened(&self, source: Source) -> *mut PcapRaw {
    let mut state = self.state();
    state.counters.open_handles += 1;
    FakeHandle::boxed(source)
  }
}

impl Backend for FakePcap {
  unsafe fn open_live(
    &self,
    device: *const c_char,
    snaplen: c_int,
    _promisc: c_int,
    _timeout_ms: c_int,
    errbuf: *mut c_char,
  ) -> *mut PcapRaw {
    let name = unsafe { read_str(device) };
    let known = {
      let mut state = self.state();
      state.counters.opens += 1;
      state.devices.iter().any(|dev| dev.name == name)
    };
    if !known {
      unsafe { write_errbuf(errbuf, &format!("{name}: No such device exists")) };
      return ptr::null_mut();
    }
    self.opened(Source::Live {
      snaplen: usize::try_from(snaplen).unwrap_or(0),
    })
  }

  unsafe fn open_offline(&self, path: *const c_char, errbuf: *mut c_char) -> *mut PcapRaw {
    let path = unsafe { read_str(path) };
    let records = {
      let mut state = self.state();
      state.counters.opens += 1;
      state.files.get(&path).cloned()
    };
    match records {
      Some(records) => self.opened(Source::Offline { records, next: 0 }),
      None => {
        unsafe { write_errbuf(errbuf, &format!("{path}: No such file or directory")) };
        ptr::null_mut()
      }
    }
  }

  unsafe fn close(&self, handle: *mut PcapRaw) {
    drop(unsafe { Box::from_raw(handle.cast::<FakeHandle>()) });
    let mut state = self.state();
    state.counters.closes += 1;
    state.counters.open_handles -= 1;
  }

  unsafe fn next_ex(
    &self,
    handle: *mut PcapRaw,
    header: *mut *mut PcapPkthdr,
    data: *mut *const u8,
  ) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    let fetched = match &mut handle.source {
      Source::Offline { records, next } => match records.get(*next) {
        Some(record) => {
          *next += 1;
          Some(Ok((record.clone(), record.len())))
        }
        None => None,
      },
      Source::Live { snaplen } => {
        let snaplen = *snaplen;
        let event = self.state().live_events.pop_front();
        match event {
          Some(LiveEvent::Packet(mut bytes)) => {
            let wire_len = bytes.len();
            bytes.truncate(snaplen);
            Some(Ok((bytes, wire_len)))
          }
          Some(LiveEvent::Error(message)) => Some(Err(message)),
          Some(LiveEvent::Timeout) | None => {
            thread::sleep(Duration::from_millis(1));
            return 0;
          }
        }
      }
    };
    let (record, wire_len) = match fetched {
      Some(Ok(fetched)) => fetched,
      Some(Err(message)) => {
        handle.set_error(&message);
        return PCAP_ERROR;
      }
      None => return PCAP_ERROR_BREAK,
    };

    // Same allocation every time, like libpcap's ring/read buffer.
    handle.buffer.clear();
    handle.buffer.extend_from_slice(&record);
    let seq = handle.delivered;
    handle.delivered += 1;
    handle.header = PcapPkthdr {
      ts: libc::timeval {
        tv_sec: (1_700_000_000 + i64::from(seq)) as _,
        tv_usec: (seq * 10) as _,
      },
      caplen: record.len() as u32,
      len: wire_len as u32,
    };
    unsafe {
      *header = &mut handle.header;
      *data = handle.buffer.as_ptr();
    }
    1
  }

  unsafe fn geterr(&self, handle: *mut PcapRaw) -> *const c_char {
    unsafe { fake_handle(handle) }.error.as_ptr()
  }

  unsafe fn stats(&self, handle: *mut PcapRaw, stats: *mut PcapStat) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    if let Source::Offline { .. } = handle.source {
      handle.set_error("Statistics aren't available from savefiles");
      return PCAP_ERROR;
    }
    let (dropped, if_dropped) = self.state().drops;
    unsafe {
      *stats = PcapStat {
        ps_recv: handle.delivered,
        ps_drop: dropped,
        ps_ifdrop: if_dropped,
      };
    }
    0
  }

  unsafe fn compile(
    &self,
    handle: *mut PcapRaw,
    program: *mut BpfProgram,
    expression: *const c_char,
    _optimize: c_int,
    _netmask: u32,
  ) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    let expression = unsafe { read_str(expression) };
    if expression.contains("!!!") {
      handle.set_error("syntax error in filter expression: syntax error");
      return PCAP_ERROR;
    }
    let insns: Box<[BpfInsn]> = vec![BpfInsn {
      code: 0x06,
      jt: 0,
      jf: 0,
      k: 0x0004_0000,
    }]
    .into_boxed_slice();
    let len = insns.len();
    let insns: *mut BpfInsn = Box::into_raw(insns).cast();
    unsafe {
      (*program).bf_len = len as _;
      (*program).bf_insns = insns;
    }
    let mut state = self.state();
    state.programs.insert(insns as usize, expression);
    state.counters.compiled += 1;
    state.counters.live_programs += 1;
    0
  }

  unsafe fn setfilter(&self, handle: *mut PcapRaw, program: *mut BpfProgram) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    let state = self.state();
    if let Some(message) = &state.setfilter_error {
      handle.set_error(message);
      return PCAP_ERROR;
    }
    let key = unsafe { (*program).bf_insns } as usize;
    handle.filter = state.programs.get(&key).cloned();
    0
  }

  unsafe fn freecode(&self, program: *mut BpfProgram) {
    let program = unsafe { &mut *program };
    if program.bf_insns.is_null() {
      return;
    }
    let insns = ptr::slice_from_raw_parts_mut(program.bf_insns, program.bf_len as usize);
    drop(unsafe { Box::from_raw(insns) });
    let mut state = self.state();
    state.programs.remove(&(program.bf_insns as usize));
    state.counters.live_programs -= 1;
    program.bf_insns = ptr::null_mut();
    program.bf_len = 0;
  }

  unsafe fn datalink(&self, handle: *mut PcapRaw) -> c_int {
    unsafe { fake_handle(handle) }.datalink
  }

  unsafe fn set_datalink(&self, handle: *mut PcapRaw, dlt: c_int) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    if matches!(handle.source, Source::Live { .. }) && SUPPORTED_DLTS.contains(&dlt) {
      handle.datalink = dlt;
      return 0;
    }
    handle.set_error(&format!(
      "{dlt} is not one of the DLTs supported by this device"
    ));
    PCAP_ERROR
  }

  unsafe fn datalink_val_to_name(&self, dlt: c_int) -> *const c_char {
    match dlt {
      1 => c"EN10MB".as_ptr(),
      127 => c"IEEE802_11_RADIO".as_ptr(),
      _ => ptr::null(),
    }
  }

  unsafe fn datalink_val_to_description(&self, dlt: c_int) -> *const c_char {
    match dlt {
      1 => c"Ethernet".as_ptr(),
      127 => c"802.11 plus radiotap header".as_ptr(),
      _ => ptr::null(),
    }
  }

  unsafe fn findalldevs(&self, devices: *mut *mut PcapIf, errbuf: *mut c_char) -> c_int {
    let mut state = self.state();
    if let Some(message) = &state.findalldevs_error {
      unsafe { write_errbuf(errbuf, message) };
      return PCAP_ERROR;
    }
    let mut head: *mut PcapIf = ptr::null_mut();
    for dev in state.devices.iter().rev() {
      let mut addresses: *mut PcapAddr = ptr::null_mut();
      for addr in dev.addresses.iter().rev() {
        addresses = Box::into_raw(Box::new(PcapAddr {
          next: addresses,
          addr: alloc_sockaddr(addr.addr),
          netmask: alloc_sockaddr(addr.netmask),
          broadaddr: alloc_sockaddr(addr.broadaddr),
          dstaddr: alloc_sockaddr(addr.dstaddr),
        }));
      }
      let description = dev
        .description
        .as_deref()
        .map_or(ptr::null_mut(), |d| {
          CString::new(d).expect("description").into_raw()
        });
      head = Box::into_raw(Box::new(PcapIf {
        next: head,
        name: CString::new(dev.name.as_str()).expect("name").into_raw(),
        description,
        addresses,
        flags: dev.flags,
      }));
    }
    if !head.is_null() {
      state.counters.live_device_lists += 1;
    }
    unsafe { *devices = head };
    0
  }

  unsafe fn freealldevs(&self, devices: *mut PcapIf) {
    let mut dev = devices;
    while !dev.is_null() {
      let node = unsafe { Box::from_raw(dev) };
      drop(unsafe { CString::from_raw(node.name) });
      if !node.description.is_null() {
        drop(unsafe { CString::from_raw(node.description) });
      }
      let mut addr = node.addresses;
      while !addr.is_null() {
        let entry = unsafe { Box::from_raw(addr) };
        for sa in [entry.addr, entry.netmask, entry.broadaddr, entry.dstaddr] {
          unsafe { free_sockaddr(sa) };
        }
        addr = entry.next;
      }
      dev = node.next;
    }
    self.state().counters.live_device_lists -= 1;
  }

  unsafe fn inject(&self, handle: *mut PcapRaw, buf: *const c_void, len: usize) -> c_int {
    let handle = unsafe { fake_handle(handle) };
    if let Source::Offline { .. } = handle.source {
      handle.set_error("cannot inject on a savefile");
      return PCAP_ERROR;
    }
    let mut state = self.state();
    if let Some(message) = &state.inject_error {
      handle.set_error(message);
      return PCAP_ERROR;
    }
    let frame = unsafe { slice::from_raw_parts(buf.cast::<u8>(), len) }.to_vec();
    state.sent.push(frame);
    (len - state.inject_shortfall.min(len)) as c_int
  }

  unsafe fn lib_version(&self) -> *const c_char {
    c"libpcap version 1.10.4 (in-process test double)".as_ptr()
  }

  unsafe fn alloc_tx(&self, len: usize) -> *mut u8 {
    let mut state = self.state();
    state.counters.tx_allocated += 1;
    state.counters.live_tx_buffers += 1;
    unsafe { libc::malloc(len).cast() }
  }

  unsafe fn free_tx(&self, buf: *mut u8) {
    self.state().counters.live_tx_buffers -= 1;
    unsafe { libc::free(buf.cast()) }
  }
}
