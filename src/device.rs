//! Enumerate capture devices and their addresses.
//!
//! `pcap_findalldevs` hands back a linked list of devices, each carrying its
//! own linked list of addresses. The list is copied into owned [`Interface`]
//! values and released before returning; nothing here outlives the call.

use std::{marker::PhantomData, net::IpAddr, ptr};

use tracing::debug;

use crate::{
  errbuf::{ErrBuf, owned_c_str},
  error::PcapError,
  ffi::{Backend, PCAP_IF_LOOPBACK, PCAP_IF_RUNNING, PCAP_IF_UP, PcapAddr, PcapIf},
  sockaddr::{AddressError, host_mask, sockaddr_to_ip, sockaddr_to_mask},
};

/// A capture device as reported by libpcap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
  /// Name to pass to `PcapHandle::open`.
  pub name: String,
  /// Human-readable description; empty when libpcap has none.
  pub description: String,
  /// IPv4/IPv6 addresses in libpcap's order.
  pub addresses: Vec<IfAddress>,
  /// Raw `PCAP_IF_*` flag word.
  pub flags: u32,
}

impl Interface {
  pub fn is_loopback(&self) -> bool {
    self.flags & PCAP_IF_LOOPBACK != 0
  }

  pub fn is_up(&self) -> bool {
    self.flags & PCAP_IF_UP != 0
  }

  pub fn is_running(&self) -> bool {
    self.flags & PCAP_IF_RUNNING != 0
  }
}

/// One address of an interface. The address and its netmask always belong to
/// the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfAddress {
  ip: IpAddr,
  netmask: IpAddr,
  broadcast: Option<IpAddr>,
  destination: Option<IpAddr>,
}

impl IfAddress {
  pub fn ip(&self) -> IpAddr {
    self.ip
  }

  pub fn netmask(&self) -> IpAddr {
    self.netmask
  }

  pub fn broadcast(&self) -> Option<IpAddr> {
    self.broadcast
  }

  /// Peer address of a point-to-point link.
  pub fn destination(&self) -> Option<IpAddr> {
    self.destination
  }

  /// Number of leading one bits in the netmask.
  pub fn prefix_len(&self) -> u32 {
    match self.netmask {
      IpAddr::V4(mask) => u32::from(mask).leading_ones(),
      IpAddr::V6(mask) => u128::from(mask).leading_ones(),
    }
  }

  /// Build from one `pcap_addr_t` node.
  ///
  /// The netmask is read from its own field, in the address's family. When it
  /// is absent or tagged with another family, a host mask matching the
  /// address is used instead.
  ///
  /// # Safety
  ///
  /// Every non-null sockaddr pointer in `node` must be valid for its family.
  unsafe fn from_raw(node: &PcapAddr) -> Result<Self, AddressError> {
    let ip = unsafe { sockaddr_to_ip(node.addr) }?;
    let netmask =
      unsafe { sockaddr_to_mask(node.netmask, &ip) }.unwrap_or_else(|_| host_mask(&ip));
    let same_family = |other: Result<IpAddr, AddressError>| {
      other.ok().filter(|addr| addr.is_ipv4() == ip.is_ipv4())
    };
    Ok(Self {
      ip,
      netmask,
      broadcast: same_family(unsafe { sockaddr_to_ip(node.broadaddr) }),
      destination: same_family(unsafe { sockaddr_to_ip(node.dstaddr) }),
    })
  }
}

/// Device list returned by `pcap_findalldevs`; freed on drop.
struct DeviceList<'a, B: Backend> {
  head: *mut PcapIf,
  backend: &'a B,
}

impl<B: Backend> DeviceList<'_, B> {
  fn iter(&self) -> Nodes<'_, PcapIf> {
    Nodes::new(self.head)
  }
}

impl<B: Backend> Drop for DeviceList<'_, B> {
  fn drop(&mut self) {
    if !self.head.is_null() {
      unsafe { self.backend.freealldevs(self.head) };
    }
  }
}

trait Linked {
  fn next_node(&self) -> *const Self;
}

impl Linked for PcapIf {
  fn next_node(&self) -> *const Self {
    self.next
  }
}

impl Linked for PcapAddr {
  fn next_node(&self) -> *const Self {
    self.next
  }
}

/// Walks a null-terminated foreign list borrowed for `'a`.
struct Nodes<'a, T> {
  next: *const T,
  _list: PhantomData<&'a T>,
}

impl<T> Nodes<'_, T> {
  fn new(head: *const T) -> Self {
    Self {
      next: head,
      _list: PhantomData,
    }
  }
}

impl<'a, T: Linked> Iterator for Nodes<'a, T> {
  type Item = &'a T;

  fn next(&mut self) -> Option<&'a T> {
    let node = unsafe { self.next.as_ref() }?;
    self.next = node.next_node();
    Some(node)
  }
}

/// List every capture device known to `backend`, in libpcap's order.
///
/// Addresses of unsupported families are skipped; an interface without any
/// usable address is still returned with an empty list.
pub fn list_interfaces_with<B: Backend>(backend: &B) -> Result<Vec<Interface>, PcapError> {
  let mut errbuf = ErrBuf::new();
  let mut head: *mut PcapIf = ptr::null_mut();
  if unsafe { backend.findalldevs(&mut head, errbuf.as_mut_ptr()) } != 0 {
    return Err(PcapError::Enumerate {
      message: errbuf.message(),
    });
  }
  let devices = DeviceList { head, backend };

  let mut interfaces = Vec::with_capacity(devices.iter().count());
  for dev in devices.iter() {
    interfaces.push(unsafe { interface_from_raw(dev) });
  }
  debug!(count = interfaces.len(), "enumerated capture devices");
  Ok(interfaces)
}

#[cfg(feature = "libpcap")]
pub fn list_interfaces() -> Result<Vec<Interface>, PcapError> {
  list_interfaces_with(&crate::ffi::Libpcap)
}

/// # Safety
///
/// `dev` must be a node of a list obtained from `pcap_findalldevs`.
unsafe fn interface_from_raw(dev: &PcapIf) -> Interface {
  let name = unsafe { owned_c_str(dev.name) }.unwrap_or_default();
  let mut addresses = Vec::new();
  for node in Nodes::<PcapAddr>::new(dev.addresses) {
    match unsafe { IfAddress::from_raw(node) } {
      Ok(addr) => addresses.push(addr),
      Err(err) => debug!(device = %name, %err, "skipping address"),
    }
  }
  Interface {
    description: unsafe { owned_c_str(dev.description) }.unwrap_or_default(),
    name,
    addresses,
    flags: dev.flags,
  }
}
