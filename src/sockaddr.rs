//! Normalizes family-tagged socket addresses into [`IpAddr`].

use std::{
  mem::{offset_of, size_of},
  net::{IpAddr, Ipv4Addr, Ipv6Addr},
  os::raw::c_int,
  ptr,
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
  #[error("no socket address present")]
  Missing,
  #[error("unsupported address family {0}")]
  UnsupportedFamily(c_int),
  #[error("socket address of family {family} is only {len} bytes long")]
  Truncated { family: c_int, len: usize },
}

/// Length the sockaddr declares for itself, on targets that carry one.
#[cfg(sa_len)]
unsafe fn declared_len(sa: *const libc::sockaddr) -> Option<usize> {
  Some(usize::from(unsafe {
    ptr::addr_of!((*sa).sa_len).read_unaligned()
  }))
}

#[cfg(not(sa_len))]
unsafe fn declared_len(_sa: *const libc::sockaddr) -> Option<usize> {
  None
}

unsafe fn family_of(sa: *const libc::sockaddr) -> c_int {
  c_int::from(unsafe { ptr::addr_of!((*sa).sa_family).read_unaligned() })
}

/// Convert a raw `sockaddr` into an IP address.
///
/// `AF_INET` yields a 4-byte [`IpAddr::V4`], `AF_INET6` a 16-byte
/// [`IpAddr::V6`]; every other family is reported as unsupported. Where the
/// sockaddr carries its own length, a shorter-than-struct address is rejected
/// before any typed read.
///
/// # Safety
///
/// `sa` must be null or point to a socket address whose allocation covers the
/// structure matching its `sa_family` tag, or its declared `sa_len` where the
/// target has one.
pub unsafe fn sockaddr_to_ip(sa: *const libc::sockaddr) -> Result<IpAddr, AddressError> {
  if sa.is_null() {
    return Err(AddressError::Missing);
  }
  let family = unsafe { family_of(sa) };
  let needed = match family {
    libc::AF_INET => size_of::<libc::sockaddr_in>(),
    libc::AF_INET6 => size_of::<libc::sockaddr_in6>(),
    other => return Err(AddressError::UnsupportedFamily(other)),
  };
  if let Some(len) = unsafe { declared_len(sa) }.filter(|&len| len < needed) {
    return Err(AddressError::Truncated { family, len });
  }
  match family {
    libc::AF_INET => {
      let sin = unsafe { ptr::read_unaligned(sa.cast::<libc::sockaddr_in>()) };
      Ok(IpAddr::V4(Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes())))
    }
    _ => {
      let sin6 = unsafe { ptr::read_unaligned(sa.cast::<libc::sockaddr_in6>()) };
      Ok(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
    }
  }
}

/// Decode a netmask sockaddr in the family of `ip`.
///
/// Netmasks may be shorter than their struct (BSD routing sockets trim
/// trailing zero bytes) and may carry `AF_UNSPEC`. Only the bytes the
/// sockaddr actually holds are read; missing trailing bytes are zero. Without
/// a declared length, an `AF_UNSPEC` mask is assumed to span a bare
/// `sockaddr`.
///
/// # Safety
///
/// Same contract as [`sockaddr_to_ip`].
pub unsafe fn sockaddr_to_mask(
  sa: *const libc::sockaddr,
  ip: &IpAddr,
) -> Result<IpAddr, AddressError> {
  if sa.is_null() {
    return Err(AddressError::Missing);
  }
  let (expected, offset) = match ip {
    IpAddr::V4(_) => (libc::AF_INET, offset_of!(libc::sockaddr_in, sin_addr)),
    IpAddr::V6(_) => (libc::AF_INET6, offset_of!(libc::sockaddr_in6, sin6_addr)),
  };
  let family = unsafe { family_of(sa) };
  let available = match unsafe { declared_len(sa) } {
    Some(len) => len,
    None if family == libc::AF_INET => size_of::<libc::sockaddr_in>(),
    None if family == libc::AF_INET6 => size_of::<libc::sockaddr_in6>(),
    None => size_of::<libc::sockaddr>(),
  };
  if family != expected && family != libc::AF_UNSPEC {
    return Err(AddressError::UnsupportedFamily(family));
  }

  let mut bytes = [0u8; 16];
  let count = available.saturating_sub(offset).min(ip_len(ip));
  unsafe { ptr::copy_nonoverlapping(sa.cast::<u8>().add(offset), bytes.as_mut_ptr(), count) };
  Ok(match ip {
    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(bytes)),
  })
}

/// All-ones mask of the same family as `ip`.
pub fn host_mask(ip: &IpAddr) -> IpAddr {
  match ip {
    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(u32::MAX)),
    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(u128::MAX)),
  }
}

/// Number of address bytes: 4 for IPv4, 16 for IPv6.
pub fn ip_len(ip: &IpAddr) -> usize {
  match ip {
    IpAddr::V4(_) => 4,
    IpAddr::V6(_) => 16,
  }
}
