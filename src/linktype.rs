//! Datalink (link-layer header) types.

use crate::{errbuf::owned_c_str, ffi::Backend};

/// A libpcap `DLT_*` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Linktype(pub i32);

impl Linktype {
  pub const NULL: Linktype = Linktype(0);
  pub const ETHERNET: Linktype = Linktype(1);
  pub const IEEE802_11: Linktype = Linktype(105);
  pub const LINUX_SLL: Linktype = Linktype(113);
  pub const IEEE802_11_RADIOTAP: Linktype = Linktype(127);
  pub const LINUX_SLL2: Linktype = Linktype(276);

  /// Short name such as `EN10MB`, or `None` if the facility does not know it.
  pub fn name_with<B: Backend>(self, backend: &B) -> Option<String> {
    unsafe { owned_c_str(backend.datalink_val_to_name(self.0)) }
  }

  /// Human-readable description, or `None` if the facility does not know it.
  pub fn description_with<B: Backend>(self, backend: &B) -> Option<String> {
    unsafe { owned_c_str(backend.datalink_val_to_description(self.0)) }
  }

  #[cfg(feature = "libpcap")]
  pub fn name(self) -> Option<String> {
    self.name_with(&crate::ffi::Libpcap)
  }

  #[cfg(feature = "libpcap")]
  pub fn description(self) -> Option<String> {
    self.description_with(&crate::ffi::Libpcap)
  }
}

impl From<i32> for Linktype {
  fn from(value: i32) -> Self {
    Linktype(value)
  }
}
