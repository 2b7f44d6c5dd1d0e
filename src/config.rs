//! Live capture settings.

/// Default snapshot length (maximum bytes per packet)
pub const DEFAULT_SNAPLEN: i32 = 65535;

/// Default read timeout (milliseconds)
pub const DEFAULT_TIMEOUT_MS: i32 = 1000;

/// Parameters for opening a live device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
  /// Maximum bytes captured per packet; longer packets are truncated.
  pub snaplen: i32,
  /// Put the interface into promiscuous mode.
  pub promiscuous: bool,
  /// Upper bound on how long a fetch blocks before reporting a timeout.
  pub timeout_ms: i32,
}

impl Default for CaptureConfig {
  fn default() -> Self {
    Self {
      snaplen: DEFAULT_SNAPLEN,
      promiscuous: true,
      timeout_ms: DEFAULT_TIMEOUT_MS,
    }
  }
}

impl CaptureConfig {
  pub fn snaplen(mut self, snaplen: i32) -> Self {
    self.snaplen = snaplen;
    self
  }

  pub fn promiscuous(mut self, enable: bool) -> Self {
    self.promiscuous = enable;
    self
  }

  pub fn timeout_ms(mut self, timeout_ms: i32) -> Self {
    self.timeout_ms = timeout_ms;
    self
  }
}
