//! Errors surfaced by capture sessions, filters, enumeration and injection.
//!
//! Variants that originate in libpcap carry its diagnostic text verbatim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcapError {
  #[error("{value:?} contains an interior NUL byte")]
  InvalidString { value: String },
  #[error("failed to open capture: {message}")]
  Open { message: String },
  #[error("failed to fetch packet: {message}")]
  Fetch { message: String },
  #[error("libpcap reported a packet without header or data")]
  NullPacket,
  #[error("failed to compile filter: {message}")]
  FilterCompile { message: String },
  #[error("failed to install filter: {message}")]
  FilterInstall { message: String },
  #[error("failed to set datalink: {message}")]
  Datalink { message: String },
  #[error("failed to read capture statistics: {message}")]
  Stats { message: String },
  #[error("failed to inject packet: {message}")]
  Inject { message: String },
  #[error("injected {sent} bytes (expected {expected})")]
  ShortWrite { sent: usize, expected: usize },
  #[error("failed to enumerate devices: {message}")]
  Enumerate { message: String },
  #[error("capture task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl PcapError {
  /// Diagnostic text reported by libpcap, if this error came from it.
  pub fn facility_message(&self) -> Option<&str> {
    match self {
      Self::Open { message }
      | Self::Fetch { message }
      | Self::FilterCompile { message }
      | Self::FilterInstall { message }
      | Self::Datalink { message }
      | Self::Stats { message }
      | Self::Inject { message }
      | Self::Enumerate { message } => Some(message),
      _ => None,
    }
  }
}
