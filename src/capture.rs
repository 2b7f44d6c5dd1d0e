//! Run a blocking capture loop on tokio's blocking pool.
//!
//! The loop owns the session while it runs. Stopping is cooperative: the flag
//! is checked after every fetch, and live sessions wake up at least once per
//! read timeout, so a stop request takes effect within one timeout period.

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use crate::{
  error::PcapError,
  ffi::{Backend, Libpcap},
  packet::Packet,
  pcap::{Fetch, PcapHandle},
};

/// Why a capture loop returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// [`CaptureTask::stop`] was called.
  Stopped,
  /// The savefile ran out of records.
  EndOfStream,
  /// The packet receiver was dropped.
  ReceiverClosed,
}

/// Result of a finished capture loop; hands the session back to the caller.
pub struct CaptureOutcome<B: Backend = Libpcap> {
  pub handle: PcapHandle<B>,
  pub packets: u64,
  pub reason: StopReason,
}

impl<B: Backend> fmt::Debug for CaptureOutcome<B> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CaptureOutcome")
      .field("handle", &self.handle)
      .field("packets", &self.packets)
      .field("reason", &self.reason)
      .finish()
  }
}

/// A capture loop running on the blocking pool.
pub struct CaptureTask<B: Backend = Libpcap> {
  stop: Arc<AtomicBool>,
  join: JoinHandle<Result<CaptureOutcome<B>, PcapError>>,
}

impl<B: Backend> CaptureTask<B> {
  /// Ask the loop to return after its current fetch.
  pub fn stop(&self) {
    self.stop.store(true, Ordering::Release);
  }

  pub fn is_finished(&self) -> bool {
    self.join.is_finished()
  }

  /// Wait for the loop to end. A fetch error ends the loop and closes the
  /// session.
  pub async fn join(self) -> Result<CaptureOutcome<B>, PcapError> {
    self.join.await?
  }
}

/// Call `on_packet` for every captured packet until stopped or the savefile
/// ends.
pub fn capture_async<B, F>(handle: PcapHandle<B>, mut on_packet: F) -> CaptureTask<B>
where
  B: Backend + Send + 'static,
  F: FnMut(Packet) + Send + 'static,
{
  spawn_loop(handle, move |packet| {
    on_packet(packet);
    true
  })
}

/// Deliver captured packets over a bounded channel. The loop ends on its own
/// once the receiver is dropped and the next packet arrives.
///
/// A `capacity` of zero is treated as one.
pub fn capture_channel<B>(
  handle: PcapHandle<B>,
  capacity: usize,
) -> (mpsc::Receiver<Packet>, CaptureTask<B>)
where
  B: Backend + Send + 'static,
{
  let (tx, rx) = mpsc::channel(capacity.max(1));
  let task = spawn_loop(handle, move |packet| tx.blocking_send(packet).is_ok());
  (rx, task)
}

fn spawn_loop<B, F>(handle: PcapHandle<B>, deliver: F) -> CaptureTask<B>
where
  B: Backend + Send + 'static,
  F: FnMut(Packet) -> bool + Send + 'static,
{
  let stop = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&stop);
  let join = tokio::task::spawn_blocking(move || run_loop(handle, &flag, deliver));
  CaptureTask { stop, join }
}

fn run_loop<B, F>(
  mut handle: PcapHandle<B>,
  stop: &AtomicBool,
  mut deliver: F,
) -> Result<CaptureOutcome<B>, PcapError>
where
  B: Backend,
  F: FnMut(Packet) -> bool,
{
  info!(source = %handle.source(), "capture loop started");
  let mut packets = 0u64;
  let reason = loop {
    if stop.load(Ordering::Acquire) {
      break StopReason::Stopped;
    }
    match handle.next_packet() {
      Ok(Fetch::Packet(packet)) => {
        packets += 1;
        if !deliver(packet) {
          break StopReason::ReceiverClosed;
        }
      }
      Ok(Fetch::TimedOut) => continue,
      Ok(Fetch::EndOfStream) => break StopReason::EndOfStream,
      Err(err) => {
        error!(source = %handle.source(), %err, "capture loop failed");
        return Err(err);
      }
    }
  };
  debug!(source = %handle.source(), packets, ?reason, "capture loop finished");
  Ok(CaptureOutcome {
    handle,
    packets,
    reason,
  })
}
