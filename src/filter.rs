//! Compile a filter expression and install it on a session.

use std::ffi::CStr;

use tracing::debug;

use crate::{
  error::PcapError,
  ffi::{Backend, BpfProgram, PCAP_NETMASK_UNKNOWN},
  pcap::PcapHandle,
};

/// Compiled bytecode; `pcap_freecode` runs when this goes out of scope.
struct CompiledFilter<'a, B: Backend> {
  program: BpfProgram,
  backend: &'a B,
}

impl<B: Backend> Drop for CompiledFilter<'_, B> {
  fn drop(&mut self) {
    unsafe { self.backend.freecode(&mut self.program) };
  }
}

impl<B: Backend> PcapHandle<B> {
  /// Compile `expression` against the current datalink and install it.
  ///
  /// A compile failure leaves the active filter untouched. The compiled
  /// program is freed once installation has been attempted, whatever the
  /// outcome.
  pub fn set_filter(&mut self, expression: &str) -> Result<(), PcapError> {
    let expr = crate::errbuf::c_string(expression)?;
    let mut compiled = self.compile(&expr)?;
    let rc = unsafe {
      self
        .backend()
        .setfilter(self.as_raw(), &mut compiled.program)
    };
    if rc != 0 {
      return Err(PcapError::FilterInstall {
        message: self.last_error(),
      });
    }
    debug!(source = %self.source(), filter = expression, "filter installed");
    Ok(())
  }

  fn compile(&self, expr: &CStr) -> Result<CompiledFilter<'_, B>, PcapError> {
    let mut program = BpfProgram::default();
    let rc = unsafe {
      self.backend().compile(
        self.as_raw(),
        &mut program,
        expr.as_ptr(),
        1,
        PCAP_NETMASK_UNKNOWN,
      )
    };
    if rc != 0 {
      return Err(PcapError::FilterCompile {
        message: self.last_error(),
      });
    }
    Ok(CompiledFilter {
      program,
      backend: self.backend(),
    })
  }
}
