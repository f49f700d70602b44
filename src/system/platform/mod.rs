//! Native kernel backends. The only place target-specific code lives.

use crate::error::KernelError;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod unsupported;

#[cfg(target_os = "macos")]
pub use macos::{Darwin as NativeKernel, DarwinTask as NativeTask};
#[cfg(not(target_os = "macos"))]
pub use unsupported::{Unsupported as NativeKernel, Unsupported as NativeTask};

/// The kernel of the running host.
pub fn native() -> Result<NativeKernel, KernelError> {
    #[cfg(target_os = "macos")]
    {
        Ok(NativeKernel::new())
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(KernelError::Unsupported)
    }
}
