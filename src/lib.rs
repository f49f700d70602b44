//! Process inventory and host resource sampling for monitoring daemons.
//!
//! The core in [`system`] is generic over [`system::kernel::Kernel`]; the
//! Darwin backend lives in [`system::platform`].

pub mod config;
pub mod error;
pub mod format;
pub mod report;
pub mod system;
pub mod telemetry;
