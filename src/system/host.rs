use serde::Serialize;
use tracing::{debug, warn};

use super::kernel::Kernel;
use crate::error::SampleError;

/// Static facts about the host, gathered once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub clock_ticks_per_second: u32,
    pub cpu_core_count: u32,
    pub page_size_kib: u64,
    pub total_memory_kib: u64,
    /// When set, other processes' memory and CPU cannot be inspected and
    /// every record is expected to carry zeroed resource fields.
    pub security_restricted: bool,
}

impl HostInfo {
    /// Queries clock rate, CPU count, physical memory and page size, in that
    /// order. Any failure is fatal; no partial state is returned.
    pub fn probe<K: Kernel>(kernel: &K) -> Result<HostInfo, SampleError> {
        let _span = tracing::debug_span!("host.probe").entered();

        let clock_ticks_per_second = kernel.clock_rate().map_err(|source| SampleError::Init {
            what: "clock rate",
            source,
        })?;
        let cpu_core_count = kernel.cpu_count().map_err(|source| SampleError::Init {
            what: "cpu count",
            source,
        })?;
        let total_memory_kib = kernel
            .physical_memory_bytes()
            .map_err(|source| SampleError::Init {
                what: "real memory amount",
                source,
            })?
            / 1024;
        let page_size_kib = kernel
            .page_size_bytes()
            .map_err(|source| SampleError::Init {
                what: "memory page size",
                source,
            })?
            / 1024;

        let security_restricted = detect_restriction(kernel);

        let info = HostInfo {
            clock_ticks_per_second,
            cpu_core_count,
            page_size_kib,
            total_memory_kib,
            security_restricted,
        };
        debug!(?info, "host capabilities probed");
        Ok(info)
    }
}

/// Decides whether per-process inspection is denied.
///
/// The direct feature check is privileged and missing on older releases, so
/// instead enumerate every task through the privileged processor-set port and
/// look for pid 1. An enumeration failure (usually: not root) counts as
/// restricted, as does a list without pid 1.
pub fn detect_restriction<K: Kernel>(kernel: &K) -> bool {
    let restricted = match kernel.privileged_task_pids() {
        Ok(pids) => !pids.contains(&1),
        Err(err) => {
            debug!(error = %err, "privileged task enumeration failed");
            true
        }
    };
    if restricted {
        warn!("process memory and CPU inspection is restricted; resource fields will read zero");
    }
    restricted
}
