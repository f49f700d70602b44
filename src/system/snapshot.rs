use serde::Serialize;

use super::host::HostInfo;
use super::process::ProcessTree;

/// Host-wide usage, refreshed in place by `SystemSampler`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SystemUsage {
    pub cpu_core_count: u32,
    pub memory_total_kib: u64,
    pub memory_used_kib: u64,
    pub swap_total_kib: u64,
    pub swap_used_kib: u64,
    /// User CPU share in tenths of a percent; `None` until two samples span
    /// a positive interval.
    pub cpu_user_per_mille: Option<u32>,
    pub cpu_system_per_mille: Option<u32>,
    /// I/O wait is not observable on Darwin and always reads zero.
    pub cpu_wait_per_mille: u32,
    pub load_average: [f64; 3],
}

impl SystemUsage {
    pub fn new(host: &HostInfo) -> Self {
        SystemUsage {
            cpu_core_count: host.cpu_core_count,
            memory_total_kib: host.total_memory_kib,
            ..SystemUsage::default()
        }
    }
}

/// Everything gathered in one sampling cycle.
#[derive(Clone, Debug, Serialize)]
pub struct SystemSnapshot {
    pub host: HostInfo,
    pub usage: SystemUsage,
    pub process_tree: ProcessTree,
}
