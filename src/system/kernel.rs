//! The kernel queries the sampling core consumes.
//!
//! Every component is generic over [`Kernel`], so the Darwin backend in
//! `platform` and the scripted kernel in `mock` are interchangeable.

use crate::error::KernelError;

/// One entry of the kernel process table, decoded from the platform record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelProcess {
    pub pid: i32,
    pub ppid: i32,
    pub real_uid: u32,
    pub effective_uid: u32,
    pub real_gid: u32,
    /// Creation time, seconds since the epoch.
    pub start_time: i64,
    /// Short command name (at most 16 bytes on Darwin).
    pub name: String,
    pub zombie: bool,
}

/// A user+system time pair as reported by Mach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeValue {
    pub seconds: i32,
    pub microseconds: i32,
}

impl TimeValue {
    pub fn new(seconds: i32, microseconds: i32) -> Self {
        Self {
            seconds,
            microseconds,
        }
    }

    /// Total microseconds, with negative components clamped to zero.
    pub fn as_micros(self) -> u64 {
        self.seconds.max(0) as u64 * 1_000_000 + self.microseconds.max(0) as u64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskBasicInfo {
    pub resident_size: u64,
    /// Time accounted to threads that have already terminated.
    pub user_time: TimeValue,
    pub system_time: TimeValue,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreadBasicInfo {
    pub user_time: TimeValue,
    pub system_time: TimeValue,
    pub idle: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VmPageCounts {
    pub wired: u64,
    pub active: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Cumulative per-state CPU ticks since boot, summed over all cores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

impl CpuTicks {
    pub fn total(&self) -> u64 {
        self.user + self.system + self.idle + self.nice
    }
}

/// An open introspection handle on one task.
///
/// Implementations release the underlying kernel port when dropped.
pub trait Task {
    fn basic_info(&self) -> Result<TaskBasicInfo, KernelError>;

    /// Basic info of every thread that answered the query.
    ///
    /// Thread handles acquired for the walk are released before this returns,
    /// whether or not every thread could be queried.
    fn thread_times(&self) -> Result<Vec<ThreadBasicInfo>, KernelError>;
}

pub trait Kernel {
    type Task: Task;

    fn clock_rate(&self) -> Result<u32, KernelError>;
    fn cpu_count(&self) -> Result<u32, KernelError>;
    fn physical_memory_bytes(&self) -> Result<u64, KernelError>;
    fn page_size_bytes(&self) -> Result<u64, KernelError>;

    /// The full process table, in kernel enumeration order.
    fn process_table(&self) -> Result<Vec<KernelProcess>, KernelError>;

    /// Upper bound for one process argument blob.
    fn argument_buffer_size(&self) -> Result<usize, KernelError>;

    /// Fills `buf` with the argument blob of `pid` and returns the number of
    /// bytes the kernel wrote.
    fn process_arguments(&self, pid: i32, buf: &mut [u8]) -> Result<usize, KernelError>;

    fn open_task(&self, pid: i32) -> Result<Self::Task, KernelError>;

    /// Pids of every task visible through the privileged processor-set port.
    fn privileged_task_pids(&self) -> Result<Vec<i32>, KernelError>;

    fn vm_page_counts(&self) -> Result<VmPageCounts, KernelError>;
    fn swap_usage(&self) -> Result<SwapUsage, KernelError>;
    fn cpu_load_ticks(&self) -> Result<CpuTicks, KernelError>;
    fn load_average(&self) -> Result<[f64; 3], KernelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_value_micros() {
        assert_eq!(TimeValue::new(2, 500_000).as_micros(), 2_500_000);
        assert_eq!(TimeValue::new(-1, 10).as_micros(), 10);
    }

    #[test]
    fn tick_total_sums_every_state() {
        let ticks = CpuTicks {
            user: 10,
            system: 20,
            idle: 30,
            nice: 40,
        };
        assert_eq!(ticks.total(), 100);
    }
}
