use tracing::debug;

use super::host::HostInfo;
use super::kernel::{CpuTicks, Kernel};
use super::snapshot::SystemUsage;
use crate::error::SampleError;

/// Tick counters carried from one CPU sample to the next.
///
/// Owned by the sampling loop and handed to [`SystemSampler::sample_cpu`];
/// only one sampler may advance it at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuHistory {
    pub previous_total: u64,
    pub previous_user: u64,
    pub previous_system: u64,
}

/// User and system CPU shares in tenths of a percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuShare {
    pub user: Option<u32>,
    pub system: Option<u32>,
}

impl CpuHistory {
    /// Computes the shares since the previous reading and stores `ticks` as
    /// the new baseline. The first reading, or an interval that did not move
    /// forward, yields `None` for both shares.
    pub fn advance(&mut self, ticks: CpuTicks) -> CpuShare {
        let total = ticks.total();
        let interval = total as i64 - self.previous_total as i64;

        let share = if self.previous_total > 0 && interval > 0 {
            CpuShare {
                user: Some(per_mille(ticks.user as i64 - self.previous_user as i64, interval)),
                system: Some(per_mille(
                    ticks.system as i64 - self.previous_system as i64,
                    interval,
                )),
            }
        } else {
            CpuShare::default()
        };

        self.previous_total = total;
        self.previous_user = ticks.user;
        self.previous_system = ticks.system;
        share
    }
}

fn per_mille(state_delta: i64, interval: i64) -> u32 {
    (1000 * state_delta.max(0) / interval).min(1000) as u32
}

/// Samples host-wide memory, swap, CPU and load.
///
/// Each operation reports its own failure and leaves the other metrics alone.
pub struct SystemSampler<'k, K: Kernel> {
    kernel: &'k K,
    host: HostInfo,
}

impl<'k, K: Kernel> SystemSampler<'k, K> {
    pub fn new(kernel: &'k K, host: HostInfo) -> Self {
        SystemSampler { kernel, host }
    }

    /// Used memory is wired + active pages. A failed page-count query leaves
    /// `usage` untouched; a failed swap query zeros only the swap fields.
    pub fn sample_memory(&self, usage: &mut SystemUsage) -> Result<(), SampleError> {
        let _span = tracing::debug_span!("sampler.memory").entered();

        let pages = self
            .kernel
            .vm_page_counts()
            .map_err(SampleError::MemoryStatistics)?;
        usage.memory_used_kib = (pages.wired + pages.active) * self.host.page_size_kib;

        self.sample_swap(usage)
    }

    pub fn sample_swap(&self, usage: &mut SystemUsage) -> Result<(), SampleError> {
        match self.kernel.swap_usage() {
            Ok(swap) => {
                usage.swap_total_kib = swap.total_bytes / 1024;
                usage.swap_used_kib = swap.used_bytes / 1024;
                Ok(())
            }
            Err(err) => {
                usage.swap_total_kib = 0;
                usage.swap_used_kib = 0;
                Err(SampleError::SwapUsage(err))
            }
        }
    }

    pub fn sample_cpu(
        &self,
        history: &mut CpuHistory,
        usage: &mut SystemUsage,
    ) -> Result<(), SampleError> {
        let _span = tracing::debug_span!("sampler.cpu").entered();

        let ticks = self
            .kernel
            .cpu_load_ticks()
            .map_err(SampleError::CpuLoad)?;
        let share = history.advance(ticks);
        if share.user.is_none() {
            debug!(total_ticks = ticks.total(), "cpu share not computable yet");
        }

        usage.cpu_user_per_mille = share.user;
        usage.cpu_system_per_mille = share.system;
        usage.cpu_wait_per_mille = 0;
        Ok(())
    }

    /// 1, 5 and 15 minute load averages; zeroed on failure.
    pub fn sample_load(&self, usage: &mut SystemUsage) -> Result<(), SampleError> {
        match self.kernel.load_average() {
            Ok(load) => {
                usage.load_average = load;
                Ok(())
            }
            Err(err) => {
                usage.load_average = [0.0; 3];
                Err(SampleError::LoadAverage(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(user: u64, system: u64, idle: u64) -> CpuTicks {
        CpuTicks {
            user,
            system,
            idle,
            nice: 0,
        }
    }

    #[test]
    fn first_reading_is_not_computable() {
        let mut history = CpuHistory::default();
        let share = history.advance(ticks(500, 200, 300));
        assert_eq!(share, CpuShare::default());
        assert_eq!(history.previous_total, 1000);
    }

    #[test]
    fn shares_are_per_mille_of_the_interval() {
        let mut history = CpuHistory::default();
        history.advance(ticks(500, 200, 300));
        let share = history.advance(ticks(750, 300, 950));
        assert_eq!(share.user, Some(250));
        assert_eq!(share.system, Some(100));
    }

    #[test]
    fn stalled_counters_reset_the_baseline() {
        let mut history = CpuHistory::default();
        history.advance(ticks(500, 200, 300));
        assert_eq!(history.advance(ticks(500, 200, 300)), CpuShare::default());
        // Counters went backwards; the next interval is measured from here.
        assert_eq!(history.advance(ticks(100, 100, 100)), CpuShare::default());
        assert_eq!(history.previous_total, 300);
        let share = history.advance(ticks(200, 100, 100));
        assert_eq!(share.user, Some(1000));
        assert_eq!(share.system, Some(0));
    }
}
