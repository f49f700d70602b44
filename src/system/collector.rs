use std::time::Instant;

use tracing::{debug, trace, warn};

use super::args::reconstruct_command_line;
use super::host::HostInfo;
use super::kernel::{Kernel, KernelProcess, Task};
use super::process::{ProcessRecord, ProcessTree};
use crate::error::SampleError;

/// Resident memory and CPU time read from one task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskUsage {
    pub resident_memory_kib: u64,
    pub cpu_time_centiseconds: u64,
}

/// Builds full process snapshots from the kernel process table.
pub struct Collector<'k, K: Kernel> {
    kernel: &'k K,
    host: HostInfo,
}

impl<'k, K: Kernel> Collector<'k, K> {
    pub fn new(kernel: &'k K, host: HostInfo) -> Self {
        Collector { kernel, host }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Enumerates every process. Only a failed process-table or argument-size
    /// query fails the snapshot; per-process problems degrade that record.
    pub fn build_snapshot(&self) -> Result<ProcessTree, SampleError> {
        let _snapshot_span = tracing::debug_span!("collector.build_snapshot").entered();

        let table = self.kernel.process_table().map_err(|err| {
            warn!(error = %err, "process table query failed");
            SampleError::ProcessTable(err)
        })?;
        let arg_max = self.kernel.argument_buffer_size().map_err(|err| {
            warn!(error = %err, "argument buffer size query failed");
            SampleError::ArgumentBuffer(err)
        })?;
        let mut args = vec![0u8; arg_max];

        let processes: Vec<ProcessRecord> = table
            .into_iter()
            .map(|entry| self.build_record(entry, &mut args))
            .collect();

        debug!(
            processes = processes.len(),
            restricted = self.host.security_restricted,
            "process snapshot built"
        );
        Ok(ProcessTree { processes })
    }

    fn build_record(&self, entry: KernelProcess, args: &mut [u8]) -> ProcessRecord {
        let command_line = self.command_line(&entry, args);
        let mut record = ProcessRecord {
            pid: entry.pid,
            ppid: entry.ppid,
            real_uid: entry.real_uid,
            effective_uid: entry.effective_uid,
            real_gid: entry.real_gid,
            start_time: entry.start_time,
            zombie: entry.zombie,
            resident_memory_kib: 0,
            cpu_time_centiseconds: 0,
            cpu_percent: 0.0,
            name: entry.name,
            command_line,
            sampled_at: Instant::now(),
        };
        self.enrich(&mut record);
        record
    }

    fn command_line(&self, entry: &KernelProcess, args: &mut [u8]) -> String {
        let line = match self.kernel.process_arguments(entry.pid, args) {
            Ok(len) => reconstruct_command_line(args, len),
            Err(err) => {
                trace!(pid = entry.pid, error = %err, "process arguments unavailable");
                String::new()
            }
        };
        if line.is_empty() {
            entry.name.clone()
        } else {
            line
        }
    }

    /// One attempt per process. Under restriction the attempt is expected to
    /// be denied, so a denial is only traced; the record keeps its zeroed
    /// resource fields either way.
    fn enrich(&self, record: &mut ProcessRecord) {
        let task = match self.kernel.open_task(record.pid) {
            Ok(task) => task,
            Err(err) => {
                if self.host.security_restricted {
                    trace!(pid = record.pid, error = %err, "task access denied");
                } else {
                    debug!(pid = record.pid, error = %err, "task access denied");
                }
                return;
            }
        };
        let usage = task_usage(&task, record.pid);
        record.resident_memory_kib = usage.resident_memory_kib;
        record.cpu_time_centiseconds = usage.cpu_time_centiseconds;
    }
}

/// Reads resident memory and CPU time from an open task.
///
/// CPU time is the task's own accounted time (terminated threads) plus the
/// time of every live thread not flagged idle. A failed task query leaves
/// memory at zero but still counts the threads, and vice versa.
pub fn task_usage<T: Task>(task: &T, pid: i32) -> TaskUsage {
    let mut resident_memory_kib = 0;
    let mut cpu_micros = 0u64;

    match task.basic_info() {
        Ok(info) => {
            resident_memory_kib = info.resident_size / 1024;
            cpu_micros += info.user_time.as_micros() + info.system_time.as_micros();
        }
        Err(err) => debug!(pid, error = %err, "task info unavailable"),
    }

    match task.thread_times() {
        Ok(threads) => {
            cpu_micros += threads
                .iter()
                .filter(|t| !t.idle)
                .map(|t| t.user_time.as_micros() + t.system_time.as_micros())
                .sum::<u64>();
        }
        Err(err) => debug!(pid, error = %err, "thread list unavailable"),
    }

    TaskUsage {
        resident_memory_kib,
        cpu_time_centiseconds: cpu_micros / 10_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::mock::{Failure, MockKernel, TaskScript, process, task, thread};

    fn host(restricted: bool) -> HostInfo {
        HostInfo {
            clock_ticks_per_second: 100,
            cpu_core_count: 4,
            page_size_kib: 4,
            total_memory_kib: 8 * 1024 * 1024,
            security_restricted: restricted,
        }
    }

    #[test]
    fn idle_threads_are_not_counted() {
        let kernel = MockKernel::new()
            .with_process(process(10, 1, "worker"))
            .with_task(
                10,
                task(4 * 1024 * 1024, 100, 50),
                vec![thread(30, 20, false), thread(500, 500, true)],
            );
        let tree = Collector::new(&kernel, host(false)).build_snapshot().unwrap();
        let record = &tree.processes[0];
        assert_eq!(record.resident_memory_kib, 4096);
        assert_eq!(record.cpu_time_centiseconds, 200);
        assert_eq!(record.cpu_percent, 0.0);
    }

    #[test]
    fn task_info_failure_still_counts_threads() {
        let kernel = MockKernel::new()
            .with_process(process(11, 1, "half"))
            .with_task_script(
                11,
                TaskScript {
                    basic: None,
                    threads: Some(vec![Some(thread(10, 5, false)), None]),
                },
            );
        let tree = Collector::new(&kernel, host(false)).build_snapshot().unwrap();
        assert_eq!(tree.processes[0].resident_memory_kib, 0);
        assert_eq!(tree.processes[0].cpu_time_centiseconds, 15);
        assert_eq!(kernel.live_tasks(), 0);
        assert_eq!(kernel.live_threads(), 0);
    }

    #[test]
    fn thread_list_failure_keeps_task_time() {
        let kernel = MockKernel::new()
            .with_process(process(12, 1, "solo"))
            .with_task_script(
                12,
                TaskScript {
                    basic: Some(task(2048, 7, 3)),
                    threads: None,
                },
            );
        let tree = Collector::new(&kernel, host(false)).build_snapshot().unwrap();
        assert_eq!(tree.processes[0].resident_memory_kib, 2);
        assert_eq!(tree.processes[0].cpu_time_centiseconds, 10);
    }

    #[test]
    fn enrichment_is_attempted_once_per_process() {
        let kernel = MockKernel::new()
            .with_process(process(1, 0, "launchd"))
            .with_process(process(2, 1, "syslogd"))
            .with_task(1, task(0, 0, 0), vec![])
            .with_task(2, task(0, 0, 0), vec![]);
        Collector::new(&kernel, host(true)).build_snapshot().unwrap();
        assert_eq!(kernel.tasks_opened(), 2);
    }

    #[test]
    fn restricted_host_still_reads_tasks_it_can_open() {
        let kernel = MockKernel::new()
            .with_process(process(4242, 1, "helper"))
            .with_task(4242, task(8 * 1024 * 1024, 100, 0), vec![thread(5, 5, false)]);
        let tree = Collector::new(&kernel, host(true)).build_snapshot().unwrap();
        let record = tree.find(4242).unwrap();
        assert_eq!(record.resident_memory_kib, 8192);
        assert_eq!(record.cpu_time_centiseconds, 110);
        assert_eq!(kernel.live_tasks(), 0);
    }

    #[test]
    fn arguments_without_argv_fall_back_to_name() {
        let mut only_executable = 0i32.to_ne_bytes().to_vec();
        only_executable.extend_from_slice(b"/usr/libexec/helperd\0\0\0PATH=/usr/bin\0");
        let kernel = MockKernel::new()
            .with_process(process(20, 1, "helperd"))
            .with_process(process(21, 1, "blank"))
            .with_raw_arguments(20, only_executable)
            .with_raw_arguments(21, 0i32.to_ne_bytes().to_vec());
        let tree = Collector::new(&kernel, host(false)).build_snapshot().unwrap();
        assert_eq!(tree.find(20).unwrap().command_line, "helperd");
        assert_eq!(tree.find(21).unwrap().command_line, "blank");
    }

    #[test]
    fn argument_buffer_failure_is_fatal() {
        let kernel = MockKernel::new()
            .with_process(process(1, 0, "launchd"))
            .failing(Failure::ArgumentBufferSize);
        let err = Collector::new(&kernel, host(false)).build_snapshot().unwrap_err();
        assert!(matches!(err, SampleError::ArgumentBuffer(_)));
    }

    #[test]
    fn zombie_flag_and_name_fallback() {
        let mut zombie = process(99, 1, "defunct");
        zombie.zombie = true;
        let kernel = MockKernel::new().with_process(zombie);
        let tree = Collector::new(&kernel, host(false)).build_snapshot().unwrap();
        assert!(tree.processes[0].zombie);
        assert_eq!(tree.processes[0].command_line, "defunct");
    }
}
