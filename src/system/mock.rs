//! Scripted [`Kernel`] for tests and benchmarks.
//!
//! Every query can be made to fail, and open task/thread handles are counted
//! so callers can assert nothing is leaked across sampling cycles.
//!
//! ```ignore
//! use procsnap::system::mock::{MockKernel, process};
//!
//! let kernel = MockKernel::new()
//!     .with_process(process(1, 0, "launchd"))
//!     .with_arguments(1, &["/sbin/launchd"]);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::kernel::{
    CpuTicks, Kernel, KernelProcess, SwapUsage, Task, TaskBasicInfo, ThreadBasicInfo, TimeValue,
    VmPageCounts,
};
use crate::error::KernelError;

/// A query that can be scripted to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Failure {
    ClockRate,
    CpuCount,
    PhysicalMemory,
    PageSize,
    ProcessTable,
    ArgumentBufferSize,
    PrivilegedTasks,
    VmStatistics,
    SwapUsage,
    CpuLoad,
    LoadAverage,
}

/// What an opened task answers. `None` makes the corresponding query fail;
/// a `None` thread entry makes only that thread's query fail.
#[derive(Clone, Debug, Default)]
pub struct TaskScript {
    pub basic: Option<TaskBasicInfo>,
    pub threads: Option<Vec<Option<ThreadBasicInfo>>>,
}

#[derive(Debug, Default)]
struct Handles {
    live_tasks: Cell<usize>,
    live_threads: Cell<usize>,
    tasks_opened: Cell<usize>,
}

pub struct MockKernel {
    clock_rate: u32,
    cpu_count: u32,
    physical_memory: u64,
    page_size: u64,
    processes: Vec<KernelProcess>,
    arguments: HashMap<i32, Vec<u8>>,
    arg_max: usize,
    tasks: HashMap<i32, TaskScript>,
    privileged_pids: Vec<i32>,
    vm: VmPageCounts,
    swap: SwapUsage,
    cpu_ticks: RefCell<VecDeque<CpuTicks>>,
    load: [f64; 3],
    failures: RefCell<HashSet<Failure>>,
    handles: Rc<Handles>,
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

/// A live process entry with the given identity and default ownership.
pub fn process(pid: i32, ppid: i32, name: &str) -> KernelProcess {
    KernelProcess {
        pid,
        ppid,
        real_uid: 501,
        effective_uid: 501,
        real_gid: 20,
        start_time: 1_700_000_000 + i64::from(pid),
        name: name.to_string(),
        zombie: false,
    }
}

/// Thread info with the given user/system centiseconds.
pub fn thread(user_cs: i32, system_cs: i32, idle: bool) -> ThreadBasicInfo {
    ThreadBasicInfo {
        user_time: centis(user_cs),
        system_time: centis(system_cs),
        idle,
    }
}

/// Task info with the given resident size and user/system centiseconds.
pub fn task(resident_bytes: u64, user_cs: i32, system_cs: i32) -> TaskBasicInfo {
    TaskBasicInfo {
        resident_size: resident_bytes,
        user_time: centis(user_cs),
        system_time: centis(system_cs),
    }
}

fn centis(cs: i32) -> TimeValue {
    TimeValue::new(cs / 100, (cs % 100) * 10_000)
}

/// Encodes `argv` as a `KERN_PROCARGS2` blob, with `argv[0]` doubling as the
/// executable path and a few bytes of padding after it.
pub fn argument_blob(argv: &[&str]) -> Vec<u8> {
    let mut out = (argv.len() as i32).to_ne_bytes().to_vec();
    out.extend_from_slice(argv.first().copied().unwrap_or_default().as_bytes());
    out.extend_from_slice(&[0, 0, 0]);
    for arg in argv {
        out.extend_from_slice(arg.as_bytes());
        out.push(0);
    }
    out.extend_from_slice(b"PATH=/usr/bin:/bin\0");
    out
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            clock_rate: 100,
            cpu_count: 4,
            physical_memory: 8 * 1024 * 1024 * 1024,
            page_size: 4096,
            processes: Vec::new(),
            arguments: HashMap::new(),
            arg_max: 4096,
            tasks: HashMap::new(),
            privileged_pids: vec![0, 1],
            vm: VmPageCounts::default(),
            swap: SwapUsage::default(),
            cpu_ticks: RefCell::new(VecDeque::new()),
            load: [0.0; 3],
            failures: RefCell::new(HashSet::new()),
            handles: Rc::new(Handles::default()),
        }
    }

    pub fn with_host(
        mut self,
        clock_rate: u32,
        cpus: u32,
        memory_bytes: u64,
        page_bytes: u64,
    ) -> Self {
        self.clock_rate = clock_rate;
        self.cpu_count = cpus;
        self.physical_memory = memory_bytes;
        self.page_size = page_bytes;
        self
    }

    pub fn with_process(mut self, process: KernelProcess) -> Self {
        self.processes.push(process);
        self
    }

    pub fn with_arguments(self, pid: i32, argv: &[&str]) -> Self {
        self.with_raw_arguments(pid, argument_blob(argv))
    }

    pub fn with_raw_arguments(mut self, pid: i32, blob: Vec<u8>) -> Self {
        self.arguments.insert(pid, blob);
        self
    }

    pub fn with_arg_max(mut self, arg_max: usize) -> Self {
        self.arg_max = arg_max;
        self
    }

    pub fn with_task(
        self,
        pid: i32,
        basic: TaskBasicInfo,
        threads: Vec<ThreadBasicInfo>,
    ) -> Self {
        self.with_task_script(
            pid,
            TaskScript {
                basic: Some(basic),
                threads: Some(threads.into_iter().map(Some).collect()),
            },
        )
    }

    pub fn with_task_script(mut self, pid: i32, script: TaskScript) -> Self {
        self.tasks.insert(pid, script);
        self
    }

    pub fn with_privileged_pids(mut self, pids: Vec<i32>) -> Self {
        self.privileged_pids = pids;
        self
    }

    pub fn with_vm(mut self, wired: u64, active: u64) -> Self {
        self.vm = VmPageCounts { wired, active };
        self
    }

    pub fn with_swap(mut self, total_bytes: u64, used_bytes: u64) -> Self {
        self.swap = SwapUsage {
            total_bytes,
            used_bytes,
        };
        self
    }

    pub fn with_load(mut self, load: [f64; 3]) -> Self {
        self.load = load;
        self
    }

    pub fn failing(self, failure: Failure) -> Self {
        self.fail(failure);
        self
    }

    pub fn fail(&self, failure: Failure) {
        self.failures.borrow_mut().insert(failure);
    }

    pub fn recover(&self, failure: Failure) {
        self.failures.borrow_mut().remove(&failure);
    }

    /// Queues the next CPU tick reading. The last queued reading repeats once
    /// the queue is drained.
    pub fn push_cpu_ticks(&self, ticks: CpuTicks) {
        self.cpu_ticks.borrow_mut().push_back(ticks);
    }

    pub fn live_tasks(&self) -> usize {
        self.handles.live_tasks.get()
    }

    pub fn live_threads(&self) -> usize {
        self.handles.live_threads.get()
    }

    pub fn tasks_opened(&self) -> usize {
        self.handles.tasks_opened.get()
    }

    fn check(&self, failure: Failure, what: &'static str) -> Result<(), KernelError> {
        if self.failures.borrow().contains(&failure) {
            Err(KernelError::mach(what, 5, "(os/kern) failure"))
        } else {
            Ok(())
        }
    }
}

pub struct MockTask {
    script: TaskScript,
    handles: Rc<Handles>,
}

impl Drop for MockTask {
    fn drop(&mut self) {
        self.handles
            .live_tasks
            .set(self.handles.live_tasks.get() - 1);
    }
}

/// Stands in for a thread port array; releases every entry on drop.
struct MockThreadList {
    count: usize,
    handles: Rc<Handles>,
}

impl Drop for MockThreadList {
    fn drop(&mut self) {
        self.handles
            .live_threads
            .set(self.handles.live_threads.get() - self.count);
    }
}

impl Task for MockTask {
    fn basic_info(&self) -> Result<TaskBasicInfo, KernelError> {
        self.script
            .basic
            .ok_or_else(|| KernelError::mach("task_info", 4, "(os/kern) invalid argument"))
    }

    fn thread_times(&self) -> Result<Vec<ThreadBasicInfo>, KernelError> {
        let threads = self
            .script
            .threads
            .as_ref()
            .ok_or_else(|| KernelError::mach("task_threads", 4, "(os/kern) invalid argument"))?;
        self.handles
            .live_threads
            .set(self.handles.live_threads.get() + threads.len());
        let _list = MockThreadList {
            count: threads.len(),
            handles: Rc::clone(&self.handles),
        };
        Ok(threads.iter().flatten().copied().collect())
    }
}

impl Kernel for MockKernel {
    type Task = MockTask;

    fn clock_rate(&self) -> Result<u32, KernelError> {
        self.check(Failure::ClockRate, "kern.clockrate")?;
        Ok(self.clock_rate)
    }

    fn cpu_count(&self) -> Result<u32, KernelError> {
        self.check(Failure::CpuCount, "hw.ncpu")?;
        Ok(self.cpu_count)
    }

    fn physical_memory_bytes(&self) -> Result<u64, KernelError> {
        self.check(Failure::PhysicalMemory, "hw.memsize")?;
        Ok(self.physical_memory)
    }

    fn page_size_bytes(&self) -> Result<u64, KernelError> {
        self.check(Failure::PageSize, "hw.pagesize")?;
        Ok(self.page_size)
    }

    fn process_table(&self) -> Result<Vec<KernelProcess>, KernelError> {
        self.check(Failure::ProcessTable, "kern.proc.all")?;
        Ok(self.processes.clone())
    }

    fn argument_buffer_size(&self) -> Result<usize, KernelError> {
        self.check(Failure::ArgumentBufferSize, "kern.argmax")?;
        Ok(self.arg_max)
    }

    fn process_arguments(&self, pid: i32, buf: &mut [u8]) -> Result<usize, KernelError> {
        let blob = self.arguments.get(&pid).ok_or_else(|| KernelError::Sysctl {
            what: "kern.procargs2",
            source: std::io::Error::from_raw_os_error(22),
        })?;
        let len = blob.len().min(buf.len());
        buf[..len].copy_from_slice(&blob[..len]);
        Ok(len)
    }

    fn open_task(&self, pid: i32) -> Result<MockTask, KernelError> {
        let script = self
            .tasks
            .get(&pid)
            .cloned()
            .ok_or_else(|| KernelError::mach("task_for_pid", 5, "(os/kern) failure"))?;
        self.handles.live_tasks.set(self.handles.live_tasks.get() + 1);
        self.handles
            .tasks_opened
            .set(self.handles.tasks_opened.get() + 1);
        Ok(MockTask {
            script,
            handles: Rc::clone(&self.handles),
        })
    }

    fn privileged_task_pids(&self) -> Result<Vec<i32>, KernelError> {
        self.check(Failure::PrivilegedTasks, "host_processor_set_priv")?;
        Ok(self.privileged_pids.clone())
    }

    fn vm_page_counts(&self) -> Result<VmPageCounts, KernelError> {
        self.check(Failure::VmStatistics, "host_statistics")?;
        Ok(self.vm)
    }

    fn swap_usage(&self) -> Result<SwapUsage, KernelError> {
        self.check(Failure::SwapUsage, "vm.swapusage")?;
        Ok(self.swap)
    }

    fn cpu_load_ticks(&self) -> Result<CpuTicks, KernelError> {
        self.check(Failure::CpuLoad, "host_statistics")?;
        let mut queue = self.cpu_ticks.borrow_mut();
        let ticks = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(ticks.unwrap_or_default())
    }

    fn load_average(&self) -> Result<[f64; 3], KernelError> {
        self.check(Failure::LoadAverage, "getloadavg")?;
        Ok(self.load)
    }
}
