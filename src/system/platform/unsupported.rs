use crate::error::KernelError;
use crate::system::kernel::{
    CpuTicks, Kernel, KernelProcess, SwapUsage, Task, TaskBasicInfo, ThreadBasicInfo,
    VmPageCounts,
};

/// Placeholder backend for targets without a sampler. It has no values, so
/// `native()` can never hand one out.
pub enum Unsupported {}

impl Task for Unsupported {
    fn basic_info(&self) -> Result<TaskBasicInfo, KernelError> {
        match *self {}
    }

    fn thread_times(&self) -> Result<Vec<ThreadBasicInfo>, KernelError> {
        match *self {}
    }
}

impl Kernel for Unsupported {
    type Task = Unsupported;

    fn clock_rate(&self) -> Result<u32, KernelError> {
        match *self {}
    }

    fn cpu_count(&self) -> Result<u32, KernelError> {
        match *self {}
    }

    fn physical_memory_bytes(&self) -> Result<u64, KernelError> {
        match *self {}
    }

    fn page_size_bytes(&self) -> Result<u64, KernelError> {
        match *self {}
    }

    fn process_table(&self) -> Result<Vec<KernelProcess>, KernelError> {
        match *self {}
    }

    fn argument_buffer_size(&self) -> Result<usize, KernelError> {
        match *self {}
    }

    fn process_arguments(&self, _pid: i32, _buf: &mut [u8]) -> Result<usize, KernelError> {
        match *self {}
    }

    fn open_task(&self, _pid: i32) -> Result<Unsupported, KernelError> {
        match *self {}
    }

    fn privileged_task_pids(&self) -> Result<Vec<i32>, KernelError> {
        match *self {}
    }

    fn vm_page_counts(&self) -> Result<VmPageCounts, KernelError> {
        match *self {}
    }

    fn swap_usage(&self) -> Result<SwapUsage, KernelError> {
        match *self {}
    }

    fn cpu_load_ticks(&self) -> Result<CpuTicks, KernelError> {
        match *self {}
    }

    fn load_average(&self) -> Result<[f64; 3], KernelError> {
        match *self {}
    }
}
