//! Darwin backend: BSD `sysctl` for the process table and host parameters,
//! Mach calls for task, thread and host statistics.
//!
//! Every port or out-of-line array the kernel hands back is wrapped in a
//! guard that releases it on drop, so early returns cannot leak rights.

// Kernel record layouts declare every field; most are never read.
#![allow(dead_code)]

use std::ffi::CStr;
use std::io;
use std::mem::{self, MaybeUninit};
use std::ptr;

use libc::{
    c_char, c_int, c_void, host_cpu_load_info, integer_t, kern_return_t, mach_msg_type_number_t,
    mach_port_t, mach_task_basic_info, pid_t, size_t, thread_basic_info, time_value_t, timeval,
    vm_statistics, xsw_usage,
};
use tracing::trace;

use crate::error::KernelError;
use crate::system::kernel::{
    CpuTicks, Kernel, KernelProcess, SwapUsage, Task, TaskBasicInfo, ThreadBasicInfo, TimeValue,
    VmPageCounts,
};

// libc has no HOST_VM_INFO_COUNT for the 32-bit statistics flavor.
const HOST_VM_INFO_COUNT: mach_msg_type_number_t =
    (mem::size_of::<vm_statistics>() / mem::size_of::<integer_t>()) as mach_msg_type_number_t;

#[repr(C)]
#[derive(Clone, Copy)]
struct ClockInfo {
    hz: c_int,
    tick: c_int,
    tickadj: c_int,
    stathz: c_int,
    profhz: c_int,
}

/// `struct extern_proc` from sys/proc.h. The leading union is represented
/// by its `p_starttime` member; both members are 16 bytes.
#[repr(C)]
#[derive(Clone, Copy)]
struct ExternProc {
    p_starttime: timeval,
    p_vmspace: *mut c_void,
    p_sigacts: *mut c_void,
    p_flag: c_int,
    p_stat: c_char,
    p_pid: pid_t,
    p_oppid: pid_t,
    p_dupfd: c_int,
    user_stack: *mut c_char,
    exit_thread: *mut c_void,
    p_debugger: c_int,
    sigwait: c_int,
    p_estcpu: u32,
    p_cpticks: c_int,
    p_pctcpu: u32,
    p_wchan: *mut c_void,
    p_wmesg: *mut c_char,
    p_swtime: u32,
    p_slptime: u32,
    p_realtimer: [timeval; 2],
    p_rtime: timeval,
    p_uticks: u64,
    p_sticks: u64,
    p_iticks: u64,
    p_traceflag: c_int,
    p_tracep: *mut c_void,
    p_siglist: c_int,
    p_textvp: *mut c_void,
    p_holdcnt: c_int,
    p_sigmask: u32,
    p_sigignore: u32,
    p_sigcatch: u32,
    p_priority: u8,
    p_usrpri: u8,
    p_nice: c_char,
    p_comm: [c_char; libc::MAXCOMLEN + 1],
    p_pgrp: *mut c_void,
    p_addr: *mut c_void,
    p_xstat: u16,
    p_acflag: u16,
    p_ru: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Pcred {
    pc_lock: [c_char; 72],
    pc_ucred: *mut c_void,
    p_ruid: u32,
    p_svuid: u32,
    p_rgid: u32,
    p_svgid: u32,
    p_refcnt: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Ucred {
    cr_ref: i32,
    cr_uid: u32,
    cr_ngroups: i16,
    cr_groups: [u32; 16],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Vmspace {
    dummy: i32,
    dummy2: *mut c_char,
    dummy3: [i32; 5],
    dummy4: [*mut c_char; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Eproc {
    e_paddr: *mut c_void,
    e_sess: *mut c_void,
    e_pcred: Pcred,
    e_ucred: Ucred,
    e_vm: Vmspace,
    e_ppid: pid_t,
    e_pgid: pid_t,
    e_jobc: i16,
    e_tdev: i32,
    e_tpgid: pid_t,
    e_tsess: *mut c_void,
    e_wmesg: [c_char; 8],
    e_xsize: i32,
    e_xrssize: i16,
    e_xccount: i16,
    e_xswrss: i16,
    e_flag: i32,
    e_login: [c_char; 12],
    e_spare: [i32; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct KinfoProc {
    kp_proc: ExternProc,
    kp_eproc: Eproc,
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(mem::size_of::<KinfoProc>() == 648);

impl From<time_value_t> for TimeValue {
    fn from(raw: time_value_t) -> Self {
        TimeValue::new(raw.seconds, raw.microseconds)
    }
}

// Not in libc, or only behind its deprecated Mach bindings.
unsafe extern "C" {
    static mach_task_self_: mach_port_t;

    fn mach_host_self() -> mach_port_t;
    fn mach_port_deallocate(task: mach_port_t, name: mach_port_t) -> kern_return_t;
    fn pid_for_task(task: mach_port_t, pid: *mut c_int) -> kern_return_t;
    fn processor_set_default(host: mach_port_t, default_set: *mut mach_port_t) -> kern_return_t;
    fn host_processor_set_priv(
        host_priv: mach_port_t,
        set_name: mach_port_t,
        set: *mut mach_port_t,
    ) -> kern_return_t;
    fn processor_set_tasks(
        processor_set: mach_port_t,
        task_list: *mut *mut mach_port_t,
        task_count: *mut mach_msg_type_number_t,
    ) -> kern_return_t;
}

fn mach_task_self() -> mach_port_t {
    // SAFETY: initialised by libSystem before main and never written after.
    unsafe { mach_task_self_ }
}

/// Zeroed storage for a plain-integer kernel record.
fn zeroed<T: Copy>() -> T {
    // SAFETY: only instantiated with libc/kernel structs of integer fields,
    // for which all-zero is a valid value.
    unsafe { MaybeUninit::<T>::zeroed().assume_init() }
}

fn mach_error(what: &'static str, code: kern_return_t) -> KernelError {
    // SAFETY: mach_error_string returns a static NUL-terminated string for any code.
    let message = unsafe { CStr::from_ptr(libc::mach_error_string(code)) }
        .to_string_lossy()
        .into_owned();
    KernelError::mach(what, code, message)
}

fn sysctl_error(what: &'static str) -> KernelError {
    KernelError::Sysctl {
        what,
        source: io::Error::last_os_error(),
    }
}

/// A send right owned by this process, released on drop.
struct Port(mach_port_t);

impl Drop for Port {
    fn drop(&mut self) {
        // SAFETY: the right was handed to us by the kernel and is released once.
        unsafe {
            mach_port_deallocate(mach_task_self(), self.0);
        }
    }
}

/// An out-of-line array of send rights (threads or tasks). Drop releases
/// every right, then the array's memory.
struct PortArray {
    ptr: *mut mach_port_t,
    len: mach_msg_type_number_t,
}

impl PortArray {
    fn as_slice(&self) -> &[mach_port_t] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: the kernel returned `len` contiguous ports at `ptr`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len as usize) }
    }
}

impl Drop for PortArray {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        let task = mach_task_self();
        for &port in self.as_slice() {
            // SAFETY: each entry is a right we own.
            unsafe {
                mach_port_deallocate(task, port);
            }
        }
        // SAFETY: the array was vm_allocated into our address space by the kernel.
        unsafe {
            libc::vm_deallocate(
                task,
                self.ptr as libc::vm_address_t,
                self.len as usize * mem::size_of::<mach_port_t>(),
            );
        }
    }
}

/// Reads a fixed-size value from a sysctl MIB.
fn sysctl_value<T: Copy>(what: &'static str, mib: &[c_int]) -> Result<T, KernelError> {
    let mut value: T = zeroed();
    let mut size = mem::size_of::<T>() as size_t;
    // SAFETY: `value` provides `size` writable bytes.
    let ret = unsafe {
        libc::sysctl(
            mib.as_ptr() as *mut c_int,
            mib.len() as u32,
            &mut value as *mut T as *mut c_void,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if ret == -1 {
        return Err(sysctl_error(what));
    }
    Ok(value)
}

/// Reads an integer sysctl the kernel may report as either 32 or 64 bits.
fn sysctl_number(what: &'static str, mib: &[c_int]) -> Result<u64, KernelError> {
    let mut raw = [0u8; 8];
    let mut size = raw.len() as size_t;
    // SAFETY: `raw` provides `size` writable bytes.
    let ret = unsafe {
        libc::sysctl(
            mib.as_ptr() as *mut c_int,
            mib.len() as u32,
            raw.as_mut_ptr() as *mut c_void,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if ret == -1 {
        return Err(sysctl_error(what));
    }
    match size {
        4 => Ok(u64::from(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))),
        8 => Ok(u64::from_ne_bytes(raw)),
        n => Err(KernelError::malformed(what, format!("unexpected size {n}"))),
    }
}

fn comm_to_string(comm: &[c_char]) -> String {
    let bytes: Vec<u8> = comm
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn decode_process(kp: &KinfoProc) -> KernelProcess {
    KernelProcess {
        pid: kp.kp_proc.p_pid,
        ppid: kp.kp_eproc.e_ppid,
        real_uid: kp.kp_eproc.e_pcred.p_ruid,
        effective_uid: kp.kp_eproc.e_ucred.cr_uid,
        real_gid: kp.kp_eproc.e_pcred.p_rgid,
        start_time: kp.kp_proc.p_starttime.tv_sec,
        name: comm_to_string(&kp.kp_proc.p_comm),
        zombie: kp.kp_proc.p_stat as u32 == libc::SZOMB,
    }
}

/// The local Darwin kernel.
pub struct Darwin {
    host: Port,
}

impl Default for Darwin {
    fn default() -> Self {
        Self::new()
    }
}

impl Darwin {
    pub fn new() -> Self {
        // SAFETY: no preconditions; returns a send right we release on drop.
        Darwin {
            host: Port(unsafe { mach_host_self() }),
        }
    }

    fn host_info<T: Copy>(
        &self,
        flavor: libc::host_flavor_t,
        mut count: mach_msg_type_number_t,
        what: &'static str,
    ) -> Result<T, KernelError> {
        let mut info: T = zeroed();
        // SAFETY: `info` is at least `count` integer_t units long.
        let kr = unsafe {
            libc::host_statistics(
                self.host.0,
                flavor,
                &mut info as *mut T as libc::host_info_t,
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error(what, kr));
        }
        Ok(info)
    }
}

pub struct DarwinTask {
    port: Port,
}

impl Task for DarwinTask {
    fn basic_info(&self) -> Result<TaskBasicInfo, KernelError> {
        let mut raw: mach_task_basic_info = zeroed();
        let mut count = libc::MACH_TASK_BASIC_INFO_COUNT;
        // SAFETY: `raw` is `count` natural_t units long.
        let kr = unsafe {
            libc::task_info(
                self.port.0,
                libc::MACH_TASK_BASIC_INFO,
                &mut raw as *mut mach_task_basic_info as libc::task_info_t,
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("task_info", kr));
        }
        let (resident_size, user_time, system_time) =
            (raw.resident_size, raw.user_time, raw.system_time);
        Ok(TaskBasicInfo {
            resident_size,
            user_time: user_time.into(),
            system_time: system_time.into(),
        })
    }

    fn thread_times(&self) -> Result<Vec<ThreadBasicInfo>, KernelError> {
        let mut list: libc::thread_act_array_t = ptr::null_mut();
        let mut len: mach_msg_type_number_t = 0;
        // SAFETY: out-pointers are valid; ownership of the array passes to `threads`.
        let kr = unsafe { libc::task_threads(self.port.0, &mut list, &mut len) };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("task_threads", kr));
        }
        let threads = PortArray { ptr: list, len };

        let mut out = Vec::with_capacity(len as usize);
        for &thread in threads.as_slice() {
            let mut raw: thread_basic_info = zeroed();
            let mut count = libc::THREAD_BASIC_INFO_COUNT;
            // SAFETY: `raw` is `count` integer_t units long.
            let kr = unsafe {
                libc::thread_info(
                    thread,
                    libc::THREAD_BASIC_INFO as libc::thread_flavor_t,
                    &mut raw as *mut thread_basic_info as libc::thread_info_t,
                    &mut count,
                )
            };
            if kr != libc::KERN_SUCCESS {
                trace!(code = kr, "thread_info failed");
                continue;
            }
            let (user_time, system_time, flags) = (raw.user_time, raw.system_time, raw.flags);
            out.push(ThreadBasicInfo {
                user_time: user_time.into(),
                system_time: system_time.into(),
                idle: flags & libc::TH_FLAGS_IDLE != 0,
            });
        }
        Ok(out)
    }
}

impl Kernel for Darwin {
    type Task = DarwinTask;

    fn clock_rate(&self) -> Result<u32, KernelError> {
        let clock: ClockInfo =
            sysctl_value("kern.clockrate", &[libc::CTL_KERN, libc::KERN_CLOCKRATE])?;
        Ok(clock.hz.max(0) as u32)
    }

    fn cpu_count(&self) -> Result<u32, KernelError> {
        Ok(sysctl_number("hw.ncpu", &[libc::CTL_HW, libc::HW_NCPU])? as u32)
    }

    fn physical_memory_bytes(&self) -> Result<u64, KernelError> {
        sysctl_number("hw.memsize", &[libc::CTL_HW, libc::HW_MEMSIZE])
    }

    fn page_size_bytes(&self) -> Result<u64, KernelError> {
        sysctl_number("hw.pagesize", &[libc::CTL_HW, libc::HW_PAGESIZE])
    }

    fn process_table(&self) -> Result<Vec<KernelProcess>, KernelError> {
        let mut mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_ALL, 0];
        let record = mem::size_of::<KinfoProc>();

        let mut size: size_t = 0;
        // SAFETY: a null buffer asks only for the required size.
        let ret = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as u32,
                ptr::null_mut(),
                &mut size,
                ptr::null_mut(),
                0,
            )
        };
        if ret == -1 {
            return Err(sysctl_error("kern.proc.all"));
        }

        // Headroom for processes spawned between the two calls.
        let capacity = size / record + size / record / 8 + 16;
        let mut table: Vec<KinfoProc> = Vec::with_capacity(capacity);
        let mut size = capacity * record;
        // SAFETY: the buffer holds `size` bytes of uninitialised KinfoProc slots.
        let ret = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as u32,
                table.as_mut_ptr() as *mut c_void,
                &mut size,
                ptr::null_mut(),
                0,
            )
        };
        if ret == -1 {
            return Err(sysctl_error("kern.proc.all"));
        }
        // SAFETY: the kernel initialised `size` bytes of whole records.
        unsafe { table.set_len((size / record).min(capacity)) };

        Ok(table.iter().map(decode_process).collect())
    }

    fn argument_buffer_size(&self) -> Result<usize, KernelError> {
        Ok(sysctl_number("kern.argmax", &[libc::CTL_KERN, libc::KERN_ARGMAX])? as usize)
    }

    fn process_arguments(&self, pid: i32, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut mib = [libc::CTL_KERN, libc::KERN_PROCARGS2, pid];
        let mut size = buf.len() as size_t;
        // SAFETY: `buf` provides `size` writable bytes.
        let ret = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                mib.len() as u32,
                buf.as_mut_ptr() as *mut c_void,
                &mut size,
                ptr::null_mut(),
                0,
            )
        };
        if ret == -1 {
            return Err(sysctl_error("kern.procargs2"));
        }
        Ok(size.min(buf.len()))
    }

    fn open_task(&self, pid: i32) -> Result<DarwinTask, KernelError> {
        let mut port: mach_port_t = 0;
        // SAFETY: out-pointer is valid; the returned right is owned by DarwinTask.
        let kr = unsafe { libc::task_for_pid(mach_task_self(), pid, &mut port) };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("task_for_pid", kr));
        }
        Ok(DarwinTask { port: Port(port) })
    }

    fn privileged_task_pids(&self) -> Result<Vec<i32>, KernelError> {
        let mut name: mach_port_t = 0;
        // SAFETY: out-pointer is valid.
        let kr = unsafe { processor_set_default(self.host.0, &mut name) };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("processor_set_default", kr));
        }
        let name = Port(name);

        let mut control: mach_port_t = 0;
        // SAFETY: out-pointer is valid. Fails unless we hold the host_priv port.
        let kr = unsafe { host_processor_set_priv(self.host.0, name.0, &mut control) };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("host_processor_set_priv", kr));
        }
        let control = Port(control);

        let mut list: *mut mach_port_t = ptr::null_mut();
        let mut len: mach_msg_type_number_t = 0;
        // SAFETY: out-pointers are valid; ownership of the array passes to `tasks`.
        let kr = unsafe { processor_set_tasks(control.0, &mut list, &mut len) };
        if kr != libc::KERN_SUCCESS {
            return Err(mach_error("processor_set_tasks", kr));
        }
        let tasks = PortArray { ptr: list, len };

        let mut pids = Vec::with_capacity(len as usize);
        for &task in tasks.as_slice() {
            let mut pid: c_int = -1;
            // SAFETY: out-pointer is valid.
            if unsafe { pid_for_task(task, &mut pid) } == libc::KERN_SUCCESS {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn vm_page_counts(&self) -> Result<VmPageCounts, KernelError> {
        let stats: vm_statistics = self.host_info(
            libc::HOST_VM_INFO,
            HOST_VM_INFO_COUNT,
            "host_statistics(HOST_VM_INFO)",
        )?;
        Ok(VmPageCounts {
            wired: u64::from(stats.wire_count),
            active: u64::from(stats.active_count),
        })
    }

    fn swap_usage(&self) -> Result<SwapUsage, KernelError> {
        let swap: xsw_usage = sysctl_value("vm.swapusage", &[libc::CTL_VM, libc::VM_SWAPUSAGE])?;
        Ok(SwapUsage {
            total_bytes: swap.xsu_total,
            used_bytes: swap.xsu_used,
        })
    }

    fn cpu_load_ticks(&self) -> Result<CpuTicks, KernelError> {
        let load: host_cpu_load_info = self.host_info(
            libc::HOST_CPU_LOAD_INFO,
            libc::HOST_CPU_LOAD_INFO_COUNT,
            "host_statistics(HOST_CPU_LOAD_INFO)",
        )?;
        let ticks = |state: c_int| u64::from(load.cpu_ticks[state as usize]);
        Ok(CpuTicks {
            user: ticks(libc::CPU_STATE_USER),
            system: ticks(libc::CPU_STATE_SYSTEM),
            idle: ticks(libc::CPU_STATE_IDLE),
            nice: ticks(libc::CPU_STATE_NICE),
        })
    }

    fn load_average(&self) -> Result<[f64; 3], KernelError> {
        let mut load = [0.0f64; 3];
        // SAFETY: `load` holds three doubles.
        let n = unsafe { libc::getloadavg(load.as_mut_ptr(), 3) };
        if n < 1 {
            return Err(KernelError::malformed("getloadavg", "no samples returned"));
        }
        Ok(load)
    }
}
