use std::fmt::Write;

use crate::config::{OutputConfig, SortKey};
use crate::format::{format_centiseconds, format_kib, format_per_mille, truncate_unicode};
use crate::system::process::ProcessRecord;
use crate::system::snapshot::SystemSnapshot;

/// The `top` records of `snapshot` ordered by `sort`. CPU ordering uses
/// accumulated CPU time since per-process percentages are not sampled.
pub fn top_processes(snapshot: &SystemSnapshot, sort: SortKey, top: usize) -> Vec<&ProcessRecord> {
    let mut rows: Vec<&ProcessRecord> = snapshot.process_tree.processes.iter().collect();
    match sort {
        SortKey::Memory => {
            rows.sort_by(|a, b| {
                b.resident_memory_kib
                    .cmp(&a.resident_memory_kib)
                    .then(a.pid.cmp(&b.pid))
            });
        }
        SortKey::Cpu => {
            rows.sort_by(|a, b| {
                b.cpu_time_centiseconds
                    .cmp(&a.cpu_time_centiseconds)
                    .then(a.pid.cmp(&b.pid))
            });
        }
        SortKey::Pid => rows.sort_by_key(|p| p.pid),
    }
    rows.truncate(top);
    rows
}

pub fn render_text(snapshot: &SystemSnapshot, output: &OutputConfig) -> String {
    let usage = &snapshot.usage;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "cpu  {} cores  user {}  system {}  wait {}  load {:.2} {:.2} {:.2}",
        usage.cpu_core_count,
        format_per_mille(usage.cpu_user_per_mille),
        format_per_mille(usage.cpu_system_per_mille),
        format_per_mille(Some(usage.cpu_wait_per_mille)),
        usage.load_average[0],
        usage.load_average[1],
        usage.load_average[2],
    );
    let _ = writeln!(
        out,
        "mem  {} / {}  swap {} / {}",
        format_kib(usage.memory_used_kib),
        format_kib(usage.memory_total_kib),
        format_kib(usage.swap_used_kib),
        format_kib(usage.swap_total_kib),
    );
    let restricted = if snapshot.host.security_restricted {
        "  (restricted: per-process usage unavailable)"
    } else {
        ""
    };
    let _ = writeln!(
        out,
        "procs {}{}",
        snapshot.process_tree.len(),
        restricted
    );
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:>7} {:>7} {:>6} {:>10} {:>12}  COMMAND",
        "PID", "PPID", "UID", "RSS", "TIME"
    );
    for record in top_processes(snapshot, output.sort, output.top) {
        let command = if record.zombie {
            format!("<{}>", record.name)
        } else {
            truncate_unicode(&record.command_line, output.command_width)
        };
        let _ = writeln!(
            out,
            "{:>7} {:>7} {:>6} {:>10} {:>12}  {}",
            record.pid,
            record.ppid,
            record.effective_uid,
            format_kib(record.resident_memory_kib),
            format_centiseconds(record.cpu_time_centiseconds),
            command
        );
    }
    out
}

pub fn render_json(snapshot: &SystemSnapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}
