use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ProcessRecord {
    pub pid: i32,
    pub ppid: i32,
    pub real_uid: u32,
    pub effective_uid: u32,
    pub real_gid: u32,
    /// Creation time, seconds since the epoch.
    pub start_time: i64,
    pub zombie: bool,
    pub resident_memory_kib: u64,
    /// User+system time of the task and its non-idle threads, in 1/100 s.
    pub cpu_time_centiseconds: u64,
    /// Always zero here; percentages are derived by the consumer from
    /// successive `cpu_time_centiseconds` readings.
    pub cpu_percent: f32,
    pub name: String,
    pub command_line: String,
    #[serde(skip)]
    pub sampled_at: Instant,
}

/// Aggregated usage of a process and all of its descendants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubtreeTotals {
    pub resident_memory_kib: u64,
    pub cpu_time_centiseconds: u64,
    pub processes: usize,
}

/// One snapshot of the process table, in kernel enumeration order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessTree {
    pub processes: Vec<ProcessRecord>,
}

impl ProcessTree {
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn find(&self, pid: i32) -> Option<&ProcessRecord> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    /// Direct children of `pid`, sorted by pid. A process listed as its own
    /// parent (pid 0 on Darwin) is not its own child.
    pub fn children_of(&self, pid: i32) -> Vec<i32> {
        let mut children: Vec<i32> = self
            .processes
            .iter()
            .filter(|p| p.ppid == pid && p.pid != pid)
            .map(|p| p.pid)
            .collect();
        children.sort_unstable();
        children
    }

    /// Memory and CPU time of every process plus all of its descendants.
    pub fn subtree_totals(&self) -> HashMap<i32, SubtreeTotals> {
        let index: HashMap<i32, usize> = self
            .processes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.pid, i))
            .collect();
        let mut children: HashMap<i32, Vec<i32>> = HashMap::with_capacity(self.processes.len());
        for process in &self.processes {
            if process.ppid != process.pid && index.contains_key(&process.ppid) {
                children.entry(process.ppid).or_default().push(process.pid);
            }
        }

        let mut cache = HashMap::with_capacity(self.processes.len());
        let mut visiting = Vec::new();
        for process in &self.processes {
            self.subtree_cached(process.pid, &index, &children, &mut cache, &mut visiting);
        }
        cache
    }

    fn subtree_cached(
        &self,
        pid: i32,
        index: &HashMap<i32, usize>,
        children: &HashMap<i32, Vec<i32>>,
        cache: &mut HashMap<i32, SubtreeTotals>,
        visiting: &mut Vec<i32>,
    ) -> SubtreeTotals {
        if let Some(&cached) = cache.get(&pid) {
            return cached;
        }
        // A pid recycled mid-scan can close a parent loop; count each member once.
        if visiting.contains(&pid) {
            return SubtreeTotals::default();
        }
        let Some(&i) = index.get(&pid) else {
            return SubtreeTotals::default();
        };
        let own = &self.processes[i];

        visiting.push(pid);
        let mut total = SubtreeTotals {
            resident_memory_kib: own.resident_memory_kib,
            cpu_time_centiseconds: own.cpu_time_centiseconds,
            processes: 1,
        };
        for &child in children.get(&pid).map(Vec::as_slice).unwrap_or_default() {
            let sub = self.subtree_cached(child, index, children, cache, visiting);
            total.resident_memory_kib += sub.resident_memory_kib;
            total.cpu_time_centiseconds += sub.cpu_time_centiseconds;
            total.processes += sub.processes;
        }
        visiting.pop();

        cache.insert(pid, total);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: i32, ppid: i32, name: &str, mem: u64, cpu: u64) -> ProcessRecord {
        ProcessRecord {
            pid,
            ppid,
            real_uid: 0,
            effective_uid: 0,
            real_gid: 0,
            start_time: 0,
            zombie: false,
            resident_memory_kib: mem,
            cpu_time_centiseconds: cpu,
            cpu_percent: 0.0,
            name: name.into(),
            command_line: name.into(),
            sampled_at: Instant::now(),
        }
    }

    fn build_tree() -> ProcessTree {
        ProcessTree {
            processes: vec![
                // kernel_task reports itself as its own parent
                record(0, 0, "kernel_task", 1000, 10),
                record(1, 0, "launchd", 100, 5),
                record(2, 1, "child_a", 50, 1),
                record(3, 1, "child_b", 50, 2),
                record(4, 2, "grandchild", 25, 3),
            ],
        }
    }

    #[test]
    fn subtree_totals_complete() {
        let tree = build_tree();
        let totals = tree.subtree_totals();
        assert_eq!(totals[&0].resident_memory_kib, 1225);
        assert_eq!(totals[&0].processes, 5);
        assert_eq!(totals[&1].resident_memory_kib, 225);
        assert_eq!(totals[&1].cpu_time_centiseconds, 11);
        assert_eq!(totals[&2].resident_memory_kib, 75);
        assert_eq!(totals[&3].resident_memory_kib, 50);
        assert_eq!(totals[&4].processes, 1);
    }

    #[test]
    fn parent_loop_terminates() {
        let tree = ProcessTree {
            processes: vec![record(7, 8, "a", 10, 0), record(8, 7, "b", 20, 0)],
        };
        let totals = tree.subtree_totals();
        assert_eq!(totals.len(), 2);
        assert!(totals[&7].resident_memory_kib <= 30);
    }

    #[test]
    fn children_exclude_self_parent() {
        let tree = build_tree();
        assert_eq!(tree.children_of(0), vec![1]);
        assert_eq!(tree.children_of(1), vec![2, 3]);
        assert!(tree.children_of(4).is_empty());
        assert_eq!(tree.find(3).map(|p| p.name.as_str()), Some("child_b"));
    }
}
