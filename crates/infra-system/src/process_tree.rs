// Process tree scans
// Descendant discovery is an explicit capability, re-queried immediately
// before every kill attempt rather than assuming a static snapshot.

use std::collections::HashSet;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, RefreshKind, System};

fn process_table() -> System {
    System::new_with_specifics(RefreshKind::new().with_processes(ProcessRefreshKind::new()))
}

/// All processes transitively spawned by `root` (root itself excluded)
pub fn list_descendants(root: u32) -> HashSet<u32> {
    let system = process_table();
    let mut descendants = HashSet::new();
    let mut frontier = vec![Pid::from_u32(root)];

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && descendants.insert(pid.as_u32()) {
                frontier.push(*pid);
            }
        }
    }
    descendants
}

/// Subset of `pids` still live in the process table
///
/// Zombies are not counted: a terminated-but-unreaped child must not keep a
/// kill grace loop spinning.
pub fn alive_subset(pids: &HashSet<u32>) -> HashSet<u32> {
    let system = process_table();
    pids.iter()
        .copied()
        .filter(|pid| {
            system
                .process(Pid::from_u32(*pid))
                .is_some_and(|p| p.status() != ProcessStatus::Zombie)
        })
        .collect()
}
