//! Best-effort resident memory probe

use parking_lot::Mutex;
use std::sync::OnceLock;
use sysinfo::{Pid, ProcessRefreshKind, System};

static SYSTEM: OnceLock<Option<(Pid, Mutex<System>)>> = OnceLock::new();

/// Resident set size of this process in megabytes, or `None` when the
/// platform does not expose it.
pub fn resident_megabytes() -> Option<f64> {
    let (pid, system) = SYSTEM
        .get_or_init(|| {
            sysinfo::get_current_pid()
                .ok()
                .map(|pid| (pid, Mutex::new(System::new())))
        })
        .as_ref()?;

    let mut system = system.lock();
    if !system.refresh_process_specifics(*pid, ProcessRefreshKind::new().with_memory()) {
        return None;
    }
    system
        .process(*pid)
        .map(|process| process.memory() as f64 / 1_048_576.0)
}
