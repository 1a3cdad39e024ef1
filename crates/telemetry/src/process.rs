//! Process-level resource sampling
//!
//! Memory comes from `sysinfo`; the user/system CPU split comes straight
//! from `/proc/self/stat` on Linux because `sysinfo` only exposes the
//! combined figure. On other platforms the CPU counters read as zero,
//! which the accounting layer tolerates (per-transaction CPU averages
//! simply stay at zero).

use std::sync::Mutex;

use sysinfo::{get_current_pid, ProcessesToUpdate, System};

use crate::agent::CpuUsage;

/// Resident and virtual memory sizes for the current process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Resident set size
    pub rss_bytes: u64,
    /// Virtual memory size
    pub virtual_bytes: u64,
}

/// Sampler for the current process's CPU and memory counters.
#[derive(Debug)]
pub struct ProcessStats {
    system: Mutex<System>,
}

impl Default for ProcessStats {
    fn default() -> Self {
        Self { system: Mutex::new(System::new()) }
    }
}

impl ProcessStats {
    /// Create a sampler for the current process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative user/system CPU time for this process.
    ///
    /// Never fails: if the counters cannot be read the result is zero,
    /// which downstream delta logic treats as "no CPU consumed".
    pub fn cpu_usage(&self) -> CpuUsage {
        read_self_cpu().unwrap_or_default()
    }

    /// Current memory usage, or `None` when the process table cannot be
    /// read.
    pub fn memory(&self) -> Option<MemoryStats> {
        let pid = get_current_pid().ok()?;
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        Some(MemoryStats {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

// Linux exposes utime/stime in clock ticks; USER_HZ is fixed at 100 on
// every supported configuration, so one tick is 10_000 microseconds.
#[cfg(target_os = "linux")]
const MICROS_PER_CLOCK_TICK: u64 = 10_000;

#[cfg(target_os = "linux")]
fn read_self_cpu() -> Option<CpuUsage> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    parse_stat_cpu(&stat)
}

/// Parse utime (field 14) and stime (field 15) out of a
/// `/proc/<pid>/stat` line. The comm field may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
#[cfg(target_os = "linux")]
fn parse_stat_cpu(stat: &str) -> Option<CpuUsage> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let mut fields = after_comm.split_whitespace();
    // after comm: state is field 3, utime field 14, stime field 15
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(CpuUsage {
        user_micros: utime * MICROS_PER_CLOCK_TICK,
        system_micros: stime * MICROS_PER_CLOCK_TICK,
    })
}

#[cfg(not(target_os = "linux"))]
fn read_self_cpu() -> Option<CpuUsage> {
    tracing::debug!("per-mode cpu counters are unavailable on this platform");
    None
}
