//! # Process Accounting
//!
//! The monitor samples CPU time and resident memory of the supervised
//! process once per tick. Where those numbers come from is platform
//! specific, so the monitor only sees the [`ProcessAccounting`] trait.
//!
//! [`ProcStatAccounting`] reads `/proc/<pid>/stat` on Linux. Tests supply
//! their own implementations.

use crate::error::{ArrowError, Result};

/// CPU time consumed by a process, in clock ticks.
///
/// Both fields include the time of children the process has already reaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub system: u64,
}

/// One accounting sample, already converted to seconds and bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub utime: f64,
    pub stime: f64,
    pub rss: u64,
}

pub trait ProcessAccounting: Send + Sync {
    fn cpu_ticks(&self, pid: u32) -> Result<CpuTicks>;

    fn resident_pages(&self, pid: u32) -> Result<u64>;

    /// Clock ticks per second (`_SC_CLK_TCK`).
    fn ticks_per_second(&self) -> f64;

    /// Bytes per page (`_SC_PAGESIZE`).
    fn page_size(&self) -> u64;

    /// Sample both counters and convert them.
    fn sample(&self, pid: u32) -> Result<ProcessUsage> {
        let ticks = self.cpu_ticks(pid)?;
        let pages = self.resident_pages(pid)?;
        Ok(self.convert(ticks, pages))
    }

    fn convert(&self, ticks: CpuTicks, pages: u64) -> ProcessUsage {
        let hz = self.ticks_per_second();
        ProcessUsage {
            utime: ticks.user as f64 / hz,
            stime: ticks.system as f64 / hz,
            rss: pages * self.page_size(),
        }
    }
}

/// Fields of `/proc/<pid>/stat` the monitor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub cpu: CpuTicks,
    pub rss_pages: u64,
}

impl ProcStat {
    /// Parse the contents of a `stat` file.
    ///
    /// The command name (field 2) is parenthesized and may itself contain
    /// spaces or parentheses, so fields are counted from the last `)`.
    pub fn parse(pid: u32, content: &str) -> Result<Self> {
        let invalid = |reason: &str| ArrowError::Accounting {
            pid,
            reason: reason.to_string(),
        };

        let name_end = content.rfind(')').ok_or_else(|| invalid("no command name"))?;
        let fields: Vec<&str> = content[name_end + 1..].split_whitespace().collect();

        // fields[0] is the state (field 3 of the file), so field N is at N - 3.
        let field = |n: usize| -> Result<u64> {
            fields
                .get(n - 3)
                .and_then(|v| v.parse::<i64>().ok())
                .map(|v| v.max(0) as u64)
                .ok_or_else(|| invalid(&format!("missing or invalid field {}", n)))
        };

        let utime = field(14)?;
        let stime = field(15)?;
        let cutime = field(16)?;
        let cstime = field(17)?;
        let rss_pages = field(24)?;

        Ok(Self {
            cpu: CpuTicks {
                user: utime + cutime,
                system: stime + cstime,
            },
            rss_pages,
        })
    }
}

/// Accounting backed by the `/proc` filesystem.
#[derive(Debug, Clone)]
pub struct ProcStatAccounting {
    ticks_per_second: f64,
    page_size: u64,
}

impl ProcStatAccounting {
    pub fn new() -> Self {
        Self {
            ticks_per_second: sysconf_or(libc::_SC_CLK_TCK, 100) as f64,
            page_size: sysconf_or(libc::_SC_PAGESIZE, 4096) as u64,
        }
    }

    fn read_stat(&self, pid: u32) -> Result<ProcStat> {
        let path = format!("/proc/{}/stat", pid);
        let content = std::fs::read_to_string(&path).map_err(|e| ArrowError::Accounting {
            pid,
            reason: format!("{}: {}", path, e),
        })?;
        ProcStat::parse(pid, &content)
    }
}

impl Default for ProcStatAccounting {
    fn default() -> Self {
        Self::new()
    }
}

fn sysconf_or(name: libc::c_int, fallback: libc::c_long) -> libc::c_long {
    // SAFETY: `sysconf` only reads a system constant and has no side effects.
    let value = unsafe { libc::sysconf(name) };
    if value > 0 {
        value
    } else {
        fallback
    }
}

impl ProcessAccounting for ProcStatAccounting {
    fn cpu_ticks(&self, pid: u32) -> Result<CpuTicks> {
        Ok(self.read_stat(pid)?.cpu)
    }

    fn resident_pages(&self, pid: u32) -> Result<u64> {
        Ok(self.read_stat(pid)?.rss_pages)
    }

    fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    // One read per tick instead of one per counter.
    fn sample(&self, pid: u32) -> Result<ProcessUsage> {
        let stat = self.read_stat(pid)?;
        Ok(self.convert(stat.cpu, stat.rss_pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (arrow (x) y) S 1 4242 4242 0 -1 4194304 1200 0 0 0 \
                        250 50 10 5 20 0 3 0 123456 98765432 1500 18446744073709551615";

    #[test]
    fn test_parse_proc_stat() {
        let stat = ProcStat::parse(4242, STAT).unwrap();
        assert_eq!(stat.cpu, CpuTicks { user: 260, system: 55 });
        assert_eq!(stat.rss_pages, 1500);
    }

    #[test]
    fn test_parse_truncated_stat_fails() {
        let err = ProcStat::parse(1, "1 (sh) S 0 1").unwrap_err();
        assert!(matches!(err, ArrowError::Accounting { pid: 1, .. }));
    }

    #[test]
    fn test_convert_uses_clock_and_page_size() {
        struct Fixed;
        impl ProcessAccounting for Fixed {
            fn cpu_ticks(&self, _pid: u32) -> Result<CpuTicks> {
                Ok(CpuTicks { user: 150, system: 50 })
            }
            fn resident_pages(&self, _pid: u32) -> Result<u64> {
                Ok(10)
            }
            fn ticks_per_second(&self) -> f64 {
                100.0
            }
            fn page_size(&self) -> u64 {
                4096
            }
        }

        let usage = Fixed.sample(1).unwrap();
        assert_eq!(usage.utime, 1.5);
        assert_eq!(usage.stime, 0.5);
        assert_eq!(usage.rss, 40960);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_samples_own_process() {
        let accounting = ProcStatAccounting::new();
        let usage = accounting.sample(std::process::id()).unwrap();
        assert!(usage.rss > 0);
        assert!(accounting.ticks_per_second() > 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_process_is_accounting_error() {
        let accounting = ProcStatAccounting::new();
        let err = accounting.sample(u32::MAX).unwrap_err();
        assert!(err.is_recoverable());
    }
}
