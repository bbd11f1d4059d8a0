/// Resource-usage probe backed by `sysinfo`.
use sysinfo::{ProcessRefreshKind, System};

use super::ProcessCpuReader;

/// Sums CPU usage over every process matching the workload name.
///
/// Keeps one `System` alive across ticks: `sysinfo` computes CPU percentages
/// as deltas between refreshes, so the 5-second poll interval doubles as the
/// measurement window. The first tick after startup reads near zero, which
/// only delays a reset by one interval at worst.
pub struct SysinfoCpu {
    system: System,
    process_name: String,
}

impl SysinfoCpu {
    pub fn new(process_name: &str) -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessRefreshKind::new().with_cpu());
        Self {
            system,
            process_name: process_name.to_string(),
        }
    }
}

impl ProcessCpuReader for SysinfoCpu {
    fn total_cpu_percent(&mut self) -> Option<f32> {
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cpu());

        let mut found = false;
        let mut total = 0.0f32;
        for process in self.system.processes_by_name(&self.process_name) {
            found = true;
            total += process.cpu_usage();
        }

        if found {
            Some(total)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_process_reports_none() {
        // No real process carries this name.
        let mut probe = SysinfoCpu::new("autostop-test-nonexistent-process");
        assert_eq!(probe.total_cpu_percent(), None);
    }
}
