// Activity sampling: three independent probes, any one of which is enough
// to call the workload active for the current tick.
pub mod connections;
pub mod cpu;
pub mod logscan;

/// Result of the connection probe for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionProbe {
    /// Number of established connections on the service port.
    Established(usize),
    /// The probe could not run (tooling missing/broken). Excluded from the
    /// activity vote: it neither reports activity nor argues for shutdown.
    Inconclusive,
}

/// Counts established TCP connections to the Ollama port.
pub trait ConnectionCounter {
    fn count(&mut self) -> ConnectionProbe;
}

/// Reads the summed CPU usage of the workload's processes.
///
/// `None` means the process was not found at all, which is treated as
/// inactive: the absence of the managed process is not a reason to keep
/// the pod alive.
pub trait ProcessCpuReader {
    fn total_cpu_percent(&mut self) -> Option<f32>;
}

/// Scans the workload log for an activity marker appended since the
/// previous scan.
pub trait LogMarkerScanner {
    fn scan(&mut self) -> bool;
}

/// Combined activity sampler. Owns the three probes and produces one
/// boolean vote per tick, short-circuiting on the first active probe.
pub struct Sampler {
    connections: Box<dyn ConnectionCounter + Send>,
    cpu: Box<dyn ProcessCpuReader + Send>,
    log: Box<dyn LogMarkerScanner + Send>,
    threshold_percent: f32,
}

impl Sampler {
    pub fn new(
        connections: Box<dyn ConnectionCounter + Send>,
        cpu: Box<dyn ProcessCpuReader + Send>,
        log: Box<dyn LogMarkerScanner + Send>,
        threshold_percent: f32,
    ) -> Self {
        Self {
            connections,
            cpu,
            log,
            threshold_percent,
        }
    }

    /// One activity vote. Probe order (connections, CPU, log marker) is an
    /// efficiency choice only; correctness does not depend on it.
    pub fn sample(&mut self) -> bool {
        match self.connections.count() {
            ConnectionProbe::Established(n) if n >= 1 => {
                tracing::debug!(connections = n, "activity: established connections");
                return true;
            }
            ConnectionProbe::Established(_) => {
                tracing::debug!("no established connections");
            }
            ConnectionProbe::Inconclusive => {
                tracing::debug!("connection probe inconclusive, excluded from vote");
            }
        }

        match self.cpu.total_cpu_percent() {
            Some(cpu) if cpu > self.threshold_percent => {
                tracing::debug!(
                    cpu_percent = cpu,
                    threshold = self.threshold_percent,
                    "activity: CPU above threshold"
                );
                return true;
            }
            Some(cpu) => {
                tracing::debug!(
                    cpu_percent = cpu,
                    threshold = self.threshold_percent,
                    "CPU at or below threshold"
                );
            }
            None => {
                tracing::warn!("workload process not found, treating as inactive");
            }
        }

        if self.log.scan() {
            tracing::debug!("activity: log marker observed");
            return true;
        }

        false
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted connection counter; replays a fixed sequence, then repeats
    /// the last entry. `calls` is shared so tests can observe whether the
    /// probe ran at all.
    pub struct FakeConnections {
        script: Vec<ConnectionProbe>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeConnections {
        pub fn new(script: Vec<ConnectionProbe>) -> Self {
            Self {
                script,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ConnectionCounter for FakeConnections {
        fn count(&mut self) -> ConnectionProbe {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let i = n.min(self.script.len().saturating_sub(1));
            self.script
                .get(i)
                .copied()
                .unwrap_or(ConnectionProbe::Established(0))
        }
    }

    pub struct FakeCpu {
        script: Vec<Option<f32>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeCpu {
        pub fn new(script: Vec<Option<f32>>) -> Self {
            Self {
                script,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ProcessCpuReader for FakeCpu {
        fn total_cpu_percent(&mut self) -> Option<f32> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let i = n.min(self.script.len().saturating_sub(1));
            self.script.get(i).copied().flatten()
        }
    }

    pub struct FakeLog {
        script: Vec<bool>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeLog {
        pub fn new(script: Vec<bool>) -> Self {
            Self {
                script,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl LogMarkerScanner for FakeLog {
        fn scan(&mut self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let i = n.min(self.script.len().saturating_sub(1));
            self.script.get(i).copied().unwrap_or(false)
        }
    }
}
