use tracing_subscriber::filter::LevelFilter;

/// Poll cadence of the monitor loop, in seconds. Fixed by design: the idle
/// counter advances in whole poll intervals, so the timeout check is exact
/// without high-resolution timers.
pub const POLL_INTERVAL_SECS: u64 = 5;

/// TCP port the Ollama server listens on.
pub const OLLAMA_PORT: u16 = 11434;

/// Process name the resource-usage probe looks for.
pub const OLLAMA_PROCESS_NAME: &str = "ollama";

/// Ollama server log scanned by the log-marker probe.
pub const OLLAMA_LOG_FILE: &str = "/var/log/ollama.log";

/// Marker substring indicating an in-flight generate request.
pub const LOG_ACTIVITY_MARKER: &str = "/api/generate";

/// Log verbosity, mapped one-to-one onto a tracing level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a `LOG_LEVEL` value. Unrecognized values fall back to `Info`;
    /// the caller is expected to warn about the fallback once logging is up.
    /// Returns `(level, recognized)`.
    pub fn parse_lenient(raw: &str) -> (LogLevel, bool) {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => (LogLevel::Debug, true),
            "INFO" => (LogLevel::Info, true),
            "WARN" | "WARNING" => (LogLevel::Warn, true),
            "ERROR" => (LogLevel::Error, true),
            _ => (LogLevel::Info, false),
        }
    }

    /// Total mapping to the subscriber filter; every level enables itself
    /// and the more severe ones.
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Immutable monitor configuration, read once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds of continuous inactivity before termination. Must be > 0.
    pub idle_timeout_secs: u64,
    /// CPU usage (percent) above which the workload counts as active.
    /// Strictly-greater-than semantics: usage equal to the threshold is idle.
    pub activity_threshold_percent: f32,
    /// Resolved log verbosity.
    pub log_level: LogLevel,
    /// Seconds between activity samples.
    pub poll_interval_secs: u64,
    /// RunPod API key; enables the remote termination path when present.
    pub api_key: Option<String>,
}

impl MonitorConfig {
    /// Build the config snapshot from already-parsed inputs.
    ///
    /// Rejects a zero timeout: the monitor would shut the pod down on its
    /// very first idle tick, which is never what the deployer intended.
    pub fn new(
        idle_timeout_secs: u64,
        activity_threshold_percent: f32,
        log_level: LogLevel,
        api_key: Option<String>,
    ) -> Result<Self, String> {
        if idle_timeout_secs == 0 {
            return Err("INACTIVITY_TIMEOUT must be greater than 0".to_string());
        }
        // An empty key is the same as no key; don't let it arm the remote path.
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Ok(Self {
            idle_timeout_secs,
            activity_threshold_percent,
            log_level,
            poll_interval_secs: POLL_INTERVAL_SECS,
            api_key,
        })
    }
}
