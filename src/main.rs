mod config;
mod monitor;
mod probes;
mod runpod;
mod terminate;

use clap::Parser;

use config::{
    LogLevel, MonitorConfig, LOG_ACTIVITY_MARKER, OLLAMA_LOG_FILE, OLLAMA_PORT,
    OLLAMA_PROCESS_NAME,
};
use monitor::Controller;
use probes::connections::NetstatConnections;
use probes::cpu::SysinfoCpu;
use probes::logscan::FileMarkerScanner;
use probes::Sampler;
use runpod::RunPodClient;
use terminate::{EnvPodResolver, PoweroffFallback, TerminationProcedure};

/// Inactivity monitor for an Ollama pod on RunPod: samples activity every
/// few seconds and terminates the pod (remote API first, local power-off
/// as fallback) once it has been idle past the configured timeout.
#[derive(Parser, Debug)]
#[command(name = "autostop", version, about)]
struct Cli {
    /// Seconds of continuous inactivity before shutdown
    #[arg(long, env = "INACTIVITY_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// CPU usage (percent) above which the workload counts as active
    #[arg(long, env = "ACTIVITY_THRESHOLD", default_value_t = 5.0)]
    threshold: f32,

    /// Log verbosity: DEBUG, INFO, WARN or ERROR (unknown falls back to INFO)
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    log_level: String,

    /// RunPod API key; enables remote pod termination
    #[arg(long, env = "RUNPOD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (log_level, recognized) = LogLevel::parse_lenient(&cli.log_level);
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_max_level(log_level.filter())
        .init();

    if !recognized {
        tracing::warn!(
            value = %cli.log_level,
            "unrecognized LOG_LEVEL, falling back to INFO"
        );
    }

    let config = match MonitorConfig::new(cli.timeout, cli.threshold, log_level, cli.api_key) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    tracing::info!(
        timeout_secs = config.idle_timeout_secs,
        threshold_percent = config.activity_threshold_percent,
        poll_interval_secs = config.poll_interval_secs,
        log_level = config.log_level.as_str(),
        remote_termination = config.api_key.is_some(),
        "autostop starting"
    );

    let remote = build_remote_client(&config).await;

    let mut sampler = Sampler::new(
        Box::new(NetstatConnections::new(OLLAMA_PORT)),
        Box::new(SysinfoCpu::new(OLLAMA_PROCESS_NAME)),
        Box::new(FileMarkerScanner::new(OLLAMA_LOG_FILE, LOG_ACTIVITY_MARKER)),
        config.activity_threshold_percent,
    );
    let mut procedure = TerminationProcedure::new(EnvPodResolver, remote, PoweroffFallback);

    // Production never cancels; the sender is held only to keep the
    // channel open for the life of the loop.
    let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let controller = Controller::new(&config);
    match controller.run(&mut sampler, &mut procedure, cancel_rx).await {
        Some(outcome) => {
            tracing::info!(?outcome, "monitoring finished");
        }
        None => {
            tracing::info!("monitoring cancelled");
        }
    }
}

/// Build the remote termination client when an API key is configured, and
/// verify the key once at startup. Any failure here downgrades to the local
/// fallback path instead of aborting the monitor.
async fn build_remote_client(config: &MonitorConfig) -> Option<RunPodClient> {
    let key = config.api_key.as_deref()?;
    let client = match RunPodClient::new(key) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "could not build RunPod client, remote termination disabled"
            );
            return None;
        }
    };
    match client.verify_api_key().await {
        Ok(true) => tracing::info!("RunPod API key verified"),
        Ok(false) => {
            tracing::warn!("RunPod API key rejected; will still try remote terminate, then fall back")
        }
        Err(e) => tracing::warn!(error = %e, "RunPod API key verification unreachable"),
    }
    Some(client)
}
