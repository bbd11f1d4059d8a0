/// Termination procedure: remote API terminate first, local power-off as
/// the last resort. Runs at most once per monitoring session.
use tokio::process::Command;

/// How the termination attempt ended. This is the procedure's only output;
/// no error crosses the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The RunPod API accepted the terminate request; the orchestrator
    /// reaps the pod from outside.
    RemoteSucceeded,
    /// The remote call ran but did not report success; local power-off
    /// worked.
    RemoteFailedFallbackSucceeded,
    /// The remote path was never viable (no credential, or the pod id could
    /// not be resolved); local power-off worked.
    RemoteUnavailableFallbackSucceeded,
    /// Local power-off failed too. Nothing left to try.
    FallbackFailed,
}

/// Resolves the identity of the instance we are running on.
pub trait InstanceResolver {
    fn resolve(&self) -> Option<String>;
}

/// Issues the authenticated remote terminate call.
///
/// `Ok(true)` is the structured success flag; `Ok(false)` means the API
/// answered but declined; `Err` is a transport-level failure.
pub trait RemoteTerminator {
    fn terminate(
        &self,
        pod_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, String>> + Send;
}

/// Invokes the local, irreversible system halt.
pub trait ShutdownFallback {
    fn halt(&self) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

/// Seam between the controller and the procedure, so scenario tests can
/// count invocations without touching the network or the host.
pub trait Terminate {
    fn execute(&mut self) -> impl std::future::Future<Output = TerminationOutcome> + Send;
}

/// Pod identity from the RunPod-injected `RUNPOD_POD_ID` environment
/// variable (the pod's metadata channel).
pub struct EnvPodResolver;

impl InstanceResolver for EnvPodResolver {
    fn resolve(&self) -> Option<String> {
        std::env::var("RUNPOD_POD_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

/// Local fallback: `poweroff`, no arguments. May be unavailable in
/// restricted containers, which is exactly why the remote path goes first.
pub struct PoweroffFallback;

impl ShutdownFallback for PoweroffFallback {
    async fn halt(&self) -> Result<(), String> {
        let status = Command::new("poweroff")
            .status()
            .await
            .map_err(|e| format!("failed to run poweroff: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("poweroff exited with {status}"))
        }
    }
}

/// The ordered procedure. `remote` is populated only when an API key is
/// configured; without it the local fallback is the whole plan.
pub struct TerminationProcedure<R, A, F> {
    resolver: R,
    remote: Option<A>,
    fallback: F,
}

impl<R, A, F> TerminationProcedure<R, A, F>
where
    R: InstanceResolver + Send + Sync,
    A: RemoteTerminator + Send + Sync,
    F: ShutdownFallback + Send + Sync,
{
    pub fn new(resolver: R, remote: Option<A>, fallback: F) -> Self {
        Self {
            resolver,
            remote,
            fallback,
        }
    }

    async fn run_fallback(&self, remote_was_attempted: bool) -> TerminationOutcome {
        tracing::info!("invoking local shutdown fallback");
        match self.fallback.halt().await {
            Ok(()) => {
                tracing::info!("local shutdown issued");
                if remote_was_attempted {
                    TerminationOutcome::RemoteFailedFallbackSucceeded
                } else {
                    TerminationOutcome::RemoteUnavailableFallbackSucceeded
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "local shutdown failed; no recovery options remain");
                TerminationOutcome::FallbackFailed
            }
        }
    }
}

impl<R, A, F> Terminate for TerminationProcedure<R, A, F>
where
    R: InstanceResolver + Send + Sync,
    A: RemoteTerminator + Send + Sync,
    F: ShutdownFallback + Send + Sync,
{
    async fn execute(&mut self) -> TerminationOutcome {
        let Some(remote) = &self.remote else {
            tracing::info!("no API key configured, skipping remote termination");
            return self.run_fallback(false).await;
        };

        // Identity is resolved lazily, only now that termination is imminent.
        let Some(pod_id) = self.resolver.resolve() else {
            tracing::error!("could not resolve pod id, falling back to local shutdown");
            return self.run_fallback(false).await;
        };

        tracing::info!(pod_id = %pod_id, "requesting remote pod termination");
        match remote.terminate(&pod_id).await {
            Ok(true) => {
                tracing::info!(pod_id = %pod_id, "remote termination accepted");
                TerminationOutcome::RemoteSucceeded
            }
            Ok(false) => {
                tracing::error!(
                    pod_id = %pod_id,
                    "remote termination did not report success"
                );
                self.run_fallback(true).await
            }
            Err(e) => {
                tracing::error!(pod_id = %pod_id, error = %e, "remote termination call failed");
                self.run_fallback(true).await
            }
        }
    }
}
