/// Connection probe: established TCP connections on the Ollama port,
/// counted via `netstat -tn`.
use std::io::ErrorKind;
use std::process::Command;

use super::{ConnectionCounter, ConnectionProbe};

pub struct NetstatConnections {
    port: u16,
    /// Self-install is attempted at most once per monitoring session.
    install_attempted: bool,
    /// Set once the tool is known to be unusable; all later calls return
    /// `Inconclusive` without re-running anything.
    unavailable: bool,
}

impl NetstatConnections {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            install_attempted: false,
            unavailable: false,
        }
    }

    /// Try to install net-tools. Best effort: failure just leaves the probe
    /// permanently inconclusive.
    fn try_install(&mut self) {
        self.install_attempted = true;
        tracing::warn!("netstat not found, attempting one-time install of net-tools");
        match Command::new("apt-get")
            .args(["install", "-y", "net-tools"])
            .output()
        {
            Ok(out) if out.status.success() => {
                tracing::info!("net-tools installed");
            }
            Ok(out) => {
                tracing::warn!(
                    status = ?out.status.code(),
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "net-tools install failed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not run apt-get for net-tools install");
            }
        }
    }

    fn run_netstat(&self) -> std::io::Result<std::process::Output> {
        Command::new("netstat").args(["-tn"]).output()
    }
}

impl ConnectionCounter for NetstatConnections {
    fn count(&mut self) -> ConnectionProbe {
        if self.unavailable {
            return ConnectionProbe::Inconclusive;
        }

        let output = match self.run_netstat() {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound && !self.install_attempted => {
                self.try_install();
                match self.run_netstat() {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "netstat still unavailable after install attempt, \
                             connection probe disabled"
                        );
                        self.unavailable = true;
                        return ConnectionProbe::Inconclusive;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.unavailable = true;
                return ConnectionProbe::Inconclusive;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to run netstat");
                return ConnectionProbe::Inconclusive;
            }
        };

        if !output.status.success() {
            tracing::warn!(
                status = ?output.status.code(),
                "netstat exited with failure"
            );
            return ConnectionProbe::Inconclusive;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        ConnectionProbe::Established(count_established(&stdout, self.port))
    }
}

/// Count ESTABLISHED rows whose local address is on `port`.
///
/// `netstat -tn` rows: Proto Recv-Q Send-Q Local-Address Foreign-Address State
fn count_established(netstat_output: &str, port: u16) -> usize {
    let suffix = format!(":{port}");
    netstat_output
        .lines()
        .filter(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            fields.len() >= 6
                && fields[3].ends_with(&suffix)
                && fields[5] == "ESTABLISHED"
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 172.17.0.2:11434        10.0.0.5:52114          ESTABLISHED
tcp        0      0 172.17.0.2:11434        10.0.0.9:41822          ESTABLISHED
tcp        0      0 172.17.0.2:22          10.0.0.5:58821          ESTABLISHED
tcp        0      0 172.17.0.2:11434        10.0.0.7:49120          TIME_WAIT
tcp6       0      0 ::1:11434              ::1:38514               ESTABLISHED
";

    #[test]
    fn test_counts_only_established_rows_on_port() {
        assert_eq!(count_established(SAMPLE, 11434), 3);
    }

    #[test]
    fn test_other_ports_not_counted() {
        assert_eq!(count_established(SAMPLE, 22), 1);
        assert_eq!(count_established(SAMPLE, 8080), 0);
    }

    #[test]
    fn test_port_match_is_exact_suffix() {
        // Port 1434 must not match the :11434 rows.
        assert_eq!(count_established(SAMPLE, 1434), 0);
    }

    #[test]
    fn test_empty_and_header_only_output() {
        assert_eq!(count_established("", 11434), 0);
        assert_eq!(
            count_established("Proto Recv-Q Send-Q Local Address Foreign Address State\n", 11434),
            0
        );
    }
}
