//! Latency and throughput probes backed by `ping` and `iperf3`

use super::{async_trait, LatencyProbe, ProbeError, ThroughputBenchmark};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// ICMP latency probe using the system `ping`
#[derive(Debug, Clone)]
pub struct PingProbe {
    /// Echo requests per attempt
    count: u32,
    /// Per-reply wait
    reply_timeout: Duration,
}

impl PingProbe {
    pub fn new(count: u32, reply_timeout: Duration) -> Self {
        Self {
            count: count.max(1),
            reply_timeout,
        }
    }

    fn deadline(&self) -> Duration {
        self.reply_timeout * (self.count + 1)
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[async_trait]
impl LatencyProbe for PingProbe {
    async fn probe(&self, target: IpAddr) -> Result<f64, ProbeError> {
        let wait_secs = self.reply_timeout.as_secs().max(1).to_string();
        let count = self.count.to_string();
        let addr = target.to_string();

        let mut cmd = Command::new("ping");
        cmd.args(["-q", "-c", count.as_str(), "-W", wait_secs.as_str(), addr.as_str()]);

        let output = run_bounded(cmd, self.deadline()).await?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                tool: "ping",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_ping_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or(ProbeError::Unparseable { tool: "ping" })
    }
}

/// Throughput benchmark using `iperf3` against a server on the target
#[derive(Debug, Clone)]
pub struct Iperf3Benchmark {
    binary: Option<PathBuf>,
    duration: Duration,
}

impl Iperf3Benchmark {
    /// Locate `iperf3` on `PATH`; a missing binary leaves the benchmark
    /// unavailable rather than failing
    pub fn discover(duration: Duration) -> Self {
        let binary = find_in_path("iperf3");
        if binary.is_none() {
            debug!("iperf3 not found on PATH, throughput will be estimated from latency");
        }
        Self { binary, duration }
    }

    pub fn with_binary(binary: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            binary: Some(binary.into()),
            duration,
        }
    }
}

#[async_trait]
impl ThroughputBenchmark for Iperf3Benchmark {
    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    async fn measure(&self, target: IpAddr) -> Result<f64, ProbeError> {
        let Some(binary) = &self.binary else {
            return Err(ProbeError::CommandFailed {
                tool: "iperf3",
                detail: "binary not available".to_string(),
            });
        };

        let secs = self.duration.as_secs().max(1).to_string();
        let addr = target.to_string();

        let mut cmd = Command::new(binary);
        cmd.args(["-c", addr.as_str(), "-t", secs.as_str(), "-f", "m", "-P", "1"]);

        let output = run_bounded(cmd, self.duration + Duration::from_secs(10)).await?;
        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                tool: "iperf3",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_iperf3_output(&String::from_utf8_lossy(&output.stdout))
            .ok_or(ProbeError::Unparseable { tool: "iperf3" })
    }
}

/// Run a command, killing it if it outlives `deadline` or the caller is
/// cancelled
async fn run_bounded(mut cmd: Command, deadline: Duration) -> Result<Output, ProbeError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(deadline, cmd.output()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProbeError::Timeout(deadline)),
    }
}

/// Extract the average from a ping summary such as
/// `rtt min/avg/max/mdev = 0.042/0.050/0.061/0.007 ms`
pub fn parse_ping_output(output: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.contains("min/avg/max"))
        .find_map(|line| {
            let (_, values) = line.split_once('=')?;
            let avg = values.trim().split('/').nth(1)?;
            avg.trim().parse::<f64>().ok()
        })
        .filter(|avg| avg.is_finite() && *avg >= 0.0)
}

/// Extract the sender throughput in Mbits/sec from `iperf3 -f m` output
pub fn parse_iperf3_output(output: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.contains("sender") && line.contains("Mbits/sec"))
        .find_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let unit = fields.iter().position(|f| *f == "Mbits/sec")?;
            fields.get(unit.checked_sub(1)?)?.parse::<f64>().ok()
        })
        .filter(|mbps| mbps.is_finite() && *mbps >= 0.0)
}

/// Average latency from the first successful attempt, `None` once all
/// `attempts` fail
pub async fn measure_latency(probe: &dyn LatencyProbe, target: IpAddr, attempts: u32) -> Option<f64> {
    for attempt in 1..=attempts.max(1) {
        match probe.probe(target).await {
            Ok(avg) => return Some(avg),
            Err(e) => {
                debug!(target = %target, attempt, error = %e, "Latency probe failed");
            }
        }
    }
    None
}

/// Measured throughput, `None` if the benchmark is unavailable or every
/// attempt fails
pub async fn measure_throughput(
    bench: &dyn ThroughputBenchmark,
    target: IpAddr,
    attempts: u32,
) -> Option<f64> {
    if !bench.is_available() {
        return None;
    }

    for attempt in 1..=attempts.max(1) {
        match bench.measure(target).await {
            Ok(mbps) => return Some(mbps),
            Err(e) => {
                debug!(target = %target, attempt, error = %e, "Throughput benchmark failed");
            }
        }
    }
    None
}

/// Locate an executable by name on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const LINUX_PING: &str = "PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.

--- 10.0.0.2 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 1.842/2.350/3.061/0.507 ms
";

    const BUSYBOX_PING: &str = "--- 10.0.0.2 ping statistics ---
3 packets transmitted, 3 packets received, 0% packet loss
round-trip min/avg/max = 0.101/0.202/0.303 ms
";

    const IPERF3: &str = "Connecting to host 10.0.0.2, port 5201
[  5] local 10.0.0.1 port 50000 connected to 10.0.0.2 port 5201
[ ID] Interval           Transfer     Bitrate         Retr  Cwnd
[  5]   0.00-1.00   sec   112 MBytes   941 Mbits/sec    0    400 KBytes
- - - - - - - - - - - - - - - - - - - - - - - - -
[ ID] Interval           Transfer     Bitrate         Retr
[  5]   0.00-3.00   sec   336 MBytes   939 Mbits/sec    0             sender
[  5]   0.00-3.04   sec   335 MBytes   925 Mbits/sec                  receiver
";

    #[test]
    fn test_parse_linux_ping() {
        assert_eq!(parse_ping_output(LINUX_PING), Some(2.350));
    }

    #[test]
    fn test_parse_busybox_ping() {
        assert_eq!(parse_ping_output(BUSYBOX_PING), Some(0.202));
    }

    #[test]
    fn test_parse_ping_without_summary() {
        assert_eq!(parse_ping_output("100% packet loss"), None);
    }

    #[test]
    fn test_parse_iperf3_sender_line() {
        assert_eq!(parse_iperf3_output(IPERF3), Some(939.0));
    }

    #[test]
    fn test_parse_iperf3_without_summary() {
        assert_eq!(parse_iperf3_output("iperf3: error - unable to connect"), None);
    }

    #[test]
    fn test_find_in_path_missing_binary() {
        assert!(find_in_path("definitely-not-a-real-binary-name").is_none());
    }

    struct FlakyProbe {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LatencyProbe for FlakyProbe {
        async fn probe(&self, _target: IpAddr) -> Result<f64, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ProbeError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(4.5)
            }
        }
    }

    #[tokio::test]
    async fn test_measure_latency_stops_at_first_success() {
        let probe = FlakyProbe {
            failures_before_success: 1,
            calls: AtomicU32::new(0),
        };
        let target: IpAddr = "10.0.0.2".parse().unwrap();

        assert_eq!(measure_latency(&probe, target, 3).await, Some(4.5));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_measure_latency_gives_up_after_bound() {
        let probe = FlakyProbe {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        };
        let target: IpAddr = "10.0.0.2".parse().unwrap();

        assert_eq!(measure_latency(&probe, target, 3).await, None);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_measure_throughput_skips_unavailable_tool() {
        let bench = Iperf3Benchmark {
            binary: None,
            duration: Duration::from_secs(1),
        };
        let target: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(measure_throughput(&bench, target, 3).await, None);
    }
}
