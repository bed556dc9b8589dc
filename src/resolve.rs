use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::process::Output;
use std::time::Duration;
use tokio::net;
use tokio::process::Command;
use tokio::time;

/// Upper bound for each reverse-lookup utility; their own retry defaults run much longer.
pub const LOOKUP_TOOL_TIMEOUT: Duration = Duration::from_secs(3);

/// Best-effort name for the scan target.
///
/// - Hostname: a forward lookup confirms it resolves and the name is returned as given.
/// - IP address: reverse lookup through the system `dig -x`, falling back to `nslookup`.
///
/// Purely informational; callers report failure as a notice and scan anyway.
pub async fn resolve_host(target: &str) -> Result<String> {
    let target = target.trim();
    if target.is_empty() {
        bail!("empty target");
    }

    let ip = match target.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => {
            let mut addrs = net::lookup_host((target, 0))
                .await
                .with_context(|| format!("failed to resolve {target}"))?;
            if addrs.next().is_none() {
                bail!("{target} resolved to no addresses");
            }
            return Ok(target.to_string());
        }
    };

    if let Some(name) = reverse_with_dig(ip).await {
        return Ok(name);
    }
    if let Some(name) = reverse_with_nslookup(ip).await {
        return Ok(name);
    }
    bail!("no reverse DNS record for {ip}")
}

async fn reverse_with_dig(ip: IpAddr) -> Option<String> {
    let mut cmd = Command::new("dig");
    cmd.arg("-x").arg(ip.to_string()).arg("+short");
    let output = run_with_deadline(cmd, LOOKUP_TOOL_TIMEOUT).await?;
    parse_dig_output(&String::from_utf8_lossy(&output.stdout), ip)
}

async fn reverse_with_nslookup(ip: IpAddr) -> Option<String> {
    let mut cmd = Command::new("nslookup");
    cmd.arg(ip.to_string());
    let output = run_with_deadline(cmd, LOOKUP_TOOL_TIMEOUT).await?;
    parse_nslookup_output(&String::from_utf8_lossy(&output.stdout), ip)
}

/// Output of a successful run that finished within `limit`. The child is killed on timeout.
async fn run_with_deadline(mut cmd: Command, limit: Duration) -> Option<Output> {
    cmd.kill_on_drop(true);
    match time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => Some(output),
        _ => None,
    }
}

/// First PTR answer from `dig -x <ip> +short`, without the trailing root dot.
pub fn parse_dig_output(stdout: &str, ip: IpAddr) -> Option<String> {
    stdout
        .lines()
        .map(|l| l.trim().trim_end_matches('.'))
        .find(|l| !l.is_empty() && !l.starts_with(';'))
        .filter(|name| *name != ip.to_string())
        .map(str::to_string)
}

/// Name from an `nslookup` answer line like `4.3.2.1.in-addr.arpa  name = host.example.`.
pub fn parse_nslookup_output(stdout: &str, ip: IpAddr) -> Option<String> {
    stdout
        .lines()
        .filter_map(|l| l.split_once("name = ").map(|(_, name)| name))
        .map(|name| name.trim().trim_end_matches('.'))
        .find(|name| !name.is_empty() && *name != ip.to_string())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));

    #[test]
    fn dig_output_takes_first_answer() {
        assert_eq!(
            parse_dig_output("router.lan.\nother.lan.\n", IP).as_deref(),
            Some("router.lan")
        );
        assert_eq!(parse_dig_output("\n", IP), None);
        assert_eq!(parse_dig_output(";; connection timed out\n", IP), None);
    }

    #[test]
    fn nslookup_output_extracts_name() {
        let out = "7.2.0.192.in-addr.arpa\tname = printer.example.\n\nAuthoritative answers can be found from:\n";
        assert_eq!(parse_nslookup_output(out, IP).as_deref(), Some("printer.example"));
        assert_eq!(parse_nslookup_output("** server can't find 7.2.0.192.in-addr.arpa: NXDOMAIN", IP), None);
    }

    #[tokio::test]
    async fn localhost_name_resolves_forward() {
        assert_eq!(resolve_host("localhost").await.unwrap(), "localhost");
    }

    #[tokio::test]
    async fn slow_lookup_tool_is_cut_off() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = time::Instant::now();
        assert!(run_with_deadline(cmd, Duration::from_millis(100)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_lookup_tool_yields_none() {
        let cmd = Command::new("definitely-not-a-lookup-tool");
        assert!(run_with_deadline(cmd, LOOKUP_TOOL_TIMEOUT).await.is_none());
    }

    #[tokio::test]
    async fn empty_target_fails() {
        assert!(resolve_host("  ").await.is_err());
    }
}
