use crate::types::{PortState, ProbeResult, NO_BANNER};
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{self, TcpStream};
use tokio::time;
use tracing::trace;

/// Bytes read from a service when grabbing its banner.
pub const BANNER_BUF_SIZE: usize = 1024;

/// Resolve, connect and banner-read deadlines for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub resolve: Duration,
    pub connect: Duration,
    pub banner: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            resolve: Duration::from_secs(5),
            connect: Duration::from_secs(1),
            banner: Duration::from_secs(1),
        }
    }
}

/// Target name plus the addresses it resolved to once, at the start of a session.
///
/// An empty address list means resolution failed; every probe against it reports ERROR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub host: String,
    pub addrs: Vec<IpAddr>,
}

impl ResolvedTarget {
    pub fn new(host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        Self {
            host: host.into(),
            addrs,
        }
    }

    pub fn unresolved(host: impl Into<String>) -> Self {
        Self::new(host, Vec::new())
    }

    pub fn is_resolved(&self) -> bool {
        !self.addrs.is_empty()
    }
}

/// Tests one port. Implementations never fail: every fault is folded into the returned state.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Resolve the target once per session. IP literals resolve to themselves.
    async fn resolve(&self, target: &str) -> io::Result<Vec<IpAddr>> {
        lookup_addrs(target).await
    }

    async fn probe(&self, target: &ResolvedTarget, port: u16, grab_banner: bool) -> ProbeResult;
}

/// TCP connect prober with an optional passive banner read on the same connection.
#[derive(Debug, Clone, Default)]
pub struct TcpProber {
    timeouts: ProbeTimeouts,
}

impl TcpProber {
    pub fn new(timeouts: ProbeTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }

    /// Try each address in turn, like `TcpStream::connect` does for a host name.
    /// The state of the last failed attempt wins when none connect.
    async fn connect_any(&self, addrs: &[IpAddr], port: u16) -> Result<TcpStream, PortState> {
        let mut state = PortState::Error;
        for &ip in addrs {
            let addr = SocketAddr::new(ip, port);
            match time::timeout(self.timeouts.connect, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    trace!(%addr, error = %e, "connect failed");
                    state = classify_connect_error(&e);
                }
                // Elapsed connect timeout: filtered or dropped, report as closed.
                Err(_) => state = PortState::Closed,
            }
        }
        Err(state)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn resolve(&self, target: &str) -> io::Result<Vec<IpAddr>> {
        time::timeout(self.timeouts.resolve, lookup_addrs(target))
            .await
            .map_err(|_| io::Error::new(ErrorKind::TimedOut, "name resolution timed out"))?
    }

    async fn probe(&self, target: &ResolvedTarget, port: u16, grab_banner: bool) -> ProbeResult {
        let mut stream = match self.connect_any(&target.addrs, port).await {
            Ok(stream) => stream,
            Err(state) => return ProbeResult::new(port, state),
        };

        let mut result = ProbeResult::new(port, PortState::Open);
        if grab_banner {
            let banner = read_banner(&mut stream, self.timeouts.banner).await;
            result.banner = Some(banner.unwrap_or_else(|| NO_BANNER.to_string()));
        }
        result
    }
}

/// All distinct addresses for `target`, in resolver order.
pub async fn lookup_addrs(target: &str) -> io::Result<Vec<IpAddr>> {
    if let Ok(ip) = target.trim().parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    let mut addrs: Vec<IpAddr> = Vec::new();
    for sa in net::lookup_host((target.trim(), 0)).await? {
        if !addrs.contains(&sa.ip()) {
            addrs.push(sa.ip());
        }
    }
    if addrs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            format!("{target} resolved to no addresses"),
        ));
    }
    Ok(addrs)
}

/// Map a connect error into CLOSED (the port said no or is unreachable) or ERROR (anything else).
pub fn classify_connect_error(err: &io::Error) -> PortState {
    match err.kind() {
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::TimedOut
        | ErrorKind::HostUnreachable
        | ErrorKind::NetworkUnreachable => PortState::Closed,
        _ => PortState::Error,
    }
}

/// Read up to `BANNER_BUF_SIZE` bytes with a deadline; lossy-decode and trim. Empty reads yield `None`.
async fn read_banner(stream: &mut TcpStream, limit: Duration) -> Option<String> {
    let mut buf = vec![0u8; BANNER_BUF_SIZE];
    match time::timeout(limit, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let s = String::from_utf8_lossy(&buf).trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
        _ => None,
    }
}
