use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Sentinel banner used when a grab was requested but nothing readable came back.
pub const NO_BANNER: &str = "no banner";

/// Classified outcome of one connection attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortState {
    Open,
    Closed,
    Error,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Open => "OPEN",
            PortState::Closed => "CLOSED",
            PortState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One probed port. `banner` is only set when a banner grab was requested on an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub state: PortState,
    pub banner: Option<String>,
}

impl ProbeResult {
    pub fn new(port: u16, state: PortState) -> Self {
        Self {
            port,
            state,
            banner: None,
        }
    }

    /// Render the result as a display/export line: `Port 22    → OPEN | SSH-2.0-demo`.
    pub fn to_line(&self) -> String {
        let mut line = format!("Port {:<5} → {}", self.port, self.state);
        if let Some(b) = &self.banner {
            line.push_str(" | ");
            line.push_str(b);
        }
        line
    }
}

/// Per-run switches, orthogonal to the profile.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    #[serde(default = "default_true")]
    pub show_closed: bool,
    #[serde(default)]
    pub grab_banners: bool,
    #[serde(default)]
    pub persist_results: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            show_closed: true,
            grab_banners: false,
            persist_results: false,
        }
    }
}

impl ScanOptions {
    /// Emit filter: open ports always pass, everything else only with `show_closed`.
    pub fn should_emit(&self, result: &ProbeResult) -> bool {
        result.state == PortState::Open || self.show_closed
    }
}

/// How a scan run ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed,
    StoppedByUser,
}

/// Lifecycle notices delivered to the presentation layer next to result lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    HostResolved(String),
    ResolveFailed,
    ScanStarting { target: String, profile: String },
    StoppedByUser,
    ScanComplete,
    ResultsSaved(PathBuf),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::HostResolved(host) => write!(f, "[+] Host resolved: {host}"),
            Notice::ResolveFailed => write!(f, "[!] Could not resolve host"),
            Notice::ScanStarting { target, profile } => {
                write!(f, "[+] Scanning {target} in {profile} mode...")
            }
            Notice::StoppedByUser => write!(f, "[!] Scan stopped by user"),
            Notice::ScanComplete => write!(f, "[✓] Scan complete"),
            Notice::ResultsSaved(path) => write!(f, "[+] results saved to {}", path.display()),
        }
    }
}

/// Exportable summary of a finished run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub target: String,
    pub profile: String,
    pub outcome: ScanOutcome,
    pub started_at: String,
    pub lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_pads_port_and_appends_banner() {
        let mut r = ProbeResult::new(22, PortState::Open);
        assert_eq!(r.to_line(), "Port 22    → OPEN");
        r.banner = Some("SSH-2.0-demo".into());
        assert_eq!(r.to_line(), "Port 22    → OPEN | SSH-2.0-demo");
        assert_eq!(
            ProbeResult::new(65535, PortState::Closed).to_line(),
            "Port 65535 → CLOSED"
        );
    }

    #[test]
    fn emit_filter_respects_show_closed() {
        let hidden = ScanOptions { show_closed: false, ..Default::default() };
        assert!(hidden.should_emit(&ProbeResult::new(80, PortState::Open)));
        assert!(!hidden.should_emit(&ProbeResult::new(81, PortState::Closed)));
        assert!(!hidden.should_emit(&ProbeResult::new(82, PortState::Error)));

        let shown = ScanOptions::default();
        assert!(shown.should_emit(&ProbeResult::new(81, PortState::Closed)));
        assert!(shown.should_emit(&ProbeResult::new(82, PortState::Error)));
    }
}
