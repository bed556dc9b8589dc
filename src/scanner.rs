use crate::error::ScanError;
use crate::persist::{self, DEFAULT_OUTPUT_FILE};
use crate::probe::{ProbeTimeouts, Prober, ResolvedTarget, TcpProber};
use crate::profile::ScanProfile;
use crate::sink::{ResultSink, ScanObserver};
use crate::types::{Notice, ScanOptions, ScanOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of the controller. A scan moves Idle → Running → (Stopping | Completing) → Idle.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Running,
    Stopping,
    Completing,
}

/// Counters and status reported when a run finishes.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: ScanOutcome,
    /// Ports in the profile's range.
    pub total: usize,
    /// Ports handed to a worker before dispatch ended.
    pub dispatched: usize,
    /// Ports that were actually probed (dispatched and not cancelled before probing).
    pub probed: usize,
}

/// Point-in-time view of the controller, for status endpoints.
#[derive(Serialize, Debug, Clone)]
pub struct ScanStatus {
    pub phase: ScanPhase,
    pub target: Option<String>,
    pub profile: Option<String>,
    pub last_summary: Option<RunSummary>,
    pub lines: usize,
}

#[derive(Debug)]
struct ControlState {
    phase: ScanPhase,
    cancel: Option<CancellationToken>,
    target: Option<String>,
    profile: Option<String>,
    last_summary: Option<RunSummary>,
}

/// Read-only inputs of one run plus its cancellation flag, shared by every worker.
#[derive(Debug)]
struct ScanSession {
    target: String,
    profile: ScanProfile,
    options: ScanOptions,
    cancel: CancellationToken,
}

/// Owns scan lifecycle: validates profiles, dispatches bounded-concurrency probes, handles stop.
///
/// Cheap to clone; clones share the same state, so one clone can `stop()` a scan another is running.
#[derive(Clone)]
pub struct ScanController {
    prober: Arc<dyn Prober>,
    sink: ResultSink,
    state: Arc<Mutex<ControlState>>,
}

impl ScanController {
    /// Controller using a `TcpProber` with default one-second timeouts.
    pub fn new(observer: Arc<dyn ScanObserver>) -> Self {
        Self::with_timeouts(observer, ProbeTimeouts::default())
    }

    pub fn with_timeouts(observer: Arc<dyn ScanObserver>, timeouts: ProbeTimeouts) -> Self {
        Self::with_prober(observer, Arc::new(TcpProber::new(timeouts)))
    }

    pub fn with_prober(observer: Arc<dyn ScanObserver>, prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            sink: ResultSink::new(observer),
            state: Arc::new(Mutex::new(ControlState {
                phase: ScanPhase::Idle,
                cancel: None,
                target: None,
                profile: None,
                last_summary: None,
            })),
        }
    }

    /// Run a full scan with a named profile and wait for it to finish or be stopped.
    pub async fn start(
        &self,
        target: &str,
        profile_name: &str,
        options: ScanOptions,
    ) -> Result<RunSummary, ScanError> {
        let run = self.begin(target, profile_name, options).await?;
        Ok(run.run().await)
    }

    pub async fn start_with_profile(
        &self,
        target: &str,
        profile: ScanProfile,
        options: ScanOptions,
    ) -> Result<RunSummary, ScanError> {
        let run = self.begin_with_profile(target, profile, options).await?;
        Ok(run.run().await)
    }

    /// Validate and claim the controller without dispatching yet. Fails before touching results.
    pub async fn begin(
        &self,
        target: &str,
        profile_name: &str,
        options: ScanOptions,
    ) -> Result<ScanRun, ScanError> {
        let profile: ScanProfile = profile_name.parse()?;
        self.begin_with_profile(target, profile, options).await
    }

    pub async fn begin_with_profile(
        &self,
        target: &str,
        profile: ScanProfile,
        options: ScanOptions,
    ) -> Result<ScanRun, ScanError> {
        let cancel = CancellationToken::new();
        {
            let mut st = self.control();
            if st.phase != ScanPhase::Idle {
                return Err(ScanError::AlreadyRunning);
            }
            st.phase = ScanPhase::Running;
            st.cancel = Some(cancel.clone());
            st.target = Some(target.to_string());
            st.profile = Some(profile.name().to_string());
        }
        // Constructed before any await so a dropped future still returns the controller to Idle.
        let run = ScanRun {
            controller: self.clone(),
            output: None,
            session: Arc::new(ScanSession {
                target: target.to_string(),
                profile,
                options,
                cancel,
            }),
        };
        self.sink.clear().await;
        Ok(run)
    }

    /// Request cooperative cancellation. Idempotent, and a no-op when idle.
    pub fn stop(&self) {
        let mut st = self.control();
        if let Some(cancel) = &st.cancel {
            cancel.cancel();
        }
        if st.phase == ScanPhase::Running {
            info!("stop requested");
            st.phase = ScanPhase::Stopping;
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.control().phase
    }

    pub fn last_summary(&self) -> Option<RunSummary> {
        self.control().last_summary
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Copy of the lines emitted so far in the current or most recent run.
    pub async fn snapshot(&self) -> Vec<String> {
        self.sink.snapshot().await
    }

    pub async fn status(&self) -> ScanStatus {
        let lines = self.sink.len().await;
        let st = self.control();
        ScanStatus {
            phase: st.phase,
            target: st.target.clone(),
            profile: st.profile.clone(),
            last_summary: st.last_summary,
            lines,
        }
    }

    fn control(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A claimed scan session. `run` dispatches it; dropping it at any point releases the controller.
pub struct ScanRun {
    controller: ScanController,
    session: Arc<ScanSession>,
    output: Option<PathBuf>,
}

impl ScanRun {
    pub fn target(&self) -> &str {
        &self.session.target
    }

    pub fn profile(&self) -> &ScanProfile {
        &self.session.profile
    }

    /// File the lines are saved to when `persist_results` is set (default `scan_output.txt`).
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output(&self) -> &Path {
        self.output
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_OUTPUT_FILE))
    }

    /// Probe every port in the profile's range, at most `max_concurrency` at a time.
    pub async fn run(self) -> RunSummary {
        let session = self.session.clone();
        let sink = self.controller.sink.clone();
        let profile = &session.profile;

        sink.notice(Notice::ScanStarting {
            target: session.target.clone(),
            profile: profile.name().to_string(),
        })
        .await;
        info!(
            host = %session.target,
            profile = profile.name(),
            ports = profile.port_count(),
            concurrency = profile.max_concurrency(),
            "scan starting"
        );

        // Resolved once; a failed lookup leaves no addresses and every port reports ERROR.
        let target = match self.controller.prober.resolve(&session.target).await {
            Ok(addrs) => ResolvedTarget::new(session.target.clone(), addrs),
            Err(e) => {
                warn!(host = %session.target, error = %e, "target did not resolve");
                ResolvedTarget::unresolved(session.target.clone())
            }
        };
        let target = Arc::new(target);

        let sem = Arc::new(Semaphore::new(profile.max_concurrency()));
        let probed = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        let mut dispatched = 0usize;

        for port in profile.ports() {
            if session.cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => break,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let session = session.clone();
            let target = target.clone();
            let prober = self.controller.prober.clone();
            let sink = sink.clone();
            let probed = probed.clone();
            set.spawn(async move {
                let _permit = permit; // slot held through probe and pacing delay

                if session.cancel.is_cancelled() {
                    return;
                }
                let result = prober
                    .probe(&target, port, session.options.grab_banners)
                    .await;
                probed.fetch_add(1, Ordering::Relaxed);
                debug!(port, state = %result.state, "probed");

                if session.options.should_emit(&result) {
                    sink.emit(&result).await;
                }
                let delay = session.profile.delay();
                if !delay.is_zero() {
                    time::sleep(delay).await;
                }
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "probe task failed");
            }
        }

        let outcome = if session.cancel.is_cancelled() {
            ScanOutcome::StoppedByUser
        } else {
            ScanOutcome::Completed
        };
        let summary = RunSummary {
            outcome,
            total: profile.port_count(),
            dispatched,
            probed: probed.load(Ordering::Relaxed),
        };

        {
            let mut st = self.controller.control();
            if outcome == ScanOutcome::Completed {
                st.phase = ScanPhase::Completing;
            }
            st.last_summary = Some(summary);
        }
        match outcome {
            ScanOutcome::StoppedByUser => {
                info!(dispatched, total = summary.total, "scan stopped by user");
                sink.notice(Notice::StoppedByUser).await;
            }
            ScanOutcome::Completed => {
                info!(total = summary.total, "scan complete");
                sink.notice(Notice::ScanComplete).await;
            }
        }

        if session.options.persist_results {
            let path = self.output().to_path_buf();
            let lines = sink.snapshot().await;
            match persist::write_lines(&path, &lines) {
                Ok(()) => sink.notice(Notice::ResultsSaved(path)).await,
                Err(e) => warn!(error = ?e, "saving results failed"),
            }
        }
        summary
    }
}

impl Drop for ScanRun {
    fn drop(&mut self) {
        let mut st = self.controller.control();
        st.phase = ScanPhase::Idle;
        st.cancel = None;
    }
}
