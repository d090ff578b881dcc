//! Scoring Gateway
//!
//! Brokers the price-acceptability decision from an external scoring
//! process. The process is invoked as
//!
//! ```text
//! <candidate> <script> check '<json-payload>'
//! ```
//!
//! with nothing on stdin. Candidates are tried in order and a candidate is
//! only abandoned when it cannot be started at all. Once a process has
//! started its result is final: exit code 0 with a JSON object on stdout
//! is a response, anything else is `ScoringFailed`. An accept or reject
//! verdict must carry `market_modal_price`.
//!
//! On unix each process leads its own process group, and a timeout kills
//! the whole group so helpers it spawned do not outlive it.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::error::{TraceError, TraceResult};
use crate::types::{ScoringRequest, ScoringResponse, ScoringStatus};

/// Longest diagnostic excerpt carried in an error
const MAX_DIAGNOSTIC_CHARS: usize = 400;

/// Price scorer
#[async_trait]
pub trait PriceScorer: Send + Sync {
    /// Score one price. Blocks until a verdict or a failure is available.
    async fn score(&self, request: &ScoringRequest) -> TraceResult<ScoringResponse>;
}

/// Scorer backed by an external process
pub struct ProcessScorer {
    config: ScoringConfig,
}

impl ProcessScorer {
    /// Create a new process scorer
    pub fn new(config: ScoringConfig) -> TraceResult<Self> {
        if config.candidates.is_empty() {
            return Err(TraceError::Configuration(
                "scoring requires at least one candidate".to_string(),
            ));
        }
        if config.timeout_secs == 0 {
            return Err(TraceError::Configuration(
                "scoring timeout must be > 0".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Scoring configuration
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    fn command_for(&self, candidate: &str, payload: &str) -> Command {
        let mut cmd = Command::new(candidate);
        cmd.arg(&self.config.script)
            .arg(&self.config.command)
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Turn a finished process into a response or `ScoringFailed`
    fn interpret(candidate: &str, output: Output) -> TraceResult<ScoringResponse> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(TraceError::ScoringFailed(format!(
                "`{}` exited with {:?}: {}",
                candidate,
                output.status.code(),
                excerpt(&stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: serde_json::Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            TraceError::ScoringFailed(format!(
                "`{}` returned invalid JSON ({}): stdout={:?} stderr={:?}",
                candidate,
                e,
                excerpt(&stdout),
                excerpt(&stderr)
            ))
        })?;

        let response: ScoringResponse = serde_json::from_value(value).map_err(|e| {
            TraceError::ScoringFailed(format!(
                "`{}` returned an unexpected response shape: {}",
                candidate, e
            ))
        })?;

        if response.status != ScoringStatus::Error && response.market_modal_price.is_none() {
            return Err(TraceError::ScoringFailed(format!(
                "`{}` returned a {:?} verdict without market_modal_price",
                candidate, response.status
            )));
        }
        Ok(response)
    }
}

/// Kill every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: killpg takes no pointers; the group was created for this child.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "Process group {} already gone: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn excerpt(text: &str) -> String {
    text.trim().chars().take(MAX_DIAGNOSTIC_CHARS).collect()
}

#[async_trait]
impl PriceScorer for ProcessScorer {
    async fn score(&self, request: &ScoringRequest) -> TraceResult<ScoringResponse> {
        if !request.is_well_formed() {
            return Err(TraceError::InvalidInput(
                "scoring request requires commodity, state, district, market and a finite price"
                    .to_string(),
            ));
        }

        let payload = serde_json::to_string(request)?;
        let limit = Duration::from_secs(self.config.timeout_secs);
        let mut start_errors = Vec::new();

        for candidate in &self.config.candidates {
            let child = match self.command_for(candidate, &payload).spawn() {
                Ok(child) => child,
                Err(e) => {
                    debug!("Scoring candidate `{}` could not start: {}", candidate, e);
                    start_errors.push(format!("{}: {}", candidate, e));
                    continue;
                }
            };

            debug!("Scoring process started via `{}`", candidate);
            let pid = child.id();

            // Dropping the future on timeout drops the child, which kills it.
            let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!("Scoring process `{}` failed while running: {}", candidate, e);
                    return Err(TraceError::ScoringFailed(format!(
                        "`{}` could not be awaited: {}",
                        candidate, e
                    )));
                }
                Err(_) => {
                    kill_process_group(pid);
                    warn!(
                        "Scoring process `{}` exceeded {}s and was terminated",
                        candidate, self.config.timeout_secs
                    );
                    return Err(TraceError::ScoringFailed(format!(
                        "`{}` timed out after {}s",
                        candidate, self.config.timeout_secs
                    )));
                }
            };

            let result = Self::interpret(candidate, output);
            if let Err(e) = &result {
                warn!("{}", e);
            }
            return result;
        }

        Err(TraceError::ScoringUnavailable(format!(
            "no scoring candidate could be started ({})",
            start_errors.join("; ")
        )))
    }
}

/// Scorer returning pre-programmed answers
///
/// Answers are consumed in order; the last one repeats. Counts every call.
pub struct StaticScorer {
    answers: Mutex<Vec<TraceResult<ScoringResponse>>>,
    calls: AtomicU64,
}

impl StaticScorer {
    /// Always answer with `response`
    pub fn new(response: ScoringResponse) -> Self {
        Self::sequence(vec![Ok(response)])
    }

    /// Always fail with `error`
    pub fn failing(error: TraceError) -> Self {
        Self::sequence(vec![Err(error)])
    }

    /// Answer with each entry in turn, repeating the last
    pub fn sequence(answers: Vec<TraceResult<ScoringResponse>>) -> Self {
        Self {
            answers: Mutex::new(answers),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of `score` calls received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceScorer for StaticScorer {
    async fn score(&self, _request: &ScoringRequest) -> TraceResult<ScoringResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().await;
        match answers.len() {
            0 => Err(TraceError::ScoringUnavailable("no scripted answer".to_string())),
            1 => answers[0].clone(),
            _ => answers.remove(0),
        }
    }
}
