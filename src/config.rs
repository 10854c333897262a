//! Resolved runner configuration.
//!
//! Configuration is read from a JSON file (path via `--config` or
//! `SENTRY_CONFIG`), merged with `SENTRY_*` environment overrides, then
//! validated into a fully-typed `RunnerConfig`. The run loop never sees
//! unresolved options.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BackendSelection;
use crate::frame::FrameDims;
use crate::source::{RetryPolicy, MAX_SOURCES};

const DEFAULT_OUTPUT_DIR: &str = ".";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CHANNELS: u32 = 3;
const DEFAULT_FAILURE_THRESHOLD: u32 = 30;
const DEFAULT_READ_BACKOFF_SECS: u64 = 1;
const DEFAULT_INTER_ROUND_DELAY_SECS: u64 = 1;
const DEFAULT_INTER_ATTEMPT_DELAY_MS: u64 = 0;
const DEFAULT_LIVENESS_MARKER: &str = "alive";

#[derive(Debug, Deserialize, Default)]
struct RunnerConfigFile {
    run_id: Option<u64>,
    output_dir: Option<String>,
    round_log: Option<String>,
    liveness_marker: Option<String>,
    single_pass: Option<bool>,
    frame: Option<FrameConfigFile>,
    sources: Option<Vec<SourceConfigFile>>,
    timing: Option<TimingConfigFile>,
    backend: Option<BackendConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FrameConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SourceConfigFile {
    id: u8,
    endpoint: String,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    inter_round_delay_secs: Option<u64>,
    inter_attempt_delay_ms: Option<u64>,
    read_backoff_secs: Option<u64>,
    failure_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    kind: Option<String>,
    addr: Option<String>,
}

/// One configured input slot.
#[derive(Clone, Debug)]
pub struct SourceSlot {
    pub id: u8,
    pub endpoint: String,
}

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub run_id: u64,
    pub output_dir: PathBuf,
    /// Optional global round-log path; relative paths resolve under
    /// `output_dir`.
    pub round_log: Option<PathBuf>,
    pub liveness_marker: PathBuf,
    pub single_pass: bool,
    pub dims: FrameDims,
    pub sources: Vec<SourceSlot>,
    pub inter_round_delay: Duration,
    pub inter_attempt_delay: Duration,
    pub retry: RetryPolicy,
    pub backend: BackendSelection,
}

impl RunnerConfig {
    /// Load from `SENTRY_CONFIG`, or defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var("SENTRY_CONFIG").ok() {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Self::resolve(RunnerConfigFile::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("cannot open config {}: {}", path.display(), e))?;
        let file: RunnerConfigFile = serde_json::from_str(&text)
            .map_err(|e| anyhow!("cannot parse config {}: {}", path.display(), e))?;
        Self::resolve(file)
    }

    fn resolve(file: RunnerConfigFile) -> Result<Self> {
        let output_dir = PathBuf::from(
            file.output_dir
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        );
        let frame = file.frame.unwrap_or_default();
        let dims = FrameDims::new(
            frame.width.unwrap_or(DEFAULT_WIDTH),
            frame.height.unwrap_or(DEFAULT_HEIGHT),
            frame.channels.unwrap_or(DEFAULT_CHANNELS),
        );
        let sources = file
            .sources
            .unwrap_or_default()
            .into_iter()
            .map(|s| SourceSlot {
                id: s.id,
                endpoint: s.endpoint,
            })
            .collect();
        let timing = file.timing.unwrap_or_default();
        let backend_file = file.backend.unwrap_or_default();
        let backend = match backend_file.kind.as_deref() {
            None | Some("local") => BackendSelection::Local,
            Some("remote") => BackendSelection::Remote {
                addr: backend_file
                    .addr
                    .ok_or_else(|| anyhow!("backend.addr is required for kind \"remote\""))?,
            },
            Some(other) => {
                return Err(anyhow!(
                    "backend.kind must be \"local\" or \"remote\", got {:?}",
                    other
                ))
            }
        };

        let liveness_marker = file
            .liveness_marker
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIVENESS_MARKER));

        let mut cfg = Self {
            run_id: file.run_id.unwrap_or(0),
            round_log: file.round_log.map(PathBuf::from),
            liveness_marker,
            single_pass: file.single_pass.unwrap_or(false),
            output_dir,
            dims,
            sources,
            inter_round_delay: Duration::from_secs(
                timing
                    .inter_round_delay_secs
                    .unwrap_or(DEFAULT_INTER_ROUND_DELAY_SECS),
            ),
            inter_attempt_delay: Duration::from_millis(
                timing
                    .inter_attempt_delay_ms
                    .unwrap_or(DEFAULT_INTER_ATTEMPT_DELAY_MS),
            ),
            retry: RetryPolicy {
                failure_threshold: timing
                    .failure_threshold
                    .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
                read_backoff: Duration::from_secs(
                    timing.read_backoff_secs.unwrap_or(DEFAULT_READ_BACKOFF_SECS),
                ),
            },
            backend,
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(run_id) = std::env::var("SENTRY_RUN_ID") {
            self.run_id = run_id
                .parse()
                .map_err(|_| anyhow!("SENTRY_RUN_ID must be an integer"))?;
        }
        if let Ok(dir) = std::env::var("SENTRY_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("SENTRY_ROUND_LOG") {
            if !path.trim().is_empty() {
                self.round_log = Some(PathBuf::from(path));
            }
        }
        if let Ok(addr) = std::env::var("SENTRY_REMOTE_ADDR") {
            if !addr.trim().is_empty() {
                self.backend = BackendSelection::Remote { addr };
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(anyhow!("at least one source must be configured"));
        }
        let mut seen = [false; MAX_SOURCES];
        for slot in &self.sources {
            if slot.id == 0 || slot.id as usize > MAX_SOURCES {
                return Err(anyhow!(
                    "source id {} out of range 1..={}",
                    slot.id,
                    MAX_SOURCES
                ));
            }
            if seen[slot.id as usize - 1] {
                return Err(anyhow!("source id {} configured twice", slot.id));
            }
            seen[slot.id as usize - 1] = true;
            if slot.endpoint.trim().is_empty() {
                return Err(anyhow!("source {} endpoint must not be empty", slot.id));
            }
        }
        if self.dims.byte_len() == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if self.retry.failure_threshold == 0 {
            return Err(anyhow!("failure_threshold must be >= 1"));
        }
        Ok(())
    }

    /// Marker path resolved under the output directory when relative.
    pub fn liveness_marker_path(&self) -> PathBuf {
        if self.liveness_marker.is_absolute() {
            self.liveness_marker.clone()
        } else {
            self.output_dir.join(&self.liveness_marker)
        }
    }

    /// Round-log path resolved under the output directory when relative.
    pub fn round_log_path(&self) -> Option<PathBuf> {
        self.round_log.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.output_dir.join(p)
            }
        })
    }
}
