use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Running => "running",
            HealthStatus::Stopped => "stopped",
            HealthStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "starting" => Some(HealthStatus::Starting),
            "running" => Some(HealthStatus::Running),
            "stopped" => Some(HealthStatus::Stopped),
            "error" => Some(HealthStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `status|rfc3339` file polled by external health checks.
pub struct HealthFile {
    path: PathBuf,
}

impl HealthFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, status: HealthStatus) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let line = format!("{}|{}", status, Utc::now().to_rfc3339());
        fs::write(&self.path, line)
            .with_context(|| format!("Failed to write health file {}", self.path.display()))
    }

    pub fn read(&self) -> Result<(HealthStatus, DateTime<Utc>)> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read health file {}", self.path.display()))?;
        let Some((status, ts)) = content.trim().split_once('|') else {
            bail!("Malformed health file: {}", content.trim());
        };
        let status = HealthStatus::parse(status)
            .with_context(|| format!("Unknown health status: {}", status))?;
        let ts = DateTime::parse_from_rfc3339(ts.trim())
            .context("Bad health timestamp")?
            .with_timezone(&Utc);
        Ok((status, ts))
    }
}
