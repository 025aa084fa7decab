//! Human-readable target names shown in progress lines and reply headers.

use crate::{CapabilityRequest, DbTarget, GgHost};

pub const DB1_NAME_ENV: &str = "DB1_NAME";
pub const DB2_NAME_ENV: &str = "DB2_NAME";
pub const GG1_HOST_ENV: &str = "GG1_HOST";
pub const GG2_HOST_ENV: &str = "GG2_HOST";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDisplayNames {
    pub db1: String,
    pub db2: String,
    pub gg1: String,
    pub gg2: String,
}

impl Default for TargetDisplayNames {
    fn default() -> Self {
        Self {
            db1: "DB1".to_string(),
            db2: "DB2".to_string(),
            gg1: "GG1".to_string(),
            gg2: "GG2".to_string(),
        }
    }
}

impl TargetDisplayNames {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank or missing values keep the fixed fallback name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: String| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            db1: pick(DB1_NAME_ENV, defaults.db1),
            db2: pick(DB2_NAME_ENV, defaults.db2),
            gg1: pick(GG1_HOST_ENV, defaults.gg1),
            gg2: pick(GG2_HOST_ENV, defaults.gg2),
        }
    }

    pub fn db(&self, target: DbTarget) -> &str {
        match target {
            DbTarget::Db1 => &self.db1,
            DbTarget::Db2 => &self.db2,
        }
    }

    pub fn gg(&self, host: GgHost) -> &str {
        match host {
            GgHost::Gg1 => &self.gg1,
            GgHost::Gg2 => &self.gg2,
        }
    }

    pub fn for_request(&self, request: &CapabilityRequest) -> &str {
        match request {
            CapabilityRequest::Tablespace { db } | CapabilityRequest::Fra { db } => self.db(*db),
            CapabilityRequest::GoldenGate { host, .. } => self.gg(*host),
        }
    }
}

/// Interim line posted while a script runs.
pub fn progress_line(request: &CapabilityRequest, names: &TargetDisplayNames) -> String {
    let target = names.for_request(request);
    match request {
        CapabilityRequest::Tablespace { .. } => format!("Checking tablespace usage on {target}..."),
        CapabilityRequest::Fra { .. } => format!("Checking FRA usage on {target}..."),
        CapabilityRequest::GoldenGate { command, .. } => {
            format!("Running GoldenGate {} on {target}...", command.as_arg())
        }
    }
}
