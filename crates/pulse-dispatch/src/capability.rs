//! Capability catalogue and closed-enumeration argument parsing.
//!
//! Free-form command text never reaches a script command line. It only
//! selects among the fixed values below, or among configured credential
//! store aliases.

/// A script-backed operation exposed as a slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Tablespace,
    Fra,
    GoldenGate,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Self::Tablespace, Self::Fra, Self::GoldenGate];

    /// Maps a slash command such as `/tablespace` (leading slash optional).
    pub fn from_command(command: &str) -> Option<Self> {
        let command = command.trim();
        let command = command.strip_prefix('/').unwrap_or(command);
        match command.to_ascii_lowercase().as_str() {
            "tablespace" => Some(Self::Tablespace),
            "fra" => Some(Self::Fra),
            "gg-status" | "gg_status" => Some(Self::GoldenGate),
            _ => None,
        }
    }

    pub fn command_name(self) -> &'static str {
        match self {
            Self::Tablespace => "/tablespace",
            Self::Fra => "/fra",
            Self::GoldenGate => "/gg-status",
        }
    }

    /// Key looked up in the permission table and static overrides.
    pub fn permission_key(self) -> &'static str {
        match self {
            Self::Tablespace => "tablespace",
            Self::Fra => "fra",
            Self::GoldenGate => "goldengate",
        }
    }

    pub fn script_name(self) -> &'static str {
        match self {
            Self::Tablespace => "tablespace.py",
            Self::Fra => "fra.py",
            Self::GoldenGate => "gg_status.py",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Self::Tablespace => "/tablespace [db1|db2]",
            Self::Fra => "/fra [db1|db2]",
            Self::GoldenGate => "/gg-status [gg1|gg2] [info|credstore|lag <credstore-alias>]",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Self::Tablespace => "tablespace usage report",
            Self::Fra => "fast recovery area usage",
            Self::GoldenGate => "GoldenGate process info, credential store and lag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbTarget {
    #[default]
    Db1,
    Db2,
}

impl DbTarget {
    fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("db1") {
            Some(Self::Db1)
        } else if token.eq_ignore_ascii_case("db2") {
            Some(Self::Db2)
        } else {
            None
        }
    }

    /// First recognized token wins; anything else selects `db1`.
    pub fn parse_or_default(raw: &str) -> Self {
        raw.split_whitespace()
            .find_map(Self::parse)
            .unwrap_or_default()
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Db1 => "db1",
            Self::Db2 => "db2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GgHost {
    #[default]
    Gg1,
    Gg2,
}

impl GgHost {
    fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gg1") {
            Some(Self::Gg1)
        } else if token.eq_ignore_ascii_case("gg2") {
            Some(Self::Gg2)
        } else {
            None
        }
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Gg1 => "gg1",
            Self::Gg2 => "gg2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GgCommand {
    Info,
    Credstore,
    /// `credstore` is always a value taken from the configured allowlist.
    Lag { credstore: String },
}

impl GgCommand {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Credstore => "credstore",
            Self::Lag { .. } => "lag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GgCommandKind {
    Info,
    Credstore,
    Lag,
}

impl GgCommandKind {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "credstore" => Some(Self::Credstore),
            "lag" => Some(Self::Lag),
            _ => None,
        }
    }
}

/// A fully validated capability request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityRequest {
    Tablespace { db: DbTarget },
    Fra { db: DbTarget },
    GoldenGate { host: GgHost, command: GgCommand },
}

impl CapabilityRequest {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Tablespace { .. } => Capability::Tablespace,
            Self::Fra { .. } => Capability::Fra,
            Self::GoldenGate { .. } => Capability::GoldenGate,
        }
    }

    /// Script flags in argv order.
    pub fn script_args(&self) -> Vec<String> {
        match self {
            Self::Tablespace { db } | Self::Fra { db } => {
                vec!["--db".to_string(), db.as_arg().to_string()]
            }
            Self::GoldenGate { host, command } => {
                let mut args = vec![
                    "--host".to_string(),
                    host.as_arg().to_string(),
                    "--command".to_string(),
                    command.as_arg().to_string(),
                ];
                if let GgCommand::Lag { credstore } = command {
                    args.push("--credstore".to_string());
                    args.push(credstore.clone());
                }
                args
            }
        }
    }
}

/// Argument text that maps to no safe default. Carries the reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageHint {
    pub message: String,
}

pub fn parse_capability_request(
    capability: Capability,
    raw_argument_text: &str,
    credstore_allowlist: &[String],
) -> Result<CapabilityRequest, UsageHint> {
    match capability {
        Capability::Tablespace => Ok(CapabilityRequest::Tablespace {
            db: DbTarget::parse_or_default(raw_argument_text),
        }),
        Capability::Fra => Ok(CapabilityRequest::Fra {
            db: DbTarget::parse_or_default(raw_argument_text),
        }),
        Capability::GoldenGate => parse_gg_request(raw_argument_text, credstore_allowlist),
    }
}

fn parse_gg_request(
    raw_argument_text: &str,
    credstore_allowlist: &[String],
) -> Result<CapabilityRequest, UsageHint> {
    let mut host = None;
    let mut kind = None;
    let mut alias_candidate = None;
    for token in raw_argument_text.split_whitespace() {
        if host.is_none() {
            if let Some(parsed) = GgHost::parse(token) {
                host = Some(parsed);
                continue;
            }
        }
        if kind.is_none() {
            if let Some(parsed) = GgCommandKind::parse(token) {
                kind = Some(parsed);
                continue;
            }
        }
        if alias_candidate.is_none() {
            alias_candidate = Some(token);
        }
    }

    let command = match kind.unwrap_or(GgCommandKind::Info) {
        GgCommandKind::Info => GgCommand::Info,
        GgCommandKind::Credstore => GgCommand::Credstore,
        GgCommandKind::Lag => {
            let credstore = alias_candidate.and_then(|candidate| {
                credstore_allowlist
                    .iter()
                    .find(|alias| alias.as_str() == candidate)
            });
            let Some(credstore) = credstore else {
                return Err(lag_usage_hint(credstore_allowlist));
            };
            GgCommand::Lag {
                credstore: credstore.clone(),
            }
        }
    };
    Ok(CapabilityRequest::GoldenGate {
        host: host.unwrap_or_default(),
        command,
    })
}

fn lag_usage_hint(credstore_allowlist: &[String]) -> UsageHint {
    let allowed = if credstore_allowlist.is_empty() {
        "no credential store aliases are configured".to_string()
    } else {
        format!("allowed aliases: {}", credstore_allowlist.join(", "))
    };
    UsageHint {
        message: format!("Usage: /gg-status [gg1|gg2] lag <credstore-alias> ({allowed})"),
    }
}
