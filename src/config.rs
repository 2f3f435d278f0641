//! # Operation Configuration
//!
//! Turns parsed command-line arguments into a validated [`OperationConfig`],
//! the single source of truth for one arrow run. Everything that can be
//! rejected up front is rejected here: unknown implementation names, bad
//! addresses, a missing collaborator executable, an unusable output
//! directory. Once a config exists, the run only fails for runtime reasons.

use crate::cli::Args;
use crate::error::{ArrowError, Result};
use crate::transfers::{parse_receive, parse_send, RecordParser};
use crate::utils::{make_temp_dir, unique_id};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// The role an arrow plays in a test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Send messages
    Send,
    /// Receive messages
    Receive,
}

impl Operation {
    /// Name used as the output file prefix.
    pub fn role(&self) -> &'static str {
        match self {
            Operation::Send => "sender",
            Operation::Receive => "receiver",
        }
    }

    /// Capitalized name for user-facing messages.
    pub fn title(&self) -> &'static str {
        match self {
            Operation::Send => "Send",
            Operation::Receive => "Receive",
        }
    }

    /// The transfer-log line parser for this role.
    pub fn parser(&self) -> RecordParser {
        match self {
            Operation::Send => parse_send,
            Operation::Receive => parse_receive,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Send => write!(f, "send"),
            Operation::Receive => write!(f, "receive"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Client,
    Server,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Client => write!(f, "client"),
            ConnectionMode::Server => write!(f, "server"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Active,
    Passive,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Active => write!(f, "active"),
            ChannelMode::Passive => write!(f, "passive"),
        }
    }
}

/// Messaging implementations that ship an arrow collaborator.
///
/// Serialized by canonical name, which is also the suffix of the
/// collaborator executable (`exec/arrow-<name>`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Implementation {
    ActivemqJms,
    ActivemqArtemisJms,
    QpidJms,
    QpidMessagingCpp,
    QpidMessagingPython,
    QpidProtonCpp,
    QpidProtonPython,
    Rhea,
    VertxProton,
}

impl Implementation {
    pub const ALL: [Implementation; 9] = [
        Implementation::ActivemqJms,
        Implementation::ActivemqArtemisJms,
        Implementation::QpidJms,
        Implementation::QpidMessagingCpp,
        Implementation::QpidMessagingPython,
        Implementation::QpidProtonCpp,
        Implementation::QpidProtonPython,
        Implementation::Rhea,
        Implementation::VertxProton,
    ];

    /// Short names accepted in addition to the canonical ones.
    const ALIASES: [(&'static str, Implementation); 6] = [
        ("artemis-jms", Implementation::ActivemqArtemisJms),
        ("cpp", Implementation::QpidProtonCpp),
        ("java", Implementation::VertxProton),
        ("javascript", Implementation::Rhea),
        ("jms", Implementation::QpidJms),
        ("python", Implementation::QpidProtonPython),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Implementation::ActivemqJms => "activemq-jms",
            Implementation::ActivemqArtemisJms => "activemq-artemis-jms",
            Implementation::QpidJms => "qpid-jms",
            Implementation::QpidMessagingCpp => "qpid-messaging-cpp",
            Implementation::QpidMessagingPython => "qpid-messaging-python",
            Implementation::QpidProtonCpp => "qpid-proton-cpp",
            Implementation::QpidProtonPython => "qpid-proton-python",
            Implementation::Rhea => "rhea",
            Implementation::VertxProton => "vertx-proton",
        }
    }

    /// Resolve a canonical name or alias.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|imp| imp.name() == name)
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map(|(_, imp)| *imp)
            })
            .ok_or_else(|| ArrowError::Config(format!("Implementation '{}' is unknown", name)))
    }

    /// Location of the collaborator executable under `home`.
    pub fn exec_file(&self, home: &Path) -> PathBuf {
        home.join("exec").join(format!("arrow-{}", self.name()))
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Implementation {
    type Err = ArrowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// A messaging address decomposed into the parts the collaborator takes.
///
/// Grammar: `[//DOMAIN/]PATH`, where `DOMAIN` is `HOST[:PORT]`. The domain
/// defaults to `localhost` and a missing port is passed on as `-`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: String,
    pub path: String,
}

impl FromStr for Address {
    type Err = ArrowError;

    fn from_str(s: &str) -> Result<Self> {
        let (domain, path) = match s.strip_prefix("//") {
            Some(rest) => rest.split_once('/').ok_or_else(|| {
                ArrowError::Config(format!("Address '{}' has no path after the domain", s))
            })?,
            None => ("localhost", s),
        };

        if path.is_empty() {
            return Err(ArrowError::Config(format!("Address '{}' has an empty path", s)));
        }

        let domain = if domain.is_empty() { "localhost" } else { domain };
        let (host, port) = domain.split_once(':').unwrap_or((domain, "-"));

        Ok(Self {
            host: host.to_string(),
            port: port.to_string(),
            path: path.to_string(),
        })
    }
}

/// Validated configuration for one arrow operation.
#[derive(Clone, Debug)]
pub struct OperationConfig {
    pub implementation: Implementation,
    /// The address exactly as given by the user
    pub address: String,
    pub host: String,
    pub port: String,
    pub path: String,
    pub output_dir: PathBuf,
    /// Collaborator executable resolved from the implementation
    pub impl_file: PathBuf,
    pub connection_mode: ConnectionMode,
    pub channel_mode: ChannelMode,
    pub operation: Operation,
    pub id: String,
    pub messages: u64,
    pub payload_size: u64,
    pub credit_window: u64,
    /// Stall timeout in seconds
    pub timeout: u64,
    pub quiet: bool,
    pub verbose: bool,
}

impl OperationConfig {
    /// Build and validate the configuration from CLI arguments.
    ///
    /// Creates the output directory when it does not exist yet (or a fresh
    /// temporary one when none was given) and checks that the collaborator
    /// executable is present.
    pub fn from_args(args: &Args) -> Result<Self> {
        let implementation = Implementation::from_name(&args.implementation)?;
        let address: Address = args.address.parse()?;

        let (connection_mode, mut channel_mode) = if args.server {
            (ConnectionMode::Server, ChannelMode::Passive)
        } else {
            (ConnectionMode::Client, ChannelMode::Active)
        };
        if args.passive {
            channel_mode = ChannelMode::Passive;
        }

        let id = args
            .id
            .clone()
            .unwrap_or_else(|| format!("quiver-{}", unique_id(4)));

        let output_dir = match &args.output {
            Some(dir) => {
                if !dir.exists() {
                    std::fs::create_dir_all(dir)?;
                }
                dir.clone()
            }
            None => make_temp_dir("quiver-")?,
        };

        if !output_dir.is_dir() {
            return Err(ArrowError::Config(format!(
                "Invalid output dir at '{}'",
                output_dir.display()
            )));
        }

        let impl_file = implementation.exec_file(&args.home);
        if !impl_file.is_file() {
            return Err(ArrowError::ProcessSpawn {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No impl at '{}'", impl_file.display()),
                ),
                path: impl_file,
            });
        }

        debug!("Resolved implementation {} to {:?}", implementation, impl_file);

        Ok(Self {
            implementation,
            address: args.address.clone(),
            host: address.host,
            port: address.port,
            path: address.path,
            output_dir,
            impl_file,
            connection_mode,
            channel_mode,
            operation: args.operation,
            id,
            messages: args.messages,
            payload_size: args.bytes,
            credit_window: args.credit,
            timeout: args.timeout,
            quiet: args.quiet,
            verbose: args.verbose,
        })
    }

    pub fn transfers_file(&self) -> PathBuf {
        self.output_file("transfers.csv")
    }

    pub fn snapshots_file(&self) -> PathBuf {
        self.output_file("snapshots.csv")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.output_file("summary.json")
    }

    fn output_file(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}", self.operation.role(), suffix))
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Positional arguments passed to the collaborator, in contract order.
    pub fn collaborator_args(&self) -> Vec<String> {
        vec![
            self.connection_mode.to_string(),
            self.channel_mode.to_string(),
            self.operation.to_string(),
            self.id.clone(),
            self.host.clone(),
            self.port.clone(),
            self.path.clone(),
            self.messages.to_string(),
            self.payload_size.to_string(),
            self.credit_window.to_string(),
        ]
    }

    /// The full collaborator command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.impl_file.display().to_string()];
        parts.extend(self.collaborator_args());
        parts.join(" ")
    }
}
