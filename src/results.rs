use crate::config::{ChannelMode, ConnectionMode, Implementation, Operation, OperationConfig};
use crate::error::{ArrowError, Result};
use crate::statistics::OperationResults;
use crate::utils::{format_decimal, format_thousands, print_bracket, print_field, print_numeric_field};
use serde::{Deserialize, Serialize};
use std::fs::Permissions;
use std::io::{BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The `config` group of the summary artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(rename = "impl")]
    pub implementation: Implementation,
    pub address: String,
    pub output_dir: PathBuf,
    pub connection_mode: ConnectionMode,
    pub channel_mode: ChannelMode,
    pub operation: Operation,
    pub id: String,
    pub messages: u64,
    pub payload_size: u64,
    pub credit_window: u64,
    pub timeout: u64,
}

impl From<&OperationConfig> for SummaryConfig {
    fn from(config: &OperationConfig) -> Self {
        Self {
            implementation: config.implementation,
            address: config.address.clone(),
            output_dir: config.output_dir.clone(),
            connection_mode: config.connection_mode,
            channel_mode: config.channel_mode,
            operation: config.operation,
            id: config.id.clone(),
            messages: config.messages,
            payload_size: config.payload_size,
            credit_window: config.credit_window,
            timeout: config.timeout,
        }
    }
}

/// Configuration and results of one finished operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub config: SummaryConfig,
    pub results: OperationResults,
}

impl ResultSummary {
    pub fn new(config: &OperationConfig, results: OperationResults) -> Self {
        Self {
            config: SummaryConfig::from(config),
            results,
        }
    }
}

/// Writes the summary artifact
///
/// The document is written to a temporary file next to the destination,
/// synced, and then renamed over it. A reader therefore sees either no
/// summary or a complete one, never a partial write.
pub struct SummaryPersister {
    path: PathBuf,
}

impl SummaryPersister {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Persist `summary`. Consumes the persister: a summary is written once.
    pub fn save(self, summary: &ResultSummary) -> Result<PathBuf> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, summary)?;
        file.write_all(b"\n")?;
        // Staging files are private; the published summary is not.
        file.as_file().set_permissions(Permissions::from_mode(0o644))?;
        file.as_file().sync_all()?;
        debug!("Summary staged at {:?}", file.path());

        file.persist(&self.path)
            .map_err(|e| ArrowError::Io(e.error))?;

        info!("Summary written to: {:?}", self.path);
        Ok(self.path)
    }

    /// Read a summary back.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ResultSummary> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Print the configuration block shown with `--verbose`
pub fn print_config(config: &OperationConfig) {
    print_bracket();
    print_field("Operation", &config.operation.to_string());
    print_field("Implementation", config.implementation.name());
    print_field("ID", &config.id);
    print_field("Address", &config.address);
    print_field("Connection mode", &config.connection_mode.to_string());
    print_field("Channel mode", &config.channel_mode.to_string());
    print_field("Output dir", &config.output_dir.display().to_string());
    print_numeric_field("Messages", &format_thousands(config.messages as i64), "messages");
    print_numeric_field("Payload size", &format_thousands(config.payload_size as i64), "bytes");
    print_numeric_field("Credit window", &format_thousands(config.credit_window as i64), "messages");
    print_numeric_field("Timeout", &format_thousands(config.timeout as i64), "s");
    print_field("Command", &config.command_line());
    print_bracket();
}

/// Print the final results block of a receive operation
pub fn print_results(results: &OperationResults, duration: f64) {
    print_bracket();
    print_numeric_field("Duration", &format_decimal(duration, 1), "s");
    print_numeric_field(
        "Message count",
        &format_thousands(results.message_count as i64),
        "messages",
    );
    print_numeric_field(
        "Message rate",
        &format_thousands(results.message_rate as i64),
        "messages/s",
    );
    if let Some(latency) = results.message_latency {
        print_numeric_field("Latency average", &format_decimal(latency, 1), "ms");
    }
    if let Some(quartiles) = results.message_latency_by_quartile {
        print_numeric_field("Latency by quartile", &format_quartiles(&quartiles), "ms");
    }
    print_bracket();
}

fn format_quartiles(quartiles: &[f64; 4]) -> String {
    quartiles
        .iter()
        .map(|q| format_decimal(*q, 0))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary_config(operation: Operation) -> SummaryConfig {
        SummaryConfig {
            implementation: Implementation::QpidProtonCpp,
            address: "//broker:5672/q0".to_string(),
            output_dir: PathBuf::from("/tmp/quiver-test"),
            connection_mode: ConnectionMode::Client,
            channel_mode: ChannelMode::Active,
            operation,
            id: "quiver-abcd1234".to_string(),
            messages: 1_000_000,
            payload_size: 100,
            credit_window: 1_000,
            timeout: 10,
        }
    }

    #[test]
    fn test_receiver_summary_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receiver-summary.json");
        let summary = ResultSummary {
            config: summary_config(Operation::Receive),
            results: OperationResults {
                message_count: 2,
                message_rate: 2,
                message_latency: Some(7.5),
                message_latency_by_quartile: Some([6.25, 7.5, 8.75, 10.0]),
            },
        };

        let written = SummaryPersister::new(&path).save(&summary).unwrap();
        assert_eq!(written, path);
        assert_eq!(SummaryPersister::load(&path).unwrap(), summary);

        // Only the summary is left behind; the staging file was renamed.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_sender_summary_omits_latency() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sender-summary.json");
        let summary = ResultSummary {
            config: summary_config(Operation::Send),
            results: OperationResults {
                message_count: 3,
                message_rate: 3,
                message_latency: None,
                message_latency_by_quartile: None,
            },
        };

        SummaryPersister::new(&path).save(&summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["config"]["impl"], "qpid-proton-cpp");
        assert_eq!(value["config"]["operation"], "send");
        assert_eq!(value["results"]["message_count"], 3);
        assert!(value["results"].get("message_latency").is_none());
        assert!(value["results"].get("message_latency_by_quartile").is_none());

        assert_eq!(SummaryPersister::load(&path).unwrap(), summary);
    }

    #[test]
    fn test_format_quartiles() {
        assert_eq!(format_quartiles(&[6.25, 7.5, 8.75, 1234.0]), "6 | 8 | 9 | 1,234");
    }
}
