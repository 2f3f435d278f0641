use crate::config::Operation;
use clap::Parser;
use std::path::PathBuf;

/// Send or receive a set number of messages as fast as possible using a
/// single connection
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Either 'send' or 'receive'
    #[clap(value_enum, value_name = "OPERATION")]
    pub operation: Operation,

    /// The location of a message queue ([//DOMAIN/]PATH)
    #[clap(value_name = "ADDRESS")]
    pub address: String,

    /// Send or receive COUNT messages
    #[clap(short = 'm', long, value_name = "COUNT", default_value = crate::defaults::MESSAGES, value_parser = parse_int_with_unit)]
    pub messages: u64,

    /// Use NAME implementation
    #[clap(long = "impl", value_name = "NAME", default_value = crate::defaults::IMPLEMENTATION)]
    pub implementation: String,

    /// Send message bodies containing COUNT bytes
    #[clap(long, value_name = "COUNT", default_value = crate::defaults::BYTES, value_parser = parse_int_with_unit)]
    pub bytes: u64,

    /// Sustain credit for COUNT incoming transfers
    #[clap(long, value_name = "COUNT", default_value = crate::defaults::CREDIT, value_parser = parse_int_with_unit)]
    pub credit: u64,

    /// Fail after SECONDS without transfers
    #[clap(long, value_name = "SECONDS", default_value = crate::defaults::TIMEOUT, value_parser = parse_int_with_unit)]
    pub timeout: u64,

    /// Save output files to DIRECTORY
    #[clap(long, value_name = "DIRECTORY")]
    pub output: Option<PathBuf>,

    /// Initialize and immediately exit
    #[clap(long, default_value_t = false)]
    pub init_only: bool,

    /// Print nothing to the console
    #[clap(long, default_value_t = false)]
    pub quiet: bool,

    /// Print details to the console
    #[clap(long, default_value_t = false)]
    pub verbose: bool,

    /// Use ID as the client or server identity
    #[clap(long, value_name = "ID")]
    pub id: Option<String>,

    /// Operate in server mode
    #[clap(long, default_value_t = false)]
    pub server: bool,

    /// Operate in passive mode
    #[clap(long, default_value_t = false)]
    pub passive: bool,

    /// Directory containing the exec/arrow-<impl> collaborators
    #[clap(long, value_name = "DIRECTORY", env = "QUIVER_HOME", default_value = ".")]
    pub home: PathBuf,

    /// Also write log events to FILE
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

/// Parse an integer with an optional unit suffix (e.g., "100", "1k", "1m")
pub fn parse_int_with_unit(s: &str) -> Result<u64, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Value cannot be empty".to_string());
    }

    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 1_000_000)
    } else if let Some(stripped) = s.strip_suffix('k') {
        (stripped, 1_000)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("Failure parsing '{}' as integer with unit", s))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("Value '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_with_unit() {
        assert_eq!(parse_int_with_unit("100").unwrap(), 100);
        assert_eq!(parse_int_with_unit("1k").unwrap(), 1_000);
        assert_eq!(parse_int_with_unit("1m").unwrap(), 1_000_000);
        assert_eq!(parse_int_with_unit("25m").unwrap(), 25_000_000);

        assert!(parse_int_with_unit("").is_err());
        assert!(parse_int_with_unit("k").is_err());
        assert!(parse_int_with_unit("1g").is_err());
        assert!(parse_int_with_unit("-5").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["quiver-arrow", "send", "q0"]);

        assert_eq!(args.operation, Operation::Send);
        assert_eq!(args.messages, 1_000_000);
        assert_eq!(args.bytes, 100);
        assert_eq!(args.credit, 1_000);
        assert_eq!(args.timeout, 10);
        assert_eq!(args.implementation, "qpid-proton-python");
        assert!(args.output.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_rejects_unknown_operation() {
        assert!(Args::try_parse_from(["quiver-arrow", "fetch", "q0"]).is_err());
    }
}
