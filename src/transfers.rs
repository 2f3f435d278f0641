//! # Transfer Record Stream
//!
//! The collaborator writes one line per transferred message to its standard
//! output, which is redirected into the transfer log:
//!
//! - sender:   `message_id,send_time`
//! - receiver: `message_id,send_time,receive_time`
//!
//! [`TransferStream`] reads that file while it is still being written. It
//! only ever hands out newline-terminated lines; a partially written trailing
//! line is left in place and picked up in full by a later call.

use crate::error::{ArrowError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One parsed line of the transfer log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub message_id: String,
    pub send_time: i64,
    /// Present for receiver records only
    pub receive_time: Option<i64>,
}

impl TransferRecord {
    /// `receive_time - send_time`, in whatever unit the collaborator logs.
    ///
    /// Can be negative when sender and receiver clocks disagree.
    pub fn latency(&self) -> Option<i64> {
        self.receive_time.map(|received| received - self.send_time)
    }

    pub fn has_negative_latency(&self) -> bool {
        self.latency().map_or(false, |latency| latency < 0)
    }
}

/// Signature shared by [`parse_send`] and [`parse_receive`].
pub type RecordParser = fn(&str) -> Result<TransferRecord>;

fn parse_time(line: &str, field: &str, name: &str) -> Result<i64> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| ArrowError::parse(line, format!("{} '{}' is not an integer", name, field)))
}

/// Parse a sender record: `message_id,send_time`.
pub fn parse_send(line: &str) -> Result<TransferRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 2 {
        return Err(ArrowError::parse(
            line,
            format!("expected 2 fields, found {}", fields.len()),
        ));
    }

    Ok(TransferRecord {
        message_id: fields[0].to_string(),
        send_time: parse_time(line, fields[1], "send time")?,
        receive_time: None,
    })
}

/// Parse a receiver record: `message_id,send_time,receive_time`.
pub fn parse_receive(line: &str) -> Result<TransferRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 3 {
        return Err(ArrowError::parse(
            line,
            format!("expected 3 fields, found {}", fields.len()),
        ));
    }

    Ok(TransferRecord {
        message_id: fields[0].to_string(),
        send_time: parse_time(line, fields[1], "send time")?,
        receive_time: Some(parse_time(line, fields[2], "receive time")?),
    })
}

/// Parse `lines`, logging and dropping the malformed ones.
pub fn parse_lines<I, S>(lines: I, parser: RecordParser) -> Vec<TransferRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| match parser(line.as_ref()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}

/// Incremental reader over a transfer log that is still growing.
pub struct TransferStream {
    path: PathBuf,
    reader: BufReader<File>,
    /// Byte offset just past the last complete line handed out
    offset: u64,
}

impl TransferStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        Ok(Self {
            path,
            reader: BufReader::new(file),
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Return the complete lines appended since the previous call, without
    /// their terminators.
    pub fn read_increment(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = self.reader.read_until(b'\n', &mut buf)?;

            if n == 0 {
                break;
            }

            if buf.last() != Some(&b'\n') {
                // Partial line: rewind so the next call rereads it whole.
                self.reader.seek(SeekFrom::Start(self.offset))?;
                break;
            }

            self.offset += n as u64;
            if let Some(line) = decode_line(&buf) {
                lines.push(line);
            }
        }

        Ok(lines)
    }

    /// [`read_increment`](Self::read_increment) followed by parsing.
    pub fn read_records(&mut self, parser: RecordParser) -> Result<Vec<TransferRecord>> {
        let lines = self.read_increment()?;
        Ok(parse_lines(lines, parser))
    }
}

/// Read and parse a finished transfer log in one pass.
///
/// Unlike [`TransferStream`], an unterminated final line is included: the
/// writer has exited, so whatever it left is all there will be.
pub fn read_transfer_log<P: AsRef<Path>>(path: P, parser: RecordParser) -> Result<Vec<TransferRecord>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        match decode_line(&buf) {
            Some(line) if !line.is_empty() => lines.push(line),
            _ => {}
        }
    }

    Ok(parse_lines(lines, parser))
}

/// Strip the line terminator and decode.
///
/// A line that is not valid UTF-8 is malformed like any other: it is logged
/// and dropped, and reading continues.
fn decode_line(raw: &[u8]) -> Option<String> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    match std::str::from_utf8(line) {
        Ok(line) => Some(line.to_string()),
        Err(e) => {
            let lossy = String::from_utf8_lossy(line);
            warn!("{}", ArrowError::parse(&lossy, e.to_string()));
            None
        }
    }
}
