//! Task server wire format.
//!
//! After the client writes its secret, the server answers with a two-byte
//! token ([`AUTH_OK`] or [`AUTH_REJECTED`]). Task lists then arrive as frames
//! of `identifier:seconds` records separated by `;`, and the client answers
//! every frame with [`ACK`].

use std::fmt;
use std::time::Duration;

use crate::task::Task;

/// Size of the server's answer to the secret.
pub const AUTH_REPLY_LEN: usize = 2;

/// Reply to a valid secret.
pub const AUTH_OK: &[u8; AUTH_REPLY_LEN] = b"OK";

/// Reply to a wrong secret.
pub const AUTH_REJECTED: &[u8; AUTH_REPLY_LEN] = b"NO";

/// Sent by the client after every received frame.
pub const ACK: &[u8] = b"OK";

/// Read size for frames; a shorter read ends the frame.
pub const CHUNK_SIZE: usize = 64;

/// Silence after which a frame is considered complete.
pub const FRAME_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

const RECORD_SEPARATOR: char = ';';
const FIELD_SEPARATOR: char = ':';

/// Outcome of the authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Accepted,
    Rejected,
    Unknown(Vec<u8>),
}

impl AuthReply {
    pub fn classify(reply: &[u8]) -> Self {
        if reply == AUTH_OK {
            Self::Accepted
        } else if reply == AUTH_REJECTED {
            Self::Rejected
        } else {
            Self::Unknown(reply.to_vec())
        }
    }
}

/// Why a record was dropped from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    FieldCount(usize),
    InvalidDuration(String),
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "expected 2 fields, found {}", n),
            Self::InvalidDuration(value) => write!(f, "invalid duration {:?}", value),
        }
    }
}

/// Parse a frame into tasks, keeping wire order.
///
/// Malformed records are logged and skipped. Empty segments (such as the one
/// after a trailing `;`) are ignored without a warning.
pub fn decode_tasks(frame: &[u8]) -> Vec<Task> {
    let text = String::from_utf8_lossy(frame);
    let mut tasks = Vec::new();

    for record in text.split(RECORD_SEPARATOR) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }

        match parse_record(record) {
            Ok(task) => tasks.push(task),
            Err(reason) => log::warn!("Skipping task record {:?}: {}", record, reason),
        }
    }

    tasks
}

fn parse_record(record: &str) -> Result<Task, MalformedRecord> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
    let [identifier, seconds] = fields.as_slice() else {
        return Err(MalformedRecord::FieldCount(fields.len()));
    };

    let seconds: u64 = seconds
        .parse()
        .map_err(|_| MalformedRecord::InvalidDuration(seconds.to_string()))?;

    Ok(Task::remote(*identifier, seconds))
}
