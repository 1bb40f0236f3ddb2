//! Folding@home command server messages.
//!
//! A line-oriented text protocol: every command is one line, every reply
//! is followed by the `> ` prompt. The server greets new connections with a
//! banner that ends at the first prompt.

use std::fmt;

use serde::Deserialize;

use dc_core::{Slot, Unit};

use crate::error::DecodeError;
use crate::pyon::decode_pyon;

/// Prompt byte ending every reply frame.
pub const FAH_PROMPT: u8 = b'>';

/// Commands this collector sends.
#[derive(Clone, PartialEq, Eq)]
pub enum FahCommand {
    Auth(String),
    SlotInfo,
    QueueInfo,
}

impl FahCommand {
    /// The command line as written to the socket.
    pub fn to_line(&self) -> String {
        match self {
            Self::Auth(password) => format!("auth {password}\n"),
            Self::SlotInfo => "slot-info\n".to_string(),
            Self::QueueInfo => "queue-info\n".to_string(),
        }
    }
}

/// Renders the command for logs, never the password.
impl fmt::Display for FahCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(_) => f.write_str("auth ****"),
            Self::SlotInfo => f.write_str("slot-info"),
            Self::QueueInfo => f.write_str("queue-info"),
        }
    }
}

impl fmt::Debug for FahCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FahCommand({self})")
    }
}

/// Server verdict on an `auth` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAck {
    Accepted,
    Rejected(String),
}

/// Classifies the reply to `auth`. The server reports failures on a line
/// starting with `ERROR`; anything else counts as accepted.
pub fn decode_auth_ack(frame: &[u8]) -> AuthAck {
    let text = String::from_utf8_lossy(frame);
    match text
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR"))
    {
        Some(line) => AuthAck::Rejected(line.to_string()),
        None => AuthAck::Accepted,
    }
}

#[derive(Debug, Deserialize)]
struct SlotsDoc {
    slots: Vec<Slot>,
}

#[derive(Debug, Deserialize)]
struct UnitsDoc {
    units: Vec<Unit>,
}

/// Decodes a `slot-info` reply frame.
pub fn decode_slots(frame: &[u8]) -> Result<Vec<Slot>, DecodeError> {
    let doc: SlotsDoc = serde_json::from_value(decode_pyon(frame)?)?;
    Ok(doc.slots)
}

/// Decodes a `queue-info` reply frame.
pub fn decode_units(frame: &[u8]) -> Result<Vec<Unit>, DecodeError> {
    let doc: UnitsDoc = serde_json::from_value(decode_pyon(frame)?)?;
    Ok(doc.units)
}
