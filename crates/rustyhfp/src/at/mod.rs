//! AT message model, tokenizer and builder
//!
//! This module implements the small AT dialect spoken over the HFP RFCOMM
//! channel. It is not a general purpose AT grammar engine; only the
//! productions used by the Hands-Free Profile dialogue are recognized:
//! - commands issued by the HF: `AT<CMD>`, `AT<CMD>?`, `AT<CMD>=?`,
//!   `AT<CMD>=<VALUE>`, each terminated with a carriage return
//! - responses issued by the AG: `\r\n<CMD>: <VALUE>\r\n` and bare result
//!   codes such as `\r\nOK\r\n` or `\r\nERROR\r\n`

use std::fmt;


/// Type of an AT message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtType {
    /// Unframed bytes passed through verbatim
    Raw,
    /// Bare command, e.g. `ATA`
    Cmd,
    /// Read command, e.g. `AT+CIND?`
    CmdGet,
    /// Write command, e.g. `AT+BRSF=575`
    CmdSet,
    /// Test command, e.g. `AT+CIND=?`
    CmdTest,
    /// Response or unsolicited result code
    Resp,
}

impl fmt::Display for AtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AtType::Raw => "RAW",
            AtType::Cmd => "CMD",
            AtType::CmdGet => "GET",
            AtType::CmdSet => "SET",
            AtType::CmdTest => "TEST",
            AtType::Resp => "RESP",
        };
        f.write_str(name)
    }
}

/// A single decoded AT message
///
/// The command field is empty for bare result codes (`OK`, `ERROR`, `RING`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtMessage {
    pub ty: AtType,
    pub command: String,
    pub value: String,
}

impl AtMessage {
    pub fn new(ty: AtType, command: &str, value: &str) -> Self {
        Self {
            ty,
            command: command.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parse a single AT message from the front of `input`.
///
/// Returns the decoded message and the unparsed tail, or `None` if the input
/// does not start with a complete, well-formed message. Leading CR, LF and
/// space bytes are skipped, so concatenated frames can be consumed by
/// calling this function repeatedly on the returned tail.
pub fn parse(input: &str) -> Option<(AtMessage, &str)> {
    let trimmed = input.trim_start_matches(['\r', '\n', ' ']);

    // every frame is terminated with a carriage return
    let end = trimmed.find('\r')?;
    let line = &trimmed[..end];
    let mut rest = &trimmed[end..];
    rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest = rest.strip_prefix('\n').unwrap_or(rest);

    if line.is_empty() {
        return None;
    }

    let at = if let Some(cmd) = line.strip_prefix("AT") {
        if let Some(command) = cmd.strip_suffix("=?") {
            AtMessage::new(AtType::CmdTest, command, "")
        } else if let Some((command, value)) = cmd.split_once('=') {
            AtMessage::new(AtType::CmdSet, command, value)
        } else if let Some(command) = cmd.strip_suffix('?') {
            AtMessage::new(AtType::CmdGet, command, "")
        } else {
            AtMessage::new(AtType::Cmd, cmd, "")
        }
    } else if line.starts_with('+') {
        match line.split_once(':') {
            Some((command, value)) => AtMessage::new(AtType::Resp, command, value.trim_start()),
            // extended response without a value separator, e.g. `+XAPL=...`
            None => AtMessage::new(AtType::Resp, "", line),
        }
    } else {
        // bare result code: OK, ERROR, RING, ...
        AtMessage::new(AtType::Resp, "", line)
    };

    Some((at, rest))
}

/// Build the wire form of an AT message.
///
/// For every non-`Raw` type the output round-trips through [`parse`]
/// back to the same command and value.
pub fn build(ty: AtType, command: &str, value: &str) -> String {
    match ty {
        AtType::Raw => format!("{}{}", command, value),
        AtType::Cmd => format!("AT{}{}\r", command, value),
        AtType::CmdGet => format!("AT{}?\r", command),
        AtType::CmdSet => format!("AT{}={}\r", command, value),
        AtType::CmdTest => format!("AT{}=?\r", command),
        AtType::Resp => {
            if command.is_empty() {
                format!("\r\n{}\r\n", value)
            } else {
                format!("\r\n{}: {}\r\n", command, value)
            }
        }
    }
}

/// Extract the ordered indicator names from a `+CIND=?` test response.
///
/// The value has the form `("call",(0,1)),("callsetup",(0-3)),...`; the
/// range groups are ignored, only the quoted names matter. Returns `None`
/// when not a single name could be extracted.
pub fn parse_cind(value: &str) -> Option<Vec<&str>> {
    let names: Vec<&str> = value.split('"').skip(1).step_by(2).collect();
    if names.is_empty() {
        return None;
    }
    Some(names)
}

/// Parse a decimal integer prefix the way C's `atoi` does.
///
/// Leading whitespace is skipped and parsing stops at the first
/// non-digit byte; garbage yields 0.
pub fn parse_number(value: &str) -> i32 {
    let s = value.trim_start();
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s),
    };
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i32>().map(|n| sign * n).unwrap_or(0)
}
