use std::fmt;

use crc16::{State, XMODEM};

use crate::error::ProtocolError;

/// General status inquiry, answered with the record parsed by `telemetry::parse`.
pub const GENERAL_STATUS: &str = "QPIGS";

const TERMINATOR: u8 = b'\r';

/// CRC-16/XMODEM (polynomial 0x1021, initial value 0) over `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    State::<XMODEM>::calculate(bytes)
}

/// An ASCII query mnemonic such as `QPIGS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    pub fn new(text: &str) -> Result<Self, ProtocolError> {
        if text.is_empty() || !text.is_ascii() {
            return Err(ProtocolError::FramingPrecondition(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn general_status() -> Self {
        Self(GENERAL_STATUS.to_string())
    }

    /// Wire form: command bytes, big-endian checksum of the command bytes, CR.
    pub fn framed(&self) -> Vec<u8> {
        let bytes = self.0.as_bytes();
        let crc = checksum(bytes);

        let mut message = Vec::with_capacity(bytes.len() + 3);
        message.extend_from_slice(bytes);
        message.extend_from_slice(&crc.to_be_bytes());
        message.push(TERMINATOR);
        message
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn frame(command_text: &str) -> Result<Vec<u8>, ProtocolError> {
    Command::new(command_text).map(|command| command.framed())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
