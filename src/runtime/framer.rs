//! Delimiter-based message framing.
//!
//! A message ends at the first line feed, carriage return, or end of
//! transmission (^D) byte. Embedded NUL bytes are ordinary data.

/// Line feed.
pub const LF: u8 = b'\n';
/// Carriage return.
pub const CR: u8 = b'\r';
/// End of transmission (^D).
pub const EOT: u8 = 0x04;

/// Kind of terminator found in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    LineFeed,
    CarriageReturn,
    EndOfTransmission,
}

impl Terminator {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            LF => Some(Terminator::LineFeed),
            CR => Some(Terminator::CarriageReturn),
            EOT => Some(Terminator::EndOfTransmission),
            _ => None,
        }
    }

    /// Whether this terminator ends the connection.
    pub fn is_end(self) -> bool {
        self == Terminator::EndOfTransmission
    }
}

/// Result of scanning a slot buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// No terminator yet.
    Incomplete,
    /// A terminator at `offset`; the message is `buf[..offset]`.
    Complete {
        offset: usize,
        terminator: Terminator,
    },
}

/// Scan `buf` for the first terminator.
pub fn scan(buf: &[u8]) -> Frame {
    buf.iter()
        .enumerate()
        .find_map(|(offset, &b)| {
            Terminator::from_byte(b).map(|terminator| Frame::Complete { offset, terminator })
        })
        .unwrap_or(Frame::Incomplete)
}
