//! Greeter protocol parser.

/// Parsed greeter command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Say hello back.
    Hello,
    /// Report the server's `PATH`.
    Path,
    /// Close the connection.
    Goodby,
    /// Anything else.
    Unknown,
}

/// Parse a framed line (terminator already stripped).
pub fn parse(line: &[u8]) -> Command {
    if line.starts_with(b"hello") {
        Command::Hello
    } else if line.starts_with(b"path") {
        Command::Path
    } else if line.starts_with(b"goodby") {
        Command::Goodby
    } else {
        Command::Unknown
    }
}

/// Sent to every new client.
pub fn response_greeting() -> &'static [u8] {
    b"Greetings\n> "
}

/// Reply to `hello`.
pub fn response_hello() -> &'static [u8] {
    b"Hello\n> "
}

/// Reply to anything unrecognised.
pub fn response_unknown() -> &'static [u8] {
    b"Huh?\n> "
}

/// Prompt appended after multi-byte replies.
pub fn prompt() -> &'static [u8] {
    b"\n> "
}
