// Serial Line Protocol
// Newline-delimited ASCII between the serial host and the bridge.
// `!` lines are commands, `$` lines are relayed to the broker.

use log::warn;

use crate::config::{COMMAND_MARKER, PASSTHROUGH_MARKER, SERIAL_LINE_CAPACITY};
use crate::system_state::DeviceStatus;

/// Commands understood on the serial link (exact match)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Reboot,
    RebootIntoPairing,
    ClearParams,
}

impl Command {
    pub fn parse(line: &[u8]) -> Option<Self> {
        match line {
            b"!PING" => Some(Command::Ping),
            b"!REBOOT" => Some(Command::Reboot),
            b"!REBOOT_AP" => Some(Command::RebootIntoPairing),
            b"!CLEAR_PARAMS" => Some(Command::ClearParams),
            _ => None,
        }
    }
}

/// One complete line, terminator removed. Bytes are kept as received.
pub type Line = heapless::Vec<u8, SERIAL_LINE_CAPACITY>;

/// How a complete line is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialLine<'a> {
    Command(Command),
    /// Marker already stripped
    Passthrough(&'a [u8]),
    Unprocessed(&'a [u8]),
}

pub fn classify_line(line: &[u8]) -> SerialLine<'_> {
    if line.first() == Some(&(COMMAND_MARKER as u8)) {
        if let Some(command) = Command::parse(line) {
            return SerialLine::Command(command);
        }
    }
    match line.strip_prefix(&[PASSTHROUGH_MARKER as u8]) {
        Some(payload) => SerialLine::Passthrough(payload),
        None => SerialLine::Unprocessed(line),
    }
}

/// Reply to `!PING`
pub fn format_pong(status: DeviceStatus) -> String {
    format!("{}PONG {}", COMMAND_MARKER, status.code())
}

/// Accumulates serial bytes into lines.
///
/// A line ends at LF; one CR directly before the LF is dropped. Bytes past
/// the line capacity are discarded and the truncated line is still delivered.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Line,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte; returns a line once its terminator arrives
    pub fn push(&mut self, byte: u8) -> Option<Line> {
        if byte == b'\n' {
            if self.buffer.last() == Some(&b'\r') && !self.overflowed {
                self.buffer.pop();
            }
            self.overflowed = false;
            return Some(core::mem::take(&mut self.buffer));
        }

        if self.buffer.push(byte).is_err() {
            // A CR arriving exactly at capacity is the terminator's, not data
            if byte != b'\r' && !self.overflowed {
                warn!(
                    "⚠️ Serial line exceeds {} bytes - truncating",
                    SERIAL_LINE_CAPACITY
                );
                self.overflowed = true;
            }
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut LineAssembler, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes
            .iter()
            .filter_map(|&b| assembler.push(b))
            .map(|line| line.to_vec())
            .collect()
    }

    #[test]
    fn splits_lines_and_strips_cr() {
        let mut assembler = LineAssembler::new();
        let lines = feed(&mut assembler, b"$one\r\n$two\nrest");
        assert_eq!(lines, vec![b"$one".to_vec(), b"$two".to_vec()]);
        assert_eq!(assembler.pending(), 4);
    }

    #[test]
    fn oversized_line_is_truncated() {
        let mut assembler = LineAssembler::new();
        let mut input = vec![b'a'; SERIAL_LINE_CAPACITY + 20];
        input.extend_from_slice(b"\r\n");
        let lines = feed(&mut assembler, &input);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), SERIAL_LINE_CAPACITY);

        let lines = feed(&mut assembler, b"next\n");
        assert_eq!(lines, vec![b"next".to_vec()]);
    }

    #[test]
    fn full_line_with_crlf_keeps_all_data() {
        let mut assembler = LineAssembler::new();
        let mut input = vec![b'b'; SERIAL_LINE_CAPACITY];
        input.extend_from_slice(b"\r\n");
        let lines = feed(&mut assembler, &input);
        assert_eq!(lines[0], vec![b'b'; SERIAL_LINE_CAPACITY]);
    }

    #[test]
    fn routes_commands_and_passthrough() {
        assert_eq!(classify_line(b"!PING"), SerialLine::Command(Command::Ping));
        assert_eq!(
            classify_line(b"!REBOOT_AP"),
            SerialLine::Command(Command::RebootIntoPairing)
        );
        assert_eq!(
            classify_line(b"!CLEAR_PARAMS"),
            SerialLine::Command(Command::ClearParams)
        );
        assert_eq!(classify_line(b"$hello"), SerialLine::Passthrough(b"hello"));
        assert_eq!(classify_line(b"!PING "), SerialLine::Unprocessed(b"!PING "));
        assert_eq!(classify_line(b"!FOO"), SerialLine::Unprocessed(b"!FOO"));
        assert_eq!(classify_line(b"plain"), SerialLine::Unprocessed(b"plain"));
    }

    #[test]
    fn non_utf8_bytes_survive_assembly() {
        let mut assembler = LineAssembler::new();
        let lines = feed(&mut assembler, b"$\xff\x00\xfe\r\n");
        assert_eq!(lines, vec![b"$\xff\x00\xfe".to_vec()]);
        assert_eq!(
            classify_line(&lines[0]),
            SerialLine::Passthrough(&[0xff, 0x00, 0xfe])
        );
    }

    #[test]
    fn pong_carries_status_code() {
        assert_eq!(format_pong(DeviceStatus::NoLink), "!PONG 3");
        assert_eq!(format_pong(DeviceStatus::PairingReady), "!PONG 100");
    }
}
