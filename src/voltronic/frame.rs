use crate::error::FrameError;

use std::borrow::Cow;

pub const FRAME_START: u8 = b'(';
pub const FRAME_END: u8 = b'\r';

/// Number of fields in a QPIGS reply.
pub const STATUS_FIELD_COUNT: usize = 21;

// {{{ CommandFrame
/// Mnemonic + big-endian CRC-16/XMODEM + `\r`, sent verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame(Cow<'static, [u8]>);

impl CommandFrame {
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Cow::Borrowed(bytes))
    }

    /// Builds a frame for a mnemonic that has no entry in the command table.
    pub fn build(mnemonic: &str) -> Self {
        let mut bytes = mnemonic.as_bytes().to_vec();
        bytes.extend_from_slice(&checksum(mnemonic.as_bytes()));
        bytes.push(FRAME_END);
        Self(Cow::Owned(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn mnemonic(&self) -> &str {
        let end = self.0.len().saturating_sub(3);
        std::str::from_utf8(&self.0[..end]).unwrap_or("?")
    }

    pub fn crc(&self) -> [u8; 2] {
        let len = self.0.len();
        [self.0[len - 3], self.0[len - 2]]
    }
}

impl std::fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02X?}", self.mnemonic(), self.crc())
    }
}

impl std::fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
// }}}

// {{{ command table
pub const QPIGS: CommandFrame = CommandFrame::from_static(b"QPIGS\xB7\xA9\r");
pub const QPIRI: CommandFrame = CommandFrame::from_static(b"QPIRI\xF8\x54\r");
pub const QMOD: CommandFrame = CommandFrame::from_static(b"QMOD\x49\xC1\r");
pub const POP02: CommandFrame = CommandFrame::from_static(b"POP02\xE2\x0B\r");
pub const POP00: CommandFrame = CommandFrame::from_static(b"POP00\xC2\x48\r");

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Request {
    GeneralStatus,     // QPIGS
    RatingInformation, // QPIRI
    ModeInquiry,       // QMOD
    BatteryPriority,   // POP02, SBU
    LinePriority,      // POP00, utility first
}

impl Request {
    pub const ALL: [Request; 5] = [
        Request::GeneralStatus,
        Request::RatingInformation,
        Request::ModeInquiry,
        Request::BatteryPriority,
        Request::LinePriority,
    ];

    pub fn mnemonic(&self) -> &'static str {
        use Request::*;
        match self {
            GeneralStatus => "QPIGS",
            RatingInformation => "QPIRI",
            ModeInquiry => "QMOD",
            BatteryPriority => "POP02",
            LinePriority => "POP00",
        }
    }

    pub fn frame(&self) -> CommandFrame {
        build_command(*self)
    }
}

pub fn build_command(request: Request) -> CommandFrame {
    use Request::*;
    match request {
        GeneralStatus => QPIGS,
        RatingInformation => QPIRI,
        ModeInquiry => QMOD,
        BatteryPriority => POP02,
        LinePriority => POP00,
    }
}
// }}}

/// CRC-16/XMODEM (poly 0x1021, init 0, unreflected), high byte first.
///
/// The firmware never lets a CRC byte collide with `(`, `\r` or `\n`; such a
/// byte is sent incremented by one (POP02 goes out as `E2 0B`, not `E2 0A`).
pub fn checksum(data: &[u8]) -> [u8; 2] {
    crc16::State::<crc16::XMODEM>::calculate(data)
        .to_be_bytes()
        .map(|b| match b {
            b'(' | b'\r' | b'\n' => b + 1,
            b => b,
        })
}

/// Locates one frame in `buffer`: the first `(` and the first `\r` at or after it.
/// Returns inclusive byte offsets.
pub fn find_frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.iter().position(|&b| b == FRAME_START)?;
    let end = buffer[start..].iter().position(|&b| b == FRAME_END)?;
    Some((start, start + end))
}

/// The protocol is ASCII; anything else on the wire is noise and is dropped.
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Splits a reply into its whitespace separated fields, after removing the
/// leading `(` and the terminator with any padding that follows it.
pub fn split_fields(frame: &str) -> Result<Vec<String>, FrameError> {
    let body = frame.strip_prefix(FRAME_START as char).ok_or(FrameError::MissingStart)?;
    let body = match body.find(FRAME_END as char) {
        Some(end) => &body[..end],
        None => body.trim_end_matches('\0'),
    };

    Ok(body.split_whitespace().map(str::to_owned).collect())
}

pub fn validate_field_count(fields: &[String], expected: usize) -> Result<(), FrameError> {
    if fields.len() != expected {
        return Err(FrameError::WrongFieldCount {
            expected,
            actual: fields.len(),
        });
    }

    Ok(())
}
