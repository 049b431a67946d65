use crate::voltronic::frame::{self, CommandFrame, FRAME_START};

use num_enum::{IntoPrimitive, TryFromPrimitive};

// {{{ OperatingMode
/// QMOD reply codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OperatingMode {
    PowerOn = b'P',
    Standby = b'S',
    Line = b'L',
    Battery = b'B',
    Fault = b'F',
    PowerSaving = b'H',
}

impl OperatingMode {
    pub fn code(&self) -> char {
        u8::from(*self) as char
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
// }}}

// {{{ ModeTarget
/// Modes that can be requested with POP0x.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModeTarget {
    Line,
    Battery,
}

impl ModeTarget {
    pub fn frame(&self) -> CommandFrame {
        match self {
            ModeTarget::Line => frame::POP00,
            ModeTarget::Battery => frame::POP02,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ModeTarget::Line => "L",
            ModeTarget::Battery => "B",
        }
    }
}

impl std::str::FromStr for ModeTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(ModeTarget::Line),
            "B" => Ok(ModeTarget::Battery),
            other => Err(anyhow::anyhow!("unknown mode command {:?}", other)),
        }
    }
}
// }}}

/// Returns true once `buffer` holds `(` followed by at least one byte.
pub fn has_mode_reply(buffer: &[u8]) -> bool {
    buffer
        .iter()
        .position(|&b| b == FRAME_START)
        .is_some_and(|start| buffer.len() > start + 1)
}

/// Decodes the byte right after `(`. Unknown codes are not an error, the
/// device answered with something we don't model.
pub fn decode_mode_reply(buffer: &[u8]) -> Option<OperatingMode> {
    let start = buffer.iter().position(|&b| b == FRAME_START)?;
    let code = *buffer.get(start + 1)?;
    OperatingMode::try_from(code).ok()
}
