use crate::prelude::*;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    SetMode(ModeTarget),
}

impl Command {
    /// Topic announcing what was asked of the inverter; it never confirms.
    pub fn to_result_topic(&self) -> String {
        match self {
            Command::SetMode(_) => "desired_mode".to_string(),
        }
    }
}
