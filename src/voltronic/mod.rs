//! Voltronic/Axpert "PI30" style ASCII protocol spoken over hidraw.
//!
//! Requests are a mnemonic followed by a CRC-16/XMODEM and `\r`; replies are
//! `(` + space separated fields + `\r`, handed back in 8 byte reports.

pub mod channel;
pub mod device;
pub mod discovery;
pub mod frame;
pub mod mode;
pub mod status;
