use inverter_bridge::prelude::*;
use inverter_bridge::voltronic::frame;
use inverter_bridge::voltronic::mode::{decode_mode_reply, has_mode_reply};

#[test]
fn decodes_mode_letters() {
    assert_eq!(decode_mode_reply(b"(L"), Some(OperatingMode::Line));
    assert_eq!(decode_mode_reply(b"(B\x06\x07\r"), Some(OperatingMode::Battery));
    assert_eq!(decode_mode_reply(b"\x00(S"), Some(OperatingMode::Standby));
}

#[test]
fn unknown_mode_is_not_an_error() {
    assert_eq!(decode_mode_reply(b"(X"), None);
    assert_eq!(decode_mode_reply(b"("), None);
    assert_eq!(decode_mode_reply(b"L"), None);
}

#[test]
fn mode_reply_completeness() {
    assert!(!has_mode_reply(b""));
    assert!(!has_mode_reply(b"junk("));
    assert!(has_mode_reply(b"junk(F"));
}

#[test]
fn mode_display() {
    assert_eq!(OperatingMode::Line.to_string(), "L");
    assert_eq!(OperatingMode::PowerSaving.code(), 'H');
}

#[test]
fn parses_mode_targets() {
    assert_eq!("L".parse::<ModeTarget>().unwrap(), ModeTarget::Line);
    assert_eq!("B".parse::<ModeTarget>().unwrap(), ModeTarget::Battery);
    assert!("B\n".parse::<ModeTarget>().is_err());
    assert!(" L".parse::<ModeTarget>().is_err());
    assert!("X".parse::<ModeTarget>().is_err());
    assert!("".parse::<ModeTarget>().is_err());
}

#[test]
fn mode_target_frames() {
    assert_eq!(ModeTarget::Line.frame(), frame::POP00);
    assert_eq!(ModeTarget::Battery.frame(), frame::POP02);
    assert_eq!(ModeTarget::Battery.code(), "B");
}
