use pretty_assertions::assert_eq;

use crate::clock::{Clock, TimeFreeze};
use crate::request::{Opcode, Status};

#[test]
fn status_round_trips_through_u8() {
    for s in [
        Status::Error,
        Status::Result,
        Status::Missing,
        Status::NotAllowed,
        Status::MalformedRequest,
        Status::Exists,
        Status::MissingRootNode,
        Status::DroppedTrigger,
        Status::MismatchingSession,
        Status::MissingCursor,
        Status::TryAgain,
    ] {
        let back = Status::from_u8(s as u8).unwrap();
        assert_eq!(back as u8, s as u8);
    }
    assert!(Status::from_u8(200).is_none());
}

#[test]
fn opcode_round_trips() {
    assert_eq!(Opcode::from_u32(1).unwrap(), Opcode::FetchRequest);
    assert_eq!(Opcode::from_u32(0x0000_000c).unwrap(), Opcode::GenericMessageResponse);
    assert!(Opcode::from_u32(0).is_none());
}

#[test]
fn time_freeze_never_exceeds_frozen_value() {
    let tf = TimeFreeze::new();
    let baseline = tf.now_unix();

    tf.freeze(baseline + 1000);
    assert_eq!(tf.now_unix(), baseline + 1000);

    tf.freeze(baseline + 2000);
    assert_eq!(tf.now_unix(), baseline + 2000);

    tf.unfreeze();
    assert_eq!(tf.now_unix(), baseline + 1000);

    tf.unfreeze();
    assert!(tf.now_unix() >= baseline);
    assert!(!tf.is_frozen());
}
