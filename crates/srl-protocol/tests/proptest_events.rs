// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based round-trip checks for the event frame codec.

use proptest::prelude::*;
use srl_core::{ScenePath, SpecData, SpecType, Token, Value};
use srl_protocol::{AcknowledgeEvent, DeltaEvent, Event, EventCodec, HistoryEvent, ReloadEvent};
use std::collections::BTreeMap;

fn arb_path() -> impl Strategy<Value = ScenePath> {
    prop::collection::vec("[A-Za-z][A-Za-z0-9_]{0,8}", 1..4)
        .prop_map(|segments| ScenePath::new(format!("/{}", segments.join("/"))).unwrap())
}

fn arb_spec_type() -> impl Strategy<Value = SpecType> {
    // Unknown is excluded: it never travels inside a delta.
    (1..=10i32).prop_map(|code| SpecType::from_code(code).unwrap())
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int),
        "[ -~]{0,16}".prop_map(Value::String),
        "[a-zA-Z][a-zA-Z0-9_:]{0,10}".prop_map(|s| Value::Token(Token::new(s))),
        prop::collection::vec("[a-z]{1,6}".prop_map(Token::new), 0..4)
            .prop_map(Value::TokenVector),
    ]
}

fn arb_spec_data() -> impl Strategy<Value = SpecData> {
    (
        arb_spec_type(),
        prop::collection::btree_map("[a-z][a-zA-Z0-9:]{0,10}", arb_value(), 0..4),
    )
        .prop_map(|(spec_type, fields)| {
            let mut spec = SpecData::new(spec_type);
            for (key, value) in fields {
                spec.set_field(Token::new(key), value);
            }
            spec
        })
}

fn arb_delta() -> impl Strategy<Value = DeltaEvent> {
    (
        "[a-z][a-z0-9._-]{0,12}",
        "[a-z][a-z0-9-]{0,12}",
        prop::option::of(1..1000u64),
        prop::collection::btree_map(arb_path(), arb_spec_data(), 1..5),
    )
        .prop_map(|(layer, user, sequence, updates)| DeltaEvent {
            layer,
            user,
            sequence,
            updates,
        })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_delta().prop_map(Event::Delta),
        (
            "[a-z][a-z0-9._-]{0,12}",
            prop::collection::vec(arb_path(), 0..4),
            1..1000u64,
        )
            .prop_map(|(layer, paths, sequence)| Event::Acknowledge(AcknowledgeEvent {
                layer,
                paths,
                sequence,
            })),
        Just(Event::History(HistoryEvent {})),
        ("[a-z][a-z0-9._-]{0,12}", prop::option::of(1..1000u64))
            .prop_map(|(layer, sequence)| Event::Reload(ReloadEvent { layer, sequence })),
    ]
}

proptest! {
    #[test]
    fn frame_round_trip(event in arb_event()) {
        let frame = EventCodec::encode(&event).unwrap();
        let back = EventCodec::decode(&frame).unwrap();
        prop_assert_eq!(back, event);
    }

    #[test]
    fn frame_envelope_shape(event in arb_event()) {
        let frame = EventCodec::encode(&event).unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let tag = json["event"].as_str().unwrap();
        prop_assert!(tag.ends_with("::Event"));
        prop_assert!(json["body"].is_object());
    }
}
