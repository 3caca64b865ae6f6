mod common;

use common::MockPort;
use pretty_assertions::assert_eq;
use serialdef_core::config::{property, CommandResponse, SelectorConfig};
use serialdef_core::device::{Device, StateSelector, SELECTOR_DEVICE_NAME};
use serialdef_core::protocol::{ConfigError, ProtocolError};

/// Three-position filter wheel answering `OK\n` to every move
fn wheel(mock: &MockPort, with_query: bool) -> StateSelector {
    let mut selector =
        StateSelector::with_clock(SelectorConfig::default(), mock.provider(), mock.boxed_clock());
    selector.set_property(property::PORT, "COM4").unwrap();
    selector.set_property(property::RESPONSE_DETECTION, "lf").unwrap();
    selector.set_property(property::NUMBER_OF_POSITIONS, "3").unwrap();
    for i in 0..3 {
        selector
            .set_property(&property::position_command(i), &format!("MOVE {}\\n", i))
            .unwrap();
        selector
            .set_property(&property::position_response(i), "OK\\n")
            .unwrap();
    }
    if with_query {
        selector.set_property(property::QUERY_COMMAND, "POS?\\n").unwrap();
        for (i, name) in ["RED", "GREEN", "BLUE"].iter().enumerate() {
            selector
                .set_property(&property::query_response(i), &format!("{}\\n", name))
                .unwrap();
        }
    }
    selector
}

#[test]
fn test_name_and_defaults() {
    let mock = MockPort::new();
    let selector = StateSelector::new(mock.provider());
    assert_eq!(selector.name(), SELECTOR_DEVICE_NAME);
    assert_eq!(selector.number_of_positions(), 2);
    assert_eq!(selector.cached_state(), 0);
    assert_eq!(selector.property(property::NUMBER_OF_POSITIONS).unwrap(), "2");
}

#[test]
fn test_set_state_sends_position_command() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();

    mock.reply(b"OK\n").reply(b"OK\n");
    selector.set_state(2).unwrap();
    assert_eq!(selector.get_state().unwrap(), 2);
    selector.set_state(1).unwrap();
    assert_eq!(selector.get_state().unwrap(), 1);

    assert_eq!(mock.written(), vec![b"MOVE 2\n".to_vec(), b"MOVE 1\n".to_vec()]);
}

#[test]
fn test_out_of_range_position_is_rejected() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();

    mock.reply(b"OK\n");
    selector.set_state(1).unwrap();
    match selector.set_state(3) {
        Err(ProtocolError::InvalidPosition { position, count }) => {
            assert_eq!((position, count), (3, 3));
        }
        other => panic!("expected invalid position, got {other:?}"),
    }
    assert_eq!(selector.cached_state(), 1);
    assert_eq!(mock.written().len(), 1);
}

#[test]
fn test_failed_move_keeps_position() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();

    mock.reply(b"JAM\n");
    assert!(matches!(
        selector.set_state(2),
        Err(ProtocolError::ResponseMismatch { .. })
    ));
    assert_eq!(selector.cached_state(), 0);

    // Silence ends in a timeout, position unchanged
    assert!(matches!(selector.set_state(2), Err(ProtocolError::Timeout)));
    assert_eq!(selector.get_state().unwrap(), 0);
}

#[test]
fn test_get_state_queries_device() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, true);
    selector.initialize().unwrap();

    mock.reply(b"BLUE\n");
    assert_eq!(selector.get_state().unwrap(), 2);
    assert_eq!(selector.cached_state(), 2);

    mock.reply(b"RED\n");
    assert_eq!(selector.query_state().unwrap(), 0);
    assert_eq!(mock.written(), vec![b"POS?\n".to_vec(), b"POS?\n".to_vec()]);
}

#[test]
fn test_query_failures_are_communication_errors() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, true);
    selector.initialize().unwrap();

    mock.reply(b"PURPLE\n");
    match selector.get_state() {
        Err(ProtocolError::CommunicationError { context, source }) => {
            assert_eq!(context, "query");
            match *source {
                ProtocolError::NoMatchingAlternative { actual } => {
                    assert_eq!(actual, "PURPLE\\n")
                }
                other => panic!("unexpected source {other:?}"),
            }
        }
        other => panic!("expected communication error, got {other:?}"),
    }
    assert_eq!(selector.cached_state(), 0);
}

#[test]
fn test_query_without_query_command_is_unsupported() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();
    assert!(matches!(
        selector.query_state(),
        Err(ProtocolError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_missing_position_command_is_incomplete() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.set_property(property::NUMBER_OF_POSITIONS, "4").unwrap();
    assert!(matches!(
        selector.initialize(),
        Err(ProtocolError::Configuration(ConfigError::Incomplete(_)))
    ));
    assert!(!selector.is_initialized());
}

#[test]
fn test_duplicate_query_responses_are_contradictory() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, true);
    selector.set_property(&property::query_response(2), "RED\\n").unwrap();
    assert!(matches!(
        selector.initialize(),
        Err(ProtocolError::Configuration(ConfigError::Contradictory(_)))
    ));
}

#[test]
fn test_shrinking_keeps_lower_slots() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, true);
    selector.set_property(property::NUMBER_OF_POSITIONS, "2").unwrap();
    assert_eq!(selector.number_of_positions(), 2);
    assert_eq!(selector.property("Position1Command").unwrap(), "MOVE 1\\n");
    assert_eq!(selector.property("Position2Command"), None);
    assert!(selector.property_names().contains(&"QueryResponse1".to_string()));
    assert!(!selector.property_names().contains(&"QueryResponse2".to_string()));

    assert!(matches!(
        selector.set_property(property::NUMBER_OF_POSITIONS, "0"),
        Err(ProtocolError::Configuration(ConfigError::InvalidValue { .. }))
    ));
}

#[test]
fn test_huge_position_count_is_rejected() {
    let mock = MockPort::new();
    let mut selector = StateSelector::new(mock.provider());
    assert!(matches!(
        selector.set_property(property::NUMBER_OF_POSITIONS, "1000000000000"),
        Err(ProtocolError::Configuration(ConfigError::InvalidValue { .. }))
    ));
    assert_eq!(selector.number_of_positions(), 2);
}

#[test]
fn test_configuration_frozen_after_initialize() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();
    assert!(matches!(
        selector.set_property(property::NUMBER_OF_POSITIONS, "5"),
        Err(ProtocolError::Configuration(ConfigError::Frozen(_)))
    ));
    assert!(selector.commands_mut().is_err());
    assert_eq!(selector.number_of_positions(), 3);
}

#[test]
fn test_from_json_config() {
    let json = r#"{
        "port": "COM9",
        "response_detection": "length:2",
        "positions": [
            { "command": "P0", "response": "ok" },
            { "command": "P1", "response": "ok" }
        ]
    }"#;
    let mock = MockPort::new();
    let mut selector = StateSelector::with_clock(
        SelectorConfig::from_json(json).unwrap(),
        mock.provider(),
        mock.boxed_clock(),
    );
    // The query table is sized to the positions even though it was omitted
    assert_eq!(selector.config().commands.query.responses.len(), 2);
    assert_eq!(selector.config().commands.positions[1], CommandResponse::new("P1", "ok"));

    selector.initialize().unwrap();
    mock.reply(b"ok");
    selector.set_state(1).unwrap();
    assert_eq!(selector.get_state().unwrap(), 1);
}

#[test]
fn test_shutdown_is_terminal() {
    let mock = MockPort::new();
    let mut selector = wheel(&mock, false);
    selector.initialize().unwrap();
    selector.shutdown().unwrap();
    assert!(!selector.is_initialized());
    assert!(matches!(
        selector.set_state(0),
        Err(ProtocolError::UnsupportedOperation(_))
    ));
    assert!(selector.initialize().is_err());
}
