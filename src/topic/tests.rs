//! Topic naming tests

use pretty_assertions::assert_eq;
use test_case::test_case;

use super::*;

#[test]
fn property_topic() {
    let topics = TopicBuilder::default();
    assert_eq!(
        topics.property(Direction::Out, "pump-7", "pressure"),
        "connio/data/out/devices/pump-7/properties/pressure"
    );
}

#[test]
fn json_feed_sentinel_selects_json_topic() {
    let topics = TopicBuilder::default();
    assert_eq!(
        topics.property(Direction::Out, "pump-7", JSON_FEED_PROPERTY),
        "connio/data/out/devices/pump-7/json"
    );
}

#[test]
fn method_topic() {
    let topics = TopicBuilder::default();
    assert_eq!(
        topics.method(Direction::Out, "pump-7", "restart"),
        "connio/data/out/devices/pump-7/methods/restart"
    );
}

#[test]
fn inbound_property_wildcard() {
    let topics = TopicBuilder::default();
    assert_eq!(
        topics.all_properties(Direction::In, "pump-7"),
        "connio/data/in/devices/pump-7/properties/#"
    );
}

#[test]
fn custom_namespace() {
    let topics = TopicBuilder::new("acme");
    assert_eq!(
        topics.json(Direction::Out, "pump-7"),
        "acme/data/out/devices/pump-7/json"
    );
}

#[test_case(Some("sensor-1"), "myaccount/apps/tracking/devices/sensor-1")]
#[test_case(None, "myaccount/apps/tracking/devices/#")]
fn app_scoped_filter(value: Option<&str>, expected: &str) {
    assert_eq!(app_filter("MyAccount", "Tracking", value), expected);
}

#[test]
fn app_filter_lowercases_only_the_prefix() {
    assert_eq!(
        app_filter("Acme", "Fleet", Some("Truck-9")),
        "acme/apps/fleet/devices/Truck-9"
    );
}
