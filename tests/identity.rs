//! Correlation key integration tests.

use std::collections::HashSet;

use reframe::MessageKey;

#[test]
fn same_message_same_key() {
    let demux_key = MessageKey::new(1_700_000_000_123_456_789, "/camera/front");
    let rewrite_key = MessageKey::new(1_700_000_000_123_456_789, String::from("/camera/front"));
    assert_eq!(demux_key, rewrite_key);
    assert_eq!(demux_key.file_name(), rewrite_key.file_name());
}

#[test]
fn file_name_is_flat_and_padded() {
    let key = MessageKey::new(42, "/apollo/sensor/camera/front_6mm/image/compressed");
    let name = key.file_name();

    assert!(!name.contains('/'), "file name must not contain separators: {name}");
    assert!(name.starts_with("00000000000000000042-"), "unexpected prefix: {name}");
    assert!(name.ends_with("%2Fimage%2Fcompressed"));
}

#[test]
fn file_names_sort_by_time_within_a_topic() {
    let early = MessageKey::new(9, "/camera").file_name();
    let late = MessageKey::new(10, "/camera").file_name();
    assert!(early < late);
}

#[test]
fn file_names_are_injective() {
    // Keys that would collide under naive concatenation or escaping.
    let keys = [
        MessageKey::new(1, "/a/b"),
        MessageKey::new(1, "%2Fa/b"),
        MessageKey::new(1, "/a%2Fb"),
        MessageKey::new(11, "/a/b"),
        MessageKey::new(1, "1/a/b"),
        MessageKey::new(1, "\\a/b"),
        MessageKey::new(1, ":a/b"),
        MessageKey::new(1, "~a/b"),
    ];
    let names: HashSet<String> = keys.iter().map(MessageKey::file_name).collect();
    assert_eq!(names.len(), keys.len());
}

#[test]
fn distinct_topics_at_same_time_differ() {
    let front = MessageKey::new(5, "/camera/front");
    let rear = MessageKey::new(5, "/camera/rear");
    assert_ne!(front, rear);
    assert_ne!(front.file_name(), rear.file_name());
}

#[test]
fn long_topics_are_shortened_to_a_valid_file_name() {
    let prefix = "/vehicle".repeat(40);
    let front = MessageKey::new(u64::MAX, format!("{prefix}/camera/front"));
    let rear = MessageKey::new(u64::MAX, format!("{prefix}/camera/rear"));

    let front_name = front.file_name();
    let rear_name = rear.file_name();
    assert!(front_name.len() <= 255, "{} bytes", front_name.len());
    assert!(rear_name.len() <= 255, "{} bytes", rear_name.len());
    assert_ne!(front_name, rear_name);
    assert_eq!(front_name, front.file_name());
    assert!(front_name.starts_with("18446744073709551615-%2Fvehicle"));

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(directory.path().join(&front_name), b"jpeg")
        .expect("Filesystem rejected the shortened name");
}

#[test]
fn shortening_respects_character_boundaries() {
    let key = MessageKey::new(3, "/камера".repeat(40));
    let name = key.file_name();
    assert!(name.len() <= 255, "{} bytes", name.len());
    assert!(name.contains('~'));
}

#[test]
fn tilde_is_escaped_in_regular_names() {
    let name = MessageKey::new(1, "/camera~front").file_name();
    assert!(!name.contains('~'), "{name}");
    assert!(name.ends_with("%2Fcamera%7Efront"));
}

#[test]
fn display_shows_topic_and_time() {
    let key = MessageKey::new(77, "/camera/front");
    assert_eq!(key.to_string(), "/camera/front@77");
}
