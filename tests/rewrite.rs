//! Log rewriter integration tests.

mod common;

use std::fs;

use reframe::{
    ImageStore, LogRewriter, MessageKey, MessageOutcome, RecordReader, RecordWriter, ReframeError,
    payload::{IMAGE_SCHEMA_NAME, decode_compressed_image},
    rewrite::image_descriptor,
};

use common::{
    FRONT_CAMERA, FixtureMessage, POSE, front_camera_map, interleaved_messages, write_log,
    write_numbered_images,
};

struct Fixture {
    _directory: tempfile::TempDir,
    source: std::path::PathBuf,
    destination: std::path::PathBuf,
    store: ImageStore,
}

fn fixture(messages: &[FixtureMessage]) -> Fixture {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let source = directory.path().join("source.mcap");
    let destination = directory.path().join("restored.mcap");
    write_log(&source, &front_camera_map(), messages);
    let store =
        ImageStore::create(directory.path().join("images")).expect("Failed to create store");
    Fixture {
        source,
        destination,
        store,
        _directory: directory,
    }
}

/// Put a decoded frame in the store for each given key.
fn stock(store: &ImageStore, keys: &[MessageKey]) {
    let scratch = store.directory().join("scratch");
    let frames = write_numbered_images(&scratch, keys.len());
    for (key, frame) in keys.iter().zip(&frames) {
        store.insert(key, frame).expect("Failed to stock store");
    }
    fs::remove_dir_all(scratch).expect("Failed to clean scratch");
}

fn read_back(path: &std::path::Path) -> Vec<(String, u64, Vec<u8>, Option<String>)> {
    let reader = RecordReader::open(path).expect("Failed to open destination");
    reader
        .messages()
        .expect("Failed to stream destination")
        .map(|message| {
            let message = message.expect("Bad destination message");
            (
                message.topic().to_string(),
                message.log_time(),
                message.data().to_vec(),
                message.type_name().map(str::to_string),
            )
        })
        .collect()
}

#[test]
fn substitutes_stocked_frames_and_copies_the_rest() {
    let messages = interleaved_messages();
    let fixture = fixture(&messages);
    let video_keys: Vec<MessageKey> = messages
        .iter()
        .filter(|message| message.topic == FRONT_CAMERA)
        .map(|message| MessageKey::new(message.log_time, message.topic))
        .collect();
    stock(&fixture.store, &video_keys);

    let channels = front_camera_map();
    let writer = RecordWriter::create(&fixture.destination).expect("Failed to create writer");
    let reader = RecordReader::open(&fixture.source).expect("Failed to open source");
    let stats = LogRewriter::new(writer, &channels, &fixture.store, 90)
        .run(&reader)
        .expect("Rewrite failed");

    assert_eq!(stats.copied, 3);
    assert_eq!(stats.substituted, 5);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.descriptors_written, 2);

    let written = read_back(&fixture.destination);
    let times: Vec<u64> = written.iter().map(|(_, time, _, _)| *time).collect();
    let source_times: Vec<u64> = messages.iter().map(|message| message.log_time).collect();
    assert_eq!(times, source_times);

    for ((topic, _, data, type_name), original) in written.iter().zip(&messages) {
        if topic == POSE {
            assert_eq!(data, &original.data, "non-video payloads must be copied verbatim");
        } else {
            assert_eq!(type_name.as_deref(), Some(IMAGE_SCHEMA_NAME));
            let image = decode_compressed_image(data).expect("Bad image payload");
            assert_eq!(image.format, "jpeg");
            assert_eq!(&image.data[..2], &[0xFF, 0xD8]);
        }
    }
}

#[test]
fn video_messages_without_frames_are_skipped() {
    let messages = interleaved_messages();
    let fixture = fixture(&messages);
    // Only the last two video messages have frames.
    stock(
        &fixture.store,
        &[
            MessageKey::new(1_400, FRONT_CAMERA),
            MessageKey::new(1_500, FRONT_CAMERA),
        ],
    );

    let channels = front_camera_map();
    let writer = RecordWriter::create(&fixture.destination).expect("Failed to create writer");
    let reader = RecordReader::open(&fixture.source).expect("Failed to open source");
    let stats = LogRewriter::new(writer, &channels, &fixture.store, 95)
        .run(&reader)
        .expect("Rewrite failed");

    assert_eq!(stats.substituted, 2);
    assert_eq!(stats.skipped, 3);
    assert_eq!(stats.written(), 5);

    let written: Vec<(String, u64)> = read_back(&fixture.destination)
        .into_iter()
        .map(|(topic, time, _, _)| (topic, time))
        .collect();
    assert_eq!(
        written,
        [
            (POSE.to_string(), 1_000),
            (POSE.to_string(), 1_250),
            (FRONT_CAMERA.to_string(), 1_400),
            (POSE.to_string(), 1_450),
            (FRONT_CAMERA.to_string(), 1_500),
        ]
    );
}

#[test]
fn descriptor_written_once_per_channel_even_when_all_messages_skip() {
    let fixture = fixture(&interleaved_messages());

    let channels = front_camera_map();
    let writer = RecordWriter::create(&fixture.destination).expect("Failed to create writer");
    let reader = RecordReader::open(&fixture.source).expect("Failed to open source");
    let mut rewriter = LogRewriter::new(writer, &channels, &fixture.store, 95);

    let mut outcomes = Vec::new();
    for message in reader.messages().expect("Failed to stream source") {
        let message = message.expect("Bad source message");
        outcomes.push(rewriter.process(&message).expect("Rewrite failed"));
    }
    assert_eq!(rewriter.stats().descriptors_written, 2);
    assert_eq!(
        outcomes.iter().filter(|o| **o == MessageOutcome::Skipped).count(),
        5
    );
    rewriter.finish().expect("Failed to close destination");
}

#[test]
fn image_descriptor_keeps_topic_and_metadata() {
    let fixture = fixture(&interleaved_messages());
    let reader = RecordReader::open(&fixture.source).expect("Failed to open source");
    let video = reader
        .messages()
        .expect("Failed to stream source")
        .map(|message| message.expect("Bad source message"))
        .find(|message| message.topic() == FRONT_CAMERA)
        .expect("No video message");

    let source = video.descriptor();
    let restored = image_descriptor(&source);
    assert_eq!(restored.topic, source.topic);
    assert_eq!(restored.metadata, source.metadata);
    assert_eq!(
        restored.schema.map(|schema| schema.name),
        Some(IMAGE_SCHEMA_NAME.to_string())
    );
}

// ── RecordWriter ───────────────────────────────────────────────────

#[test]
fn writer_rejects_message_before_descriptor() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let mut writer =
        RecordWriter::create(directory.path().join("out.mcap")).expect("Failed to create writer");

    let result = writer.write_message("/undeclared", 0, 1, 1, b"data");
    assert!(matches!(
        result,
        Err(ReframeError::UndeclaredChannel { topic }) if topic == "/undeclared"
    ));
}

#[test]
fn writer_declares_each_topic_once() {
    let fixture = fixture(&[FixtureMessage::plain(POSE, 1)]);
    let reader = RecordReader::open(&fixture.source).expect("Failed to open source");
    let message = reader
        .messages()
        .expect("Failed to stream source")
        .next()
        .expect("Empty log")
        .expect("Bad source message");

    let mut writer = RecordWriter::create(&fixture.destination).expect("Failed to create writer");
    assert!(!writer.has_channel(POSE));
    let first = writer.write_channel(&message.descriptor()).expect("Failed to declare");
    let second = writer.write_channel(&message.descriptor()).expect("Failed to declare");
    assert_eq!(first, second);
    assert!(writer.has_channel(POSE));
    writer.close().expect("Failed to close writer");
}
