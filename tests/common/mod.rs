//! Shared fixtures: synthetic logs, Annex-B access units and fake decoders.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use image::{Rgb, RgbImage};
use reframe::{
    ChannelDescriptor, ChannelMap, CompressedVideo, FrameDecoder, ReframeError, RecordWriter,
    SchemaDescriptor, VideoChannel, VideoCodec,
    payload::{Timestamp, encode_compressed_video, nal_unit_types},
};

pub const FRONT_CAMERA: &str = "/camera/front/compressed";
pub const REAR_CAMERA: &str = "/camera/rear/compressed";
pub const POSE: &str = "/localization/pose";
pub const CHASSIS: &str = "/canbus/chassis";

/// Width and height of every image the fake decoders write.
pub const FRAME_WIDTH: u32 = 8;
pub const FRAME_HEIGHT: u32 = 6;

// ── Access units ───────────────────────────────────────────────────

/// H.264 access unit with SPS, PPS and an IDR slice.
pub fn h264_keyframe() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, 0xAB, // SPS
        0, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80, // PPS
        0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00, 0x33, // IDR slice
    ]
}

/// H.264 access unit with a single non-IDR slice.
pub fn h264_delta() -> Vec<u8> {
    vec![0, 0, 0, 1, 0x41, 0x9A, 0x21, 0x6C, 0x42]
}

/// H.265 access unit with VPS, SPS, PPS and an IDR slice.
pub fn h265_keyframe() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x40, 0x01, 0x0C, 0x01, // VPS
        0, 0, 0, 1, 0x42, 0x01, 0x01, 0x01, // SPS
        0, 0, 0, 1, 0x44, 0x01, 0xC1, 0x72, // PPS
        0, 0, 0, 1, 0x26, 0x01, 0xAF, 0x06, // IDR_W_RADL slice
    ]
}

/// H.265 access unit with a single trailing slice.
pub fn h265_delta() -> Vec<u8> {
    vec![0, 0, 0, 1, 0x02, 0x01, 0xD0, 0x09, 0x7E]
}

/// CDR `CompressedVideo` payload wrapping one access unit.
pub fn video_payload(log_time: u64, access_unit: Vec<u8>, codec: VideoCodec) -> Vec<u8> {
    let video = CompressedVideo {
        timestamp: Timestamp::from_nanos(log_time).expect("Fixture time out of range"),
        frame_id: "camera".to_string(),
        data: access_unit,
        format: codec.file_extension().to_string(),
    };
    encode_compressed_video(&video).expect("Failed to encode video payload")
}

// ── Logs ───────────────────────────────────────────────────────────

/// One message of a fixture log.
#[derive(Debug, Clone)]
pub struct FixtureMessage {
    pub topic: &'static str,
    pub log_time: u64,
    pub data: Vec<u8>,
}

impl FixtureMessage {
    pub fn video(topic: &'static str, log_time: u64, access_unit: Vec<u8>, codec: VideoCodec) -> Self {
        Self {
            topic,
            log_time,
            data: video_payload(log_time, access_unit, codec),
        }
    }

    pub fn plain(topic: &'static str, log_time: u64) -> Self {
        Self {
            topic,
            log_time,
            data: format!("{topic} at {log_time}").into_bytes(),
        }
    }
}

fn fixture_descriptor(topic: &str, video: bool) -> ChannelDescriptor {
    let schema = if video {
        SchemaDescriptor {
            name: "foxglove_msgs/msg/CompressedVideo".to_string(),
            encoding: "ros2msg".to_string(),
            data: b"builtin_interfaces/Time timestamp\nstring frame_id\nuint8[] data\nstring format\n"
                .to_vec(),
        }
    } else {
        SchemaDescriptor {
            name: "std_msgs/msg/String".to_string(),
            encoding: "ros2msg".to_string(),
            data: b"string data\n".to_vec(),
        }
    };
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), "fixture".to_string());

    ChannelDescriptor {
        topic: topic.to_string(),
        message_encoding: "cdr".to_string(),
        schema: Some(schema),
        metadata,
    }
}

/// Write `messages` in order to a new log, declaring each channel on
/// first use. Topics in `channels` get a video schema.
pub fn write_log(path: &Path, channels: &ChannelMap, messages: &[FixtureMessage]) {
    let mut writer = RecordWriter::create(path).expect("Failed to create fixture log");
    for (sequence, message) in messages.iter().enumerate() {
        writer
            .write_channel(&fixture_descriptor(message.topic, channels.is_video(message.topic)))
            .expect("Failed to declare fixture channel");
        writer
            .write_message(
                message.topic,
                sequence as u32,
                message.log_time,
                message.log_time,
                &message.data,
            )
            .expect("Failed to write fixture message");
    }
    writer.close().expect("Failed to close fixture log");
}

/// One H.264 video channel on [`FRONT_CAMERA`].
pub fn front_camera_map() -> ChannelMap {
    let mut channels = ChannelMap::new();
    channels
        .insert(VideoChannel::new(FRONT_CAMERA, "front", VideoCodec::H264))
        .expect("Failed to configure channel");
    channels
}

/// Five front camera chunks (one keyframe then four deltas) interleaved
/// with three pose messages.
pub fn interleaved_messages() -> Vec<FixtureMessage> {
    let codec = VideoCodec::H264;
    vec![
        FixtureMessage::plain(POSE, 1_000),
        FixtureMessage::video(FRONT_CAMERA, 1_100, h264_keyframe(), codec),
        FixtureMessage::video(FRONT_CAMERA, 1_200, h264_delta(), codec),
        FixtureMessage::plain(POSE, 1_250),
        FixtureMessage::video(FRONT_CAMERA, 1_300, h264_delta(), codec),
        FixtureMessage::video(FRONT_CAMERA, 1_400, h264_delta(), codec),
        FixtureMessage::plain(POSE, 1_450),
        FixtureMessage::video(FRONT_CAMERA, 1_500, h264_delta(), codec),
    ]
}

// ── Decoders ───────────────────────────────────────────────────────

/// Writes one PNG per slice NAL unit in the bitstream, optionally with a
/// wrong frame count.
pub struct FakeDecoder {
    /// Frames to add (positive) or drop (negative) from the true count.
    pub frame_offset: isize,
    /// Number of times `decode` was called.
    pub calls: AtomicUsize,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::with_frame_offset(0)
    }

    pub fn with_frame_offset(frame_offset: isize) -> Self {
        Self {
            frame_offset,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn is_slice(nal_type: u8, codec: VideoCodec) -> bool {
    match codec {
        VideoCodec::H264 => nal_type == 1 || nal_type == 5,
        VideoCodec::H265 => nal_type < 32,
    }
}

impl FrameDecoder for FakeDecoder {
    fn decode(
        &self,
        bitstream: &Path,
        codec: VideoCodec,
        output_directory: &Path,
    ) -> Result<(), ReframeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let data = fs::read(bitstream)?;
        let slices = nal_unit_types(&data, codec)
            .filter(|nal_type| is_slice(*nal_type, codec))
            .count();
        let frames = (slices as isize + self.frame_offset).max(0) as usize;

        for index in 0..frames {
            let shade = (index * 40 % 256) as u8;
            let image = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([shade, 64, 255 - shade]));
            image.save(output_directory.join(format!("{index}.png")))?;
        }
        Ok(())
    }
}

/// Always fails.
pub struct FailingDecoder;

impl FrameDecoder for FailingDecoder {
    fn decode(
        &self,
        bitstream: &Path,
        _codec: VideoCodec,
        _output_directory: &Path,
    ) -> Result<(), ReframeError> {
        Err(ReframeError::DecoderFailed {
            bitstream: bitstream.to_path_buf(),
            reason: "corrupt bitstream".to_string(),
        })
    }
}

/// Write `count` numbered PNG images into `directory`.
pub fn write_numbered_images(directory: &Path, count: usize) -> Vec<std::path::PathBuf> {
    fs::create_dir_all(directory).expect("Failed to create image directory");
    (0..count)
        .map(|index| {
            let path = directory.join(format!("{index}.png"));
            RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([index as u8, 0, 0]))
                .save(&path)
                .expect("Failed to write image");
            path
        })
        .collect()
}
