//! Video and image message payloads.
//!
//! Video channels carry `foxglove_msgs/msg/CompressedVideo` messages
//! serialized as CDR, each holding one Annex-B access unit. The restored
//! log carries `foxglove_msgs/msg/CompressedImage` messages in their place.
//! Both types share the same field layout, so a substituted message keeps
//! its timestamp and frame id and only swaps `data` and `format`.

use std::io::Cursor;

use cdr::{CdrLe, Infinite, LittleEndian, de::Deserializer};
use serde::{Deserialize, Serialize};

use crate::channel::VideoCodec;

/// Schema name of restored image channels.
pub const IMAGE_SCHEMA_NAME: &str = "foxglove_msgs/msg/CompressedImage";

/// Schema encoding of [`IMAGE_SCHEMA_DEFINITION`].
pub const IMAGE_SCHEMA_ENCODING: &str = "ros2msg";

/// `ros2msg` definition of `foxglove_msgs/msg/CompressedImage`.
pub const IMAGE_SCHEMA_DEFINITION: &str = "builtin_interfaces/Time timestamp
string frame_id
uint8[] data
string format
================================================================================
MSG: builtin_interfaces/Time
int32 sec
uint32 nanosec
";

/// Format tag stamped on substituted image messages.
pub const JPEG_FORMAT: &str = "jpeg";

/// Message header timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u32,
    pub nsec: u32,
}

impl Timestamp {
    /// Split nanoseconds since the epoch into seconds and nanoseconds.
    ///
    /// Returns `None` past `u32::MAX` seconds (early 2106), which the
    /// header cannot represent.
    pub fn from_nanos(nanos: u64) -> Option<Self> {
        Some(Self {
            sec: u32::try_from(nanos / 1_000_000_000).ok()?,
            nsec: (nanos % 1_000_000_000) as u32,
        })
    }

    pub fn as_nanos(&self) -> u64 {
        (self.sec as u64) * 1_000_000_000 + (self.nsec as u64)
    }
}

/// A compressed video chunk as recorded on a video channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedVideo {
    pub timestamp: Timestamp,
    pub frame_id: String,
    /// One Annex-B access unit.
    pub data: Vec<u8>,
    pub format: String,
}

/// A compressed still image, the restored form of a [`CompressedVideo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedImage {
    pub timestamp: Timestamp,
    pub frame_id: String,
    pub data: Vec<u8>,
    pub format: String,
}

impl CompressedImage {
    /// Replace a video chunk's payload with encoded JPEG bytes.
    pub fn from_video(video: CompressedVideo, jpeg: Vec<u8>) -> Self {
        Self {
            timestamp: video.timestamp,
            frame_id: video.frame_id,
            data: jpeg,
            format: JPEG_FORMAT.to_string(),
        }
    }
}

/// Decode a CDR-serialized [`CompressedVideo`].
pub fn decode_compressed_video(data: &[u8]) -> cdr::Result<CompressedVideo> {
    cdr::deserialize::<CompressedVideo>(data).or_else(|_err| {
        // Payloads without an encapsulation header: assume little-endian.
        let mut de =
            Deserializer::<_, Infinite, LittleEndian>::new(Cursor::new(data), Infinite);
        Deserialize::deserialize(&mut de)
    })
}

/// Serialize a [`CompressedVideo`] as little-endian CDR.
pub fn encode_compressed_video(video: &CompressedVideo) -> cdr::Result<Vec<u8>> {
    cdr::serialize::<_, _, CdrLe>(video, Infinite)
}

/// Decode a CDR-serialized [`CompressedImage`].
pub fn decode_compressed_image(data: &[u8]) -> cdr::Result<CompressedImage> {
    cdr::deserialize::<CompressedImage>(data)
}

/// Serialize a [`CompressedImage`] as little-endian CDR.
pub fn encode_compressed_image(image: &CompressedImage) -> cdr::Result<Vec<u8>> {
    cdr::serialize::<_, _, CdrLe>(image, Infinite)
}

/// H.264 NAL unit types that carry stream setup.
mod h264 {
    pub const SPS: u8 = 7;
}

/// H.265 NAL unit types that carry stream setup.
mod h265 {
    pub const VPS: u8 = 32;
    pub const SPS: u8 = 33;
}

/// Kind of a video chunk, as far as the keyframe gate is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries parameter sets; a decodable bitstream may start here.
    Initial,
    /// Depends on state set up by an earlier initial frame.
    Delta,
}

/// Iterate the NAL unit types of an Annex-B access unit.
///
/// Both 3-byte and 4-byte start codes are recognised; a 4-byte code is a
/// 3-byte code with a leading zero.
pub fn nal_unit_types(data: &[u8], codec: VideoCodec) -> impl Iterator<Item = u8> + '_ {
    let mut position = 0;
    std::iter::from_fn(move || {
        while position + 3 < data.len() {
            if data[position] == 0 && data[position + 1] == 0 && data[position + 2] == 1 {
                let header = data[position + 3];
                position += 4;
                return Some(match codec {
                    VideoCodec::H264 => header & 0x1F,
                    VideoCodec::H265 => (header >> 1) & 0x3F,
                });
            }
            position += 1;
        }
        None
    })
}

/// Classify an access unit by whether it carries parameter sets.
pub fn frame_kind(data: &[u8], codec: VideoCodec) -> FrameKind {
    let initial = nal_unit_types(data, codec).any(|nal_type| match codec {
        VideoCodec::H264 => nal_type == h264::SPS,
        VideoCodec::H265 => nal_type == h265::VPS || nal_type == h265::SPS,
    });
    if initial {
        FrameKind::Initial
    } else {
        FrameKind::Delta
    }
}
