//! Video channel configuration.
//!
//! A [`ChannelMap`] tells the restore pipeline which topics carry
//! compressed video and which codec each one uses. Every other topic is
//! copied through untouched.
//!
//! # Example
//!
//! ```
//! use reframe::{ChannelMap, VideoChannel, VideoCodec};
//!
//! let mut channels = ChannelMap::new();
//! channels.insert(VideoChannel::new("/camera/front", "front", VideoCodec::H264))?;
//! assert!(channels.is_video("/camera/front"));
//! assert!(!channels.is_video("/imu"));
//! # Ok::<(), reframe::ReframeError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::ReframeError;

/// Video codecs carried by compressed video channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    #[default]
    H265,
}

impl VideoCodec {
    /// Parse a codec from a format string such as `h264`, `avc` or `hevc`.
    pub fn from_format_string(format: &str) -> Option<Self> {
        match format.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "h.264" => Some(VideoCodec::H264),
            "h265" | "hevc" | "h.265" => Some(VideoCodec::H265),
            _ => None,
        }
    }

    /// File extension of a raw Annex-B bitstream in this codec.
    pub fn file_extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
        }
    }
}

impl Display for VideoCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::H265 => write!(f, "H.265"),
        }
    }
}

/// One topic configured as a compressed video channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoChannel {
    /// Channel topic in the log.
    pub topic: String,
    /// Short label used to name the channel's work files.
    pub label: String,
    /// Codec of the channel's video payloads.
    #[serde(default)]
    pub codec: VideoCodec,
}

impl VideoChannel {
    /// Describe a video channel.
    pub fn new(topic: impl Into<String>, label: impl Into<String>, codec: VideoCodec) -> Self {
        Self {
            topic: topic.into(),
            label: label.into(),
            codec,
        }
    }

    /// File name of this channel's accumulated bitstream.
    pub fn bitstream_file_name(&self) -> String {
        format!("{}.{}", self.label, self.codec.file_extension())
    }
}

/// Camera topics recorded as H.265 video by the vehicle video drivers.
const DEFAULT_CHANNELS: &[(&str, &str)] = &[
    ("/apollo/sensor/camera/front_12mm/image/compressed", "front12mm"),
    ("/apollo/sensor/camera/front_6mm/image/compressed", "front6mm"),
    ("/apollo/sensor/camera/left_fisheye/image/compressed", "left_fisheye"),
    ("/apollo/sensor/camera/right_fisheye/image/compressed", "right_fisheye"),
    ("/apollo/sensor/camera/rear_6mm/image/compressed", "rear6mm"),
];

/// Static mapping of video topics to their channel configuration.
///
/// Iteration follows insertion order, which keeps work-file layout and
/// reports stable between runs. Labels are unique across the map, since
/// each one names a channel's bitstream file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VideoChannel>", into = "Vec<VideoChannel>")]
pub struct ChannelMap {
    channels: Vec<VideoChannel>,
}

impl ChannelMap {
    /// Create an empty map (no topic is treated as video).
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Load a map from a JSON array of `{ "topic", "label", "codec" }` objects.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::IoError`] if the file cannot be read, or
    /// [`ReframeError::InvalidChannelMap`] if it is malformed or contains
    /// duplicate topics or labels.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ReframeError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Parse a map from JSON text. See [`from_json_file`](ChannelMap::from_json_file).
    pub fn from_json_str(text: &str) -> Result<Self, ReframeError> {
        let channels: Vec<VideoChannel> = serde_json::from_str(text)
            .map_err(|error| ReframeError::InvalidChannelMap(error.to_string()))?;
        Self::try_from(channels)
    }

    /// Add or replace the configuration for a topic.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::InvalidChannelMap`] if another topic already
    /// uses the channel's label. The map is left unchanged.
    pub fn insert(&mut self, channel: VideoChannel) -> Result<(), ReframeError> {
        if let Some(existing) = self
            .channels
            .iter()
            .find(|existing| existing.label == channel.label && existing.topic != channel.topic)
        {
            return Err(ReframeError::InvalidChannelMap(format!(
                "label {} is used by both {} and {}",
                channel.label, existing.topic, channel.topic
            )));
        }

        match self
            .channels
            .iter_mut()
            .find(|existing| existing.topic == channel.topic)
        {
            Some(existing) => *existing = channel,
            None => self.channels.push(channel),
        }
        Ok(())
    }

    /// Look up a topic.
    pub fn get(&self, topic: &str) -> Option<&VideoChannel> {
        self.channels.iter().find(|channel| channel.topic == topic)
    }

    /// Whether a topic is configured as video.
    pub fn is_video(&self, topic: &str) -> bool {
        self.get(topic).is_some()
    }

    /// Iterate configured channels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &VideoChannel> {
        self.channels.iter()
    }

    /// Number of configured channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelMap {
    /// The five vehicle camera topics, all H.265.
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS
                .iter()
                .map(|(topic, label)| VideoChannel::new(*topic, *label, VideoCodec::H265))
                .collect(),
        }
    }
}

impl TryFrom<Vec<VideoChannel>> for ChannelMap {
    type Error = ReframeError;

    /// Build a map, rejecting duplicate topics as well as duplicate labels.
    fn try_from(channels: Vec<VideoChannel>) -> Result<Self, Self::Error> {
        let mut map = Self::new();
        for channel in channels {
            if map.is_video(&channel.topic) {
                return Err(ReframeError::InvalidChannelMap(format!(
                    "duplicate topic {}",
                    channel.topic
                )));
            }
            map.insert(channel)?;
        }
        Ok(map)
    }
}

impl From<ChannelMap> for Vec<VideoChannel> {
    fn from(map: ChannelMap) -> Self {
        map.channels
    }
}
