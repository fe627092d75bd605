//! # reframe
//!
//! Restore sensor logs whose camera channels were recorded as compressed
//! video, by replacing every video chunk with an independently decodable
//! still image.
//!
//! Drive logs are often recorded with cameras encoding H.264/H.265 on the
//! fly to save space. Each message then holds one access unit that cannot be
//! decoded without the messages before it, which breaks tools that expect
//! one image per message. `reframe` reads such a log twice: once to split
//! each video channel into a bitstream and decode it, and once to write a
//! new log in which video messages carry JPEG images and every other
//! message is copied unchanged, in the original order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reframe::Restorer;
//!
//! let report = Restorer::new("drive.mcap")?.run()?;
//! for channel in &report.channels {
//!     println!("{}: {:?}", channel.topic, channel.status);
//! }
//! # Ok::<(), reframe::ReframeError>(())
//! ```
//!
//! ### Custom video channels and an external decoder
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use reframe::{ChannelMap, CommandDecoder, RestoreOptions, Restorer, VideoChannel, VideoCodec};
//!
//! let mut channels = ChannelMap::new();
//! channels.insert(VideoChannel::new("/camera/front", "front", VideoCodec::H264))?;
//!
//! let decoder = CommandDecoder::parse(
//!     "ffmpeg -loglevel error -i {input} -start_number 0 {output}/%06d.png",
//! )?;
//!
//! Restorer::new("drive.mcap")?
//!     .with_destination("drive_images.mcap")
//!     .with_channels(channels)
//!     .with_options(RestoreOptions::new().with_decoder(Arc::new(decoder)))
//!     .run()?;
//! # Ok::<(), reframe::ReframeError>(())
//! ```
//!
//! ## Guarantees
//!
//! - Destination message order is a subsequence of source order.
//! - Non-video messages are byte-for-byte copies with identical timestamps.
//! - Each channel's descriptor is written exactly once, before its first
//!   message.
//! - A video message is only substituted if its channel decoded to exactly
//!   as many frames as chunks were admitted; otherwise the channel's video
//!   messages are dropped and the failure is reported.
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | In-process [`FfmpegDecoder`] (default) |
//! | `rayon` | Decode video channels concurrently |
//! | `full` | Enables all of the above |

pub mod accumulator;
pub mod channel;
pub mod config;
pub mod decode;
pub mod demux;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod identity;
pub mod payload;
pub mod progress;
pub mod record;
pub mod relink;
pub mod restore;
pub mod rewrite;
pub mod still;
pub mod store;

pub use accumulator::{Admission, SealedBitstream, VideoAccumulator};
pub use channel::{ChannelMap, VideoChannel, VideoCodec};
pub use config::RestoreOptions;
#[cfg(feature = "ffmpeg")]
pub use decode::FfmpegDecoder;
pub use decode::{CommandDecoder, FrameDecoder, collect_images};
pub use demux::Demultiplexer;
pub use error::ReframeError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use identity::MessageKey;
pub use payload::{CompressedImage, CompressedVideo, FrameKind};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use record::{ChannelDescriptor, RecordMessage, RecordReader, RecordWriter, SchemaDescriptor};
pub use relink::relink;
pub use restore::{
    ChannelReport, ChannelStatus, RestoreReport, Restorer, SCRATCH_DIRECTORY, default_destination,
};
pub use rewrite::{LogRewriter, MessageOutcome, RewriteStats};
pub use store::ImageStore;
