//! Error types for the `reframe` crate.
//!
//! This module defines [`ReframeError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry rich context to aid debugging,
//! including file paths, channel topics, and frame counts.
//!
//! Not every variant aborts a restore. Channel-level failures
//! ([`DecoderFailed`](ReframeError::DecoderFailed),
//! [`FrameCountMismatch`](ReframeError::FrameCountMismatch)) and
//! message-level failures ([`ImageNotFound`](ReframeError::ImageNotFound),
//! [`ImageError`](ReframeError::ImageError), [`PayloadError`](ReframeError::PayloadError))
//! are absorbed by [`Restorer::run`](crate::Restorer::run) and surfaced in the
//! [`RestoreReport`](crate::RestoreReport) instead.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use mcap::McapError;
use thiserror::Error;

/// The unified error type for all `reframe` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReframeError {
    /// The source log does not exist or is not a regular file.
    #[error("Source log not found at {path}")]
    SourceNotFound {
        /// Path that was passed to [`crate::Restorer::new`].
        path: PathBuf,
    },

    /// A log file could not be opened or created.
    #[error("Failed to open log file at {path}: {reason}")]
    FileOpen {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// A destination or work path would overwrite or clear an input.
    #[error("Refusing to use {path}: {reason}")]
    PathConflict {
        /// Offending destination or scratch path.
        path: PathBuf,
        /// What the path collides with.
        reason: String,
    },

    /// The log container could not be read or written.
    #[error("Log container error: {0}")]
    RecordError(String),

    /// A message was written before its channel descriptor.
    #[error("Channel {topic} was written before its descriptor")]
    UndeclaredChannel {
        /// Topic of the offending message.
        topic: String,
    },

    /// A message payload could not be decoded or encoded.
    #[error("Payload error on {topic}: {reason}")]
    PayloadError {
        /// Topic of the offending message.
        topic: String,
        /// Underlying reason.
        reason: String,
    },

    /// The decoder reported failure for a channel's bitstream.
    #[error("Decoder failed for {bitstream}: {reason}")]
    DecoderFailed {
        /// Bitstream file handed to the decoder.
        bitstream: PathBuf,
        /// Exit status or decoder error.
        reason: String,
    },

    /// The number of decoded images does not match the number of admitted chunks.
    #[error("Mismatch on {topic}: {expected} chunks admitted but {actual} frames decoded")]
    FrameCountMismatch {
        /// Channel topic.
        topic: String,
        /// Number of correlation keys recorded during demux.
        expected: usize,
        /// Number of images produced by the decoder.
        actual: usize,
    },

    /// No decoded image exists for a message.
    #[error("Image {key} not found in image store")]
    ImageNotFound {
        /// File name of the missing correlation key.
        key: String,
    },

    /// The channel map could not be parsed.
    #[error("Invalid channel map: {0}")]
    InvalidChannelMap(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while decoding or encoding a still image.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<McapError> for ReframeError {
    fn from(error: McapError) -> Self {
        ReframeError::RecordError(error.to_string())
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for ReframeError {
    fn from(error: ffmpeg_next::Error) -> Self {
        ReframeError::FfmpegError(error.to_string())
    }
}
