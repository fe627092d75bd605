//! Per-channel video bitstream accumulation.
//!
//! A [`VideoAccumulator`] appends the access units of one video channel to a
//! raw Annex-B bitstream file and records the [`MessageKey`] of every chunk
//! it writes, in arrival order. Chunks arriving before the channel's first
//! initial frame are dropped, since a decoder cannot start on a delta frame.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    channel::VideoChannel,
    error::ReframeError,
    identity::MessageKey,
    payload::{FrameKind, decode_compressed_video, frame_kind},
};

/// Admission state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyframeGate {
    /// No initial frame seen yet; everything is dropped.
    Pending,
    /// Every chunk is written.
    Admitting,
}

/// Outcome of [`VideoAccumulator::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Written to the bitstream and keyed.
    Admitted,
    /// Dropped because the channel has not seen an initial frame yet.
    BeforeKeyframe,
    /// Dropped because the payload is not a readable video message.
    Rejected,
}

/// Collects one channel's admitted chunks into a bitstream file.
pub struct VideoAccumulator {
    channel: VideoChannel,
    path: PathBuf,
    writer: BufWriter<File>,
    gate: KeyframeGate,
    keys: Vec<MessageKey>,
    chunks_written: usize,
    dropped_before_keyframe: u64,
    rejected: u64,
}

impl VideoAccumulator {
    /// Create the channel's bitstream file inside `directory`.
    pub fn create(channel: VideoChannel, directory: &Path) -> Result<Self, ReframeError> {
        let path = directory.join(channel.bitstream_file_name());
        log::debug!(
            "Accumulating {} ({}) into {}",
            channel.topic,
            channel.codec,
            path.display()
        );
        let writer = BufWriter::new(File::create(&path)?);

        Ok(Self {
            channel,
            path,
            writer,
            gate: KeyframeGate::Pending,
            keys: Vec::new(),
            chunks_written: 0,
            dropped_before_keyframe: 0,
            rejected: 0,
        })
    }

    /// The channel this accumulator serves.
    pub fn channel(&self) -> &VideoChannel {
        &self.channel
    }

    /// Offer one message payload to the bitstream.
    ///
    /// # Errors
    ///
    /// Only I/O errors writing the bitstream are returned; unreadable
    /// payloads are reported as [`Admission::Rejected`].
    pub fn admit(&mut self, log_time: u64, payload: &[u8]) -> Result<Admission, ReframeError> {
        let video = match decode_compressed_video(payload) {
            Ok(video) => video,
            Err(error) => {
                log::warn!(
                    "Dropping unreadable video message on {} at {log_time}: {error}",
                    self.channel.topic
                );
                self.rejected += 1;
                return Ok(Admission::Rejected);
            }
        };

        if self.gate == KeyframeGate::Pending {
            if frame_kind(&video.data, self.channel.codec) != FrameKind::Initial {
                self.dropped_before_keyframe += 1;
                return Ok(Admission::BeforeKeyframe);
            }
            log::debug!(
                "First initial frame on {} at {log_time} ({} chunks dropped before it)",
                self.channel.topic,
                self.dropped_before_keyframe
            );
            self.gate = KeyframeGate::Admitting;
        }

        self.writer.write_all(&video.data)?;
        self.chunks_written += 1;
        self.keys
            .push(MessageKey::new(log_time, self.channel.topic.as_str()));
        Ok(Admission::Admitted)
    }

    /// Number of chunks written to the bitstream so far.
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    /// Correlation keys recorded so far, in arrival order.
    pub fn keys(&self) -> &[MessageKey] {
        &self.keys
    }

    /// Flush and close the bitstream.
    pub fn seal(mut self) -> Result<SealedBitstream, ReframeError> {
        self.writer.flush()?;
        drop(self.writer);

        log::debug!(
            "Sealed {}: {} chunks, {} dropped before keyframe, {} rejected",
            self.path.display(),
            self.keys.len(),
            self.dropped_before_keyframe,
            self.rejected
        );

        Ok(SealedBitstream {
            channel: self.channel,
            path: self.path,
            keys: self.keys,
            dropped_before_keyframe: self.dropped_before_keyframe,
            rejected: self.rejected,
        })
    }
}

/// A closed bitstream ready for decoding.
#[derive(Debug, Clone)]
pub struct SealedBitstream {
    pub channel: VideoChannel,
    /// Path of the raw Annex-B bitstream.
    pub path: PathBuf,
    /// One key per written chunk, in arrival order.
    pub keys: Vec<MessageKey>,
    pub dropped_before_keyframe: u64,
    pub rejected: u64,
}

impl SealedBitstream {
    /// Whether no chunk was admitted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
