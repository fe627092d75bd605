//! Second pass: writing the restored log.
//!
//! [`LogRewriter`] walks the source log in order. Messages on ordinary
//! channels are copied byte-for-byte. Messages on video channels are
//! replaced by a JPEG [`CompressedImage`] built from the decoded frame in the
//! [`ImageStore`], or skipped when no usable frame exists. Each channel's
//! descriptor is written once, the first time the channel is encountered.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    channel::ChannelMap,
    error::ReframeError,
    identity::MessageKey,
    payload::{
        CompressedImage, IMAGE_SCHEMA_DEFINITION, IMAGE_SCHEMA_ENCODING, IMAGE_SCHEMA_NAME,
        decode_compressed_video, encode_compressed_image,
    },
    progress::{OperationType, ProgressTracker},
    record::{ChannelDescriptor, RecordMessage, RecordReader, RecordWriter, SchemaDescriptor},
    still::{decode_still, encode_jpeg},
    store::ImageStore,
};

/// How often a progress line is logged during the rewrite.
const LOG_INTERVAL: u64 = 1000;

/// Descriptor state of one channel in the destination log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorState {
    Pending,
    Written,
}

/// What happened to one source message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Written unchanged.
    Copied,
    /// Written with a still-image payload.
    Substituted,
    /// Not written.
    Skipped,
}

/// Counters for one rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    pub copied: u64,
    pub substituted: u64,
    pub skipped: u64,
    pub descriptors_written: u64,
}

impl RewriteStats {
    /// Messages written to the destination.
    pub fn written(&self) -> u64 {
        self.copied + self.substituted
    }
}

/// Descriptor for a video channel once its payloads are still images.
///
/// Topic and metadata are kept; the schema becomes `CompressedImage`.
pub fn image_descriptor(source: &ChannelDescriptor) -> ChannelDescriptor {
    ChannelDescriptor {
        topic: source.topic.clone(),
        message_encoding: "cdr".to_string(),
        schema: Some(SchemaDescriptor {
            name: IMAGE_SCHEMA_NAME.to_string(),
            encoding: IMAGE_SCHEMA_ENCODING.to_string(),
            data: IMAGE_SCHEMA_DEFINITION.as_bytes().to_vec(),
        }),
        metadata: source.metadata.clone(),
    }
}

/// Streams a restored log into a [`RecordWriter`].
pub struct LogRewriter<'a> {
    writer: RecordWriter,
    channels: &'a ChannelMap,
    store: &'a ImageStore,
    quality: u8,
    descriptors: HashMap<String, DescriptorState>,
    stats: RewriteStats,
}

impl<'a> LogRewriter<'a> {
    pub fn new(
        writer: RecordWriter,
        channels: &'a ChannelMap,
        store: &'a ImageStore,
        quality: u8,
    ) -> Self {
        Self {
            writer,
            channels,
            store,
            quality,
            descriptors: HashMap::new(),
            stats: RewriteStats::default(),
        }
    }

    /// Process one source message.
    ///
    /// # Errors
    ///
    /// Only failures to write the destination are returned. Problems with
    /// a single video message are logged and yield [`MessageOutcome::Skipped`].
    pub fn process(&mut self, message: &RecordMessage<'_>) -> Result<MessageOutcome, ReframeError> {
        let is_video = self.channels.is_video(message.topic());
        self.ensure_descriptor(message, is_video)?;

        let outcome = if is_video {
            match self.substitute(message) {
                Ok(payload) => {
                    self.write(message, &payload)?;
                    self.stats.substituted += 1;
                    MessageOutcome::Substituted
                }
                Err(error) => {
                    log::warn!(
                        "Skipping {}: {error}",
                        MessageKey::new(message.log_time(), message.topic())
                    );
                    self.stats.skipped += 1;
                    MessageOutcome::Skipped
                }
            }
        } else {
            self.write(message, message.data())?;
            self.stats.copied += 1;
            MessageOutcome::Copied
        };

        if outcome != MessageOutcome::Skipped && self.stats.written() % LOG_INTERVAL == 0 {
            log::info!(
                "Rewriting message {} to {}",
                self.stats.written(),
                self.writer.path().display()
            );
        }
        Ok(outcome)
    }

    /// Stream the whole source log and close the destination.
    pub fn run(self, reader: &RecordReader) -> Result<RewriteStats, ReframeError> {
        let mut tracker = ProgressTracker::silent(OperationType::Rewrite);
        self.run_with_progress(reader, &mut tracker)
    }

    pub(crate) fn run_with_progress(
        mut self,
        reader: &RecordReader,
        tracker: &mut ProgressTracker,
    ) -> Result<RewriteStats, ReframeError> {
        log::info!(
            "Rewriting {} into {}",
            reader.path().display(),
            self.writer.path().display()
        );

        for message in reader.messages()? {
            let message = message?;
            self.process(&message)?;
            tracker.advance(Some(message.log_time()));
        }
        tracker.finish();

        self.finish()
    }

    /// Close the destination log and return the counters.
    pub fn finish(self) -> Result<RewriteStats, ReframeError> {
        self.writer.close()?;
        Ok(self.stats)
    }

    pub fn stats(&self) -> &RewriteStats {
        &self.stats
    }

    fn ensure_descriptor(
        &mut self,
        message: &RecordMessage<'_>,
        is_video: bool,
    ) -> Result<(), ReframeError> {
        let state = self
            .descriptors
            .get(message.topic())
            .copied()
            .unwrap_or(DescriptorState::Pending);
        if state == DescriptorState::Written {
            return Ok(());
        }

        let source = message.descriptor();
        let descriptor = if is_video {
            image_descriptor(&source)
        } else {
            source
        };
        self.writer.write_channel(&descriptor)?;
        self.descriptors
            .insert(descriptor.topic, DescriptorState::Written);
        self.stats.descriptors_written += 1;
        Ok(())
    }

    /// Build the still-image payload for a video message.
    fn substitute(&self, message: &RecordMessage<'_>) -> Result<Vec<u8>, ReframeError> {
        let key = MessageKey::new(message.log_time(), message.topic());
        let still = decode_still(&self.store.read(&key)?)?;
        let jpeg = encode_jpeg(&still, self.quality)?;

        let video =
            decode_compressed_video(message.data()).map_err(|error| ReframeError::PayloadError {
                topic: message.topic().to_string(),
                reason: error.to_string(),
            })?;
        encode_compressed_image(&CompressedImage::from_video(video, jpeg)).map_err(|error| {
            ReframeError::PayloadError {
                topic: message.topic().to_string(),
                reason: error.to_string(),
            }
        })
    }

    fn write(&mut self, message: &RecordMessage<'_>, payload: &[u8]) -> Result<(), ReframeError> {
        self.writer.write_message(
            message.topic(),
            message.sequence(),
            message.log_time(),
            message.publish_time(),
            payload,
        )
    }
}
