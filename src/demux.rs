//! First pass: routing video messages to their accumulators.

use std::{collections::HashMap, path::Path};

use crate::{
    accumulator::{Admission, SealedBitstream, VideoAccumulator},
    channel::ChannelMap,
    error::ReframeError,
    progress::{OperationType, ProgressTracker},
    record::RecordReader,
};

/// Routes each message of a video channel to that channel's
/// [`VideoAccumulator`] and ignores everything else.
pub struct Demultiplexer {
    accumulators: Vec<VideoAccumulator>,
    by_topic: HashMap<String, usize>,
}

impl Demultiplexer {
    /// Create one accumulator per configured channel, with bitstreams in
    /// `directory`.
    pub fn new(channels: &ChannelMap, directory: &Path) -> Result<Self, ReframeError> {
        let mut accumulators = Vec::with_capacity(channels.len());
        let mut by_topic = HashMap::with_capacity(channels.len());

        for channel in channels.iter() {
            by_topic.insert(channel.topic.clone(), accumulators.len());
            accumulators.push(VideoAccumulator::create(channel.clone(), directory)?);
        }

        Ok(Self {
            accumulators,
            by_topic,
        })
    }

    /// Route one message. Returns `None` for non-video topics.
    pub fn route(
        &mut self,
        topic: &str,
        log_time: u64,
        payload: &[u8],
    ) -> Result<Option<Admission>, ReframeError> {
        match self.by_topic.get(topic) {
            Some(&index) => self.accumulators[index]
                .admit(log_time, payload)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Stream the whole source log through the accumulators and seal them.
    ///
    /// # Errors
    ///
    /// Any container or I/O error is fatal for the restore.
    pub fn run(self, reader: &RecordReader) -> Result<Vec<SealedBitstream>, ReframeError> {
        let mut tracker = ProgressTracker::silent(OperationType::Demux);
        self.run_with_progress(reader, &mut tracker)
    }

    pub(crate) fn run_with_progress(
        mut self,
        reader: &RecordReader,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<SealedBitstream>, ReframeError> {
        log::info!("Demultiplexing video channels from {}", reader.path().display());

        for message in reader.messages()? {
            let message = message?;
            self.route(message.topic(), message.log_time(), message.data())?;
            tracker.advance(Some(message.log_time()));
        }
        tracker.finish();

        log::debug!("Demux pass read {} messages", tracker.current());
        self.finish()
    }

    /// Seal every accumulator, in channel configuration order.
    pub fn finish(self) -> Result<Vec<SealedBitstream>, ReframeError> {
        self.accumulators
            .into_iter()
            .map(VideoAccumulator::seal)
            .collect()
    }
}
