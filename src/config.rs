//! Restore configuration.
//!
//! [`RestoreOptions`] is a builder that threads the decoder, progress
//! callback, and tuning settings through [`Restorer`](crate::Restorer)
//! without polluting its constructor.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use reframe::{CommandDecoder, RestoreOptions};
//!
//! let options = RestoreOptions::new()
//!     .with_decoder(Arc::new(CommandDecoder::new("video2jpg")))
//!     .with_jpeg_quality(90)
//!     .with_work_directory("/tmp/reframe-work")
//!     .keep_work_directory(true);
//! assert_eq!(options.jpeg_quality(), 90);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decode::FrameDecoder;
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::still::DEFAULT_JPEG_QUALITY;

/// Progress is reported every this many messages unless overridden.
const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Configuration for a restore run.
#[derive(Clone)]
pub struct RestoreOptions {
    pub(crate) decoder: Option<Arc<dyn FrameDecoder>>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
    pub(crate) jpeg_quality: u8,
    pub(crate) work_directory: Option<PathBuf>,
    pub(crate) keep_work_directory: bool,
}

impl Debug for RestoreOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RestoreOptions")
            .field("has_decoder", &self.decoder.is_some())
            .field("batch_size", &self.batch_size)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("work_directory", &self.work_directory)
            .field("keep_work_directory", &self.keep_work_directory)
            .finish_non_exhaustive()
    }
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            decoder: None,
            progress: Arc::new(NoOpProgress),
            batch_size: DEFAULT_BATCH_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            work_directory: None,
            keep_work_directory: false,
        }
    }
}

impl RestoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder used for every video channel.
    ///
    /// Defaults to [`FfmpegDecoder`](crate::FfmpegDecoder) when the `ffmpeg`
    /// feature is enabled; without it a decoder must be set.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Register a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Report progress every `batch_size` messages (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// JPEG quality of substituted image messages, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Directory for bitstreams and decoded frames.
    ///
    /// Work files go in a [`SCRATCH_DIRECTORY`](crate::SCRATCH_DIRECTORY)
    /// subdirectory, which is wiped at the start of a run; nothing else in
    /// the directory is touched. Defaults to `<destination>.work` next to
    /// the destination log.
    #[must_use]
    pub fn with_work_directory<P: AsRef<Path>>(mut self, directory: P) -> Self {
        self.work_directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Keep the scratch directory after the run instead of deleting it.
    #[must_use]
    pub fn keep_work_directory(mut self, keep: bool) -> Self {
        self.keep_work_directory = keep;
        self
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}
