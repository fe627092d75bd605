//! The restore pipeline.
//!
//! [`Restorer`] is the main entry point for the crate. A run has three
//! phases, strictly in order:
//!
//! 1. **Demux**: one pass over the source log splits every configured video
//!    channel into a raw bitstream, keeping one correlation key per chunk.
//! 2. **Decode**: each bitstream is decoded into numbered images, which are
//!    renamed to their correlation keys in the [`ImageStore`].
//! 3. **Rewrite**: a second pass over the source log writes the destination,
//!    substituting still images for video chunks.
//!
//! Channels are independent until the rewrite begins; with the `rayon`
//! feature they are decoded concurrently.
//!
//! # Example
//!
//! ```no_run
//! use reframe::{ChannelMap, Restorer};
//!
//! let report = Restorer::new("drive.record")?
//!     .with_destination("drive.record_restored")
//!     .with_channels(ChannelMap::default())
//!     .run()?;
//! println!("{} image messages restored", report.rewrite.substituted);
//! # Ok::<(), reframe::ReframeError>(())
//! ```

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    accumulator::SealedBitstream,
    channel::ChannelMap,
    config::RestoreOptions,
    decode::{FrameDecoder, collect_images},
    demux::Demultiplexer,
    error::ReframeError,
    progress::{OperationType, ProgressCallback, ProgressInfo, ProgressTracker},
    record::{RecordReader, RecordWriter},
    relink::relink,
    rewrite::{LogRewriter, RewriteStats},
    store::ImageStore,
};

/// Destination used when none is given: `<source>_restored`.
pub fn default_destination(source: &Path) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push("_restored");
    PathBuf::from(name)
}

/// Work directory used when none is given: `<destination>.work`.
fn default_work_directory(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".work");
    PathBuf::from(name)
}

/// How a video channel fared in the decode phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Every admitted chunk has an image in the store.
    Restored { images: usize },
    /// No initial frame was seen, so nothing was admitted.
    NoKeyframe,
    /// The decoder failed; the channel's messages are dropped.
    DecodeFailed { reason: String },
    /// Decoded frame count differs from admitted chunk count; the
    /// channel's messages are dropped.
    Mismatch { expected: usize, actual: usize },
    /// Moving images into the store failed; the channel's messages are dropped.
    RelinkFailed { reason: String },
}

/// Per-channel outcome of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    pub topic: String,
    /// Chunks written to the bitstream.
    pub admitted: usize,
    /// Chunks dropped while waiting for the first initial frame.
    pub dropped_before_keyframe: u64,
    /// Payloads that were not readable video messages.
    pub rejected: u64,
    /// Images the decoder produced, if it ran successfully.
    pub decoded: Option<usize>,
    pub status: ChannelStatus,
}

impl ChannelReport {
    /// Whether the channel's video messages will be substituted.
    pub fn is_restored(&self) -> bool {
        matches!(self.status, ChannelStatus::Restored { .. })
    }
}

/// Outcome of [`Restorer::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub channels: Vec<ChannelReport>,
    pub rewrite: RewriteStats,
}

impl RestoreReport {
    /// Channels whose video messages were dropped because of a failure.
    pub fn failed_channels(&self) -> impl Iterator<Item = &ChannelReport> {
        self.channels.iter().filter(|channel| {
            !matches!(
                channel.status,
                ChannelStatus::Restored { .. } | ChannelStatus::NoKeyframe
            )
        })
    }
}

/// Restores a log whose camera channels were recorded as video.
///
/// Created via [`Restorer::new`]; configure with the `with_*` methods and
/// execute with [`run`](Restorer::run).
#[derive(Debug, Clone)]
pub struct Restorer {
    source: PathBuf,
    destination: PathBuf,
    channels: ChannelMap,
    options: RestoreOptions,
}

impl Restorer {
    /// Prepare a restore of `source` into `<source>_restored`.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::SourceNotFound`] if `source` is not an
    /// existing file.
    pub fn new<P: AsRef<Path>>(source: P) -> Result<Self, ReframeError> {
        let source = source.as_ref().to_path_buf();
        if !source.is_file() {
            return Err(ReframeError::SourceNotFound { path: source });
        }

        Ok(Self {
            destination: default_destination(&source),
            source,
            channels: ChannelMap::default(),
            options: RestoreOptions::default(),
        })
    }

    /// Write the restored log to `destination`.
    #[must_use]
    pub fn with_destination<P: AsRef<Path>>(mut self, destination: P) -> Self {
        self.destination = destination.as_ref().to_path_buf();
        self
    }

    /// Which topics are video, and in which codec.
    #[must_use]
    pub fn with_channels(mut self, channels: ChannelMap) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn work_directory(&self) -> PathBuf {
        self.options
            .work_directory
            .clone()
            .unwrap_or_else(|| default_work_directory(&self.destination))
    }

    /// Execute the restore.
    ///
    /// Channel- and message-level failures are logged and recorded in the
    /// returned [`RestoreReport`]; they do not fail the run.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::PathConflict`] before any file is touched if
    /// the destination names the source log, or if the scratch directory
    /// would contain either log. Otherwise returns an error if the source
    /// cannot be read as a log, the destination or work directory cannot
    /// be written, or streaming either pass fails.
    pub fn run(&self) -> Result<RestoreReport, ReframeError> {
        ensure_distinct_destination(&self.source, &self.destination)?;

        let decoder = self.decoder()?;
        let work = WorkDirectory::prepare(
            self.work_directory(),
            &[self.source.as_path(), self.destination.as_path()],
        )?;
        let result = self.run_phases(&work, decoder.as_ref());

        if self.options.keep_work_directory {
            log::info!("Keeping work files in {}", work.scratch.display());
        } else {
            work.remove();
        }
        result
    }

    fn run_phases(
        &self,
        work: &WorkDirectory,
        decoder: &dyn FrameDecoder,
    ) -> Result<RestoreReport, ReframeError> {
        let reader = RecordReader::open(&self.source)?;
        let batch_size = self.options.batch_size;

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Demux,
            None,
            batch_size,
        );
        let sealed = Demultiplexer::new(&self.channels, &work.videos)?
            .run_with_progress(&reader, &mut tracker)?;

        let store = ImageStore::create(&work.images)?;
        let channels = decode_channels(&sealed, decoder, &store, &self.options.progress);

        let writer = RecordWriter::create(&self.destination)?;
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::Rewrite,
            None,
            batch_size,
        );
        let rewrite = LogRewriter::new(
            writer,
            &self.channels,
            &store,
            self.options.jpeg_quality,
        )
        .run_with_progress(&reader, &mut tracker)?;

        log::info!(
            "All done, restored log: {} ({} copied, {} substituted, {} skipped)",
            self.destination.display(),
            rewrite.copied,
            rewrite.substituted,
            rewrite.skipped
        );

        Ok(RestoreReport {
            source: self.source.clone(),
            destination: self.destination.clone(),
            channels,
            rewrite,
        })
    }

    fn decoder(&self) -> Result<Arc<dyn FrameDecoder>, ReframeError> {
        match &self.options.decoder {
            Some(decoder) => Ok(Arc::clone(decoder)),
            None => default_decoder(),
        }
    }
}

#[cfg(feature = "ffmpeg")]
fn default_decoder() -> Result<Arc<dyn FrameDecoder>, ReframeError> {
    Ok(Arc::new(crate::decode::FfmpegDecoder::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn default_decoder() -> Result<Arc<dyn FrameDecoder>, ReframeError> {
    Err(ReframeError::DecoderFailed {
        bitstream: PathBuf::new(),
        reason: "no decoder configured and the `ffmpeg` feature is disabled".to_string(),
    })
}

/// Decode and relink every sealed channel.
fn decode_channels(
    sealed: &[SealedBitstream],
    decoder: &dyn FrameDecoder,
    store: &ImageStore,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<ChannelReport> {
    let started = Instant::now();
    let finished = AtomicU64::new(0);
    let total = sealed.len() as u64;

    let decode_one = |bitstream: &SealedBitstream| {
        let report = decode_channel(bitstream, decoder, store);
        let current = finished.fetch_add(1, Ordering::Relaxed) + 1;
        progress.on_progress(&ProgressInfo {
            operation: OperationType::Decode,
            current,
            total: Some(total),
            elapsed: started.elapsed(),
            log_time: None,
        });
        report
    };

    #[cfg(feature = "rayon")]
    let reports = sealed.par_iter().map(decode_one).collect();
    #[cfg(not(feature = "rayon"))]
    let reports = sealed.iter().map(decode_one).collect();

    reports
}

/// Decode one channel's bitstream and link its frames into the store.
fn decode_channel(
    bitstream: &SealedBitstream,
    decoder: &dyn FrameDecoder,
    store: &ImageStore,
) -> ChannelReport {
    let topic = bitstream.channel.topic.clone();
    let mut report = ChannelReport {
        topic: topic.clone(),
        admitted: bitstream.keys.len(),
        dropped_before_keyframe: bitstream.dropped_before_keyframe,
        rejected: bitstream.rejected,
        decoded: None,
        status: ChannelStatus::NoKeyframe,
    };

    if bitstream.is_empty() {
        log::warn!("No initial frame found on {topic}; its messages will be dropped");
        report.decoded = Some(0);
        return report;
    }

    let images = match decode_frames(bitstream, decoder) {
        Ok(images) => images,
        Err(error) => {
            log::error!("Failed to decode {topic}: {error}");
            report.status = ChannelStatus::DecodeFailed {
                reason: error.to_string(),
            };
            return report;
        }
    };
    report.decoded = Some(images.len());

    report.status = match relink(&topic, &bitstream.keys, &images, store) {
        Ok(images) => ChannelStatus::Restored { images },
        Err(ReframeError::FrameCountMismatch {
            expected, actual, ..
        }) => {
            log::error!(
                "Mismatch between original {expected} and generated {actual} frames on {topic}"
            );
            ChannelStatus::Mismatch { expected, actual }
        }
        Err(error) => {
            log::error!("Failed to link decoded frames for {topic}: {error}");
            ChannelStatus::RelinkFailed {
                reason: error.to_string(),
            }
        }
    };
    report
}

fn decode_frames(
    bitstream: &SealedBitstream,
    decoder: &dyn FrameDecoder,
) -> Result<Vec<PathBuf>, ReframeError> {
    let mut directory_name = bitstream
        .path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    directory_name.push("_images");
    let frames_directory = bitstream.path.with_file_name(directory_name);
    fs::create_dir_all(&frames_directory)?;

    decoder.decode(&bitstream.path, bitstream.channel.codec, &frames_directory)?;
    collect_images(&frames_directory)
}

/// Directory created inside the work directory to hold one run's files.
///
/// Only this directory is ever wiped; the work directory itself may be
/// shared with unrelated files.
pub const SCRATCH_DIRECTORY: &str = "reframe-scratch";

/// Scratch space for one run.
struct WorkDirectory {
    root: PathBuf,
    scratch: PathBuf,
    videos: PathBuf,
    images: PathBuf,
    created_root: bool,
}

impl WorkDirectory {
    /// Wipe and recreate the scratch layout under `root`.
    ///
    /// Refuses to proceed if the scratch directory would contain any of
    /// `protected`.
    fn prepare(root: PathBuf, protected: &[&Path]) -> Result<Self, ReframeError> {
        let scratch = root.join(SCRATCH_DIRECTORY);
        let resolved_scratch = resolve_path(&scratch)?;
        for path in protected {
            if resolve_path(path)?.starts_with(&resolved_scratch) {
                return Err(ReframeError::PathConflict {
                    path: scratch,
                    reason: format!("work files would be cleared over {}", path.display()),
                });
            }
        }

        let created_root = !root.exists();
        if scratch.exists() {
            log::debug!("Clearing scratch directory {}", scratch.display());
            fs::remove_dir_all(&scratch)?;
        }
        let videos = scratch.join("videos");
        let images = scratch.join("images");
        fs::create_dir_all(&videos)?;
        fs::create_dir_all(&images)?;

        Ok(Self {
            root,
            scratch,
            videos,
            images,
            created_root,
        })
    }

    fn remove(&self) {
        if let Err(error) = fs::remove_dir_all(&self.scratch) {
            log::warn!(
                "Failed to remove scratch directory {}: {error}",
                self.scratch.display()
            );
        }
        // Non-recursive: anything else placed there is left alone.
        if self.created_root {
            if let Err(error) = fs::remove_dir(&self.root) {
                log::debug!("Leaving work directory {}: {error}", self.root.display());
            }
        }
    }
}

/// Refuse a destination that is the source under another name.
///
/// Catches `..` aliases, symlinks and hard links. A destination that does
/// not exist yet cannot be the source.
fn ensure_distinct_destination(source: &Path, destination: &Path) -> Result<(), ReframeError> {
    if destination.exists() && same_file::is_same_file(source, destination)? {
        return Err(ReframeError::PathConflict {
            path: destination.to_path_buf(),
            reason: format!("it is the source log {}", source.display()),
        });
    }
    Ok(())
}

/// Absolute, symlink-free form of `path`.
///
/// Trailing components that do not exist yet are appended unchanged to the
/// resolved form of their nearest existing ancestor.
fn resolve_path(path: &Path) -> Result<PathBuf, ReframeError> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Ok(resolved);
    }
    let name = path.file_name().ok_or_else(|| ReframeError::PathConflict {
        path: path.to_path_buf(),
        reason: "the path cannot be resolved".to_string(),
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(resolve_path(parent)?.join(name))
}
