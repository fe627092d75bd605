//! FFmpeg initialisation and log level configuration.
//!
//! FFmpeg has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. By default it prints warnings
//! about every damaged access unit to stderr, which drowns out restore
//! progress on long drives. [`set_ffmpeg_log_level`] tunes or silences it.
//!
//! # Example
//!
//! ```no_run
//! use reframe::FfmpegLogLevel;
//!
//! reframe::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

use ffmpeg_next::util::log::Level;

use crate::error::ReframeError;

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    Quiet,
    Panic,
    Fatal,
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl FfmpegLogLevel {
    /// Parse a level name as accepted by `--log-level`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }

    /// The FFmpeg level matching a Rust-side log filter.
    pub fn from_log_filter(filter: log::LevelFilter) -> Self {
        match filter {
            log::LevelFilter::Off => FfmpegLogLevel::Quiet,
            log::LevelFilter::Error => FfmpegLogLevel::Error,
            log::LevelFilter::Warn => FfmpegLogLevel::Warning,
            log::LevelFilter::Info => FfmpegLogLevel::Error,
            log::LevelFilter::Debug => FfmpegLogLevel::Info,
            log::LevelFilter::Trace => FfmpegLogLevel::Debug,
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does **not** affect
/// Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise FFmpeg (safe to call multiple times).
pub(crate) fn initialize() -> Result<(), ReframeError> {
    ffmpeg_next::init().map_err(ReframeError::from)
}
