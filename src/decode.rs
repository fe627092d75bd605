//! Turning a channel bitstream into numbered still images.
//!
//! A [`FrameDecoder`] reads one sealed Annex-B bitstream and writes one image
//! per decoded frame into an output directory, named so that sorting the
//! names gives decode order. [`collect_images`] then lists them in that
//! order for the frame relinker.
//!
//! Two decoders are provided:
//!
//! - [`FfmpegDecoder`] decodes in-process through FFmpeg (feature `ffmpeg`,
//!   enabled by default).
//! - [`CommandDecoder`] runs an external executable and trusts its exit
//!   status.

use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{channel::VideoCodec, error::ReframeError};

/// Image file extensions recognised in a decoder's output directory.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Decodes a raw bitstream into a directory of numbered images.
///
/// Implementations must be [`Send`] and [`Sync`] because channels may be
/// decoded concurrently (feature `rayon`). Each call works on its own
/// bitstream and output directory.
pub trait FrameDecoder: Send + Sync {
    /// Decode `bitstream` into `output_directory`.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::DecoderFailed`] (or an FFmpeg/I/O error) if the
    /// bitstream could not be decoded. The restore treats this as a failure
    /// of the channel, not of the run.
    fn decode(
        &self,
        bitstream: &Path,
        codec: VideoCodec,
        output_directory: &Path,
    ) -> Result<(), ReframeError>;
}

/// List the images a decoder produced, in decode order.
///
/// Files are ordered by the number in their stem (`2.jpg` before
/// `10.jpg`); stems that are not numbers sort after numbered ones,
/// lexically.
pub fn collect_images(directory: &Path) -> Result<Vec<PathBuf>, ReframeError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(extension))
            });
        if is_image && path.is_file() {
            images.push(path);
        }
    }

    images.sort_by(|left, right| compare_decode_order(left, right));
    Ok(images)
}

fn compare_decode_order(left: &Path, right: &Path) -> Ordering {
    let sequence = |path: &Path| {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
    };

    match (sequence(left), sequence(right)) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| left.cmp(right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

/// Runs an external decoder executable.
///
/// Arguments are templates: `{input}` expands to the bitstream path,
/// `{output}` to the output directory and `{codec}` to `h264` or `h265`.
/// A non-zero exit status fails the channel.
///
/// # Example
///
/// ```
/// use reframe::CommandDecoder;
///
/// let decoder = CommandDecoder::parse(
///     "ffmpeg -loglevel error -i {input} -start_number 0 {output}/%06d.jpg",
/// )?;
/// assert_eq!(decoder.program(), "ffmpeg");
/// # Ok::<(), reframe::ReframeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    arguments: Vec<String>,
}

impl CommandDecoder {
    /// A decoder invoked as `program --input_video={input} --output_dir={output}`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arguments: vec![
                "--input_video={input}".to_string(),
                "--output_dir={output}".to_string(),
            ],
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::DecoderFailed`] if the command line is empty.
    pub fn parse(command_line: &str) -> Result<Self, ReframeError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| ReframeError::DecoderFailed {
            bitstream: PathBuf::new(),
            reason: "empty decoder command".to_string(),
        })?;

        Ok(Self {
            program,
            arguments: parts.collect(),
        })
    }

    /// Replace the argument templates.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one invocation, with placeholders expanded.
    pub fn expand_arguments(
        &self,
        bitstream: &Path,
        codec: VideoCodec,
        output_directory: &Path,
    ) -> Vec<String> {
        let input = bitstream.to_string_lossy();
        let output = output_directory.to_string_lossy();
        self.arguments
            .iter()
            .map(|argument| {
                argument
                    .replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{codec}", codec.file_extension())
            })
            .collect()
    }
}

impl FrameDecoder for CommandDecoder {
    fn decode(
        &self,
        bitstream: &Path,
        codec: VideoCodec,
        output_directory: &Path,
    ) -> Result<(), ReframeError> {
        let arguments = self.expand_arguments(bitstream, codec, output_directory);
        log::debug!("Running {} {}", self.program, arguments.join(" "));

        let status = Command::new(&self.program)
            .args(&arguments)
            .status()
            .map_err(|error| ReframeError::DecoderFailed {
                bitstream: bitstream.to_path_buf(),
                reason: format!("unable to run {}: {error}", self.program),
            })?;

        if !status.success() {
            return Err(ReframeError::DecoderFailed {
                bitstream: bitstream.to_path_buf(),
                reason: format!("{} exited with {status}", self.program),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg_decoder::FfmpegDecoder;

#[cfg(feature = "ffmpeg")]
mod ffmpeg_decoder {
    use std::path::{Path, PathBuf};

    use ffmpeg_next::{
        codec::context::Context as CodecContext,
        decoder::Video as VideoDecoder,
        format::Pixel,
        frame::Video as VideoFrame,
        media::Type,
        software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    };
    use image::{DynamicImage, RgbImage};

    use super::FrameDecoder;
    use crate::{
        channel::VideoCodec,
        error::ReframeError,
        still::{DEFAULT_JPEG_QUALITY, write_jpeg},
    };

    /// Decodes bitstreams in-process with FFmpeg and writes `000000.jpg`,
    /// `000001.jpg`, … in decode order.
    #[derive(Debug, Clone)]
    pub struct FfmpegDecoder {
        quality: u8,
    }

    impl FfmpegDecoder {
        pub fn new() -> Self {
            Self {
                quality: DEFAULT_JPEG_QUALITY,
            }
        }

        /// JPEG quality of the intermediate frame files.
        #[must_use]
        pub fn with_quality(mut self, quality: u8) -> Self {
            self.quality = quality.clamp(1, 100);
            self
        }
    }

    impl Default for FfmpegDecoder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FrameDecoder for FfmpegDecoder {
        fn decode(
            &self,
            bitstream: &Path,
            codec: VideoCodec,
            output_directory: &Path,
        ) -> Result<(), ReframeError> {
            crate::ffmpeg::initialize()?;
            log::debug!("Decoding {} ({codec}) with FFmpeg", bitstream.display());

            let mut input_context =
                ffmpeg_next::format::input(&bitstream).map_err(|error| {
                    ReframeError::DecoderFailed {
                        bitstream: bitstream.to_path_buf(),
                        reason: error.to_string(),
                    }
                })?;

            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or_else(|| ReframeError::DecoderFailed {
                    bitstream: bitstream.to_path_buf(),
                    reason: "no video stream in bitstream".to_string(),
                })?;
            let video_stream_index = stream.index();
            let decoder_context = CodecContext::from_parameters(stream.parameters())?;
            let mut decoder = decoder_context.decoder().video()?;

            let mut sink = FrameSink::new(output_directory, self.quality);
            for (stream, packet) in input_context.packets() {
                if stream.index() != video_stream_index {
                    continue;
                }
                decoder.send_packet(&packet)?;
                sink.drain(&mut decoder)?;
            }

            // Flush the decoder.
            decoder.send_eof()?;
            sink.drain(&mut decoder)?;

            log::debug!(
                "Decoded {} frames from {}",
                sink.written,
                bitstream.display()
            );
            Ok(())
        }
    }

    /// Geometry a scaler was built for.
    type Geometry = (Pixel, u32, u32);

    /// Receives decoded frames and writes them as numbered JPEG files.
    struct FrameSink {
        directory: PathBuf,
        quality: u8,
        scaler: Option<(Geometry, ScalingContext)>,
        decoded_frame: VideoFrame,
        rgb_frame: VideoFrame,
        written: u64,
    }

    impl FrameSink {
        fn new(directory: &Path, quality: u8) -> Self {
            Self {
                directory: directory.to_path_buf(),
                quality,
                scaler: None,
                decoded_frame: VideoFrame::empty(),
                rgb_frame: VideoFrame::empty(),
                written: 0,
            }
        }

        fn drain(&mut self, decoder: &mut VideoDecoder) -> Result<(), ReframeError> {
            while decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let width = self.decoded_frame.width();
                let height = self.decoded_frame.height();
                let geometry = (self.decoded_frame.format(), width, height);

                // Resolution changes mid-stream need a fresh scaler.
                let stale = self
                    .scaler
                    .as_ref()
                    .is_none_or(|(current, _)| *current != geometry);
                if stale {
                    let scaler = ScalingContext::get(
                        geometry.0,
                        width,
                        height,
                        Pixel::RGB24,
                        width,
                        height,
                        ScalingFlags::BILINEAR,
                    )?;
                    self.scaler = Some((geometry, scaler));
                }
                if let Some((_, scaler)) = self.scaler.as_mut() {
                    scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;
                }

                let buffer = frame_to_rgb_buffer(&self.rgb_frame, width, height);
                let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
                    ReframeError::FfmpegError(format!(
                        "frame buffer does not match {width}x{height}"
                    ))
                })?;

                let path = self.directory.join(format!("{:06}.jpg", self.written));
                write_jpeg(&DynamicImage::ImageRgb8(image), &path, self.quality)?;
                self.written += 1;
            }
            Ok(())
        }
    }

    /// Copy an RGB24 frame into a tightly-packed buffer, dropping row padding.
    fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
        let stride = video_frame.stride(0);
        let row_bytes = (width as usize) * 3;
        let data = video_frame.data(0);

        if stride == row_bytes {
            data[..row_bytes * (height as usize)].to_vec()
        } else {
            let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
            for row in 0..(height as usize) {
                let row_start = row * stride;
                buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
            }
            buffer
        }
    }
}
