//! External decoder integration tests.
//!
//! The process tests rely on a POSIX shell and are skipped elsewhere.

use std::path::Path;

use reframe::{CommandDecoder, FrameDecoder, ReframeError, VideoCodec};

#[test]
fn default_arguments_expand_placeholders() {
    let decoder = CommandDecoder::new("video2jpg");
    let arguments = decoder.expand_arguments(
        Path::new("/work/videos/front.h265"),
        VideoCodec::H265,
        Path::new("/work/videos/front.h265_images"),
    );
    assert_eq!(
        arguments,
        [
            "--input_video=/work/videos/front.h265",
            "--output_dir=/work/videos/front.h265_images",
        ]
    );
}

#[test]
fn parsed_command_expands_codec() {
    let decoder = CommandDecoder::parse("decode --codec {codec} {input} {output}")
        .expect("Failed to parse command");
    assert_eq!(decoder.program(), "decode");

    let arguments =
        decoder.expand_arguments(Path::new("in.h264"), VideoCodec::H264, Path::new("out"));
    assert_eq!(arguments, ["--codec", "h264", "in.h264", "out"]);
}

#[test]
fn empty_command_is_rejected() {
    assert!(matches!(
        CommandDecoder::parse("  \t "),
        Err(ReframeError::DecoderFailed { .. })
    ));
}

#[cfg(unix)]
#[test]
fn successful_command_writes_frames() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let bitstream = directory.path().join("front.h264");
    let output = directory.path().join("frames");
    std::fs::write(&bitstream, [0, 0, 0, 1, 0x67]).expect("Failed to write bitstream");
    std::fs::create_dir_all(&output).expect("Failed to create output dir");

    let decoder = CommandDecoder::new("sh").with_arguments([
        "-c",
        "cp \"$0\" \"$1/0.jpg\" && cp \"$0\" \"$1/1.jpg\"",
        "{input}",
        "{output}",
    ]);
    decoder
        .decode(&bitstream, VideoCodec::H264, &output)
        .expect("Decoder should succeed");

    let images = reframe::collect_images(&output).expect("Failed to collect images");
    assert_eq!(images.len(), 2);
}

#[cfg(unix)]
#[test]
fn non_zero_exit_fails_the_channel() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let decoder = CommandDecoder::new("sh").with_arguments(["-c", "exit 3"]);

    let result = decoder.decode(
        &directory.path().join("front.h264"),
        VideoCodec::H264,
        directory.path(),
    );
    match result {
        Err(ReframeError::DecoderFailed { bitstream, reason }) => {
            assert!(bitstream.ends_with("front.h264"));
            assert!(reason.contains("sh exited"), "{reason}");
        }
        other => panic!("Expected DecoderFailed, got {other:?}"),
    }
}

#[test]
fn missing_program_fails_the_channel() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let decoder = CommandDecoder::new("reframe-decoder-that-does-not-exist");

    let result = decoder.decode(
        &directory.path().join("front.h265"),
        VideoCodec::H265,
        directory.path(),
    );
    assert!(matches!(result, Err(ReframeError::DecoderFailed { .. })));
}

#[cfg(feature = "ffmpeg")]
#[test]
fn ffmpeg_decoder_reports_unreadable_bitstream() {
    use reframe::FfmpegDecoder;

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let result = FfmpegDecoder::new().decode(
        &directory.path().join("missing.h264"),
        VideoCodec::H264,
        directory.path(),
    );
    assert!(matches!(result, Err(ReframeError::DecoderFailed { .. })));
}
