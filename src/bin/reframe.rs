use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reframe::{
    ChannelMap, ChannelStatus, CommandDecoder, FrameDecoder, ProgressCallback, ProgressInfo,
    RecordReader, RestoreOptions, RestoreReport, Restorer, default_destination,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  reframe restore drive.record\n  reframe restore drive.record --to restored.record --channels cameras.json --progress\n  reframe restore drive.record --decoder-command \"video2jpg --input_video={input} --output_dir={output}\"\n  reframe channels drive.record --json\n  reframe completions zsh > _reframe";

#[derive(Debug, Parser)]
#[command(
    name = "reframe",
    version,
    about = "Restore logs by replacing compressed video channels with still images",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress spinner.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting an existing destination log.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DecoderChoice {
    /// Decode in-process with FFmpeg.
    Ffmpeg,
    /// Run an external decoder executable.
    Command,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Restore a log, writing a new log with image channels.
    #[command(
        about = "Restore video channels as still images",
        after_help = "Examples:\n  reframe restore drive.record\n  reframe restore drive.record --to out.record --quality 90 --json"
    )]
    Restore {
        /// Source log to restore.
        source: PathBuf,
        /// Restored log (defaults to <SOURCE>_restored).
        #[arg(long)]
        to: Option<PathBuf>,
        /// Work directory; bitstreams and frames go in its reframe-scratch/ subdirectory.
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// JSON file listing video channels ([{"topic", "label", "codec"}]).
        #[arg(long)]
        channels: Option<PathBuf>,
        /// Decoder implementation.
        #[arg(long, value_enum)]
        decoder: Option<DecoderChoice>,
        /// External decoder command line; `{input}`, `{output}` and `{codec}` are expanded.
        #[arg(long)]
        decoder_command: Option<String>,
        /// JPEG quality of restored images (1-100).
        #[arg(long, default_value_t = 95)]
        quality: u8,
        /// Keep the scratch directory after the run.
        #[arg(long)]
        keep_work_dir: bool,
        /// Print the restore report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the configured video channels and message counts in a log.
    #[command(about = "Show video channels in a log")]
    Channels {
        /// Log to inspect.
        source: PathBuf,
        /// JSON file listing video channels.
        #[arg(long)]
        channels: Option<PathBuf>,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    #[cfg(feature = "ffmpeg")]
    {
        let level = match &global.log_level {
            Some(level) => reframe::FfmpegLogLevel::parse(level)
                .ok_or(format!("unsupported --log-level: {level}"))?,
            None => reframe::FfmpegLogLevel::from_log_filter(log::max_level()),
        };
        reframe::set_ffmpeg_log_level(level);
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        if global.log_level.is_some() {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                "--log-level requires building with the `ffmpeg` feature".yellow()
            );
        }
    }

    Ok(())
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn load_channels(path: Option<&Path>) -> Result<ChannelMap, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ChannelMap::from_json_file(path)?),
        None => Ok(ChannelMap::default()),
    }
}

fn build_decoder(
    choice: Option<DecoderChoice>,
    command: Option<&str>,
) -> Result<Option<Arc<dyn FrameDecoder>>, Box<dyn std::error::Error>> {
    let choice = match (choice, command) {
        (Some(choice), _) => choice,
        (None, Some(_)) => DecoderChoice::Command,
        (None, None) => DecoderChoice::Ffmpeg,
    };

    match choice {
        DecoderChoice::Command => {
            let decoder = match command {
                Some(command) => CommandDecoder::parse(command)?,
                None => CommandDecoder::new("video2jpg"),
            };
            Ok(Some(Arc::new(decoder)))
        }
        DecoderChoice::Ffmpeg if command.is_some() => {
            Err("--decoder-command cannot be combined with --decoder ffmpeg".into())
        }
        #[cfg(feature = "ffmpeg")]
        DecoderChoice::Ffmpeg => Ok(None),
        #[cfg(not(feature = "ffmpeg"))]
        DecoderChoice::Ffmpeg => {
            Err("the ffmpeg decoder requires building with the `ffmpeg` feature".into())
        }
    }
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let message = match info.total {
            Some(total) => format!("{:?} {}/{}", info.operation, info.current, total),
            None => format!("{:?} {} messages", info.operation, info.current),
        };
        self.bar.set_message(message);
    }
}

fn print_report(report: &RestoreReport) {
    for channel in &report.channels {
        let status = match &channel.status {
            ChannelStatus::Restored { images } => format!("restored {images} images").green(),
            ChannelStatus::NoKeyframe => "no keyframe".yellow(),
            ChannelStatus::DecodeFailed { reason } => format!("decode failed: {reason}").red(),
            ChannelStatus::Mismatch { expected, actual } => {
                format!("mismatch: {expected} chunks, {actual} frames").red()
            }
            ChannelStatus::RelinkFailed { reason } => format!("relink failed: {reason}").red(),
        };
        println!(
            "{} {} ({} admitted, {} before keyframe)",
            channel.topic.bold(),
            status,
            channel.admitted,
            channel.dropped_before_keyframe
        );
    }
    println!(
        "{} {} ({} copied, {} substituted, {} skipped)",
        "saved".green().bold(),
        report.destination.display(),
        report.rewrite.copied,
        report.rewrite.substituted,
        report.rewrite.skipped
    );
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Restore {
            source,
            to,
            work_dir,
            channels,
            decoder,
            decoder_command,
            quality,
            keep_work_dir,
            json,
        } => {
            if !source.is_file() {
                return Err(format!(
                    "please provide a valid source log: {} does not exist",
                    source.display()
                )
                .into());
            }
            let destination = match to {
                Some(destination) => destination,
                None => {
                    let destination = default_destination(&source);
                    log::warn!(
                        "The default restored log is set as {}",
                        destination.display()
                    );
                    destination
                }
            };
            ensure_writable_path(&destination, cli.global.overwrite)?;

            let mut options = RestoreOptions::new()
                .with_jpeg_quality(quality)
                .keep_work_directory(keep_work_dir);
            if let Some(work_dir) = work_dir {
                options = options.with_work_directory(work_dir);
            }
            if let Some(decoder) = build_decoder(decoder, decoder_command.as_deref())? {
                options = options.with_decoder(decoder);
            }
            let progress = cli.global.progress.then(|| Arc::new(TerminalProgress::new()));
            if let Some(progress) = &progress {
                options = options.with_progress(progress.clone());
            }

            let report = Restorer::new(&source)?
                .with_destination(&destination)
                .with_channels(load_channels(channels.as_deref())?)
                .with_options(options)
                .run();
            if let Some(progress) = &progress {
                progress.finish();
            }
            let report = report?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Channels {
            source,
            channels,
            json,
        } => {
            let channel_map = load_channels(channels.as_deref())?;
            let reader = RecordReader::open(&source)?;

            let mut counts: BTreeMap<String, (u64, Option<String>)> = BTreeMap::new();
            for message in reader.messages()? {
                let message = message?;
                let entry = counts
                    .entry(message.topic().to_string())
                    .or_insert_with(|| (0, message.type_name().map(str::to_string)));
                entry.0 += 1;
            }

            if json {
                let payload: Vec<_> = counts
                    .iter()
                    .map(|(topic, (count, type_name))| {
                        let video = channel_map.get(topic);
                        json!({
                            "topic": topic,
                            "messages": count,
                            "type": type_name,
                            "video": video.is_some(),
                            "codec": video.map(|channel| channel.codec.file_extension()),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (topic, (count, type_name)) in &counts {
                    let type_name = type_name.as_deref().unwrap_or("<no schema>");
                    match channel_map.get(topic) {
                        Some(channel) => println!(
                            "{} {topic} ({type_name}, {count} messages, {})",
                            "video".cyan().bold(),
                            channel.codec
                        ),
                        None => println!("      {topic} ({type_name}, {count} messages)"),
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "reframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, DecoderChoice, build_decoder};
    use clap::Parser;

    #[test]
    fn parse_restore_defaults() {
        let cli = Cli::try_parse_from(["reframe", "restore", "drive.record"]).unwrap();
        match cli.command {
            Commands::Restore {
                source,
                to,
                quality,
                decoder,
                ..
            } => {
                assert_eq!(source.to_str(), Some("drive.record"));
                assert!(to.is_none());
                assert_eq!(quality, 95);
                assert!(decoder.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["reframe", "restore", "in.mcap", "--verbose", "--overwrite"])
                .unwrap();
        assert!(cli.global.verbose);
        assert!(cli.global.overwrite);
    }

    #[test]
    fn decoder_command_implies_command_decoder() {
        let decoder = build_decoder(None, Some("video2jpg --input_video={input}")).unwrap();
        assert!(decoder.is_some());
    }

    #[test]
    fn decoder_command_conflicts_with_ffmpeg() {
        assert!(build_decoder(Some(DecoderChoice::Ffmpeg), Some("video2jpg")).is_err());
    }

    #[test]
    fn empty_decoder_command_is_rejected() {
        assert!(build_decoder(Some(DecoderChoice::Command), Some("   ")).is_err());
    }
}
