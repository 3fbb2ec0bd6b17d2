use std::{
    fs::File,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rtmv::{
    ByteOrder, DumpOption, ExportOptions, FeedEvent, FeedObserver, FeederConfig, LoadOptions,
    ParseOptions, Player, PlayerConfig, ProgressCallback, ProgressInfo, RtmvFile, WriterStage,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  rtmv brief flight.rtmv\n  rtmv sections flight.rtmv --json\n  rtmv header flight.rtmv 0-10\n  rtmv dump flight.rtmv -o flight.h264 --option payload_vid\n  rtmv feed flight.rtmv --section 0 --progress\n  rtmv completions zsh > _rtmv";

#[derive(Debug, Parser)]
#[command(
    name = "rtmv",
    version,
    about = "Inspect, stream and export RTMV drone recordings",
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
    /// Show additional output on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// Reject inputs larger than this many bytes (default 2 GiB).
    #[arg(long, global = true)]
    max_size: Option<u64>,

    /// Header fields are little-endian (signature "EVaP").
    #[arg(long, global = true)]
    little_endian: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print a summary of a recording (alias: info).
    #[command(
        about = "Summarise a recording",
        visible_alias = "info",
        after_help = "Examples:\n  rtmv brief flight.rtmv\n  rtmv brief flight.rtmv --json"
    )]
    Brief {
        /// Input RTMV file.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// List payload sections and their probed metadata.
    #[command(about = "List payload sections")]
    Sections {
        /// Input RTMV file.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print package headers.
    #[command(
        about = "Print package headers",
        after_help = "Examples:\n  rtmv header flight.rtmv 100\n  rtmv header flight.rtmv 0-10\n  rtmv header flight.rtmv 0,1,5"
    )]
    Header {
        /// Input RTMV file.
        input: PathBuf,
        /// Package index, inclusive range `a-b`, or list `a,b,c`.
        selection: String,
    },

    /// Export packages, payloads, headers or the flight route.
    #[command(
        about = "Export data from a recording",
        after_help = "Options: payload, header, pkg_all, pkg_vid, pkg_pic, payload_vid, payload_pic, route\n\nExamples:\n  rtmv dump flight.rtmv -o video.rtmv --option pkg_vid\n  rtmv dump flight.rtmv -o flight.h264 --option payload_vid\n  rtmv dump flight.rtmv -o images --option payload_pic\n  rtmv dump flight.rtmv -o headers.csv --option header -p 0-1000"
    )]
    Dump {
        /// Input RTMV file.
        input: PathBuf,
        /// Output file, or directory for `payload_pic`.
        #[arg(short, long)]
        out: PathBuf,
        /// What to export.
        #[arg(long, default_value = "payload")]
        option: DumpOption,
        /// Inclusive package range `a-b`; all packages when omitted.
        #[arg(short = 'p', long)]
        packages: Option<String>,
    },

    /// Check a recording for damage.
    #[command(about = "Validate a recording")]
    Validate {
        /// Input RTMV file.
        input: PathBuf,
    },

    /// Serve payloads over a local TCP endpoint for an external decoder.
    #[command(
        about = "Stream payloads to an external decoder",
        after_help = "Examples:\n  rtmv feed flight.rtmv --section 0\n  rtmv feed flight.rtmv --packages 100-200 --port 16000\n\nConnect with e.g. `ffplay -f h264 tcp://127.0.0.1:15000`."
    )]
    Feed {
        /// Input RTMV file.
        input: PathBuf,
        /// Section index to stream.
        #[arg(long, conflicts_with = "packages")]
        section: Option<usize>,
        /// Inclusive package range `a-b` to stream.
        #[arg(long)]
        packages: Option<String>,
        /// First port to try (0 for any free port).
        #[arg(long, default_value_t = 15000)]
        port: u16,
        /// Seconds to wait for the decoder to connect.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Play a section through the player into a file.
    #[command(about = "Play a section into a file")]
    Play {
        /// Input RTMV file.
        input: PathBuf,
        /// Section index to play.
        #[arg(long, default_value_t = 0)]
        section: usize,
        /// Output file receiving the stream.
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Parse an inclusive `a-b` range.
fn parse_range(value: &str) -> Result<RangeInclusive<usize>, String> {
    let (start, end) = value
        .split_once('-')
        .ok_or(format!("expected a range like 0-10, got '{value}'"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid range start in '{value}'"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid range end in '{value}'"))?;
    if start > end {
        return Err(format!("range start must not exceed end: '{value}'"));
    }
    Ok(start..=end)
}

/// Parse `100`, `0-10` (inclusive) or `0,1,5`.
fn parse_selection(value: &str) -> Result<Vec<usize>, String> {
    if value.contains('-') {
        return Ok(parse_range(value)?.collect());
    }
    value
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid package index '{item}'"))
        })
        .collect()
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

fn load_options(global: &GlobalOptions, probe: bool) -> LoadOptions {
    let mut parse = ParseOptions::new();
    if let Some(max_size) = global.max_size {
        parse = parse.with_max_size(max_size);
    }
    if global.little_endian {
        parse = parse.with_byte_order(ByteOrder::Little);
    }
    let options = LoadOptions::new().with_parse(parse);
    if probe {
        options
    } else {
        options.without_demuxer().with_probe_images(false)
    }
}

fn load(
    input: &Path,
    global: &GlobalOptions,
    probe: bool,
) -> Result<RtmvFile, Box<dyn std::error::Error>> {
    let file = RtmvFile::load(input, &load_options(global, probe))?;
    if global.verbose {
        for segment in file.container().table().corrupt_segments() {
            eprintln!(
                "{} skipped candidate at offset {}: {}",
                "warning:".yellow().bold(),
                segment.offset,
                segment.reason
            );
        }
    }
    Ok(file)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "ffmpeg")]
    if let Some(level) = &global.log_level {
        let parsed: rtmv::FfmpegLogLevel = level.parse()?;
        rtmv::set_ffmpeg_log_level(parsed);
    }

    #[cfg(not(feature = "ffmpeg"))]
    if global.log_level.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--log-level requires building with the `ffmpeg` feature".yellow()
        );
    }

    Ok(())
}

fn progress_bar(total: u64) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} packages {msg}",
    )?;
    bar.set_style(style.progress_chars("##-"));
    Ok(bar)
}

/// Drives an indicatif bar from library progress callbacks.
struct BarProgress(ProgressBar);

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.set_position(info.current);
        self.0.set_message(format!("{} bytes", info.bytes));
    }
}

/// Prints feeder events to stderr.
struct ConsoleObserver;

impl FeedObserver for ConsoleObserver {
    fn on_event(&self, event: &FeedEvent) {
        match event {
            FeedEvent::Connected { peer } => {
                eprintln!("{} {peer}", "connected:".cyan().bold())
            }
            FeedEvent::Finished(outcome) => {
                eprintln!("{} {outcome:?}", "finished:".cyan().bold())
            }
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Brief { input, json } => {
            let file = load(&input, &cli.global, false)?;
            if json {
                let payload = json!({
                    "file": input.display().to_string(),
                    "size": file.file_size(),
                    "sync_positions": file.sync_positions(),
                    "packages": file.package_count(),
                    "video_packages": file.video_count(),
                    "image_packages": file.image_count(),
                    "sections": file.sections().len(),
                    "start_time": file.start_time(),
                    "duration_seconds": file.duration(),
                    "center_position": file.center_position().map(|(lat, long, alt)| json!({
                        "lat": lat,
                        "long": long,
                        "alt": alt,
                    })),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {} ({} bytes)", input.display(), file.file_size());
                println!(
                    "Sync: {} times at offsets {:?}",
                    file.sync_positions().len(),
                    file.sync_positions()
                );
                println!(
                    "Packages: {} ({} video, {} image)",
                    file.package_count(),
                    file.video_count(),
                    file.image_count()
                );
                if let Some(start) = file.start_time() {
                    println!("Start time: {start:.3}");
                }
                println!("Duration: {:.3}s", file.duration());
                if let Some((lat, long, alt)) = file.center_position() {
                    println!("Acquired around: ({lat}, {long}, {alt})");
                }
                if file.package_count() == 0 {
                    println!("{}", "no packages found".yellow().bold());
                }
            }
        }
        Commands::Sections { input, json } => {
            let file = load(&input, &cli.global, true)?;
            if json {
                let payload: Vec<_> = file
                    .sections()
                    .iter()
                    .map(|section| {
                        json!({
                            "start": section.start_index,
                            "end": section.end_index,
                            "kind": section.kind.to_string(),
                            "duration_seconds": section.duration_seconds,
                            "metadata": section.metadata,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (index, section) in file.sections().iter().enumerate() {
                    println!(
                        "#{index} {} {}..={} ({} packages, {:.3}s)",
                        section.kind,
                        section.start_index,
                        section.end_index,
                        section.len(),
                        section.duration_seconds
                    );
                    if let Some(metadata) = &section.metadata {
                        for (key, value) in metadata {
                            println!("    {key}: {value}");
                        }
                    }
                }
            }
        }
        Commands::Header { input, selection } => {
            let file = load(&input, &cli.global, false)?;
            for index in parse_selection(&selection)? {
                let header = file.header(index)?;
                println!("{}", format!("Header of package {index}:").bold());
                for (name, value) in header.field_values() {
                    println!("  {:<16}{value}", format!("{name}:"));
                }
            }
        }
        Commands::Dump {
            input,
            out,
            option,
            packages,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let range = packages.as_deref().map(parse_range).transpose()?;
            let file = load(&input, &cli.global, false)?;

            let mut options = ExportOptions::new();
            let bar = if cli.global.progress {
                let total = range
                    .as_ref()
                    .map_or(file.package_count(), |range| range.clone().count());
                let bar = progress_bar(total as u64)?;
                options = options.with_progress(Arc::new(BarProgress(bar.clone())));
                Some(bar)
            } else {
                None
            };

            let report = rtmv::dump(&file, &out, option, range, &options)?;
            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Dumped {} package(s), {} bytes to {}",
                    report.packages_written,
                    report.bytes_written,
                    out.display()
                )
                .green()
            );
        }
        Commands::Validate { input } => {
            let file = load(&input, &cli.global, false)?;
            let report = file.validate();
            print!("{report}");
        }
        Commands::Feed {
            input,
            section,
            packages,
            port,
            timeout,
        } => {
            let file = load(&input, &cli.global, false)?;
            let (start, end) = match (section, packages) {
                (_, Some(packages)) => {
                    let range = parse_range(&packages)?;
                    (*range.start(), *range.end())
                }
                (section, None) => {
                    let index = section.unwrap_or(0);
                    let section = file
                        .sections()
                        .get(index)
                        .ok_or(format!("no section {index}"))?;
                    (section.start_index, section.end_index)
                }
            };

            let accept_timeout = Duration::from_secs(timeout);
            let mut config = FeederConfig::new()
                .with_base_port(port)
                .with_accept_timeout(accept_timeout);
            if cli.global.verbose {
                config = config.with_observer(Arc::new(ConsoleObserver));
            }
            let bar = if cli.global.progress {
                let bar = progress_bar((end - start + 1) as u64)?;
                config = config.with_progress(Arc::new(BarProgress(bar.clone())));
                Some(bar)
            } else {
                None
            };

            let mut feeder = file.feeder(start, end, config)?;
            let addr = feeder.start()?;
            println!(
                "{} packages {start}..={end} on tcp://{addr}",
                "serving".cyan().bold()
            );

            let outcome = feeder.wait().ok_or("feeder did not run")?;
            if let Some(bar) = &bar {
                bar.finish_with_message("done");
            }
            let outcome = outcome.into_result(accept_timeout)?;
            if outcome.is_completed() {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Sent {} package(s), {} bytes",
                        outcome.packages_sent(),
                        outcome.bytes_sent()
                    )
                    .green()
                );
            } else {
                return Err(format!("feed ended early: {outcome:?}").into());
            }
        }
        Commands::Play {
            input,
            section,
            out,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let file = load(&input, &cli.global, false)?;
            let section = file
                .sections()
                .get(section)
                .ok_or(format!("no section {section}"))?
                .clone();

            let config = PlayerConfig::new().with_feeder(FeederConfig::new().with_base_port(0));
            let mut player = Player::new(WriterStage::new(File::create(&out)?), config);
            player.play(file.container(), &section)?;
            player.wait()?;

            let written = player.stage().map_or(0, WriterStage::bytes);
            println!(
                "{} {}",
                "saved".green().bold(),
                format!("{} ({written} bytes)", out.display())
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "rtmv", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_range, parse_selection};

    #[test]
    fn parse_range_forms() {
        assert_eq!(parse_range("0-10").unwrap(), 0..=10);
        assert_eq!(parse_range(" 5 - 9 ").unwrap(), 5..=9);
        assert!(parse_range("9-5").is_err());
        assert!(parse_range("12").is_err());
    }

    #[test]
    fn parse_selection_forms() {
        assert_eq!(parse_selection("100").unwrap(), vec![100]);
        assert_eq!(parse_selection("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_selection("0,1,5").unwrap(), vec![0, 1, 5]);
        assert!(parse_selection("a,b").is_err());
    }
}
