use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use convert_core::{ConvertError, SourcePath};
use gif_converter::{
    EncoderKind, FfmpegVersionProbe, GifOptions, GifPipeline, GifReport, HwAccelPolicy, open_video,
};
use media_convert::{
    config::{Config, load_config, write_default_config},
    init_tracing,
    version::{long_version, short_version},
};
use tracing::info;

/// Convert MP4 video to GIF
#[derive(Parser)]
#[command(version = short_version(), long_version = long_version())]
struct Args {
    /// Input MP4 file path
    #[arg(required_unless_present = "init")]
    input: Option<PathBuf>,

    /// Output GIF file path (defaults to the input path with a .gif extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frames per second for output GIF [default: 10]
    #[arg(short, long)]
    fps: Option<u32>,

    /// Resize factor [default: 1.0, no resize]
    #[arg(short, long)]
    resize: Option<f64>,

    /// Hardware acceleration hints: vendor, nvidia-compat or off [default: vendor]
    #[arg(long)]
    hwaccel: Option<HwAccelPolicy>,

    /// GIF encoder: ffmpeg or native [default: ffmpeg]
    #[arg(long)]
    encoder: Option<EncoderKind>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default configuration to --config and exit
    #[arg(long, requires = "config")]
    init: bool,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// コマンドライン引数が設定ファイルより優先される。
    fn options(&self, config: &Config) -> GifOptions {
        GifOptions {
            fps: self.fps.unwrap_or(config.gif.fps),
            resize: self.resize.unwrap_or(config.gif.resize),
            hwaccel: self.hwaccel.unwrap_or(config.gif.hwaccel),
        }
    }

    fn encoder(&self, config: &Config) -> EncoderKind {
        self.encoder.unwrap_or(config.gif.encoder)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    // --init は clap 側で --config を必須にしている
    if args.init
        && let Some(path) = args.config.as_deref()
    {
        return match write_default_config(path) {
            Ok(()) => {
                info!(path = ?path, "Created default configuration");
                println!("Created default configuration: {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &config) {
        Ok((output, report)) => {
            if let Some(hints) = &report.hints {
                println!("Used {} hardware acceleration hints", hints.vendor);
            }
            println!("Successfully created GIF: {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error converting video: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &Config) -> Result<(PathBuf, GifReport), ConvertError> {
    let input = args
        .input
        .as_deref()
        .ok_or_else(|| ConvertError::InvalidArgument("no input file given".to_string()))?;
    let source = SourcePath::new(input)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| source.destination("gif"));

    let options = args.options(config);
    options.validate()?;

    let report = convert(&source, &output, &options, args.encoder(config), config)?;
    Ok((output, report))
}

fn convert(
    source: &SourcePath,
    output: &Path,
    options: &GifOptions,
    encoder: EncoderKind,
    config: &Config,
) -> Result<GifReport, ConvertError> {
    let tools = config.ffmpeg.tools();
    let pipeline = GifPipeline::new(
        Box::new(FfmpegVersionProbe::new(&tools.ffmpeg)),
        encoder.writer(&tools.ffmpeg, config.gif.speed),
    );

    println!("Converting {} to GIF...", source.as_path().display());
    let frames = open_video(source, &tools)?;
    pipeline.run(frames, output, options)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_come_from_config() {
        let args = Args::try_parse_from(["mp42gif", "clip.mp4"]).unwrap();

        assert_eq!(args.options(&Config::default()), GifOptions::default());
        assert_eq!(args.encoder(&Config::default()), EncoderKind::Ffmpeg);

        let mut config = Config::default();
        config.gif.fps = 24;
        config.gif.hwaccel = HwAccelPolicy::Off;
        let options = args.options(&config);
        assert_eq!(options.fps, 24);
        assert_eq!(options.hwaccel, HwAccelPolicy::Off);
    }

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "mp42gif",
            "clip.mp4",
            "-o",
            "out.gif",
            "-f",
            "5",
            "-r",
            "0.5",
            "--hwaccel",
            "nvidia-compat",
            "--encoder",
            "native",
        ])
        .unwrap();
        let mut config = Config::default();
        config.gif.fps = 24;

        let options = args.options(&config);

        assert_eq!(args.output, Some(PathBuf::from("out.gif")));
        assert_eq!(options.fps, 5);
        assert_eq!(options.resize, 0.5);
        assert_eq!(options.hwaccel, HwAccelPolicy::NvidiaCompat);
        assert_eq!(args.encoder(&config), EncoderKind::Native);
    }

    #[test]
    fn rejects_negative_fps_and_unknown_policy() {
        assert!(Args::try_parse_from(["mp42gif", "clip.mp4", "-f", "-3"]).is_err());
        assert!(Args::try_parse_from(["mp42gif", "clip.mp4", "--hwaccel", "cuda"]).is_err());
    }

    #[test]
    fn init_requires_config_but_not_input() {
        assert!(Args::try_parse_from(["mp42gif", "--init"]).is_err());
        assert!(Args::try_parse_from(["mp42gif", "--init", "--config", "mp42gif.toml"]).is_ok());
        assert!(Args::try_parse_from(["mp42gif"]).is_err());
    }

    #[test]
    fn missing_input_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.mp4");
        let args = Args::try_parse_from([PathBuf::from("mp42gif"), input.clone()]).unwrap();

        let err = run(&args, &Config::default()).unwrap_err();

        assert!(matches!(err, ConvertError::InputNotFound(ref p) if p == &input));
        assert!(err.to_string().contains("missing.mp4"));
    }

    #[test]
    fn zero_fps_is_rejected_before_decoding() {
        let input = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        let args = Args::try_parse_from([
            PathBuf::from("mp42gif"),
            input.path().to_path_buf(),
            PathBuf::from("--fps"),
            PathBuf::from("0"),
        ])
        .unwrap();

        let err = run(&args, &Config::default()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidArgument(_)));
    }
}
