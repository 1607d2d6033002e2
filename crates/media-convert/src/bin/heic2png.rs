use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use convert_core::{ConvertError, SourcePath};
use media_convert::{
    init_tracing,
    version::{long_version, short_version},
};

/// Convert HEIC images to PNG format
#[derive(Parser)]
#[command(version = short_version(), long_version = long_version())]
struct Args {
    /// Input HEIC file path
    input: PathBuf,

    /// Output PNG file path (defaults to the input path with a .png extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(output) => {
            println!(
                "Successfully converted {} to {}",
                args.input.display(),
                output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error converting file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<PathBuf, ConvertError> {
    let source = SourcePath::new(&args.input)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| source.destination("png"));

    heic_converter::convert_file(&source, &output)?;
    Ok(output)
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
    fn parses_output_flag() {
        let args = Args::try_parse_from(["heic2png", "IMG_0001.HEIC", "-o", "out.png"]).unwrap();
        assert_eq!(args.input, PathBuf::from("IMG_0001.HEIC"));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));

        let args = Args::try_parse_from(["heic2png", "IMG_0001.HEIC", "--output", "x.png"]).unwrap();
        assert_eq!(args.output, Some(PathBuf::from("x.png")));
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["heic2png"]).is_err());
    }

    #[test]
    fn missing_input_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.heic");
        let args = Args::try_parse_from([PathBuf::from("heic2png"), input.clone()]).unwrap();

        let err = run(&args).unwrap_err();

        assert!(matches!(err, ConvertError::InputNotFound(_)));
        assert!(err.to_string().contains("missing.heic"));
    }

    #[test]
    fn default_output_replaces_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.bmp");
        image::RgbImage::new(4, 4).save(&input).unwrap();
        let args = Args::try_parse_from([PathBuf::from("heic2png"), input.clone()]).unwrap();

        let output = run(&args).unwrap();

        assert_eq!(output, dir.path().join("photo.png"));
        assert!(output.exists());
    }
}
