//! text-ocr - Text detection and recognition runner
//!
//! Finds text regions in an image, reads them, prints one report block per
//! region and writes a copy of the image with the regions outlined.

mod app;
mod codec;
mod config;
mod error;
mod overlay;
mod pipeline;
mod runtime;
mod vision;

use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::Overrides;
use crate::error::OcrError;
use crate::pipeline::RunRequest;

/// text-ocr - Run a text detector and recognizer over one image
#[derive(Parser, Debug)]
#[command(name = "text-ocr", version)]
#[command(about = "Detects and recognizes text in an image and writes an annotated copy")]
struct Args {
    /// Execution device: cpu, cuda[:N], tensorrt[:N], coreml, directml[:N]
    device_name: String,

    /// Text detection model (.onnx file or model directory)
    det_model_path: PathBuf,

    /// Text recognition model (.onnx file or model directory)
    reg_model_path: PathBuf,

    /// Input image
    image_path: PathBuf,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of discarded warm-up passes
    #[arg(long)]
    warmup: Option<u32>,

    /// Annotated image destination
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Profiler sink destination
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Do not attach a profiler
    #[arg(long)]
    no_profile: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn request(&self) -> RunRequest {
        RunRequest {
            device: self.device_name.clone(),
            detector_model: self.det_model_path.clone(),
            recognizer_model: self.reg_model_path.clone(),
            image: self.image_path.clone(),
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            warmup_iterations: self.warmup,
            output_path: self.output.clone(),
            profile_path: self.profile.clone(),
            no_profile: self.no_profile,
        }
    }
}

/// Why argument parsing stopped short of a run
#[derive(Debug)]
enum CliExit {
    /// `--help` or `--version` text for stdout
    Info(String),
    Usage(OcrError),
}

fn parse_args<I, T>(argv: I) -> Result<Args, CliExit>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => CliExit::Info(e.render().to_string()),
        _ => CliExit::Usage(OcrError::Usage(e.render().to_string())),
    })
}

/// Print a fatal error with its source chain and return its exit code
///
/// Written directly so the message survives any log filter.
fn report_failure<W: Write>(err: OcrError, out: &mut W) -> u8 {
    let code = err.exit_code();
    let message = format!("{:#}", anyhow::Error::from(err));
    let _ = writeln!(out, "{}", message.trim_end());
    code
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(CliExit::Info(text)) => {
            print!("{}", text);
            return ExitCode::SUCCESS;
        }
        Err(CliExit::Usage(err)) => {
            return ExitCode::from(report_failure(err, &mut std::io::stderr()));
        }
    };

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report_failure(err, &mut std::io::stderr())),
    }
}

fn run(args: &Args) -> Result<(), OcrError> {
    let mut config = app::resolve_config(args.config.as_deref())?;
    args.overrides().apply(&mut config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let written = app::run(&args.request(), &config, &mut out)?;
    out.flush().map_err(OcrError::Report)?;

    info!("Done, wrote {:?}", written);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_positional_arguments() {
        let args = parse_args(["text-ocr", "cpu", "det", "rec", "demo.jpg"]).unwrap();

        let request = args.request();
        assert_eq!(request.device, "cpu");
        assert_eq!(request.detector_model, PathBuf::from("det"));
        assert_eq!(request.recognizer_model, PathBuf::from("rec"));
        assert_eq!(request.image, PathBuf::from("demo.jpg"));

        let overrides = args.overrides();
        assert!(overrides.warmup_iterations.is_none());
        assert!(!overrides.no_profile);
    }

    fn usage_error(argv: &[&str]) -> OcrError {
        match parse_args(argv) {
            Err(CliExit::Usage(err)) => err,
            other => panic!("expected a usage error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_positional_count_is_usage_error() {
        for argv in [
            &["text-ocr"][..],
            &["text-ocr", "cpu", "det", "rec"][..],
            &["text-ocr", "cpu", "det", "rec", "a.jpg", "b.jpg"][..],
        ] {
            let err = usage_error(argv);
            assert_eq!(err.exit_code(), 1);

            let mut stderr = Vec::new();
            assert_eq!(report_failure(err, &mut stderr), 1);
            assert!(String::from_utf8(stderr).unwrap().contains("Usage:"));
        }
    }

    #[test]
    fn test_help_and_version_exit_cleanly() {
        match parse_args(["text-ocr", "--help"]) {
            Err(CliExit::Info(text)) => assert!(text.contains("Usage:")),
            other => panic!("expected help text, got {:?}", other),
        }
        assert!(matches!(
            parse_args(["text-ocr", "--version"]),
            Err(CliExit::Info(_))
        ));
    }

    #[test]
    fn test_fatal_error_is_printed_with_source() {
        let err = OcrError::ImageLoad {
            path: PathBuf::from("/nonexistent.png"),
            source: Some("No such file or directory".into()),
        };

        let mut stderr = Vec::new();
        let code = report_failure(err, &mut stderr);

        assert_eq!(code, 1);
        assert_eq!(
            String::from_utf8(stderr).unwrap(),
            "failed to load image: /nonexistent.png: No such file or directory\n"
        );
    }

    #[test]
    fn test_optional_flags() {
        let args = Args::try_parse_from([
            "text-ocr",
            "cuda:1",
            "det.onnx",
            "rec.onnx",
            "demo.jpg",
            "--warmup",
            "3",
            "-o",
            "out.png",
            "--no-profile",
            "-v",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.warmup_iterations, Some(3));
        assert_eq!(overrides.output_path, Some(PathBuf::from("out.png")));
        assert!(overrides.no_profile);
        assert!(args.verbose);
    }
}
