use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use movie_generator::{
    config::Config,
    generation::{MovieGenerator, MovieSettings},
    video::{CodecKind, ContainerKind, FitPolicy, ImageSequence},
    EncodingResult,
};

#[derive(Parser)]
#[command(
    name = "movie-generator",
    version,
    about = "Turn a sequence of still images into a movie",
    long_about = "Movie Generator encodes an ordered list of images into a QuickTime or MPEG-4 movie, one image per frame at a constant frame rate."
)]
struct Cli {
    /// Image files, in frame order
    #[arg(required_unless_present_any = ["images", "list_formats"], conflicts_with = "images")]
    paths: Vec<PathBuf>,

    /// Directory of images, encoded in file name order
    #[arg(short, long)]
    images: Option<PathBuf>,

    /// Output movie file path
    #[arg(short, long, required_unless_present = "list_formats")]
    output: Option<PathBuf>,

    /// Movie width in pixels (defaults to the first image's width)
    #[arg(long, allow_negative_numbers = true)]
    width: Option<i64>,

    /// Movie height in pixels (defaults to the first image's height)
    #[arg(long, allow_negative_numbers = true)]
    height: Option<i64>,

    /// Frames per second
    #[arg(short, long, allow_negative_numbers = true)]
    fps: Option<i64>,

    /// Video codec (h264, hevc, prores422, prores4444, mjpeg)
    #[arg(long)]
    codec: Option<CodecKind>,

    /// Container (mov, m4v, mp4); defaults to the output's extension
    #[arg(long)]
    container: Option<ContainerKind>,

    /// How images of a different size are fitted (letterbox, stretch)
    #[arg(long)]
    fit: Option<FitPolicy>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the supported codecs and containers and exit
    #[arg(long)]
    list_formats: bool,
}

fn list_formats() {
    println!("Codecs:");
    for codec in CodecKind::ALL {
        println!("  {:<12} {}", codec.name(), codec.label());
    }
    println!("Containers:");
    for container in ContainerKind::ALL {
        let codecs: Vec<&str> = CodecKind::ALL
            .iter()
            .filter(|codec| container.supports(**codec))
            .map(|codec| codec.name())
            .collect();
        println!("  {:<12} {} [{}]", container.name(), container.label(), codecs.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let log_level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    if cli.list_formats {
        list_formats();
        return Ok(ExitCode::SUCCESS);
    }

    info!("Starting Movie Generator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let generator = MovieGenerator::new(config)?;
    info!("Using {} backend", generator.backend_name());

    let output = cli
        .output
        .clone()
        .ok_or_else(|| anyhow::anyhow!("an output path is required"))?;

    let sequence = match &cli.images {
        Some(directory) => ImageSequence::from_directory(directory),
        None => Ok(ImageSequence::from_paths(cli.paths.iter())),
    };

    let settings = MovieSettings {
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
        codec: cli.codec,
        container: cli.container,
        fit: cli.fit,
    };

    let result = match sequence.and_then(|sequence| generator.request(sequence, &output, &settings)) {
        Ok(request) => generator.generate(request).await,
        Err(e) => EncodingResult::Failure(e),
    };

    match result {
        EncodingResult::Success(movie) => {
            info!(
                "Wrote {:?}: {} frames, {:.3}s, {} bytes",
                movie.destination,
                movie.frame_count,
                movie.duration.as_secs_f64(),
                movie.file_size
            );
            Ok(ExitCode::SUCCESS)
        }
        EncodingResult::Failure(e) => {
            error!("{}", e);
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}
