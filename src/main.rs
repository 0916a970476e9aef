use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;
use tracing::info_span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use dense_trajectories::config::*;
use dense_trajectories::dataset::*;
use dense_trajectories::emitter::TextEmitter;
use dense_trajectories::pipeline::{run, DenseTracker};
use dense_trajectories::visualization::*;

const VIDEO_EXTENSIONS: [&str; 5] = ["avi", "mp4", "mkv", "mov", "webm"];

/// Extract dense trajectories with HOG/HOF/MBH descriptors, one line per
/// trajectory on stdout.
#[derive(Parser)]
#[clap(name = "dense-track")]
pub struct Args {
    /// a video file, a directory of frames, or a list of frame files
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,
    /// write records here instead of stdout
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// JSON file with engine parameters, replaces the parameter flags
    #[clap(long)]
    pub params: Option<PathBuf>,
    #[clap(long, default_value_t = 0)]
    pub start_frame: usize,
    /// last frame to process, inclusive
    #[clap(long)]
    pub end_frame: Option<usize>,
    /// show the live tracks in a window (needs the `opencv` feature)
    #[clap(long)]
    pub show: bool,
    /// log the live tracks to a rerun recording (needs the `rerun` feature)
    #[clap(long)]
    pub rerun: Option<PathBuf>,
    #[clap(short, long)]
    pub verbose: bool,
    #[clap(flatten)]
    pub config: Config,
}

fn load_config(args: &Args) -> Result<Config> {
    match &args.params {
        None => Ok(args.config.clone()),
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open parameter file {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("Failed to parse parameter file {}", path.display()))
        }
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_source(inputs: &[PathBuf]) -> Result<Box<dyn FrameSource>> {
    match inputs {
        [path] if is_video(path) => open_video(path),
        _ => Ok(Box::new(ImageSequence::new(inputs)?)),
    }
}

#[cfg(feature = "opencv")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(dense_trajectories::video::VideoInput::new(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    bail!(
        "Cannot decode {}: video input needs the `opencv` feature",
        path.display()
    )
}

fn open_visualizer(args: &Args) -> Result<Box<dyn Visualizer>> {
    if args.show {
        #[cfg(feature = "opencv")]
        return Ok(Box::new(WindowVisualizer::new()?));
        #[cfg(not(feature = "opencv"))]
        bail!("--show needs the `opencv` feature");
    }
    if let Some(_path) = &args.rerun {
        #[cfg(feature = "rerun")]
        return Ok(Box::new(RerunVisualizer::new(_path)?));
        #[cfg(not(feature = "rerun"))]
        bail!("--rerun needs the `rerun` feature");
    }
    Ok(Box::new(NoopVisualizer))
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let config = load_config(&args)?;

    // setup logging, records go to stdout
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .with(level)
        .init();

    let mut tracker = DenseTracker::new(config)?;
    let mut source = open_source(&args.inputs)?;
    let mut visualizer = open_visualizer(&args)?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut emitter = TextEmitter::new(BufWriter::new(writer));

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    if let Some(length) = source.len() {
        header_span.pb_set_length(length);
    }
    let header_span_enter = header_span.enter();

    run(
        source.as_mut(),
        &mut tracker,
        &mut emitter,
        visualizer.as_mut(),
        args.start_frame,
        args.end_frame,
    )?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::parse_from([
            "dense-track",
            "frames",
            "--track-length",
            "10",
            "--start-frame",
            "3",
            "--end-frame",
            "20",
        ]);
        assert_eq!(args.inputs, vec![PathBuf::from("frames")]);
        assert_eq!(args.config.track_length, 10);
        assert_eq!(args.start_frame, 3);
        assert_eq!(args.end_frame, Some(20));
        assert!(!args.show);
        assert_eq!(load_config(&args).unwrap(), args.config);
    }

    #[test]
    fn test_params_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"track_length": 8, "nt_cell": 2}"#).unwrap();
        let args = Args::parse_from([
            "dense-track".into(),
            "a.png".into(),
            "--params".into(),
            path.into_os_string(),
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.track_length, 8);
        assert_eq!(config.nt_cell, 2);
        assert_eq!(config.patch_size, DEFAULT_PATCH_SIZE);
    }

    #[test]
    fn test_video_detection() {
        assert!(is_video(Path::new("clip.MP4")));
        assert!(!is_video(Path::new("frame_001.png")));
    }
}
