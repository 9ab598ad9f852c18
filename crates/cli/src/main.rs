#![deny(warnings)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use emotion_sampler_core::config::{
    resolve_face_model, resolve_model_path, resolve_sample_rate, AnalysisConfig, Env, ModelPaths,
    OverlayConfig, StdEnv, DEFAULT_CLASSIFIER_MODEL, ENV_CLASSIFIER_MODEL,
};
use emotion_sampler_core::overlay::{CancelToken, SnapshotOverlay};
use emotion_sampler_core::pipeline::{load_pipeline, open_source, AnalysisError};
use emotion_sampler_core::preprocess::ChannelOrder;
use emotion_sampler_core::sink::LogSink;
use emotion_sampler_core::source::{SourceKind, VideoSource};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_SOURCE_UNAVAILABLE: u8 = 2;
const EXIT_MODEL_LOAD: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "emotion-sampler")]
#[command(about = "Dominant facial emotion of a video file or live camera")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample a video file or camera and report the dominant emotion.
    Video(VideoArgs),
    /// Classify a single still image.
    Image(ImageArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Emotion classifier ONNX model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Face detector ONNX model
    #[arg(long, conflicts_with = "no_face_model")]
    face_model: Option<PathBuf>,

    /// Classify whole frames without face localisation
    #[arg(long)]
    no_face_model: bool,

    #[arg(long, value_enum, default_value_t = ChannelOrderArg::Bgr)]
    channel_order: ChannelOrderArg,
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Camera index (e.g. `0`) or video file path
    source: String,

    /// Draw each classified frame to a preview image; on a camera, `q` + Enter
    /// or Ctrl-C stops sampling
    #[arg(long)]
    overlay: bool,

    #[arg(long, requires = "overlay")]
    preview: Option<PathBuf>,

    /// Classifications per second
    #[arg(long)]
    target_rate: Option<f64>,

    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Args, Debug)]
struct ImageArgs {
    path: PathBuf,

    #[command(flatten)]
    models: ModelArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChannelOrderArg {
    Bgr,
    Rgb,
}

impl From<ChannelOrderArg> for ChannelOrder {
    fn from(arg: ChannelOrderArg) -> Self {
        match arg {
            ChannelOrderArg::Bgr => ChannelOrder::Bgr,
            ChannelOrderArg::Rgb => ChannelOrder::Rgb,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("Error: {e:#}");
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "analysis failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let env = StdEnv;
    match command {
        Command::Video(args) => {
            let cfg = build_video_config(args, &env)?;
            tracing::info!(
                source = %cfg.source,
                target_rate = cfg.target_rate.hz(),
                overlay = cfg.overlay.enabled,
                "config loaded"
            );
            run_video(cfg).await
        }
        Command::Image(args) => {
            let path = args.path.clone();
            let cfg = AnalysisConfig {
                models: model_paths(&args.models, &env)?,
                channel_order: args.models.channel_order.into(),
                ..AnalysisConfig::new(VideoSource::File(path.clone()))
            };
            let prediction = tokio::task::spawn_blocking(move || {
                let mut pipeline = load_pipeline(&cfg)?;
                pipeline.analyze_image(&path)
            })
            .await
            .context("image analysis task panicked")??;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            Ok(())
        }
    }
}

async fn run_video(cfg: AnalysisConfig) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    if cfg.overlay.enabled && cfg.source.kind() == SourceKind::Unbounded {
        watch_for_cancel(cancel.clone());
    }

    let report = tokio::task::spawn_blocking(move || {
        let mut pipeline = load_pipeline(&cfg)?;
        let source = open_source(&cfg)?;
        let mut overlay = cfg
            .overlay
            .enabled
            .then(|| SnapshotOverlay::new(cfg.overlay.preview_path(), cancel));
        pipeline.analyze_into(source, overlay.as_mut(), &mut LogSink)
    })
    .await
    .context("analysis task panicked")??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Trips `cancel` on Ctrl-C or on a `q` line typed on stdin.
fn watch_for_cancel(cancel: CancelToken) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    // Plain thread: a blocking stdin read would hold up runtime shutdown.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") {
                tracing::info!("quit requested, stopping");
                cancel.cancel();
                break;
            }
        }
    });
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn model_paths(args: &ModelArgs, env: &impl Env) -> anyhow::Result<ModelPaths> {
    let classifier = resolve_model_path(
        args.model.clone(),
        ENV_CLASSIFIER_MODEL,
        env,
        DEFAULT_CLASSIFIER_MODEL,
    )?;
    let face_detector = resolve_face_model(args.face_model.clone(), args.no_face_model, env)?;
    Ok(ModelPaths {
        classifier,
        face_detector,
    })
}

fn build_video_config(args: VideoArgs, env: &impl Env) -> anyhow::Result<AnalysisConfig> {
    Ok(AnalysisConfig {
        source: VideoSource::parse(&args.source),
        target_rate: resolve_sample_rate(args.target_rate, env)?,
        overlay: OverlayConfig {
            enabled: args.overlay,
            preview_path: args.preview,
        },
        models: model_paths(&args.models, env)?,
        channel_order: args.models.channel_order.into(),
    })
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::SourceUnavailable { .. }) => EXIT_SOURCE_UNAVAILABLE,
        Some(AnalysisError::ModelLoad { .. }) => EXIT_MODEL_LOAD,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotion_sampler_core::config::{
        FaceModel, MapEnv, DEFAULT_FACE_MODEL, ENV_FACE_MODEL, ENV_TARGET_SAMPLE_RATE,
    };

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid args")
    }

    #[test]
    fn numeric_source_is_camera() {
        let Command::Video(args) = parse(&["emotion-sampler", "video", "0", "--overlay"]).command
        else {
            panic!("expected video command");
        };
        let cfg = build_video_config(args, &MapEnv::default()).expect("config");
        assert_eq!(cfg.source, VideoSource::Camera(0));
        assert!(cfg.overlay.enabled);
        assert_eq!(
            cfg.models.face_detector,
            FaceModel::Default(PathBuf::from(DEFAULT_FACE_MODEL))
        );
    }

    #[test]
    fn env_supplies_rate_and_models() {
        let env = MapEnv::default()
            .with_var(ENV_TARGET_SAMPLE_RATE, "2")
            .with_var(ENV_CLASSIFIER_MODEL, "mer.onnx");
        let Command::Video(args) =
            parse(&["emotion-sampler", "video", "clip.mp4", "--no-face-model"]).command
        else {
            panic!("expected video command");
        };
        let cfg = build_video_config(args, &env).expect("config");
        assert_eq!(cfg.source, VideoSource::File(PathBuf::from("clip.mp4")));
        assert_eq!(cfg.target_rate.hz(), 2.0);
        assert_eq!(cfg.models.classifier, PathBuf::from("mer.onnx"));
        assert_eq!(cfg.models.face_detector, FaceModel::Disabled);
    }

    #[test]
    fn face_model_flag_must_load() {
        let Command::Video(args) = parse(&[
            "emotion-sampler",
            "video",
            "0",
            "--face-model",
            "faces.onnx",
        ])
        .command
        else {
            panic!("expected video command");
        };
        let env = MapEnv::default().with_var(ENV_FACE_MODEL, "env-face.onnx");
        let cfg = build_video_config(args, &env).expect("config");
        assert_eq!(
            cfg.models.face_detector,
            FaceModel::Explicit(PathBuf::from("faces.onnx"))
        );
    }

    #[test]
    fn invalid_rate_rejected() {
        let Command::Video(args) =
            parse(&["emotion-sampler", "video", "clip.mp4", "--target-rate", "0"]).command
        else {
            panic!("expected video command");
        };
        assert!(build_video_config(args, &MapEnv::default()).is_err());
    }

    #[test]
    fn preview_requires_overlay() {
        assert!(Cli::try_parse_from([
            "emotion-sampler",
            "video",
            "0",
            "--preview",
            "p.png"
        ])
        .is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let source = anyhow::Error::new(AnalysisError::SourceUnavailable {
            selector: "camera 0".to_owned(),
            reason: "busy".to_owned(),
        });
        let model = anyhow::Error::new(AnalysisError::ModelLoad {
            path: "m.onnx".to_owned(),
            reason: "missing".to_owned(),
        });
        assert_eq!(exit_code(&source), EXIT_SOURCE_UNAVAILABLE);
        assert_eq!(exit_code(&model), EXIT_MODEL_LOAD);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }
}
