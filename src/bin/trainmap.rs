use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trainmap", version, about = "Animate a train moving across a map")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the whole animation (GIF, or MP4 when `ffmpeg` is on PATH).
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Print the sampled train positions as JSON lines.
    Sample(SampleArgs),
    /// Print the default configuration as JSON.
    Config,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Configuration JSON; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output path (.gif or .mp4).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Number of frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Delay between frames in milliseconds.
    #[arg(long)]
    interval_ms: Option<u32>,

    /// Loop the animation instead of playing it once.
    #[arg(long)]
    loop_forever: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Configuration JSON; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct SampleArgs {
    /// Configuration JSON; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of samples.
    #[arg(long)]
    frames: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Sample(args) => cmd_sample(args),
        Command::Config => cmd_config(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<trainmap::AnimationConfig> {
    match path {
        Some(p) => trainmap::AnimationConfig::from_json_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(trainmap::AnimationConfig::default()),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(out) = args.out {
        cfg.output = out;
    }
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if let Some(ms) = args.interval_ms {
        cfg.interval_ms = ms;
    }
    if args.loop_forever {
        cfg.loop_forever = true;
    }

    let mut anim = trainmap::TrainAnimation::new(cfg)?;
    let out = anim.render_to_file()?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let background = cfg.background;
    let mut anim = trainmap::TrainAnimation::new(cfg)?;
    let frame = anim.render_frame(trainmap::FrameIndex(args.index))?;
    trainmap::encode::save_png(&args.out, &frame, background)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_sample(args: SampleArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    cfg.validate()?;

    let route = trainmap::Route::new(cfg.stations.iter().map(|s| s.position()).collect())?;
    let frames = usize::try_from(cfg.frames).context("frame count does not fit in usize")?;
    for s in route.sample(frames)? {
        let mercator = trainmap::project_point(&s.point, trainmap::Crs::WebMercator)?;
        let line = serde_json::json!({
            "index": s.index,
            "fraction": s.fraction,
            "lon": s.point.x(),
            "lat": s.point.y(),
            "x": mercator.x(),
            "y": mercator.y(),
        });
        println!("{line}");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    println!("{}", trainmap::AnimationConfig::default().to_json_pretty()?);
    Ok(())
}
