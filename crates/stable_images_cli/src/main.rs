use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stable_images::prelude::*;

/// CLI for generating AI images via the ControlNet and Stability APIs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The directory images are written to
    #[arg(long, global = true, default_value = "images")]
    output_dir: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an image guided by the canny edges of a source image
    Img2img(Img2ImgArgs),
    /// Generate an image from a text prompt
    Txt2img(Txt2ImgArgs),
}

#[derive(Args, Debug)]
struct Img2ImgArgs {
    /// The key for the ControlNet API
    #[arg(short, long, env = "CONTROLNET_API_KEY", hide_env_values = true)]
    api_key: String,

    /// The prompt for the image
    #[arg(short, long)]
    prompt: String,

    /// URL of the image whose edges guide the generation
    #[arg(short, long)]
    image: String,

    /// The negative prompt for the image
    #[arg(short, long)]
    negative: Option<String>,

    /// The model to generate with
    #[arg(short, long, default_value_t = String::from("midjourney"))]
    model: String,

    /// The scheduler to use
    #[arg(long, value_enum, default_value_t = Scheduler::UniPcMultistep)]
    scheduler: Scheduler,

    /// The number of inference steps
    #[arg(short, long, default_value_t = 30)]
    steps: u32,

    /// Classifier-free guidance scale
    #[arg(long, default_value_t = 7.5)]
    guidance_scale: f32,

    /// How strongly the source image is transformed
    #[arg(long, default_value_t = 0.55)]
    strength: f32,

    /// A fixed seed, random when not given
    #[arg(long)]
    seed: Option<u64>,

    /// Follow-up fetch attempts before giving up
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Seconds between follow-up fetch attempts
    #[arg(long, default_value_t = 5)]
    retry_interval: u64,

    /// Minimum seconds to wait on a processing image before fetching it
    #[arg(long, default_value_t = 5)]
    min_eta: u64,
}

#[derive(Args, Debug)]
struct Txt2ImgArgs {
    /// The token for the Stability API
    #[arg(short, long, env = "STABILITY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// The prompt for the image
    #[arg(short, long)]
    prompt: String,

    /// The negative prompt for the image
    #[arg(short, long)]
    negative: Option<String>,

    /// The engine to generate with
    #[arg(short, long, value_enum, default_value_t = StabilityEngine::V2_1)]
    engine: StabilityEngine,

    /// The number of diffusion steps
    #[arg(short, long, default_value_t = 10)]
    steps: u32,

    /// Classifier-free guidance scale
    #[arg(long, default_value_t = 5.0)]
    cfg_scale: f32,

    /// The seed to generate with
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = ImageStore::new(cli.output_dir);
    let image = match cli.command {
        Command::Img2img(args) => img2img(args, store).await?,
        Command::Txt2img(args) => txt2img(args, store).await?,
    };

    let image = image.ok_or(anyhow!("no image was produced"))?;
    info!(seed = %image.seed, "image written to {}", image.path.display());

    Ok(())
}

async fn img2img(args: Img2ImgArgs, store: ImageStore) -> Result<Option<SavedImage>> {
    let policy = PollPolicy {
        max_retries: args.max_retries,
        retry_interval: Duration::from_secs(args.retry_interval),
        min_eta: Duration::from_secs(args.min_eta),
    };
    let client = ControlNetClient::new(args.api_key)?
        .with_store(store)
        .with_policy(policy);

    let mut request = ControlNetRequest::new(args.prompt, args.image)
        .update_model_id(args.model)
        .update_scheduler(args.scheduler)
        .update_steps(args.steps)
        .update_guidance_scale(args.guidance_scale)
        .update_strength(args.strength);
    if let Some(negative) = args.negative {
        request = request.update_negative_prompt(negative);
    }
    if let Some(seed) = args.seed {
        request = request.update_seed(seed);
    }

    Ok(client.generate(&request).await)
}

async fn txt2img(args: Txt2ImgArgs, store: ImageStore) -> Result<Option<SavedImage>> {
    let client = StabilityClient::new(args.api_key)?.with_store(store);

    let mut request = TextToImageRequest::new(args.prompt)
        .update_engine(args.engine)
        .update_steps(args.steps)
        .update_cfg_scale(args.cfg_scale)
        .update_seed(args.seed);
    if let Some(negative) = args.negative {
        request = request.update_negative_prompt(negative);
    }

    Ok(client.generate(&request).await)
}
