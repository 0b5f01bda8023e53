//! Vision Insight - command-line front end
//!
//! Drives one [`SessionState`] per invocation:
//!
//! - `analyze <FILE>`: upload an image, print the detections, optionally save the
//!   annotated image returned by the service
//! - `feedback <FILE> --correct <LABEL>`: submit a correction. Without `--incorrect`
//!   the image is analyzed first and the detected labels are disputed.
//!
//! # Execution Flow
//!
//! 1. Load `vision-insight.yaml` from the config directory (defaults when absent)
//! 2. Initialize logging -> logs/vision-insight.<date>
//! 3. Create a tokio runtime
//! 4. Run the subcommand against a fresh session
//! 5. Tear the session down and shut the runtime down

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use vision_insight::models::NO_DETECTIONS_LABEL;
use vision_insight::services::{NoCaptureDevice, TracingNotifier};
use vision_insight::{APP_NAME, ClientConfig, ConfigManager, SessionState, VERSION};

#[derive(Parser, Debug)]
#[command(name = "vision-insight", version, about)]
struct Cli {
    /// Directory containing vision-insight.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Inference service base URL, overriding the config file and environment
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an image and print its detections
    Analyze {
        file: Utf8PathBuf,

        /// Write the annotated image returned by the service to this path
        #[arg(long)]
        save_annotated: Option<Utf8PathBuf>,
    },

    /// Submit a correction for an image
    Feedback {
        file: Utf8PathBuf,

        /// What the image actually shows
        #[arg(long)]
        correct: String,

        /// Label being disputed; defaults to the labels detected by a fresh analysis
        #[arg(long)]
        incorrect: Option<String>,

        #[arg(long, default_value = "")]
        comments: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut config = config_manager.load_config_preferring(cli.api_url.clone())?;
    if cli.debug {
        config.logging.debug = true;
    }

    let _guard = vision_insight::logging::setup_from_settings(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Inference service: {}", config.api.base_url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vision-insight-worker")
        .build()?;

    let result = runtime.block_on(run(cli.command, &config));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

async fn run(command: Command, config: &ClientConfig) -> Result<()> {
    let session = SessionState::new(config, Arc::new(NoCaptureDevice), Arc::new(TracingNotifier))?;

    let outcome = match command {
        Command::Analyze {
            file,
            save_annotated,
        } => analyze(&session, &file, save_annotated.as_deref()).await,
        Command::Feedback {
            file,
            correct,
            incorrect,
            comments,
        } => feedback(&session, &file, incorrect, correct, comments).await,
    };

    session.teardown();
    outcome
}

async fn select(session: &SessionState, file: &Utf8Path) -> Result<()> {
    let selected = session
        .select_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file))?;

    if !selected {
        bail!("{} is not an image file", file);
    }
    Ok(())
}

async fn analyze(
    session: &SessionState,
    file: &Utf8Path,
    save_annotated: Option<&Utf8Path>,
) -> Result<()> {
    select(session, file).await?;

    let result = session
        .analyze()
        .await
        .with_context(|| format!("Could not analyze {}", file))?;

    if result.has_detections() {
        for detection in result.detections() {
            println!("{}\t{:.2}", detection.label, detection.confidence);
        }
    } else {
        println!("{}", NO_DETECTIONS_LABEL);
    }

    if let Some(path) = save_annotated {
        let bytes = session
            .annotated_image()
            .context("Annotated image is no longer available")?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write annotated image: {}", path))?;
        println!("Annotated image saved to {}", path);
    }

    Ok(())
}

async fn feedback(
    session: &SessionState,
    file: &Utf8Path,
    incorrect: Option<String>,
    correct: String,
    comments: String,
) -> Result<()> {
    select(session, file).await?;

    let disputed = match incorrect {
        Some(label) => label,
        None => session
            .analyze()
            .await
            .with_context(|| format!("Could not analyze {}", file))?
            .disputed_label(),
    };

    session.open_feedback_with_label(disputed)?;
    session.feedback().set_correct_label(correct);
    session.feedback().set_comments(comments);

    session
        .submit_feedback()
        .await
        .context("Feedback was not accepted")?;

    println!("Feedback submitted");
    Ok(())
}
