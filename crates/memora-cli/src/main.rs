use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use memora_core::QualityGate;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "memora", about = "Memora family-member recognition CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    /// (also enabled by MEMORA_SYSTEM_BUS=1)
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify which family member appears in a photo
    Recognize {
        /// Photo to identify (any common image format)
        #[arg(short, long)]
        image: PathBuf,
        /// Subject whose family members are searched
        #[arg(short, long)]
        subject: String,
    },
    /// Show daemon status
    Status,
    /// Run the image quality gate locally, without the daemon
    Quality {
        #[arg(short, long)]
        image: PathBuf,
    },
}

#[zbus::proxy(
    interface = "org.memora.Recognizer1",
    default_service = "org.memora.Recognizer1",
    default_path = "/org/memora/Recognizer1"
)]
trait Recognizer {
    async fn recognize(&self, image: &[u8], subject_id: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn connect(system: bool) -> Result<zbus::Connection> {
    let builder = if system {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    builder
        .method_timeout(Duration::from_secs(120))
        .build()
        .await
        .context("failed to connect to D-Bus")
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Quality gate verdict for a photo, with the measurements behind it.
fn quality_report(image: &RgbImage) -> serde_json::Value {
    let verdict = QualityGate::default().check(image);
    serde_json::json!({
        "width": image.width(),
        "height": image.height(),
        "passed": verdict.passed(),
        "reason": verdict.reason(),
        "issue": verdict.issue.map(|i| i.code()),
        "suggestion": verdict.issue.map(|i| i.suggestion()),
        "blur_score": verdict.blur_score,
        "brightness": verdict.brightness,
    })
}

fn load_image(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgb8())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let system = cli.system || std::env::var("MEMORA_SYSTEM_BUS").is_ok_and(|v| v == "1");

    match cli.command {
        Commands::Recognize { image, subject } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            tracing::debug!(path = %image.display(), bytes = bytes.len(), "sending photo");

            let conn = connect(system).await?;
            let proxy = RecognizerProxy::new(&conn).await?;
            let result = proxy
                .recognize(&bytes, &subject)
                .await
                .context("memorad not reachable; is the daemon running?")?;
            print_json(&result)?;
        }
        Commands::Status => {
            let conn = connect(system).await?;
            let proxy = RecognizerProxy::new(&conn).await?;
            match proxy.status().await {
                Ok(status) => print_json(&status)?,
                Err(e) => {
                    tracing::debug!(error = %e, "status call failed");
                    println!("memorad: not connected");
                }
            }
        }
        Commands::Quality { image } => {
            let report = quality_report(&load_image(&image)?);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
