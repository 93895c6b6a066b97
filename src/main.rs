use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitalwatch::data::duration::parse_duration;
use vitalwatch::{App, Attribute, CycleOutcome, FileSource, SampleSource, Settings, SthSource};

#[derive(Parser, Debug)]
#[command(name = "vitalwatch")]
#[command(about = "Vital-sign monitor for FIWARE STH-Comet histories")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// STH-Comet base URL (e.g. http://localhost:8666)
    #[arg(long, conflicts_with = "replay")]
    endpoint: Option<String>,

    /// Entity to monitor (e.g. urn:ngsi-ld:bpm:032)
    #[arg(short = 'i', long)]
    entity_id: Option<String>,

    /// Polling interval (e.g. "2s", "500ms")
    #[arg(long)]
    interval: Option<String>,

    /// Number of samples kept per signal
    #[arg(short = 'n', long)]
    last_n: Option<usize>,

    /// Signal shown next to BPM: temperatureC or spo2
    #[arg(short, long)]
    secondary: Option<Attribute>,

    /// Replay recorded responses from a directory (<dir>/<attribute>.json)
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Run one cycle, export the state to a JSON file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let settings = load_settings(&args)?;
    let monitor = settings.monitor_settings()?;

    let source: Box<dyn SampleSource> = match &args.replay {
        Some(dir) => Box::new(FileSource::new(dir)),
        None => Box::new(SthSource::new(settings.adapter()?)),
    };
    let app = App::new(source, monitor).context("Failed to create monitor")?;

    let rt = tokio::runtime::Runtime::new()?;

    // Handle export mode (non-interactive)
    if let Some(export_path) = &args.export {
        return rt.block_on(export_to_file(app, export_path));
    }

    rt.block_on(run(app))
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "vitalwatch=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}

/// Layer command-line flags over the configuration file and environment.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(endpoint) = &args.endpoint {
        settings.source.endpoint = endpoint.clone();
    }
    if let Some(entity_id) = &args.entity_id {
        settings.source.entity_id = entity_id.clone();
    }
    if let Some(interval) = &args.interval {
        settings.monitor.interval =
            parse_duration(interval).with_context(|| format!("Invalid --interval '{}'", interval))?;
    }
    if let Some(last_n) = args.last_n {
        settings.monitor.last_n = last_n;
    }
    if let Some(secondary) = args.secondary {
        if secondary == settings.monitor.reference {
            bail!("--secondary must differ from the reference signal ({})", secondary);
        }
        settings = settings.with_secondary(secondary);
    }

    settings.validate()?;
    Ok(settings)
}

/// Poll until Ctrl-C.
async fn run(app: App) -> Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    app.run(shutdown).await;
    Ok(())
}

/// Run a single cycle and write the published state as JSON.
async fn export_to_file(mut app: App, export_path: &Path) -> Result<()> {
    if let CycleOutcome::Skipped(reason) = app.run_cycle().await {
        bail!("No data to export: {}", reason);
    }
    let state = app.state();

    let json = state.to_json(app.source_description())?;
    tokio::fs::write(export_path, json)
        .await
        .with_context(|| format!("Failed to write {}", export_path.display()))?;

    println!("Exported monitor state to: {}", export_path.display());
    Ok(())
}
