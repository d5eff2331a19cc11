//! asdk - command-line client for the avatar computation service
//!
//! Authorizes with client credentials, prints and edits default settings,
//! submits photos and fetches the resulting exports.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use asdk_client::auth::{request_access_token, usable_token};
use asdk_client::jobs::PollOptions;
use asdk_client::params::{
    export_parameters_pair, generate_computation_parameters, ConfigTree, ExportSection,
};
use asdk_client::pipeline::all_selections;
use asdk_client::retrieval::{direct_link, export_links, file_name_from_url};
use asdk_client::{AsdkError, AvatarSdkClient, Photo, PipelineSelection, Session};
use asdk_common::config::{load_toml_config, resolve_config_path, write_toml_config, TomlConfig};
use asdk_common::events::{AsdkEvent, EventBus};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for asdk
#[derive(Parser, Debug)]
#[command(name = "asdk")]
#[command(about = "Avatar SDK command-line client")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/asdk/config.toml)
    #[arg(short, long, env = "ASDK_CONFIG")]
    config: Option<PathBuf>,

    /// Access token; skips authorization
    #[arg(long, env = "ASDK_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain an access token and store it in the config file
    Auth {
        #[arg(long, env = "ASDK_CLIENT_ID")]
        client_id: Option<String>,
        #[arg(long, env = "ASDK_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,
    },
    /// List available pipelines
    Pipelines,
    /// Write default settings for a pipeline as JSON
    Settings {
        /// "pipeline | subtype"
        #[arg(short, long)]
        pipeline: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the wire JSON a settings file produces
    Preview {
        settings: PathBuf,
    },
    /// Compute an avatar from a photo
    Generate {
        #[arg(long)]
        photo: PathBuf,
        /// Settings file from `settings`; defaults are used if omitted
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// "pipeline | subtype", required without a settings file
        #[arg(short, long)]
        pipeline: Option<String>,
        /// Directory for the unpacked preview files
        #[arg(short, long, default_value = "avatar")]
        out: PathBuf,
    },
    /// Get an export file as a direct link, or save it
    Download {
        url: String,
        /// Save the file here instead of printing a link
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

/// Settings as written by `settings` and read by `preview`/`generate`
#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    pipeline: String,
    parameters: ConfigTree,
    export: ExportSection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = load_toml_config(&config_path)?;

    init_tracing(&config)?;
    info!(config = %config_path.display(), "asdk {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Auth {
            client_id,
            client_secret,
        } => auth(config, &config_path, client_id, client_secret).await,
        Command::Pipelines => {
            for selection in all_selections() {
                println!("{}", selection);
            }
            Ok(())
        }
        Command::Settings { pipeline, out } => {
            let session = session(&config, args.token)?;
            let selection = PipelineSelection::parse(&pipeline).map_err(user_error)?;
            let settings = session
                .load_settings(&selection)
                .await
                .map_err(user_error)?;

            let file = SettingsFile {
                pipeline: selection.label(),
                parameters: settings.parameters,
                export: settings.export,
            };
            write_output(out.as_deref(), &serde_json::to_string_pretty(&file)?)
        }
        Command::Preview { settings } => {
            let file = read_settings(&settings)?;
            let catalog = asdk_client::params::ParameterCatalog::default();
            let wire = json!({
                "parameters": generate_computation_parameters(&file.parameters, &catalog),
                "export_parameters": export_parameters_pair(&file.export),
            });
            println!("{}", serde_json::to_string_pretty(&wire)?);
            Ok(())
        }
        Command::Generate {
            photo,
            settings,
            pipeline,
            out,
        } => {
            let session = session(&config, args.token)?;
            generate(&session, &photo, settings.as_deref(), pipeline.as_deref(), &out).await
        }
        Command::Download { url, save } => {
            let session = session(&config, args.token)?;
            let client = session.client();
            match save {
                Some(path) => {
                    let data = client.fetch_export_file(&url).await.map_err(user_error)?;
                    tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Saved {} ({} bytes)", path.display(), data.len());
                }
                None => {
                    let link = direct_link(&url, client.token(), file_name_from_url(&url))
                        .map_err(user_error)?;
                    println!("{}\t{}", link.filename, link.href);
                }
            }
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise the level from the config file
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn user_error(e: AsdkError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

fn session(config: &TomlConfig, token: Option<String>) -> Result<Session> {
    let token = match token {
        Some(t) => t,
        None => match usable_token(config.access_token.as_ref()) {
            Some(t) => t.to_string(),
            None => bail!("No valid access token, run `asdk auth` first"),
        },
    };

    let client = AvatarSdkClient::new(&config.api_url, token).map_err(user_error)?;
    Ok(Session::new(client, EventBus::new(100))
        .with_poll_options(PollOptions::from(&config.polling)))
}

async fn auth(
    mut config: TomlConfig,
    config_path: &Path,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> Result<()> {
    let client_id = client_id.or_else(|| config.client_id.clone()).unwrap_or_default();
    let client_secret = client_secret
        .or_else(|| config.client_secret.clone())
        .unwrap_or_default();

    let http = reqwest::Client::new();
    let token = request_access_token(&http, &config.auth_url, &client_id, &client_secret)
        .await
        .map_err(user_error)?;

    config.client_id = Some(client_id);
    config.client_secret = Some(client_secret);
    config.access_token = Some((&token).into());
    write_toml_config(&config, config_path)?;

    println!("Authorized, token valid for {} s", token.expires_in);
    Ok(())
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid settings file {}", path.display()))
}

fn write_output(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

async fn generate(
    session: &Session,
    photo_path: &Path,
    settings_path: Option<&Path>,
    pipeline: Option<&str>,
    out: &Path,
) -> Result<()> {
    let file = settings_path.map(read_settings).transpose()?;
    let label = pipeline
        .map(str::to_string)
        .or_else(|| file.as_ref().map(|f| f.pipeline.clone()));
    let Some(label) = label else {
        bail!("Please select a pipeline");
    };

    let selection = PipelineSelection::parse(&label).map_err(user_error)?;
    let mut settings = session.load_settings(&selection).await.map_err(user_error)?;

    if let Some(file) = file {
        if file.pipeline != selection.label() {
            warn!(file = %file.pipeline, "Settings file was written for another pipeline");
        }
        settings.parameters = file.parameters;
        settings.export = file.export;
    }

    let data = tokio::fs::read(photo_path)
        .await
        .with_context(|| format!("Failed to read photo {}", photo_path.display()))?;
    let photo = Photo {
        name: photo_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "photo.jpg".to_string()),
        data: data.into(),
    };

    let progress = tokio::spawn(render_progress(session.events().subscribe()));

    let result = session.compute_avatar(Some(photo), &settings).await;
    progress.abort();
    let outcome = result.map_err(user_error)?;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;
    for (name, contents) in &outcome.preview_files {
        let path = out.join(name);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    println!(
        "Avatar {} ready, {} preview files in {}",
        outcome.avatar.code.as_deref().unwrap_or(&outcome.avatar.url),
        outcome.preview_files.len(),
        out.display()
    );

    match &outcome.full_export {
        Ok(Some(export)) => {
            println!("Downloads:");
            for link in export_links(export, session.client().token()).map_err(user_error)? {
                println!("  {}\t{}", link.filename, link.href);
            }
        }
        Ok(None) => println!("No full export was created"),
        Err(e) => println!("Full export unavailable: {}", e),
    }

    Ok(())
}

async fn render_progress(mut rx: tokio::sync::broadcast::Receiver<AsdkEvent>) {
    loop {
        match rx.recv().await {
            Ok(AsdkEvent::StageChanged { stage, .. }) => eprintln!("{}", stage),
            Ok(AsdkEvent::JobProgress {
                kind,
                status,
                progress,
                ..
            }) => eprintln!("  {} {} {}%", kind, status, progress),
            Ok(AsdkEvent::DownloadProgress { percent, .. }) => eprint!("\r  {}%", percent),
            Ok(AsdkEvent::ExportReady { files, .. }) => {
                eprintln!("\n  full export ready ({} files)", files)
            }
            Err(RecvError::Lagged(n)) => warn!(missed = n, "Progress output lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
