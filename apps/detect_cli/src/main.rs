mod config;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    runtime, ConfiguredDevices, DetectionSessionController, DiskFileDelivery,
    HttpUploadTransport, Outcome, PriorityClasses, RuntimeEvent, RuntimeOptions, SessionHandle,
    SessionRequest, SessionStatus, SessionView, VideoInput, WsEventChannel,
};
use shared::domain::SourceId;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, validate_service_url, Settings, DEFAULT_CONFIG_FILE};

const SOURCE_LIST_WAIT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(about = "Drive a remote object-detection service from the terminal")]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    service_url: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Classes listed first and flagged, comma separated.
    #[arg(long, value_delimiter = ',')]
    priority: Vec<String>,
    #[arg(long)]
    auto_select: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured sources merged with those the service reports.
    Sources,
    /// Run live detection on one source until interrupted.
    Live {
        #[arg(long)]
        source: String,
    },
    /// Run batch detection over a video file.
    Video(VideoArgs),
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct VideoInputArgs {
    /// Local file, uploaded before submission.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Path already readable by the service.
    #[arg(long)]
    server_path: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct VideoArgs {
    #[command(flatten)]
    input: VideoInputArgs,
    /// Ask for an annotated render once detection finishes.
    #[arg(long)]
    render: bool,
}

impl VideoInputArgs {
    fn into_input(self) -> Result<VideoInput> {
        match (self.file, self.server_path) {
            (Some(file), None) => Ok(VideoInput::LocalFile(file)),
            (None, Some(path)) => Ok(VideoInput::ServerPath(path)),
            _ => bail!("pass exactly one of --file or --server-path"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    apply_overrides(&mut settings, &args);
    let service_url = validate_service_url(&settings.service_url)?;
    let service_url = service_url.as_str().trim_end_matches('/').to_string();

    let (channel, inbound) = WsEventChannel::connect(&service_url)
        .await
        .with_context(|| format!("failed to reach detection service at {service_url}"))?;
    info!(service_url = %service_url, "connected to detection service");

    let controller = DetectionSessionController::new(
        Arc::new(channel),
        Arc::new(HttpUploadTransport::new(service_url.clone())),
    );
    let devices = ConfiguredDevices::new(
        settings.local_devices.clone(),
        settings.rtsp_streams.clone(),
    );
    let delivery = DiskFileDelivery::new(settings.output_dir.clone());
    let options = RuntimeOptions {
        priority: PriorityClasses::new(settings.priority_classes.iter().cloned()),
        auto_select_first_source: settings.auto_select_first_source,
    };
    let (handle, actor) = runtime::spawn(
        controller,
        inbound,
        Arc::new(devices),
        Arc::new(delivery),
        options,
    );

    let result = match args.command {
        Command::Sources => list_sources(&handle).await,
        Command::Live { source } => run_live(&handle, SourceId::new(source)).await,
        Command::Video(video) => run_video(&handle, video.input.into_input()?, video.render).await,
    };

    drop(handle);
    let _ = actor.await;
    result
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(v) = &args.service_url {
        settings.service_url = v.clone();
    }
    if let Some(v) = &args.output_dir {
        settings.output_dir = v.clone();
    }
    if !args.priority.is_empty() {
        settings.priority_classes = args.priority.clone();
    }
    if args.auto_select {
        settings.auto_select_first_source = true;
    }
}

async fn list_sources(handle: &SessionHandle) -> Result<()> {
    let mut events = handle.subscribe();
    handle.request(SessionRequest::RefreshSources).await?;

    let wait = tokio::time::timeout(SOURCE_LIST_WAIT, async {
        loop {
            match events.recv().await {
                Ok(RuntimeEvent::SourcesUpdated(sources)) => return Some(sources),
                Ok(RuntimeEvent::Notice(message)) => warn!("{message}"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    });
    let Ok(Some(sources)) = wait.await else {
        bail!("detection service did not answer the source list request");
    };

    if sources.is_empty() {
        println!("No sources available.");
    }
    for source in sources {
        println!(
            "{:<12} {:<32} {}",
            source.id.as_str(),
            source.locator.to_string(),
            source.display_label
        );
    }
    Ok(())
}

async fn run_live(handle: &SessionHandle, source: SourceId) -> Result<()> {
    expect_applied(handle.request(SessionRequest::StartCamera(source)).await?)?;
    print_view(&handle.view());

    let mut views = handle.watch_view();
    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                print_view(&views.borrow_and_update());
            }
            event = events.recv() => {
                if !report_event(event) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping camera");
                break;
            }
        }
    }

    handle.request(SessionRequest::StopCamera).await?;
    Ok(())
}

async fn run_video(handle: &SessionHandle, input: VideoInput, render: bool) -> Result<()> {
    expect_applied(handle.request(SessionRequest::StartVideo(input)).await?)?;
    print_view(&handle.view());

    let mut views = handle.watch_view();
    let mut events = handle.subscribe();
    let mut render_requested = false;
    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                print_view(&view);
                if view.status != SessionStatus::Done {
                    continue;
                }
                if !render {
                    break;
                }
                if !render_requested && view.affordances.can_render {
                    render_requested = true;
                    expect_applied(handle.request(SessionRequest::Render).await?)?;
                }
            }
            event = events.recv() => match event {
                Ok(RuntimeEvent::ArtifactSaved(path)) => {
                    println!("Rendered video saved to {}", path.display());
                    break;
                }
                Ok(RuntimeEvent::ArtifactFailed(message)) => bail!(message),
                other => {
                    if !report_event(other) {
                        break;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, clearing video session");
                handle.request(SessionRequest::Clear).await?;
                break;
            }
        }
    }
    Ok(())
}

fn expect_applied(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Applied | Outcome::Unchanged => Ok(()),
        Outcome::Rejected(rejection) => bail!("request rejected: {rejection}"),
    }
}

/// Returns false once the session can no longer make progress.
fn report_event(event: Result<RuntimeEvent, RecvError>) -> bool {
    match event {
        Ok(RuntimeEvent::Notice(message)) => println!("! {message}"),
        Ok(RuntimeEvent::UploadFailed(message)) => println!("! {message}"),
        Ok(RuntimeEvent::ArtifactSaved(path)) => println!("Saved {}", path.display()),
        Ok(RuntimeEvent::ArtifactFailed(message)) => println!("! {message}"),
        Ok(RuntimeEvent::SourcesUpdated(_)) => {}
        Ok(RuntimeEvent::EventStreamEnded) => {
            println!("! Detection service closed the connection");
            return false;
        }
        Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped runtime events"),
        Err(RecvError::Closed) => return false,
    }
    true
}

fn print_view(view: &SessionView) {
    let source = view.source_label.as_deref().unwrap_or("-");
    println!(
        "[{}] {source} | started {} | frames {} | inference {}{}",
        view.status.label(),
        view.started_label,
        view.frames_received,
        view.inference_label,
        if view.has_priority_hits() {
            format!(" | {} priority", view.priority_hits)
        } else {
            String::new()
        }
    );
    for row in &view.rows {
        let marker = if row.is_priority { '*' } else { ' ' };
        println!(
            "  {marker}{:>3}. {:<20} {}",
            row.number, row.class_name, row.confidence_label
        );
    }
}
