#![warn(missing_docs)]
//! # geosnap binary
//!
//! Terminal front-end driving one capture widget from stdin commands.

use std::sync::Arc;

use async_trait::async_trait;
use geosnap_app::{AppConfig, AppError, CameraCapture, WidgetDeps, app_version, init_tracing};
use geosnap_capture::{CameraBackend, FixedLocationProvider, LocationProvider};
use geosnap_ui::{DeferredPrompt, InstallChoice, NoticeLog, PlatformEvent, PlatformEvents};
use geosnap_upload::{HttpTransport, UPLOAD_ENDPOINT, UploadClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const HELP: &str = "commands: switch | capture | location <text> | description <text> | submit \
| installable <accept|dismiss> | installed | install | status | help | quit";

/// CLI entry point.
#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    init_tracing(&config.log_filter);

    if let Err(error) = run(config).await {
        eprintln!("geosnap failed: {error}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    let transport = Arc::new(HttpTransport::new(config.upload_timeout)?);
    let uploader = UploadClient::new(UPLOAD_ENDPOINT, transport)?;
    let location: Arc<dyn LocationProvider> = Arc::new(match config.fixed_position {
        Some(position) => FixedLocationProvider::new(position),
        None => FixedLocationProvider::unavailable(),
    });
    let notices = Arc::new(NoticeLog::new());
    let platform = PlatformEvents::new();

    let widget = CameraCapture::new(
        WidgetDeps {
            camera: camera_backend(),
            location,
            uploader,
            notifier: notices.clone(),
            platform: platform.clone(),
        },
        &config.user_agent,
    );

    println!("geosnap {}", app_version());
    println!("{HELP}");
    widget.mount().await;
    print_notices(&notices);
    print_status(&widget);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Status => print_status(&widget),
            Command::Switch => {
                if let Err(error) = widget.switch_camera().await {
                    println!("{error}");
                }
            }
            Command::Capture => match widget.capture_photo() {
                Ok(()) => println!("photo captured"),
                Err(error) => println!("{error}"),
            },
            Command::Location(text) => widget.set_location(text),
            Command::Description(text) => widget.set_description(text),
            Command::Submit => {
                if let Ok(report) = widget.submit().await {
                    println!("uploaded {} ({} bytes)", report.file_name, report.payload_bytes);
                }
            }
            Command::Installable(choice) => {
                platform.emit(&PlatformEvent::BeforeInstallPrompt(Arc::new(ScriptedPrompt(
                    choice,
                ))));
            }
            Command::Installed => {
                platform.emit(&PlatformEvent::AppInstalled);
            }
            Command::Install => {
                if widget.accept_install().await.is_none() {
                    println!("app is not installable right now");
                }
            }
        }
        print_notices(&notices);
    }

    widget.unmount();
    info!("geosnap exiting");
    Ok(())
}

#[cfg(feature = "native-camera")]
fn camera_backend() -> Arc<dyn CameraBackend> {
    Arc::new(geosnap_capture::NativeCameraBackend::new())
}

#[cfg(not(feature = "native-camera"))]
fn camera_backend() -> Arc<dyn CameraBackend> {
    Arc::new(geosnap_capture::SyntheticCameraBackend::new())
}

fn print_notices(notices: &NoticeLog) {
    for notice in notices.drain() {
        println!("[notice] {notice}");
    }
}

fn print_status(widget: &CameraCapture) {
    let view = widget.view();
    println!(
        "camera={:?} facing={} geolocation={:?} upload={:?} live_view={} switch={} install={}",
        view.camera,
        widget.facing().as_str(),
        view.geolocation,
        view.upload,
        view.show_live_view,
        view.show_switch_camera,
        view.show_install,
    );
    println!(
        "location={:?} description={:?} photo={}",
        view.location,
        view.description,
        if view.has_photo { "captured" } else { "none" },
    );
}

/// Install prompt whose answer was chosen when the platform event was raised.
struct ScriptedPrompt(InstallChoice);

#[async_trait]
impl DeferredPrompt for ScriptedPrompt {
    async fn prompt(&self) -> InstallChoice {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Switch,
    Capture,
    Location(String),
    Description(String),
    Submit,
    Installable(InstallChoice),
    Installed,
    Install,
    Status,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let command = match verb.to_ascii_lowercase().as_str() {
            "switch" => Self::Switch,
            "capture" => Self::Capture,
            "location" => Self::Location(rest.to_string()),
            "description" => Self::Description(rest.to_string()),
            "submit" => Self::Submit,
            "installable" => match rest {
                "accept" | "" => Self::Installable(InstallChoice::Accepted),
                "dismiss" => Self::Installable(InstallChoice::Dismissed),
                other => return Err(format!("unknown install choice '{other}'")),
            },
            "installed" => Self::Installed,
            "install" => Self::Install,
            "status" => Self::Status,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'; {HELP}")),
        };
        Ok(Some(command))
    }
}
