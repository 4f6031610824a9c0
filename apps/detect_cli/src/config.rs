use std::{fs, io, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "detect.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub service_url: String,
    pub output_dir: PathBuf,
    pub priority_classes: Vec<String>,
    pub local_devices: Vec<u32>,
    pub rtsp_streams: Vec<String>,
    pub auto_select_first_source: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:5000".into(),
            output_dir: PathBuf::from("./renders"),
            priority_classes: Vec::new(),
            local_devices: vec![0],
            rtsp_streams: Vec::new(),
            auto_select_first_source: false,
        }
    }
}

/// Keys accepted in `detect.toml`. Anything missing keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    service_url: Option<String>,
    output_dir: Option<PathBuf>,
    priority_classes: Option<Vec<String>>,
    local_devices: Option<Vec<u32>>,
    rtsp_streams: Option<Vec<String>>,
    auto_select_first_source: Option<bool>,
}

/// Defaults, then the config file if present, then `APP__*` variables.
pub fn load_settings(config_path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(config_path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file {}", config_path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file {}", config_path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.service_url {
        settings.service_url = v;
    }
    if let Some(v) = file_cfg.output_dir {
        settings.output_dir = v;
    }
    if let Some(v) = file_cfg.priority_classes {
        settings.priority_classes = v;
    }
    if let Some(v) = file_cfg.local_devices {
        settings.local_devices = v;
    }
    if let Some(v) = file_cfg.rtsp_streams {
        settings.rtsp_streams = v;
    }
    if let Some(v) = file_cfg.auto_select_first_source {
        settings.auto_select_first_source = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = var("APP__SERVICE_URL") {
        settings.service_url = v;
    }
    if let Some(v) = var("APP__OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(v);
    }
    if let Some(v) = var("APP__PRIORITY_CLASSES") {
        settings.priority_classes = split_list(&v).map(str::to_string).collect();
    }
    if let Some(v) = var("APP__LOCAL_DEVICES") {
        settings.local_devices = split_list(&v)
            .map(|index| {
                index
                    .parse::<u32>()
                    .with_context(|| format!("APP__LOCAL_DEVICES entry is not an index: {index}"))
            })
            .collect::<Result<_>>()?;
    }
    if let Some(v) = var("APP__RTSP_STREAMS") {
        settings.rtsp_streams = split_list(&v).map(str::to_string).collect();
    }
    if let Some(v) = var("APP__AUTO_SELECT_FIRST_SOURCE") {
        settings.auto_select_first_source = parse_flag(&v)
            .ok_or_else(|| anyhow!("APP__AUTO_SELECT_FIRST_SOURCE must be true or false, got {v}"))?;
    }
    Ok(())
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The client only speaks plain HTTP(S) to the detection service.
pub fn validate_service_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid service url '{raw}'"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("service url must use http or https, got {other}")),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
