use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn file_values_replace_defaults() {
    let mut settings = Settings::default();

    apply_file(
        &mut settings,
        r#"
service_url = "http://detector.lan:5000"
priority_classes = ["no_helmet", "no_vest"]
rtsp_streams = ["rtsp://10.0.0.4/stream1"]
auto_select_first_source = true
"#,
    )
    .expect("apply file");

    assert_eq!(settings.service_url, "http://detector.lan:5000");
    assert_eq!(settings.priority_classes, vec!["no_helmet", "no_vest"]);
    assert_eq!(settings.rtsp_streams, vec!["rtsp://10.0.0.4/stream1"]);
    assert!(settings.auto_select_first_source);
    assert_eq!(settings.local_devices, vec![0]);
    assert_eq!(settings.output_dir, PathBuf::from("./renders"));
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();

    assert!(apply_file(&mut settings, "server_bind = \"0.0.0.0\"").is_err());
}

#[test]
fn environment_overrides_file() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "service_url = \"http://from-file:5000\"").expect("apply file");

    apply_env(
        &mut settings,
        vars(&[
            ("APP__SERVICE_URL", "https://from-env"),
            ("APP__PRIORITY_CLASSES", "no_helmet, ,fire"),
            ("APP__LOCAL_DEVICES", "0,2"),
            ("APP__AUTO_SELECT_FIRST_SOURCE", "yes"),
            ("APP__OUTPUT_DIR", "/var/renders"),
        ]),
    )
    .expect("apply env");

    assert_eq!(settings.service_url, "https://from-env");
    assert_eq!(settings.priority_classes, vec!["no_helmet", "fire"]);
    assert_eq!(settings.local_devices, vec![0, 2]);
    assert!(settings.auto_select_first_source);
    assert_eq!(settings.output_dir, PathBuf::from("/var/renders"));
}

#[test]
fn malformed_environment_values_are_errors() {
    let mut settings = Settings::default();
    assert!(apply_env(&mut settings, vars(&[("APP__LOCAL_DEVICES", "zero")])).is_err());
    assert!(apply_env(
        &mut settings,
        vars(&[("APP__AUTO_SELECT_FIRST_SOURCE", "maybe")])
    )
    .is_err());
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("detect_cli_missing_{suffix}.toml"));

    let settings = load_settings(&path).expect("load");

    assert_eq!(settings.output_dir, Settings::default().output_dir);
}

#[test]
fn service_url_must_be_http() {
    assert!(validate_service_url("http://localhost:5000").is_ok());
    assert!(validate_service_url(" https://detect.example.com ").is_ok());
    assert!(validate_service_url("ws://localhost:5000").is_err());
    assert!(validate_service_url("localhost:5000").is_err());
}
