use data_playground::{AppError, ServerConfig};

fn template() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

fn full_toml(template: &str) -> String {
    format!(
        r##"
bind_address = "127.0.0.1"
ws_port = 9080
static_port = 9000
static_dir = "public"
template_dir = '{template}'
api_domain = "https://api.example.test"
inherit_env = ["PATH"]
teardown_timeout_ms = 750

[interpreter]
program = "Rscript"
args = ["--vanilla"]
marker = "#Bookkeeping"

[plot]
width = 800
height = 600

[pipes]
image = "img.png"
dataframe = "frame.json"
dflist = "frames.json"
"##
    )
}

#[test]
fn parses_every_key() {
    let dir = template();
    let config =
        ServerConfig::from_toml_str(&full_toml(dir.path().to_str().unwrap())).expect("valid");

    assert_eq!(config.ws_addr().to_string(), "127.0.0.1:9080");
    assert_eq!(config.static_addr().to_string(), "127.0.0.1:9000");
    assert_eq!(config.api_domain, "https://api.example.test");
    assert_eq!(config.inherit_env, vec!["PATH".to_owned()]);
    assert_eq!(config.teardown_timeout().as_millis(), 750);
    assert_eq!(config.interpreter.program, "Rscript");
    assert_eq!(config.interpreter.marker, "#Bookkeeping");
    assert_eq!((config.plot.width, config.plot.height), (800, 600));
    assert_eq!(config.pipes.dflist, "frames.json");
    assert_eq!(config.template_dir, dir.path().canonicalize().unwrap());
}

#[test]
fn minimal_file_uses_defaults() {
    let dir = template();
    let raw = format!("template_dir = '{}'", dir.path().display());
    let config = ServerConfig::from_toml_str(&raw).expect("valid");

    assert_eq!(config.ws_port, 8080);
    assert_eq!(config.static_port, 8000);
    assert!(config.static_dir.is_none());
    assert_eq!(config.interpreter.program, "R");
    assert_eq!(config.interpreter.args, vec!["--no-save", "--interactive"]);
    assert_eq!(config.interpreter.marker, "#DataPirate");
    assert_eq!((config.plot.width, config.plot.height), (1024, 1024));
    assert_eq!(config.pipes.image, "plot.png");
    assert_eq!(config.pipes.dataframe, "dataframe.json");
    assert_eq!(config.api_domain, "https://public-api.us-east-1.inindca.com");
}

#[test]
fn missing_template_dir_is_rejected() {
    let result = ServerConfig::from_toml_str("template_dir = '/definitely/not/here'");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("template_dir")));
}

#[test]
fn pipe_names_must_be_plain_and_distinct() {
    let dir = template();
    let root = dir.path().display().to_string();

    let nested = format!("template_dir = '{root}'\n[pipes]\nimage = \"sub/plot.png\"");
    assert!(matches!(
        ServerConfig::from_toml_str(&nested),
        Err(AppError::Config(_))
    ));

    let clash = format!("template_dir = '{root}'\n[pipes]\ndataframe = \"dflist.json\"");
    assert!(matches!(
        ServerConfig::from_toml_str(&clash),
        Err(AppError::Config(msg)) if msg.contains("distinct")
    ));
}

#[test]
fn zero_plot_size_is_rejected() {
    let dir = template();
    let raw = format!(
        "template_dir = '{}'\n[plot]\nwidth = 0",
        dir.path().display()
    );
    assert!(matches!(
        ServerConfig::from_toml_str(&raw),
        Err(AppError::Config(_))
    ));
}

#[test]
fn invalid_toml_maps_to_config_error() {
    let err = ServerConfig::from_toml_str("ws_port = \"not a number\"").unwrap_err();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn read_from_path_defers_validation_until_overrides_are_applied() {
    let file_dir = template();
    let path = file_dir.path().join("config.toml");
    std::fs::write(&path, "template_dir = '/definitely/not/here'\nws_port = 9090\n").unwrap();

    assert!(matches!(
        ServerConfig::load_from_path(&path),
        Err(AppError::Config(msg)) if msg.contains("template_dir")
    ));

    let mut config = ServerConfig::read_from_path(&path).expect("parses without validating");
    assert_eq!(config.ws_port, 9090);

    let real_template = template();
    config.template_dir = real_template.path().to_path_buf();
    config.validate().expect("valid after override");
    assert_eq!(
        config.template_dir,
        real_template.path().canonicalize().unwrap()
    );
}

#[test]
fn load_from_path_reports_unreadable_files() {
    let err = ServerConfig::load_from_path("/definitely/not/a/config.toml").unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("failed to read config")));
}
