//! Server configuration parsing and validation.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Interpreter launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InterpreterConfig {
    /// Interpreter binary, resolved through `PATH` when not absolute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments passed to the interpreter.
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,
    /// Token appended to every bookkeeping command; stdout lines carrying it
    /// are never forwarded to the client.
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_interpreter_args(),
            marker: default_marker(),
        }
    }
}

/// Fixed plot device dimensions in pixels.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PlotConfig {
    /// Device width.
    #[serde(default = "default_plot_edge")]
    pub width: u32,
    /// Device height.
    #[serde(default = "default_plot_edge")]
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_edge(),
            height: default_plot_edge(),
        }
    }
}

/// File names of the three named pipes inside each run directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipeNames {
    /// Plot image pipe.
    #[serde(default = "default_image_pipe")]
    pub image: String,
    /// Data frame snapshot pipe.
    #[serde(default = "default_dataframe_pipe")]
    pub dataframe: String,
    /// Data frame list pipe.
    #[serde(default = "default_dflist_pipe")]
    pub dflist: String,
}

impl Default for PipeNames {
    fn default() -> Self {
        Self {
            image: default_image_pipe(),
            dataframe: default_dataframe_pipe(),
            dflist: default_dflist_pipe(),
        }
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_ws_port() -> u16 {
    8080
}

fn default_static_port() -> u16 {
    8000
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("../R")
}

fn default_api_domain() -> String {
    "https://public-api.us-east-1.inindca.com".into()
}

fn default_inherit_env() -> Vec<String> {
    vec!["PATH".into(), "HOME".into(), "LANG".into()]
}

fn default_teardown_timeout_ms() -> u64 {
    5000
}

fn default_program() -> String {
    "R".into()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["--no-save".into(), "--interactive".into()]
}

fn default_marker() -> String {
    "#DataPirate".into()
}

fn default_plot_edge() -> u32 {
    1024
}

fn default_image_pipe() -> String {
    "plot.png".into()
}

fn default_dataframe_pipe() -> String {
    "dataframe.json".into()
}

fn default_dflist_pipe() -> String {
    "dflist.json".into()
}

/// Server configuration parsed from `config.toml`.
///
/// Every key is optional; [`ServerConfig::default`] matches an empty file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Address both listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// WebSocket listener port.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// Static file listener port.
    #[serde(default = "default_static_port")]
    pub static_port: u16,
    /// Client bundle directory. The static host is disabled when unset.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Directory whose files seed every run directory.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    /// Parent directory for run directories; the system temp dir when unset.
    #[serde(default)]
    pub run_root: Option<PathBuf>,
    /// Value injected into the interpreter environment as `APIDOMAIN`.
    #[serde(default = "default_api_domain")]
    pub api_domain: String,
    /// Server environment variables copied into the interpreter environment.
    #[serde(default = "default_inherit_env")]
    pub inherit_env: Vec<String>,
    /// Upper bound on reaping a killed interpreter, in milliseconds.
    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,
    /// Interpreter launch settings.
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    /// Plot device dimensions.
    #[serde(default)]
    pub plot: PlotConfig,
    /// Named pipe file names.
    #[serde(default)]
    pub pipes: PipeNames,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_port: default_ws_port(),
            static_port: default_static_port(),
            static_dir: None,
            template_dir: default_template_dir(),
            run_root: None,
            api_domain: default_api_domain(),
            inherit_env: default_inherit_env(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
            interpreter: InterpreterConfig::default(),
            plot: PlotConfig::default(),
            pipes: PipeNames::default(),
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read_from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file without validating it, so overrides can
    /// be applied before [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::parse(&raw)
    }

    /// Parse a TOML string without validating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on invalid TOML or mistyped keys.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config = Self::parse(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address of the WebSocket listener.
    #[must_use]
    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.ws_port)
    }

    /// Socket address of the static file listener.
    #[must_use]
    pub fn static_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.static_port)
    }

    /// Teardown reap bound as a [`Duration`].
    #[must_use]
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Re-run validation, e.g. after CLI overrides were applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid setting.
    pub fn validate(&mut self) -> Result<()> {
        if self.interpreter.program.trim().is_empty() {
            return Err(AppError::Config(
                "interpreter.program must not be empty".into(),
            ));
        }

        if self.interpreter.marker.trim().is_empty() {
            return Err(AppError::Config(
                "interpreter.marker must not be empty".into(),
            ));
        }

        if self.plot.width == 0 || self.plot.height == 0 {
            return Err(AppError::Config(
                "plot width and height must be greater than zero".into(),
            ));
        }

        let names = [&self.pipes.image, &self.pipes.dataframe, &self.pipes.dflist];
        for name in names {
            if !is_plain_file_name(name) {
                return Err(AppError::Config(format!(
                    "pipe name '{name}' must be a plain file name"
                )));
            }
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(AppError::Config("pipe names must be distinct".into()));
        }

        let canonical = self.template_dir.canonicalize().map_err(|err| {
            AppError::Config(format!(
                "template_dir '{}' invalid: {err}",
                self.template_dir.display()
            ))
        })?;
        self.template_dir = canonical;

        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('"')
}
