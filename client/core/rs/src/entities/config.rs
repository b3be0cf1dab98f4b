use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::logger::{LogConfig, LogLevel, StdioLogMode};

/// Environment overrides for [CoreConfig].
/// All variables carry the `REFACTOR_` prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct Env {
  /// Override `port`
  pub refactor_port: Option<u16>,
  /// Override `bind_ip`
  pub refactor_bind_ip: Option<String>,

  /// Override `jwt_secret`
  pub refactor_jwt_secret: Option<String>,

  /// Override `database.uri`
  pub refactor_database_uri: Option<String>,
  /// Override `database.address`
  pub refactor_database_address: Option<String>,
  /// Override `database.username`
  pub refactor_database_username: Option<String>,
  /// Override `database.password`
  pub refactor_database_password: Option<String>,
  /// Override `database.app_name`
  pub refactor_database_app_name: Option<String>,
  /// Override `database.db_name`
  pub refactor_database_db_name: Option<String>,

  /// Override `workspace_root`
  pub refactor_workspace_root: Option<PathBuf>,
  /// Override `container_image`
  pub refactor_container_image: Option<String>,
  /// Override `container_network`
  pub refactor_container_network: Option<String>,
  /// Override `container_cpus`
  pub refactor_container_cpus: Option<f64>,
  /// Override `container_memory`
  pub refactor_container_memory: Option<String>,
  /// Override `docker_bin`
  pub refactor_docker_bin: Option<String>,

  /// Override `clone_depth`
  pub refactor_clone_depth: Option<u64>,
  /// Override `clone_timeout_secs`
  pub refactor_clone_timeout_secs: Option<u64>,

  /// Override `agent_port`
  pub refactor_agent_port: Option<u16>,
  /// Override `agent_database_url`
  pub refactor_agent_database_url: Option<String>,
  /// Override `ai_provider`
  pub refactor_ai_provider: Option<String>,
  /// Override `ai_credentials_path`
  pub refactor_ai_credentials_path: Option<PathBuf>,

  /// Override `dev_mode`
  pub refactor_dev_mode: Option<bool>,
  /// Override `dev_agent_source`
  pub refactor_dev_agent_source: Option<PathBuf>,

  /// Override `files_max_depth`
  pub refactor_files_max_depth: Option<u64>,
  /// Override `files_max_bytes`
  pub refactor_files_max_bytes: Option<u64>,

  /// Override `logging.level`
  pub refactor_logging_level: Option<LogLevel>,
  /// Override `logging.stdio`
  pub refactor_logging_stdio: Option<StdioLogMode>,
  /// Override `logging.pretty`
  pub refactor_logging_pretty: Option<bool>,
  /// Override `logging.otlp_endpoint`
  pub refactor_logging_otlp_endpoint: Option<String>,
  /// Override `logging.opentelemetry_service_name`
  pub refactor_logging_opentelemetry_service_name: Option<String>,

  /// Override `ssl_enabled`
  pub refactor_ssl_enabled: Option<bool>,
  /// Override `ssl_key_file`
  pub refactor_ssl_key_file: Option<PathBuf>,
  /// Override `ssl_cert_file`
  pub refactor_ssl_cert_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
  /// Port the control plane listens on. Default: 9120
  #[serde(default = "default_core_port")]
  pub port: u16,

  /// IP to bind the server to. Default: `0.0.0.0`
  #[serde(default = "default_bind_ip")]
  pub bind_ip: String,

  /// Secret used to validate the bearer tokens issued by the auth
  /// service. When empty, a random secret is generated at startup
  /// (all externally issued tokens will fail to validate).
  #[serde(default)]
  pub jwt_secret: String,

  #[serde(default)]
  pub database: DatabaseConfig,

  /// Host directory holding the per-project workspaces.
  /// Default: `/var/lib/refactor/workspace`
  #[serde(default = "default_workspace_root")]
  pub workspace_root: PathBuf,

  /// Image every project container is created from.
  #[serde(default = "default_container_image")]
  pub container_image: String,

  /// Docker network shared by the control plane and the project
  /// containers. Agent hostnames resolve over this network.
  /// Default: `refactor`
  #[serde(default = "default_container_network")]
  pub container_network: String,

  /// CPU cap per project container. Default: 2.0
  #[serde(default = "default_container_cpus")]
  pub container_cpus: f64,

  /// Memory cap per project container, in docker syntax.
  /// Default: `4g`
  #[serde(default = "default_container_memory")]
  pub container_memory: String,

  /// Container CLI binary to invoke. Default: `docker`
  #[serde(default = "default_docker_bin")]
  pub docker_bin: String,

  /// --depth passed to git clone. Default: 1
  #[serde(default = "default_clone_depth")]
  pub clone_depth: u64,

  /// Timeout for the in-container git clone. Default: 300
  #[serde(default = "default_clone_timeout_secs")]
  pub clone_timeout_secs: u64,

  /// Port the in-container agent listens on. Default: 8000
  #[serde(default = "default_agent_port")]
  pub agent_port: u16,

  /// Connection string handed to the agent for its own persistent
  /// run state. The control plane never connects to it.
  #[serde(default)]
  pub agent_database_url: String,

  /// Upstream AI provider identity handed to the agent.
  /// Default: `anthropic`
  #[serde(default = "default_ai_provider")]
  pub ai_provider: String,

  /// Host path of a credentials file for the AI provider. Mounted
  /// read-only into every project container when set.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ai_credentials_path: Option<PathBuf>,

  /// Bind-mount a local agent source tree into new containers
  /// instead of the baked-in agent. Per-provision override
  /// available on the API.
  #[serde(default)]
  pub dev_mode: bool,

  /// Host path of the agent source tree for dev mode.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dev_agent_source: Option<PathBuf>,

  /// Max depth of the workspace file tree endpoint. Default: 6
  #[serde(default = "default_files_max_depth")]
  pub files_max_depth: u64,

  /// File content responses are truncated past this size.
  /// Default: 1 MiB
  #[serde(default = "default_files_max_bytes")]
  pub files_max_bytes: u64,

  #[serde(default)]
  pub logging: LogConfig,

  /// Serve over https.
  #[serde(default)]
  pub ssl_enabled: bool,

  #[serde(default = "default_ssl_key_file")]
  pub ssl_key_file: PathBuf,

  #[serde(default = "default_ssl_cert_file")]
  pub ssl_cert_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
  /// Full connection string. Takes precedence over the
  /// address / username / password fields.
  #[serde(default)]
  pub uri: String,
  /// Default: `localhost:27017`
  #[serde(default = "default_database_address")]
  pub address: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
  /// Default: `refactor_core`
  #[serde(default = "default_database_app_name")]
  pub app_name: String,
  /// Default: `refactor`
  #[serde(default = "default_database_db_name")]
  pub db_name: String,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      uri: Default::default(),
      address: default_database_address(),
      username: Default::default(),
      password: Default::default(),
      app_name: default_database_app_name(),
      db_name: default_database_db_name(),
    }
  }
}

impl Default for CoreConfig {
  fn default() -> Self {
    Self {
      port: default_core_port(),
      bind_ip: default_bind_ip(),
      jwt_secret: Default::default(),
      database: Default::default(),
      workspace_root: default_workspace_root(),
      container_image: default_container_image(),
      container_network: default_container_network(),
      container_cpus: default_container_cpus(),
      container_memory: default_container_memory(),
      docker_bin: default_docker_bin(),
      clone_depth: default_clone_depth(),
      clone_timeout_secs: default_clone_timeout_secs(),
      agent_port: default_agent_port(),
      agent_database_url: Default::default(),
      ai_provider: default_ai_provider(),
      ai_credentials_path: Default::default(),
      dev_mode: Default::default(),
      dev_agent_source: Default::default(),
      files_max_depth: default_files_max_depth(),
      files_max_bytes: default_files_max_bytes(),
      logging: Default::default(),
      ssl_enabled: Default::default(),
      ssl_key_file: default_ssl_key_file(),
      ssl_cert_file: default_ssl_cert_file(),
    }
  }
}

impl CoreConfig {
  /// Copy of the config with secrets masked, safe to print at
  /// startup.
  pub fn sanitized(&self) -> CoreConfig {
    let mut config = self.clone();
    config.jwt_secret = empty_or_redacted(&config.jwt_secret);
    config.database.uri = empty_or_redacted(&config.database.uri);
    config.database.password =
      empty_or_redacted(&config.database.password);
    config.agent_database_url =
      empty_or_redacted(&config.agent_database_url);
    config
  }
}

fn empty_or_redacted(value: &str) -> String {
  if value.is_empty() {
    String::new()
  } else {
    String::from("##############")
  }
}

fn default_core_port() -> u16 {
  9120
}

fn default_bind_ip() -> String {
  String::from("0.0.0.0")
}

fn default_workspace_root() -> PathBuf {
  PathBuf::from("/var/lib/refactor/workspace")
}

fn default_container_image() -> String {
  String::from("ghcr.io/refactor-sh/refactor-agent:latest")
}

fn default_container_network() -> String {
  String::from("refactor")
}

fn default_container_cpus() -> f64 {
  2.0
}

fn default_container_memory() -> String {
  String::from("4g")
}

fn default_docker_bin() -> String {
  String::from("docker")
}

fn default_clone_depth() -> u64 {
  1
}

fn default_clone_timeout_secs() -> u64 {
  300
}

fn default_agent_port() -> u16 {
  8000
}

fn default_ai_provider() -> String {
  String::from("anthropic")
}

fn default_files_max_depth() -> u64 {
  6
}

fn default_files_max_bytes() -> u64 {
  1024 * 1024
}

fn default_database_address() -> String {
  String::from("localhost:27017")
}

fn default_database_app_name() -> String {
  String::from("refactor_core")
}

fn default_database_db_name() -> String {
  String::from("refactor")
}

fn default_ssl_key_file() -> PathBuf {
  PathBuf::from("/config/ssl/key.pem")
}

fn default_ssl_cert_file() -> PathBuf {
  PathBuf::from("/config/ssl/cert.pem")
}
