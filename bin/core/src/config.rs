use std::sync::OnceLock;

use colored::Colorize;
use refactor_client::entities::{
  config::{CoreConfig, DatabaseConfig, Env},
  logger::LogConfig,
};

pub fn core_config() -> &'static CoreConfig {
  static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| {
    let env: Env = match envy::from_env() {
      Ok(env) => env,
      Err(e) => {
        println!(
          "{}: Failed to parse Refactor Core environment",
          "ERROR".red()
        );
        panic!("{e:?}");
      }
    };
    let config = CoreConfig::default();

    // Env overrides applied over the defaults.
    CoreConfig {
      port: env.refactor_port.unwrap_or(config.port),
      bind_ip: env.refactor_bind_ip.unwrap_or(config.bind_ip),
      jwt_secret: env
        .refactor_jwt_secret
        .unwrap_or(config.jwt_secret),
      database: DatabaseConfig {
        uri: env
          .refactor_database_uri
          .unwrap_or(config.database.uri),
        address: env
          .refactor_database_address
          .unwrap_or(config.database.address),
        username: env
          .refactor_database_username
          .unwrap_or(config.database.username),
        password: env
          .refactor_database_password
          .unwrap_or(config.database.password),
        app_name: env
          .refactor_database_app_name
          .unwrap_or(config.database.app_name),
        db_name: env
          .refactor_database_db_name
          .unwrap_or(config.database.db_name),
      },
      workspace_root: env
        .refactor_workspace_root
        .unwrap_or(config.workspace_root),
      container_image: env
        .refactor_container_image
        .unwrap_or(config.container_image),
      container_network: env
        .refactor_container_network
        .unwrap_or(config.container_network),
      container_cpus: env
        .refactor_container_cpus
        .unwrap_or(config.container_cpus),
      container_memory: env
        .refactor_container_memory
        .unwrap_or(config.container_memory),
      docker_bin: env
        .refactor_docker_bin
        .unwrap_or(config.docker_bin),
      clone_depth: env
        .refactor_clone_depth
        .unwrap_or(config.clone_depth),
      clone_timeout_secs: env
        .refactor_clone_timeout_secs
        .unwrap_or(config.clone_timeout_secs),
      agent_port: env
        .refactor_agent_port
        .unwrap_or(config.agent_port),
      agent_database_url: env
        .refactor_agent_database_url
        .unwrap_or(config.agent_database_url),
      ai_provider: env
        .refactor_ai_provider
        .unwrap_or(config.ai_provider),
      ai_credentials_path: env
        .refactor_ai_credentials_path
        .or(config.ai_credentials_path),
      dev_mode: env.refactor_dev_mode.unwrap_or(config.dev_mode),
      dev_agent_source: env
        .refactor_dev_agent_source
        .or(config.dev_agent_source),
      files_max_depth: env
        .refactor_files_max_depth
        .unwrap_or(config.files_max_depth),
      files_max_bytes: env
        .refactor_files_max_bytes
        .unwrap_or(config.files_max_bytes),
      logging: LogConfig {
        level: env
          .refactor_logging_level
          .unwrap_or(config.logging.level),
        stdio: env
          .refactor_logging_stdio
          .unwrap_or(config.logging.stdio),
        pretty: env
          .refactor_logging_pretty
          .unwrap_or(config.logging.pretty),
        otlp_endpoint: env
          .refactor_logging_otlp_endpoint
          .unwrap_or(config.logging.otlp_endpoint),
        opentelemetry_service_name: env
          .refactor_logging_opentelemetry_service_name
          .unwrap_or(config.logging.opentelemetry_service_name),
      },
      ssl_enabled: env
        .refactor_ssl_enabled
        .unwrap_or(config.ssl_enabled),
      ssl_key_file: env
        .refactor_ssl_key_file
        .unwrap_or(config.ssl_key_file),
      ssl_cert_file: env
        .refactor_ssl_cert_file
        .unwrap_or(config.ssl_cert_file),
    }
  })
}
