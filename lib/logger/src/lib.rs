use anyhow::Context;
use refactor_client::entities::logger::{LogConfig, StdioLogMode};
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

mod otel;

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let log_level: tracing::Level = config.level.into();
  let registry =
    Registry::default().with(LevelFilter::from(log_level));

  let use_otel = !config.otlp_endpoint.is_empty();

  match (config.stdio, use_otel) {
    (StdioLogMode::Standard, false) if config.pretty => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    (StdioLogMode::Json, false) => registry
      .with(tracing_subscriber::fmt::layer().json())
      .try_init(),
    (StdioLogMode::None, false) => Ok(()),

    (StdioLogMode::Standard, true) if config.pretty => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false),
      )
      .with(OpenTelemetryLayer::new(otel_tracer(config)))
      .try_init(),
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .with(OpenTelemetryLayer::new(otel_tracer(config)))
      .try_init(),
    (StdioLogMode::Json, true) => registry
      .with(tracing_subscriber::fmt::layer().json())
      .with(OpenTelemetryLayer::new(otel_tracer(config)))
      .try_init(),
    (StdioLogMode::None, true) => registry
      .with(OpenTelemetryLayer::new(otel_tracer(config)))
      .try_init(),
  }
  .context("failed to init logger")
}

fn otel_tracer(
  config: &LogConfig,
) -> opentelemetry_sdk::trace::Tracer {
  otel::tracer(
    &config.otlp_endpoint,
    config.opentelemetry_service_name.clone(),
  )
}
