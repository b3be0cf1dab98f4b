//! Thin typed wrapper around the host container CLI.
//!
//! Every operation is exactly one invocation of the configured
//! container binary (default `docker`), spawned with an argument
//! vector through the command crate. Nothing here goes through a
//! shell, and client-derived strings only arrive pre-validated by
//! the sanitize crate.

use std::{
  path::Path,
  pin::Pin,
  process::Stdio,
  task::{Context as TaskContext, Poll},
  time::Duration,
};

use anyhow::{Context, anyhow};
use command::CommandOutput;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

use crate::config::core_config;

fn docker_bin() -> &'static str {
  &core_config().docker_bin
}

/// Everything `create` needs to assemble a project container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
  pub name: String,
  pub image: String,
  pub network: String,
  pub env: Vec<(String, String)>,
  pub mounts: Vec<Mount>,
  pub cpus: f64,
  pub memory: String,
}

#[derive(Debug, Clone)]
pub struct Mount {
  pub host: String,
  pub container: String,
  pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContainerState {
  Running,
  Exited,
  /// The runtime does not know the container. Not an error,
  /// see the reconciliation rule on project reads.
  #[default]
  Missing,
  Other(String),
}

impl ContainerState {
  pub fn as_str(&self) -> &str {
    match self {
      ContainerState::Running => "running",
      ContainerState::Exited => "exited",
      ContainerState::Missing => "not_found",
      ContainerState::Other(state) => state,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerInspect {
  pub state: ContainerState,
  pub name: Option<String>,
  pub image: Option<String>,
}

/// Creates the container without starting it.
/// Returns the runtime container id.
#[instrument(level = "debug", skip(spec), fields(name = %spec.name))]
pub async fn create(spec: &ContainerSpec) -> anyhow::Result<String> {
  let output = command::run(docker_bin(), &create_args(spec))
    .await
    .context("failed to invoke container create")?;
  if !output.success() {
    return Err(anyhow!(
      "container create failed: {}",
      output.stderr.trim()
    ));
  }
  Ok(output.stdout.trim().to_string())
}

#[instrument(level = "debug")]
pub async fn start(container: &str) -> anyhow::Result<()> {
  simple(&["start", container], "container start").await
}

/// Graceful signal first, hard kill after `timeout_secs`.
#[instrument(level = "debug")]
pub async fn stop(
  container: &str,
  timeout_secs: u64,
) -> anyhow::Result<()> {
  simple(
    &["stop", "--time", &timeout_secs.to_string(), container],
    "container stop",
  )
  .await
}

#[instrument(level = "debug")]
pub async fn remove(
  container: &str,
  force: bool,
) -> anyhow::Result<()> {
  if force {
    simple(&["rm", "--force", container], "container remove").await
  } else {
    simple(&["rm", container], "container remove").await
  }
}

#[instrument(level = "debug")]
pub async fn inspect(
  container: &str,
) -> anyhow::Result<ContainerInspect> {
  let args =
    vec![String::from("inspect"), container.to_string()];
  let output = command::run(docker_bin(), &args)
    .await
    .context("failed to invoke container inspect")?;
  if !output.success() {
    if is_missing(&output.stderr) {
      return Ok(ContainerInspect::default());
    }
    return Err(anyhow!(
      "container inspect failed: {}",
      output.stderr.trim()
    ));
  }
  parse_inspect(&output.stdout)
}

/// Runs `argv` inside the container. Direct spawn of the target
/// argv, no in-container shell.
#[instrument(level = "debug", skip(argv))]
pub async fn exec(
  container: &str,
  argv: &[String],
  workdir: Option<&str>,
  timeout: Duration,
) -> Result<CommandOutput, command::Error> {
  command::run_with_timeout(
    docker_bin(),
    &exec_args(container, argv, workdir),
    timeout,
  )
  .await
}

/// Copy a file from the host into a stopped or running container.
/// Part of the driver surface alongside the mounts, no service
/// operation drives it right now.
#[allow(dead_code)]
#[instrument(level = "debug")]
pub async fn cp_to(
  container: &str,
  host_path: &Path,
  container_path: &str,
) -> anyhow::Result<()> {
  let args = vec![
    String::from("cp"),
    host_path.display().to_string(),
    format!("{container}:{container_path}"),
  ];
  let output = command::run(docker_bin(), &args)
    .await
    .context("failed to invoke container cp")?;
  if !output.success() {
    return Err(anyhow!(
      "container cp failed: {}",
      output.stderr.trim()
    ));
  }
  Ok(())
}

/// Follows the container's combined stdout / stderr, starting with
/// the last `tail` lines. The underlying CLI process is killed when
/// the stream is dropped, and the stream ends when the container
/// exits (or immediately after the tail when `follow` is false).
pub fn logs(
  container: &str,
  tail: u64,
  follow: bool,
) -> anyhow::Result<LogStream> {
  let mut args = vec![
    String::from("logs"),
    String::from("--tail"),
    tail.to_string(),
  ];
  if follow {
    args.push(String::from("--follow"));
  }
  args.push(container.to_string());

  let mut child = Command::new(docker_bin())
    .args(&args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .context("failed to spawn container logs")?;
  let stdout = child
    .stdout
    .take()
    .context("container logs stdout not captured")?;
  let stderr = child
    .stderr
    .take()
    .context("container logs stderr not captured")?;

  // Interleaved as they arrive. Ordering within each of stdout /
  // stderr is preserved.
  let lines =
    futures::stream::select(lossy_lines(stdout), lossy_lines(stderr));
  Ok(LogStream {
    _child: child,
    inner: Box::pin(lines),
  })
}

/// One line of container output per item, invalid utf-8 replaced.
pub struct LogStream {
  // Held so kill_on_drop fires when the stream is dropped.
  _child: Child,
  inner: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl Stream for LogStream {
  type Item = String;

  fn poll_next(
    self: Pin<&mut Self>,
    cx: &mut TaskContext<'_>,
  ) -> Poll<Option<String>> {
    self.get_mut().inner.as_mut().poll_next(cx)
  }
}

fn lossy_lines(
  reader: impl tokio::io::AsyncRead + Send + 'static,
) -> Pin<Box<dyn Stream<Item = String> + Send>> {
  let framed = FramedRead::new(
    reader,
    AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new()),
  );
  Box::pin(framed.filter_map(|res| async move {
    res.ok().map(|bytes| {
      String::from_utf8_lossy(&bytes)
        .trim_end_matches('\r')
        .to_string()
    })
  }))
}

async fn simple(
  args: &[&str],
  operation: &str,
) -> anyhow::Result<()> {
  let args =
    args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
  let output = command::run(docker_bin(), &args)
    .await
    .with_context(|| format!("failed to invoke {operation}"))?;
  if !output.success() {
    return Err(anyhow!(
      "{operation} failed: {}",
      output.stderr.trim()
    ));
  }
  Ok(())
}

fn create_args(spec: &ContainerSpec) -> Vec<String> {
  let mut args = vec![
    String::from("create"),
    String::from("--name"),
    spec.name.clone(),
    String::from("--network"),
    spec.network.clone(),
    String::from("--cpus"),
    spec.cpus.to_string(),
    String::from("--memory"),
    spec.memory.clone(),
  ];
  for (key, value) in &spec.env {
    args.push(String::from("--env"));
    args.push(format!("{key}={value}"));
  }
  for mount in &spec.mounts {
    let mode = if mount.read_only { "ro" } else { "rw" };
    args.push(String::from("--volume"));
    args.push(format!("{}:{}:{mode}", mount.host, mount.container));
  }
  args.push(spec.image.clone());
  args
}

fn exec_args(
  container: &str,
  argv: &[String],
  workdir: Option<&str>,
) -> Vec<String> {
  let mut args = vec![String::from("exec")];
  if let Some(workdir) = workdir {
    args.push(String::from("--workdir"));
    args.push(workdir.to_string());
  }
  args.push(container.to_string());
  args.extend(argv.iter().cloned());
  args
}

fn is_missing(stderr: &str) -> bool {
  stderr.contains("No such object")
    || stderr.contains("No such container")
}

#[derive(Deserialize)]
struct InspectRaw {
  #[serde(rename = "Name")]
  name: Option<String>,
  #[serde(rename = "State")]
  state: Option<InspectStateRaw>,
  #[serde(rename = "Config")]
  config: Option<InspectConfigRaw>,
}

#[derive(Deserialize)]
struct InspectStateRaw {
  #[serde(rename = "Status")]
  status: Option<String>,
}

#[derive(Deserialize)]
struct InspectConfigRaw {
  #[serde(rename = "Image")]
  image: Option<String>,
}

fn parse_inspect(stdout: &str) -> anyhow::Result<ContainerInspect> {
  let entries: Vec<InspectRaw> = serde_json::from_str(stdout)
    .context("failed to parse container inspect output")?;
  let Some(raw) = entries.into_iter().next() else {
    return Ok(ContainerInspect::default());
  };
  let state = match raw.state.and_then(|state| state.status) {
    Some(status) if status == "running" => ContainerState::Running,
    Some(status) if status == "exited" => ContainerState::Exited,
    Some(status) => ContainerState::Other(status),
    None => ContainerState::Missing,
  };
  Ok(ContainerInspect {
    state,
    name: raw
      .name
      .map(|name| name.trim_start_matches('/').to_string()),
    image: raw.config.and_then(|config| config.image),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_args_carry_caps_env_and_mounts() {
    let spec = ContainerSpec {
      name: String::from("refactor-project-abc"),
      image: String::from("refactor-agent:latest"),
      network: String::from("refactor"),
      env: vec![(String::from("PROJECT_ID"), String::from("abc"))],
      mounts: vec![
        Mount {
          host: String::from("/srv/ws/abc/repo"),
          container: String::from("/workspace/repo"),
          read_only: false,
        },
        Mount {
          host: String::from("/etc/refactor/creds"),
          container: String::from("/credentials/ai"),
          read_only: true,
        },
      ],
      cpus: 2.0,
      memory: String::from("4g"),
    };
    let args = create_args(&spec);
    let has_pair = |pair: [&str; 2]| {
      args.windows(2).any(|w| w == pair.as_slice())
    };
    assert_eq!(args[0], "create");
    assert!(has_pair(["--name", "refactor-project-abc"]));
    assert!(has_pair(["--cpus", "2"]));
    assert!(has_pair(["--memory", "4g"]));
    assert!(has_pair(["--env", "PROJECT_ID=abc"]));
    assert!(has_pair([
      "--volume",
      "/srv/ws/abc/repo:/workspace/repo:rw",
    ]));
    assert!(has_pair([
      "--volume",
      "/etc/refactor/creds:/credentials/ai:ro",
    ]));
    // The image is the final argument, the container runs its
    // baked-in entrypoint.
    assert_eq!(args.last().unwrap(), "refactor-agent:latest");
  }

  #[test]
  fn exec_args_append_argv_verbatim() {
    let argv = vec![
      String::from("git"),
      String::from("clone"),
      String::from("https://github.com/owner/repo.git"),
    ];
    let args = exec_args("refactor-project-abc", &argv, Some("/workspace"));
    assert_eq!(
      args,
      [
        "exec",
        "--workdir",
        "/workspace",
        "refactor-project-abc",
        "git",
        "clone",
        "https://github.com/owner/repo.git",
      ]
    );
  }

  #[test]
  fn parses_running_inspect_output() {
    let stdout = r#"[{
      "Name": "/refactor-project-abc",
      "State": { "Status": "running" },
      "Config": { "Image": "refactor-agent:latest" }
    }]"#;
    let inspect = parse_inspect(stdout).unwrap();
    assert_eq!(inspect.state, ContainerState::Running);
    assert_eq!(
      inspect.name.as_deref(),
      Some("refactor-project-abc")
    );
    assert_eq!(
      inspect.image.as_deref(),
      Some("refactor-agent:latest")
    );
  }

  #[test]
  fn parses_exited_and_unknown_states() {
    let exited =
      r#"[{ "State": { "Status": "exited" } }]"#;
    assert_eq!(
      parse_inspect(exited).unwrap().state,
      ContainerState::Exited
    );
    let paused =
      r#"[{ "State": { "Status": "paused" } }]"#;
    assert_eq!(
      parse_inspect(paused).unwrap().state,
      ContainerState::Other(String::from("paused"))
    );
  }

  #[test]
  fn empty_inspect_output_is_missing() {
    let inspect = parse_inspect("[]").unwrap();
    assert_eq!(inspect.state, ContainerState::Missing);
    assert_eq!(inspect.state.as_str(), "not_found");
  }

  #[test]
  fn missing_container_stderr_is_recognized() {
    assert!(is_missing(
      "Error: No such object: refactor-project-abc"
    ));
    assert!(is_missing(
      "Error response from daemon: No such container: x"
    ));
    assert!(!is_missing("permission denied"));
  }
}
