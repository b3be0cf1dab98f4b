//! Per-project host directory tree and its container mount points.
//!
//! Every project owns `<workspace_root>/<project_id>/` with `repo/`
//! (working tree) and `artifacts/` (agent outputs). No operation
//! ever writes outside a project's own subtree.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// In-container mount points.
pub const CONTAINER_WORKSPACE: &str = "/workspace";
pub const CONTAINER_REPO: &str = "/workspace/repo";
pub const CONTAINER_ARTIFACTS: &str = "/workspace/artifacts";
/// Read-only AI provider credentials, when configured.
pub const CONTAINER_CREDENTIALS: &str = "/credentials/ai";
/// Dev-mode live mount of the agent source tree.
pub const CONTAINER_AGENT_SOURCE: &str = "/app";

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
  pub root: PathBuf,
  pub repo: PathBuf,
  pub artifacts: PathBuf,
}

pub fn paths(
  workspace_root: &Path,
  project_id: &str,
) -> WorkspacePaths {
  let root = workspace_root.join(project_id);
  WorkspacePaths {
    repo: root.join("repo"),
    artifacts: root.join("artifacts"),
    root,
  }
}

pub async fn ensure(
  workspace_root: &Path,
  project_id: &str,
) -> anyhow::Result<WorkspacePaths> {
  let paths = paths(workspace_root, project_id);
  tokio::fs::create_dir_all(&paths.repo)
    .await
    .with_context(|| {
      format!("failed to create {}", paths.repo.display())
    })?;
  tokio::fs::create_dir_all(&paths.artifacts)
    .await
    .with_context(|| {
      format!("failed to create {}", paths.artifacts.display())
    })?;
  Ok(paths)
}

/// Recursive removal of the project subtree. Callers treat failure
/// as non-fatal and log it.
pub async fn remove(
  workspace_root: &Path,
  project_id: &str,
) -> anyhow::Result<()> {
  let paths = paths(workspace_root, project_id);
  match tokio::fs::remove_dir_all(&paths.root).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e).with_context(|| {
      format!("failed to remove {}", paths.root.display())
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn ensure_creates_the_full_tree() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ensure(dir.path(), "proj1").await.unwrap();
    assert!(paths.repo.is_dir());
    assert!(paths.artifacts.is_dir());
    assert!(paths.root.starts_with(dir.path()));
  }

  #[tokio::test]
  async fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    ensure(dir.path(), "proj1").await.unwrap();
    remove(dir.path(), "proj1").await.unwrap();
    assert!(!dir.path().join("proj1").exists());
    // Second removal of a missing tree is fine.
    remove(dir.path(), "proj1").await.unwrap();
  }
}
