//! Read-only workspace browsing, implemented over container exec.

use std::time::Duration;

use anyhow::anyhow;
use axum::{
  Extension,
  extract::{Path, Query},
};
use refactor_client::{
  api::{FileContentQuery, FileContentResponse, FsNode, FsNodeType},
  entities::{
    container_name, project::ProjectStatus, user::User,
  },
};
use reqwest::StatusCode;
use serror::AddStatusCodeError;

use crate::{
  config::core_config,
  docker,
  helpers::{query::get_check_ownership, workspace},
  project,
};

const EXEC_TIMEOUT: Duration = Duration::from_secs(5);

const BROWSE_FROM: &[ProjectStatus] =
  &[ProjectStatus::Ready, ProjectStatus::Running];

#[instrument(name = "GetFileTree", skip_all)]
pub async fn tree(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> serror::Result<axum::Json<FsNode>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, BROWSE_FROM)?;

  let find = format!(
    "find {} -maxdepth {} -printf '%y %p\\n'",
    workspace::CONTAINER_WORKSPACE,
    core_config().files_max_depth,
  );
  let argv =
    vec![String::from("sh"), String::from("-c"), find];
  let output = docker::exec(
    &container_name(&project.id),
    &argv,
    None,
    EXEC_TIMEOUT,
  )
  .await
  .map_err(anyhow::Error::from)?;
  if !output.success() {
    return Err(
      anyhow!(
        "failed to walk workspace: {}",
        output.stderr.trim()
      )
      .into(),
    );
  }
  Ok(axum::Json(parse_tree(&output.stdout)))
}

#[instrument(name = "GetFileContent", skip_all)]
pub async fn content(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Query(FileContentQuery { path }): Query<FileContentQuery>,
) -> serror::Result<axum::Json<FileContentResponse>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, BROWSE_FROM)?;

  let absolute =
    sanitize::workspace_path(workspace::CONTAINER_WORKSPACE, &path)
      .map_err(|e| {
        anyhow::Error::from(e)
          .status_code(StatusCode::BAD_REQUEST)
      })?;
  let argv = vec![String::from("cat"), absolute];
  let output = docker::exec(
    &container_name(&project.id),
    &argv,
    None,
    EXEC_TIMEOUT,
  )
  .await
  .map_err(anyhow::Error::from)?;
  if !output.success() {
    return Err(
      anyhow!(
        "failed to read {path}: {}",
        output.stderr.trim()
      )
      .status_code(StatusCode::NOT_FOUND),
    );
  }

  let cap = core_config().files_max_bytes as usize;
  let mut content = output.stdout;
  let truncated = content.len() > cap;
  if truncated {
    let mut end = cap;
    while !content.is_char_boundary(end) {
      end -= 1;
    }
    content.truncate(end);
  }
  Ok(axum::Json(FileContentResponse { content, truncated }))
}

/// Assembles the nested tree out of `find -printf '%y %p\n'`
/// output. Paths are exposed relative to the workspace root.
fn parse_tree(output: &str) -> FsNode {
  let mut root = FsNode {
    kind: FsNodeType::Directory,
    name: String::from("workspace"),
    path: String::new(),
    children: Some(Vec::new()),
  };
  for line in output.lines() {
    let Some((kind, path)) = line.split_once(' ') else {
      continue;
    };
    let kind = match kind {
      "d" => FsNodeType::Directory,
      "f" => FsNodeType::File,
      // Sockets, devices and links are not exposed.
      _ => continue,
    };
    let Some(rel) =
      path.strip_prefix(workspace::CONTAINER_WORKSPACE)
    else {
      continue;
    };
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
      // The workspace root itself.
      continue;
    }
    insert_node(&mut root, rel, kind);
  }
  root
}

/// Find emits parents before children, but intermediate directories
/// are still created on demand in case the walk was depth-cut.
fn insert_node(root: &mut FsNode, rel: &str, kind: FsNodeType) {
  let segments = rel.split('/').collect::<Vec<_>>();
  let Some((leaf, parents)) = segments.split_last() else {
    return;
  };
  let mut node = root;
  let mut prefix = String::new();
  for segment in parents {
    if !prefix.is_empty() {
      prefix.push('/');
    }
    prefix.push_str(segment);
    let children = node.children.get_or_insert_with(Vec::new);
    let idx = match children.iter().position(|child| {
      child.name == *segment && child.kind == FsNodeType::Directory
    }) {
      Some(idx) => idx,
      None => {
        children.push(FsNode {
          kind: FsNodeType::Directory,
          name: segment.to_string(),
          path: prefix.clone(),
          children: Some(Vec::new()),
        });
        children.len() - 1
      }
    };
    node = &mut children[idx];
  }
  let children = node.children.get_or_insert_with(Vec::new);
  if !children.iter().any(|child| child.name == *leaf) {
    children.push(FsNode {
      kind,
      name: leaf.to_string(),
      path: rel.to_string(),
      children: matches!(kind, FsNodeType::Directory)
        .then(Vec::new),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_a_nested_tree_from_find_output() {
    let output = "\
d /workspace
d /workspace/repo
f /workspace/repo/Cargo.toml
d /workspace/repo/src
f /workspace/repo/src/main.rs
d /workspace/artifacts
";
    let tree = parse_tree(output);
    assert_eq!(tree.name, "workspace");
    let children = tree.children.as_ref().unwrap();
    assert_eq!(children.len(), 2);

    let repo = &children[0];
    assert_eq!(repo.name, "repo");
    assert_eq!(repo.kind, FsNodeType::Directory);
    let repo_children = repo.children.as_ref().unwrap();
    assert_eq!(repo_children[0].name, "Cargo.toml");
    assert_eq!(repo_children[0].kind, FsNodeType::File);
    assert_eq!(repo_children[0].path, "repo/Cargo.toml");

    let src = &repo_children[1];
    assert_eq!(src.name, "src");
    assert_eq!(
      src.children.as_ref().unwrap()[0].path,
      "repo/src/main.rs"
    );

    assert_eq!(children[1].name, "artifacts");
  }

  #[test]
  fn orphaned_entries_get_intermediate_directories() {
    // Depth-cut walks can surface a file whose parent line was
    // filtered out.
    let tree = parse_tree("f /workspace/repo/deep/file.rs\n");
    let repo = &tree.children.as_ref().unwrap()[0];
    assert_eq!(repo.kind, FsNodeType::Directory);
    let deep = &repo.children.as_ref().unwrap()[0];
    assert_eq!(deep.kind, FsNodeType::Directory);
    assert_eq!(deep.path, "repo/deep");
    assert_eq!(
      deep.children.as_ref().unwrap()[0].name,
      "file.rs"
    );
  }

  #[test]
  fn non_file_entries_are_skipped() {
    let tree = parse_tree(
      "l /workspace/link\nf /workspace/kept.txt\n",
    );
    let children = tree.children.as_ref().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "kept.txt");
  }
}
