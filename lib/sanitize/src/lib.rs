//! Validation for every client string that ends up in container CLI
//! argv or addresses files under the container workspace.
//!
//! The container CLI is always invoked with an argument vector, so a
//! metacharacter could not change command structure even if it got
//! through. These checks reject such strings anyway, before any
//! process is spawned, and bound paths to the workspace subtree.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  #[error("invalid git url: {0}")]
  InvalidGitUrl(String),
  #[error("invalid branch: {0}")]
  InvalidBranch(String),
  #[error("invalid path: {0}")]
  InvalidPath(String),
}

/// Characters which could alter command structure if a string ever
/// reached a shell.
pub const SHELL_METACHARACTERS: &[char] = &[
  ';', '&', '|', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>',
  '!', '\n', '\r', '\'', '"', '\\',
];

fn https_url_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^https://[A-Za-z0-9.-]+/[A-Za-z0-9._/\-]+(\.git)?$")
      .expect("invalid https url regex")
  })
}

fn ssh_url_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^git@[A-Za-z0-9.-]+:[A-Za-z0-9._/\-]+(\.git)?$")
      .expect("invalid ssh url regex")
  })
}

fn branch_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^[A-Za-z0-9._/\-]{1,255}$")
      .expect("invalid branch regex")
  })
}

/// Accepts `https://<host>/<path>` and `git@<host>:<path>` remotes,
/// nothing else.
pub fn git_url(url: &str) -> Result<&str, Error> {
  if let Some(c) = url.chars().find(|c| {
    SHELL_METACHARACTERS.contains(c) || c.is_whitespace()
  }) {
    return Err(Error::InvalidGitUrl(format!(
      "illegal character {c:?}"
    )));
  }
  if https_url_regex().is_match(url) || ssh_url_regex().is_match(url)
  {
    Ok(url)
  } else {
    Err(Error::InvalidGitUrl(String::from(
      "expected https://<host>/<path> or git@<host>:<path>",
    )))
  }
}

pub fn branch(name: &str) -> Result<&str, Error> {
  if !branch_regex().is_match(name) {
    return Err(Error::InvalidBranch(String::from(
      "branch must match [A-Za-z0-9._/-], 1 to 255 characters",
    )));
  }
  if name.starts_with('-') {
    return Err(Error::InvalidBranch(String::from(
      "branch must not begin with '-'",
    )));
  }
  if name.contains("..") {
    return Err(Error::InvalidBranch(String::from(
      "branch must not contain '..'",
    )));
  }
  if name.ends_with('/') || name.ends_with('.') {
    return Err(Error::InvalidBranch(String::from(
      "branch must not end with '/' or '.'",
    )));
  }
  Ok(name)
}

/// Validates a client supplied relative path for reads under the
/// container workspace, and returns it normalized
/// (no `.` segments, no empty segments).
///
/// The input is percent-decoded exactly once. Double-encoded
/// traversal (`%252e%252e`) therefore decodes to the literal
/// `%2e%2e`, which the substring check still rejects.
pub fn relative_path(path: &str) -> Result<String, Error> {
  let decoded = urlencoding::decode(path).map_err(|_| {
    Error::InvalidPath(String::from("invalid percent encoding"))
  })?;
  let decoded = decoded.as_ref();
  if decoded.contains('\0') {
    return Err(Error::InvalidPath(String::from(
      "path contains NUL byte",
    )));
  }
  if decoded.starts_with('/') {
    return Err(Error::InvalidPath(String::from(
      "path must be relative",
    )));
  }
  let lowered = decoded.to_ascii_lowercase();
  if lowered.contains("..") || lowered.contains("%2e%2e") {
    return Err(Error::InvalidPath(String::from(
      "path traversal rejected",
    )));
  }
  if let Some(c) =
    decoded.chars().find(|c| SHELL_METACHARACTERS.contains(c))
  {
    return Err(Error::InvalidPath(format!(
      "illegal character {c:?}"
    )));
  }
  let normalized = decoded
    .split('/')
    .filter(|segment| !segment.is_empty() && *segment != ".")
    .collect::<Vec<_>>()
    .join("/");
  if normalized.is_empty() {
    return Err(Error::InvalidPath(String::from("empty path")));
  }
  Ok(normalized)
}

/// Anchors a validated relative path under the in-container
/// workspace root. The result is always a descendant of `root`.
pub fn workspace_path(
  root: &str,
  path: &str,
) -> Result<String, Error> {
  let relative = relative_path(path)?;
  Ok(format!("{}/{relative}", root.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_well_formed_git_urls() {
    for url in [
      "https://github.com/owner/repo.git",
      "https://github.com/owner/repo",
      "https://gitlab.example.com/group/sub/repo.git",
      "git@github.com:owner/repo.git",
    ] {
      assert_eq!(git_url(url), Ok(url));
    }
  }

  #[test]
  fn rejects_every_shell_metacharacter_in_urls() {
    for c in SHELL_METACHARACTERS {
      let url = format!("https://github.com/owner/re{c}po.git");
      assert!(
        matches!(git_url(&url), Err(Error::InvalidGitUrl(_))),
        "accepted metacharacter {c:?}"
      );
    }
  }

  #[test]
  fn rejects_whitespace_and_injection_urls() {
    for url in [
      "https://github.com/owner/repo.git; rm -rf /",
      "https://github.com/owner/repo .git",
      "ftp://github.com/owner/repo",
      "git@github.com/owner/repo",
      "",
    ] {
      assert!(git_url(url).is_err(), "accepted {url:?}");
    }
  }

  #[test]
  fn branch_rules() {
    assert_eq!(branch("main"), Ok("main"));
    assert_eq!(
      branch("feature/llm-migration"),
      Ok("feature/llm-migration")
    );
    assert_eq!(branch("v1.2.3"), Ok("v1.2.3"));
    for bad in [
      "-rf",
      "a..b",
      "release/",
      "release.",
      "",
      "name with space",
      "na;me",
    ] {
      assert!(
        matches!(branch(bad), Err(Error::InvalidBranch(_))),
        "accepted {bad:?}"
      );
    }
    assert!(branch(&"a".repeat(255)).is_ok());
    assert!(branch(&"a".repeat(256)).is_err());
  }

  #[test]
  fn rejects_path_traversal_in_all_encodings() {
    for bad in [
      "../etc/passwd",
      "repo/../../etc/passwd",
      "%2e%2e/etc/passwd",
      "%2E%2E/etc/passwd",
      "%252e%252e/etc/passwd",
      "/etc/passwd",
      "repo/\0/x",
      "repo/$(id)/x",
      "repo/a|b",
    ] {
      assert!(
        matches!(relative_path(bad), Err(Error::InvalidPath(_))),
        "accepted {bad:?}"
      );
    }
  }

  #[test]
  fn normalizes_accepted_paths() {
    assert_eq!(
      relative_path("repo/./src//main.rs").unwrap(),
      "repo/src/main.rs"
    );
    assert_eq!(
      relative_path("repo%2Fsrc%2Flib.rs").unwrap(),
      "repo/src/lib.rs"
    );
  }

  #[test]
  fn sanitization_is_idempotent() {
    for path in
      ["repo/src/main.rs", "repo/./a.txt", "artifacts//out.json"]
    {
      let once = relative_path(path).unwrap();
      assert_eq!(relative_path(&once).unwrap(), once);
    }
  }

  #[test]
  fn anchors_under_workspace_root() {
    assert_eq!(
      workspace_path("/workspace", "repo/src/main.rs").unwrap(),
      "/workspace/repo/src/main.rs"
    );
    assert!(workspace_path("/workspace", "../escape").is_err());
  }
}
