//! Minimal incremental parser for `text/event-stream` bodies.
//!
//! Only the framing is interpreted: `event:` / `data:` field lines,
//! comment lines, and the blank line terminating a frame. Payloads
//! stay opaque strings so the relay can forward them unmodified and
//! in arrival order.

/// One `event:` / `data:` block of an SSE response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
  /// The `event:` name, if the frame carried one.
  pub event: Option<String>,
  /// All `data:` lines of the frame, joined with `\n`.
  pub data: String,
}

#[derive(Debug, Default)]
pub struct SseParser {
  buf: String,
  event: Option<String>,
  data: Vec<String>,
}

impl SseParser {
  pub fn new() -> SseParser {
    Default::default()
  }

  /// Feed one chunk of the response body, receiving every frame the
  /// chunk completes, in arrival order. Partial lines are buffered
  /// until the next push. Invalid utf-8 is replaced.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.buf.push_str(&String::from_utf8_lossy(chunk));
    let mut frames = Vec::new();
    while let Some(newline) = self.buf.find('\n') {
      let line: String = self.buf.drain(..=newline).collect();
      self.handle_line(
        line.trim_end_matches(['\n', '\r']),
        &mut frames,
      );
    }
    frames
  }

  fn handle_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
    if line.is_empty() {
      // Blank line dispatches the pending frame.
      if self.event.is_some() || !self.data.is_empty() {
        frames.push(SseFrame {
          event: self.event.take(),
          data: std::mem::take(&mut self.data).join("\n"),
        });
      }
      return;
    }
    if line.starts_with(':') {
      // Keep-alive comment.
      return;
    }
    let (field, value) = match line.split_once(':') {
      Some((field, value)) => {
        (field, value.strip_prefix(' ').unwrap_or(value))
      }
      None => (line, ""),
    };
    match field {
      "event" => self.event = Some(value.to_string()),
      "data" => self.data.push(value.to_string()),
      // id / retry are not part of the agent contract.
      _ => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame(event: &str, data: &str) -> SseFrame {
    SseFrame {
      event: Some(event.to_string()),
      data: data.to_string(),
    }
  }

  #[test]
  fn parses_a_single_frame() {
    let mut parser = SseParser::new();
    let frames =
      parser.push(b"event: log\ndata: {\"line\":\"hi\"}\n\n");
    assert_eq!(frames, vec![frame("log", "{\"line\":\"hi\"}")]);
  }

  #[test]
  fn preserves_frame_order() {
    let mut parser = SseParser::new();
    let input = (0..20)
      .map(|i| format!("event: log\ndata: {i}\n\n"))
      .collect::<String>();
    let frames = parser.push(input.as_bytes());
    let expected = (0..20)
      .map(|i| frame("log", &i.to_string()))
      .collect::<Vec<_>>();
    assert_eq!(frames, expected);
  }

  #[test]
  fn buffers_partial_lines_across_chunks() {
    let mut parser = SseParser::new();
    assert!(parser.push(b"event: ai_con").is_empty());
    assert!(parser.push(b"tent\ndata: del").is_empty());
    let frames = parser.push(b"ta\n\n");
    assert_eq!(frames, vec![frame("ai_content", "delta")]);
  }

  #[test]
  fn joins_multi_line_data() {
    let mut parser = SseParser::new();
    let frames =
      parser.push(b"event: log\ndata: one\ndata: two\n\n");
    assert_eq!(frames, vec![frame("log", "one\ntwo")]);
  }

  #[test]
  fn handles_crlf_line_endings() {
    let mut parser = SseParser::new();
    let frames = parser.push(b"event: status\r\ndata: ok\r\n\r\n");
    assert_eq!(frames, vec![frame("status", "ok")]);
  }

  #[test]
  fn drops_comment_lines() {
    let mut parser = SseParser::new();
    let frames = parser.push(b": keep-alive\n\nevent: log\ndata: x\n\n");
    assert_eq!(frames, vec![frame("log", "x")]);
  }

  #[test]
  fn data_only_frame_has_no_event() {
    let mut parser = SseParser::new();
    let frames = parser.push(b"data: bare\n\n");
    assert_eq!(
      frames,
      vec![SseFrame {
        event: None,
        data: "bare".to_string(),
      }]
    );
  }

  #[test]
  fn incomplete_frame_is_not_dispatched() {
    let mut parser = SseParser::new();
    assert!(parser.push(b"event: log\ndata: pending\n").is_empty());
  }
}
