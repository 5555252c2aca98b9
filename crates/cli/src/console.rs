//! Terminal rendering of session events for `browserpilot run`.

use std::io::Write;

use agent::EventSink;
use parking_lot::Mutex;
use proto::{AgentEvent, ContentUnit, ResultPart, SessionId};

/// Prints streamed text as it arrives and one line per tool result.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn emit(&self, _session_id: &SessionId, event: AgentEvent) {
        let Some(line) = render(&event) else {
            return;
        };
        let mut out = self.out.lock();
        // Terminal write failures are not worth failing the session over.
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

fn render(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::TextDelta { text, .. } => Some(text.clone()),
        AgentEvent::ToolResult { turn } => {
            let summary: Vec<String> = turn
                .content
                .iter()
                .filter_map(|unit| match unit {
                    ContentUnit::ToolResult { parts, is_error, .. } => {
                        Some(summarize_parts(parts, *is_error))
                    }
                    _ => None,
                })
                .collect();
            Some(format!("\n  ⎿ {}\n", summary.join("; ")))
        }
        AgentEvent::UrlChanged { url } => Some(format!("  ↳ {url}\n")),
        AgentEvent::Finished => Some("\n".to_string()),
        AgentEvent::Failed { error } => Some(format!("\nError: {error}\n")),
        AgentEvent::Stream { .. } => None,
    }
}

fn summarize_parts(parts: &[ResultPart], is_error: bool) -> String {
    let images = parts.iter().filter(|p| p.is_image()).count();
    let text = parts.iter().find_map(|p| match p {
        ResultPart::Text { text } => Some(text.as_str()),
        ResultPart::Image { .. } => None,
    });
    let mut summary = match (images, text) {
        (0, Some(text)) => text.to_string(),
        (n, Some(text)) => format!("{n} screenshot(s), {text}"),
        (n, None) => format!("{n} screenshot(s)"),
    };
    if is_error {
        summary.insert_str(0, "error: ");
    }
    summary
}
