//! Rebuilds whole content units from streamed block fragments.

use std::collections::HashSet;

use proto::{AgentEvent, BlockDelta, BlockMeta, ContentUnit, ProtocolError, Role, StreamEvent, Turn};
use serde_json::Value;
use tracing::warn;

#[derive(Debug)]
enum OpenBlock {
    Text {
        index: usize,
        text: String,
    },
    ToolInvocation {
        index: usize,
        id: String,
        name: String,
        buffer: String,
    },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            OpenBlock::Text { index, .. } | OpenBlock::ToolInvocation { index, .. } => *index,
        }
    }
}

/// State machine for one assistant turn; at most one block is open at a time.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    content: Vec<ContentUnit>,
    open: Option<OpenBlock>,
    seen: HashSet<usize>,
    finished: bool,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event.
    ///
    /// Returns the live-display event to forward for text deltas. Events
    /// arriving after `MessageStop` are ignored.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<Option<AgentEvent>, ProtocolError> {
        if self.finished {
            return Ok(None);
        }

        match event {
            StreamEvent::BlockStart { index, block } => {
                if let Some(open) = &self.open {
                    return Err(ProtocolError::OverlappingBlock {
                        open: open.index(),
                        got: *index,
                    });
                }
                if !self.seen.insert(*index) {
                    return Err(ProtocolError::ReusedIndex(*index));
                }
                self.open = Some(match block {
                    BlockMeta::Text => OpenBlock::Text {
                        index: *index,
                        text: String::new(),
                    },
                    BlockMeta::ToolInvocation { id, name } => OpenBlock::ToolInvocation {
                        index: *index,
                        id: id.clone(),
                        name: name.clone(),
                        buffer: String::new(),
                    },
                });
                Ok(None)
            }
            StreamEvent::BlockDelta { index, delta } => {
                let open = self.open_block(*index)?;
                match (open, delta) {
                    (OpenBlock::Text { text, .. }, BlockDelta::Text { text: fragment }) => {
                        text.push_str(fragment);
                        Ok(Some(AgentEvent::TextDelta {
                            index: *index,
                            text: fragment.clone(),
                        }))
                    }
                    (OpenBlock::ToolInvocation { buffer, .. }, BlockDelta::Json { partial_json }) => {
                        buffer.push_str(partial_json);
                        Ok(None)
                    }
                    _ => Err(ProtocolError::DeltaKindMismatch(*index)),
                }
            }
            StreamEvent::BlockStop { index } => {
                self.open_block(*index)?;
                if let Some(block) = self.open.take() {
                    let unit = finalize(block)?;
                    self.content.push(unit);
                }
                Ok(None)
            }
            StreamEvent::MessageStop => {
                if let Some(open) = self.open.take() {
                    warn!(index = open.index(), "message stopped with an open block, dropping it");
                }
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Returns `true` once `MessageStop` was seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Assembled assistant turn, units in emitted order.
    pub fn into_turn(self) -> Turn {
        Turn::new(Role::Assistant, self.content)
    }

    fn open_block(&mut self, index: usize) -> Result<&mut OpenBlock, ProtocolError> {
        match self.open.as_mut() {
            Some(open) if open.index() == index => Ok(open),
            other => Err(ProtocolError::UnexpectedIndex {
                expected: other.map(|o| o.index()),
                got: index,
            }),
        }
    }
}

fn finalize(block: OpenBlock) -> Result<ContentUnit, ProtocolError> {
    match block {
        OpenBlock::Text { text, .. } => Ok(ContentUnit::Text { text }),
        OpenBlock::ToolInvocation {
            id, name, buffer, ..
        } => {
            let raw = buffer.trim();
            let arguments = if raw.is_empty() {
                Value::Object(Default::default())
            } else if !raw.ends_with('}') {
                return Err(ProtocolError::MalformedArguments {
                    id,
                    reason: "argument buffer is incomplete".to_string(),
                });
            } else {
                serde_json::from_str(raw).map_err(|e| ProtocolError::MalformedArguments {
                    id: id.clone(),
                    reason: e.to_string(),
                })?
            };
            Ok(ContentUnit::ToolInvocation {
                id,
                name,
                arguments,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn start_text(index: usize) -> StreamEvent {
        StreamEvent::BlockStart {
            index,
            block: BlockMeta::Text,
        }
    }

    fn start_tool(index: usize, id: &str, name: &str) -> StreamEvent {
        StreamEvent::BlockStart {
            index,
            block: BlockMeta::ToolInvocation {
                id: id.to_string(),
                name: name.to_string(),
            },
        }
    }

    fn text(index: usize, t: &str) -> StreamEvent {
        StreamEvent::BlockDelta {
            index,
            delta: BlockDelta::Text {
                text: t.to_string(),
            },
        }
    }

    fn json_part(index: usize, j: &str) -> StreamEvent {
        StreamEvent::BlockDelta {
            index,
            delta: BlockDelta::Json {
                partial_json: j.to_string(),
            },
        }
    }

    fn stop(index: usize) -> StreamEvent {
        StreamEvent::BlockStop { index }
    }

    fn run(events: &[StreamEvent]) -> Result<(Turn, Vec<AgentEvent>), ProtocolError> {
        let mut r = StreamReassembler::new();
        let mut forwarded = Vec::new();
        for event in events {
            if let Some(out) = r.apply(event)? {
                forwarded.push(out);
            }
        }
        Ok((r.into_turn(), forwarded))
    }

    #[test]
    fn text_equals_concatenated_deltas_and_is_forwarded() {
        let (turn, forwarded) = run(&[
            start_text(0),
            text(0, "Hel"),
            text(0, "lo, "),
            text(0, "world"),
            stop(0),
            StreamEvent::MessageStop,
        ])
        .expect("well formed");

        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, vec![ContentUnit::text("Hello, world")]);
        assert_eq!(forwarded.len(), 3);
        assert_eq!(
            forwarded[1],
            AgentEvent::TextDelta {
                index: 0,
                text: "lo, ".to_string()
            }
        );
    }

    #[test]
    fn tool_arguments_equal_parse_of_concatenated_fragments() {
        let fragments = [r#"{"act"#, r#"ion": "left_cl"#, r#"ick", "n": [1, "#, "2]}"];
        let mut events = vec![start_text(0), text(0, "Clicking."), stop(0)];
        events.push(start_tool(1, "tu_1", "computer"));
        events.extend(fragments.iter().map(|f| json_part(1, f)));
        events.push(stop(1));
        events.push(StreamEvent::MessageStop);

        let (turn, forwarded) = run(&events).expect("well formed");
        let expected: Value = serde_json::from_str(&fragments.concat()).expect("json");
        assert_eq!(turn.content.len(), 2);
        assert_eq!(
            turn.content[1],
            ContentUnit::ToolInvocation {
                id: "tu_1".to_string(),
                name: "computer".to_string(),
                arguments: expected,
            }
        );
        // Only the text delta is forwarded for display.
        assert_eq!(forwarded.len(), 1);
    }

    #[test]
    fn empty_argument_buffer_is_empty_object() {
        let (turn, _) = run(&[start_tool(0, "tu", "computer"), stop(0), StreamEvent::MessageStop])
            .expect("empty args");
        let invocations: Vec<_> = turn.tool_invocations().collect();
        assert_eq!(invocations[0].2, &json!({}));
    }

    #[test]
    fn incomplete_or_invalid_arguments_are_malformed() {
        let err = run(&[start_tool(0, "tu", "computer"), json_part(0, r#"{"action""#), stop(0)])
            .expect_err("incomplete");
        assert!(matches!(err, ProtocolError::MalformedArguments { id, .. } if id == "tu"));

        let err = run(&[start_tool(0, "tu", "computer"), json_part(0, "{action}"), stop(0)])
            .expect_err("invalid");
        assert!(matches!(err, ProtocolError::MalformedArguments { .. }));
    }

    #[test]
    fn delta_for_non_open_index_is_violation() {
        let err = run(&[start_text(0), text(1, "x")]).expect_err("wrong index");
        assert!(matches!(
            err,
            ProtocolError::UnexpectedIndex {
                expected: Some(0),
                got: 1
            }
        ));

        let err = run(&[text(0, "x")]).expect_err("nothing open");
        assert!(matches!(
            err,
            ProtocolError::UnexpectedIndex {
                expected: None,
                got: 0
            }
        ));
    }

    #[test]
    fn overlapping_and_reused_indices_are_violations() {
        let err = run(&[start_text(0), start_text(1)]).expect_err("overlap");
        assert!(matches!(err, ProtocolError::OverlappingBlock { open: 0, got: 1 }));

        let err = run(&[start_text(0), stop(0), start_text(0)]).expect_err("reuse");
        assert!(matches!(err, ProtocolError::ReusedIndex(0)));
    }

    #[test]
    fn delta_kind_must_match_block_kind() {
        let err = run(&[start_text(0), json_part(0, "{}")]).expect_err("mismatch");
        assert!(matches!(err, ProtocolError::DeltaKindMismatch(0)));
    }

    #[test]
    fn message_stop_drops_open_block_and_ignores_later_events() {
        let mut r = StreamReassembler::new();
        for event in [
            start_text(0),
            text(0, "done"),
            stop(0),
            start_tool(1, "tu", "computer"),
            json_part(1, "{"),
            StreamEvent::MessageStop,
        ] {
            r.apply(&event).expect("apply");
        }
        assert!(r.is_finished());
        assert_eq!(r.apply(&text(5, "late")).expect("ignored"), None);

        let turn = r.into_turn();
        assert_eq!(turn.content, vec![ContentUnit::text("done")]);
    }
}
