//! Shared SSE plumbing for the provider adapters.
//!
//! Both wire dialects stream completions the same way: the response body
//! arrives in chunks, events are delimited by `\n\n`, and each event's
//! `data:` payload feeds a dialect-specific parser. This module owns the
//! buffering and draining so the adapters only supply the parser.

use parlor_domain::error::Result;
use parlor_domain::stream::{BoxStream, StreamEvent};

use crate::util::from_reqwest;

/// Incremental splitter for an SSE response body.
///
/// Feed raw body chunks with [`extend`](SseBuffer::extend); complete
/// `data:` payloads come back as their event block is terminated, and a
/// trailing partial event waits for the next chunk. [`finish`]
/// (SseBuffer::finish) salvages an unterminated tail once the body has
/// closed.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.find("\n\n") {
            payloads.extend(data_payloads(&self.pending[..pos]));
            self.pending.replace_range(..pos + 2, "");
        }
        payloads
    }

    /// Parse whatever a closed body left without its `\n\n` terminator.
    pub(crate) fn finish(self) -> Vec<String> {
        data_payloads(&self.pending)
    }
}

/// `data:` payloads of one event block. Blocks may also carry `event:`,
/// `id:`, or `retry:` lines; those are dropped here.
fn data_payloads(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Turn an SSE `reqwest::Response` into a [`BoxStream`] of events.
///
/// `parse_payload` maps each `data:` payload to zero or more events; it
/// is `FnMut` because the Anthropic dialect carries parser state across
/// payloads. If the body ends without the parser ever producing a
/// `Done`, one is appended so downstream always sees a terminal event.
pub(crate) fn sse_event_stream<F>(
    response: reqwest::Response,
    mut parse_payload: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::default();
        let mut done_emitted = false;

        loop {
            let chunk = match response.chunk().await {
                Ok(c) => c,
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            };
            let at_end = chunk.is_none();
            let payloads = match chunk {
                Some(bytes) => buffer.extend(&bytes),
                None => std::mem::take(&mut buffer).finish(),
            };

            for payload in payloads {
                for event in parse_payload(&payload) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }

            if at_end {
                break;
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_event_in_one_chunk() {
        let mut buf = SseBuffer::default();
        assert_eq!(
            buf.extend(b"event: chunk\ndata: {\"a\":1}\n\n"),
            vec!["{\"a\":1}"]
        );
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut buf = SseBuffer::default();
        assert_eq!(buf.extend(b"data: one\n\ndata: two\n\n"), vec!["one", "two"]);
    }

    #[test]
    fn partial_event_waits_for_the_next_chunk() {
        let mut buf = SseBuffer::default();
        assert_eq!(buf.extend(b"data: whole\n\ndata: par"), vec!["whole"]);
        assert_eq!(buf.extend(b"tial\n\n"), vec!["partial"]);
    }

    #[test]
    fn event_split_mid_delimiter() {
        let mut buf = SseBuffer::default();
        assert!(buf.extend(b"data: split\n").is_empty());
        assert_eq!(buf.extend(b"\n"), vec!["split"]);
    }

    #[test]
    fn finish_salvages_an_unterminated_tail() {
        let mut buf = SseBuffer::default();
        assert!(buf.extend(b"data: tail").is_empty());
        assert_eq!(buf.finish(), vec!["tail"]);
    }

    #[test]
    fn non_data_lines_are_dropped() {
        let mut buf = SseBuffer::default();
        assert_eq!(
            buf.extend(b"event: ping\nid: 7\nretry: 3000\ndata: payload\n\n"),
            vec!["payload"]
        );
    }

    #[test]
    fn empty_data_lines_are_skipped() {
        let mut buf = SseBuffer::default();
        assert!(buf.extend(b"data: \n\n").is_empty());
        assert!(buf.finish().is_empty());
    }

    #[test]
    fn done_sentinel_passes_through() {
        let mut buf = SseBuffer::default();
        assert_eq!(buf.extend(b"data: [DONE]\n\n"), vec!["[DONE]"]);
    }
}
