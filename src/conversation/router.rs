//! Splits streamed deltas into spoken reply text and tool content.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::chat::delta::{Delta, ResponseMode};
use crate::chat::message::Role;
use crate::chat::sse::DONE_SENTINEL;

static CITATION_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[doc\d+\]").ok());

/// Remove `[docN]` citation markers from reply text.
pub fn strip_citations(text: &str) -> Cow<'_, str> {
    match CITATION_MARKER.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

/// Where one delta went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Fragment to speak. Already appended to the reply accumulator.
    Spoken(String),
    /// Fragment appended to the tool accumulator.
    Tool,
    /// Nothing to do: empty fragment, sentinel, or terminal block.
    Dropped,
}

/// Per-response router holding the reply and tool accumulators.
#[derive(Debug, Clone, Default)]
pub struct ToolContentRouter {
    mode: ResponseMode,
    reply: String,
    tool_content: String,
}

impl ToolContentRouter {
    /// Create an empty router for one response.
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Response mode this router was created for.
    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    /// Classify one delta and update the accumulators.
    pub fn route(&mut self, delta: &Delta) -> Routed {
        if delta.is_terminal {
            return Routed::Dropped;
        }
        if delta.role == Some(Role::Tool) {
            self.tool_content.push_str(&delta.text);
            return Routed::Tool;
        }

        let text = strip_citations(&delta.text);
        if text.is_empty() || text == DONE_SENTINEL {
            return Routed::Dropped;
        }
        self.reply.push_str(&text);
        Routed::Spoken(text.into_owned())
    }

    /// Spoken reply accumulated so far.
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Tool content accumulated so far.
    pub fn tool_content(&self) -> &str {
        &self.tool_content
    }

    /// Tool content worth committing to the ledger.
    ///
    /// Only retrieval responses keep their tool content.
    pub fn committed_tool_content(&self) -> Option<&str> {
        (self.mode == ResponseMode::Retrieval && !self.tool_content.is_empty())
            .then_some(self.tool_content.as_str())
    }

    /// Take both accumulators, leaving the router empty.
    pub fn take(&mut self) -> (Option<String>, String) {
        let tool = self.committed_tool_content().map(str::to_owned);
        self.tool_content.clear();
        (tool, std::mem::take(&mut self.reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── strip_citations ───────────────────────────────────────

    #[test]
    fn strips_citation_markers() {
        assert_eq!(strip_citations("See above[doc1]."), "See above.");
        assert_eq!(strip_citations("[doc12][doc3]"), "");
        assert_eq!(strip_citations("no markers"), "no markers");
    }

    #[test]
    fn keeps_surrounding_whitespace() {
        assert_eq!(strip_citations(" [doc2] world"), "  world");
    }

    #[test]
    fn leaves_other_brackets_alone() {
        assert_eq!(strip_citations("[docs] and [doc]"), "[docs] and [doc]");
    }

    // ── route ─────────────────────────────────────────────────

    #[test]
    fn assistant_text_is_spoken_and_accumulated() {
        let mut router = ToolContentRouter::new(ResponseMode::Plain);
        assert_eq!(
            router.route(&Delta::content("Hello")),
            Routed::Spoken("Hello".into())
        );
        assert_eq!(
            router.route(&Delta::with_role(Role::Assistant, ", world")),
            Routed::Spoken(", world".into())
        );
        assert_eq!(router.reply(), "Hello, world");
    }

    #[test]
    fn tool_text_never_reaches_reply() {
        let mut router = ToolContentRouter::new(ResponseMode::Retrieval);
        assert_eq!(
            router.route(&Delta::with_role(Role::Tool, "doc1 text")),
            Routed::Tool
        );
        assert_eq!(router.reply(), "");
        assert_eq!(router.tool_content(), "doc1 text");
    }

    #[test]
    fn tool_fragments_are_appended() {
        let mut router = ToolContentRouter::new(ResponseMode::Retrieval);
        router.route(&Delta::with_role(Role::Tool, "part one, "));
        router.route(&Delta::with_role(Role::Tool, "part two"));
        assert_eq!(router.tool_content(), "part one, part two");
    }

    #[test]
    fn sentinel_text_and_empty_fragments_are_dropped() {
        let mut router = ToolContentRouter::new(ResponseMode::Plain);
        assert_eq!(router.route(&Delta::content("[DONE]")), Routed::Dropped);
        assert_eq!(router.route(&Delta::content("")), Routed::Dropped);
        assert_eq!(router.route(&Delta::content("[doc1]")), Routed::Dropped);
        assert_eq!(router.route(&Delta::terminal()), Routed::Dropped);
        assert_eq!(router.reply(), "");
    }

    #[test]
    fn citation_is_stripped_before_speaking() {
        let mut router = ToolContentRouter::new(ResponseMode::Retrieval);
        assert_eq!(
            router.route(&Delta::content("above[doc1].")),
            Routed::Spoken("above.".into())
        );
        assert_eq!(router.reply(), "above.");
    }

    #[test]
    fn whitespace_left_after_stripping_is_kept() {
        let mut router = ToolContentRouter::new(ResponseMode::Retrieval);
        router.route(&Delta::content("It is"));
        assert_eq!(
            router.route(&Delta::content(" [doc1]")),
            Routed::Spoken(" ".into())
        );
        router.route(&Delta::content("Paris"));
        router.route(&Delta::content(" [doc2]."));
        assert_eq!(router.reply(), "It is Paris .");
    }

    // ── commit ────────────────────────────────────────────────

    #[test]
    fn plain_mode_discards_tool_content() {
        let mut router = ToolContentRouter::new(ResponseMode::Plain);
        router.route(&Delta::with_role(Role::Tool, "stray"));
        router.route(&Delta::content("Hi."));
        assert!(router.committed_tool_content().is_none());
        let (tool, reply) = router.take();
        assert!(tool.is_none());
        assert_eq!(reply, "Hi.");
    }

    #[test]
    fn take_empties_accumulators() {
        let mut router = ToolContentRouter::new(ResponseMode::Retrieval);
        router.route(&Delta::with_role(Role::Tool, "doc"));
        router.route(&Delta::content("Answer."));
        let (tool, reply) = router.take();
        assert_eq!(tool.as_deref(), Some("doc"));
        assert_eq!(reply, "Answer.");
        assert!(router.reply().is_empty());
        assert!(router.tool_content().is_empty());
    }
}
