//! Sentence segmentation for streaming speech.
//!
//! Spoken fragments accumulate in a pending buffer. A fragment that trips a
//! [`BoundaryRule`] flushes the whole buffer, including that fragment, as one
//! utterance. A punctuation mark anywhere in the fragment counts, so
//! `"end. Next"` flushes `"... end. Next"` in one piece.
//!
//! Nothing is trimmed, so the concatenation of every emitted utterance plus
//! the final [`SentenceSegmenter::finish`] remainder equals the spoken reply.

use crate::config::SegmenterConfig;

/// One boundary predicate, evaluated against the fragment just appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryRule {
    /// The fragment is exactly this separator.
    Separator(String),
    /// The fragment contains any of these marks.
    Punctuation(Vec<char>),
}

impl BoundaryRule {
    /// Whether this rule fires for `fragment`.
    pub fn fires(&self, fragment: &str) -> bool {
        match self {
            Self::Separator(sep) => fragment == sep,
            Self::Punctuation(marks) => fragment.chars().any(|c| marks.contains(&c)),
        }
    }
}

/// Ordered set of boundary rules. The first rule that fires wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryPolicy {
    rules: Vec<BoundaryRule>,
}

impl BoundaryPolicy {
    /// Build a policy from explicit rules.
    pub fn new(rules: Vec<BoundaryRule>) -> Self {
        Self { rules }
    }

    /// Separators first, then the punctuation set.
    pub fn from_config(config: &SegmenterConfig) -> Self {
        let mut rules: Vec<BoundaryRule> = config
            .separators
            .iter()
            .cloned()
            .map(BoundaryRule::Separator)
            .collect();
        if !config.punctuation.is_empty() {
            rules.push(BoundaryRule::Punctuation(config.punctuation.clone()));
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[BoundaryRule] {
        &self.rules
    }

    /// First rule that fires for `fragment`, if any.
    pub fn matching_rule(&self, fragment: &str) -> Option<&BoundaryRule> {
        self.rules.iter().find(|rule| rule.fires(fragment))
    }
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        Self::from_config(&SegmenterConfig::default())
    }
}

/// Per-response sentence accumulator.
#[derive(Debug, Clone, Default)]
pub struct SentenceSegmenter {
    policy: BoundaryPolicy,
    pending: String,
}

impl SentenceSegmenter {
    pub fn new(policy: BoundaryPolicy) -> Self {
        Self {
            policy,
            pending: String::new(),
        }
    }

    /// Append a fragment; returns the flushed buffer when a boundary fires.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        self.pending.push_str(fragment);
        self.policy
            .matching_rule(fragment)
            .map(|_| std::mem::take(&mut self.pending))
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| std::mem::take(&mut self.pending))
    }

    /// Text waiting for a boundary.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Discard pending text without emitting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(segmenter: &mut SentenceSegmenter, fragments: &[&str]) -> Vec<String> {
        let mut out: Vec<String> = fragments.iter().filter_map(|f| segmenter.push(f)).collect();
        out.extend(segmenter.finish());
        out
    }

    // ── boundaries ────────────────────────────────────────────

    #[test]
    fn emits_at_sentence_punctuation() {
        let mut seg = SentenceSegmenter::default();
        let out = feed(
            &mut seg,
            &["Hello", ", ", "world", "!", " How", " are", " you", "?"],
        );
        assert_eq!(out, vec!["Hello, world!", " How are you?"]);
    }

    #[test]
    fn comma_is_not_a_boundary() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("one, two").is_none());
        assert_eq!(seg.pending(), "one, two");
    }

    #[test]
    fn punctuation_mid_fragment_flushes_whole_buffer() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("It is").is_none());
        assert_eq!(seg.push(" done. Next").as_deref(), Some("It is done. Next"));
        assert_eq!(seg.pending(), "");
    }

    #[test]
    fn separator_fragment_flushes() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("Line one").is_none());
        assert_eq!(seg.push("\n").as_deref(), Some("Line one\n"));
        assert!(seg.push("Para").is_none());
        assert_eq!(seg.push("\n\n").as_deref(), Some("Para\n\n"));
    }

    #[test]
    fn newline_inside_longer_fragment_is_not_a_separator() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("a\nb").is_none());
    }

    #[test]
    fn cjk_punctuation() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("你好").is_none());
        assert_eq!(seg.push("。").as_deref(), Some("你好。"));
        assert_eq!(seg.push("真的吗？").as_deref(), Some("真的吗？"));
    }

    #[test]
    fn colon_and_semicolon_are_boundaries() {
        let mut seg = SentenceSegmenter::default();
        assert_eq!(seg.push("Note:").as_deref(), Some("Note:"));
        assert_eq!(seg.push(" a; ").as_deref(), Some(" a; "));
    }

    // ── end of stream ─────────────────────────────────────────

    #[test]
    fn finish_flushes_remainder() {
        let mut seg = SentenceSegmenter::default();
        seg.push("Par");
        seg.push("tial");
        assert_eq!(seg.finish().as_deref(), Some("Partial"));
        assert!(seg.finish().is_none());
    }

    #[test]
    fn concatenation_equals_input() {
        let fragments = [
            "The ", "answer", " is", " 4.", "2 ", "maybe", "?", "\n", "Also", ": ", "yes",
        ];
        let mut seg = SentenceSegmenter::default();
        let out = feed(&mut seg, &fragments);
        assert_eq!(out.concat(), fragments.concat());
    }

    #[test]
    fn empty_fragment_is_ignored() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("").is_none());
        assert!(seg.finish().is_none());
    }

    #[test]
    fn clear_discards_pending() {
        let mut seg = SentenceSegmenter::default();
        seg.push("unfinished");
        seg.clear();
        assert!(seg.finish().is_none());
    }

    // ── policy ────────────────────────────────────────────────

    #[test]
    fn custom_policy() {
        let policy = BoundaryPolicy::new(vec![BoundaryRule::Punctuation(vec![','])]);
        let mut seg = SentenceSegmenter::new(policy);
        assert!(seg.push("stop.").is_none());
        assert_eq!(seg.push(" go,").as_deref(), Some("stop. go,"));
    }

    #[test]
    fn policy_rule_order_follows_config() {
        let policy = BoundaryPolicy::default();
        assert_eq!(policy.rules().len(), 3);
        assert_eq!(policy.rules()[0], BoundaryRule::Separator("\n".into()));
        assert!(matches!(
            policy.matching_rule("\n"),
            Some(BoundaryRule::Separator(_))
        ));
        assert!(matches!(
            policy.matching_rule("ok."),
            Some(BoundaryRule::Punctuation(_))
        ));
        assert!(policy.matching_rule("ok").is_none());
    }
}
