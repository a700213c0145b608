/// Prefix applied to text that is kept in its original language, either
/// because translation failed or because the output came back unchanged.
pub const UNTRANSLATED_MARKER: &str = "[untranslated]";

/// Tag a text that could not be translated. Text already carrying the
/// marker comes back unchanged, so the tag never stacks.
pub fn tag_untranslated(text: &str) -> String {
    if has_marker(text) {
        return text.to_string();
    }
    format!("{} {}", UNTRANSLATED_MARKER, text)
}

/// True when the text already carries the untranslated marker.
pub fn has_marker(text: &str) -> bool {
    text.starts_with(UNTRANSLATED_MARKER)
}

/// Outcome of assessing one translation candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Candidate is usable as-is.
    Accept,
    /// Candidate equals the source; keep it but tag it so readers can tell.
    AcceptUntranslated,
    Reject(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// One side of the pair contains a known term whose expected
    /// counterpart is missing from the other side.
    MissingAnchor { expected: String },
    /// Candidate collapsed to a fraction of the source length.
    Truncated,
    /// Candidate is a bare token or article-plus-word where the source was
    /// a full phrase.
    Degenerate,
}

/// Strategy seam for judging translation output before it is cached.
pub trait QualityCheck: Send + Sync {
    fn assess(&self, source: &str, candidate: &str, from_lang: &str, to_lang: &str) -> Verdict;
}

/// Known-good term mapping for one language pair, used to spot-check that a
/// translation actually happened.
#[derive(Debug, Clone)]
pub struct AnchorPair {
    pub from_lang: String,
    pub to_lang: String,
    pub source_term: String,
    pub target_term: String,
}

/// Default quality guard built on cheap textual heuristics.
///
/// No heuristic proves a translation correct; each one catches a shape of
/// output that upstream engines produce when they silently fail (echoing
/// the input, truncating, or answering with a single word).
#[derive(Debug, Clone, Default)]
pub struct HeuristicQualityGuard {
    anchors: Vec<AnchorPair>,
}

impl HeuristicQualityGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(
        mut self,
        from_lang: impl Into<String>,
        to_lang: impl Into<String>,
        source_term: impl Into<String>,
        target_term: impl Into<String>,
    ) -> Self {
        self.anchors.push(AnchorPair {
            from_lang: from_lang.into(),
            to_lang: to_lang.into(),
            source_term: source_term.into(),
            target_term: target_term.into(),
        });
        self
    }
}

impl QualityCheck for HeuristicQualityGuard {
    fn assess(&self, source: &str, candidate: &str, from_lang: &str, to_lang: &str) -> Verdict {
        let source = source.trim();
        let candidate = candidate.trim();

        if candidate.is_empty() {
            return Verdict::Reject(RejectReason::Truncated);
        }
        if source == candidate {
            return Verdict::AcceptUntranslated;
        }

        let source_lower = source.to_lowercase();
        let candidate_lower = candidate.to_lowercase();
        for pair in &self.anchors {
            if pair.from_lang != from_lang || pair.to_lang != to_lang {
                continue;
            }
            let in_source = source_lower.contains(&pair.source_term.to_lowercase());
            let in_candidate = candidate_lower.contains(&pair.target_term.to_lowercase());
            if in_source && !in_candidate {
                return Verdict::Reject(RejectReason::MissingAnchor {
                    expected: pair.target_term.clone(),
                });
            }
            // The mirror case: the output names an anchor the source never
            // mentioned, which means it translates some other text.
            if in_candidate && !in_source {
                return Verdict::Reject(RejectReason::MissingAnchor {
                    expected: pair.source_term.clone(),
                });
            }
        }

        let source_chars = source.chars().count();
        if source_chars > 10 {
            let candidate_chars = candidate.chars().count();
            if candidate_chars * 3 < source_chars {
                return Verdict::Reject(RejectReason::Truncated);
            }
            // Shape checks only make sense when the source was a phrase,
            // not one long compound word.
            if source.split_whitespace().nth(1).is_some() && is_degenerate(candidate) {
                return Verdict::Reject(RejectReason::Degenerate);
            }
        }

        Verdict::Accept
    }
}

fn is_degenerate(candidate: &str) -> bool {
    let mut words = candidate.split_whitespace();
    let first = match words.next() {
        Some(w) => w,
        None => return true,
    };
    match (words.next(), words.next()) {
        // Single bare token.
        (None, _) => true,
        // Article plus one word, e.g. "the update".
        (Some(_), None) => matches!(first.to_lowercase().as_str(), "the" | "a" | "an"),
        _ => false,
    }
}
