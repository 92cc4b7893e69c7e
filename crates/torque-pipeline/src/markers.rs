//! Lexical pre-gates shared by the classifiers.
//!
//! These checks are intentionally cheap: they let the pipeline skip LLM
//! calls on the easy majority of queries and force deterministic behavior
//! on the follow-up rule. Word matching is exact on lowercased alphanumeric
//! tokens, so "city" never trips "it".

/// Single words that point back at prior turns.
const ANAPHORA_WORDS: &[&str] = &[
    "it", "that", "this", "these", "those", "them", "above", "point", "previous", "earlier",
];

/// Phrases that point back at prior turns.
const ANAPHORA_PHRASES: &[&str] = &["tell me more", "what about", "summarize", "summarise"];

/// Verbs that operate on the last assistant answer.
const META_VERBS: &[&str] = &[
    "summarize",
    "summarise",
    "translate",
    "rephrase",
    "reword",
    "shorten",
    "rewrite",
    "reformat",
    "simplify",
    "condense",
];

/// Substrings that suggest a user-imposed output format. The format
/// detector only spends an LLM call when one of these is present.
const FORMAT_TRIGGERS: &[&str] = &[
    "words", "word", "bullet", "bullets", "list", "table", "paragraph", "paragraphs", "tone",
    "format", "points", "markdown", "email", "letter", "report", "brief", "detailed", "short",
    "long", "concise",
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

fn has_word(text: &str, candidates: &[&str]) -> bool {
    let ws = words(text);
    ws.iter().any(|w| candidates.contains(&w.as_str()))
}

/// Does the utterance refer back to something said before?
pub fn has_anaphora(text: &str) -> bool {
    let lower = text.to_lowercase();
    has_word(text, ANAPHORA_WORDS) || ANAPHORA_PHRASES.iter().any(|p| lower.contains(p))
}

/// Does the utterance ask to transform the previous answer?
pub fn has_meta_verb(text: &str) -> bool {
    has_word(text, META_VERBS)
}

/// Quick gate for the format detector.
pub fn has_format_trigger(text: &str) -> bool {
    has_word(text, FORMAT_TRIGGERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anaphora_matches_whole_words_only() {
        assert!(has_anaphora("Summarize point 3 above"));
        assert!(has_anaphora("tell me more"));
        assert!(has_anaphora("what does it cost?"));
        // "city" and "italy" contain "it" but are not anaphora
        assert!(!has_anaphora("What's the weather in Karachi city?"));
        assert!(!has_anaphora("dealers in italy"));
    }

    #[test]
    fn meta_verbs_detected() {
        assert!(has_meta_verb("summarize that for me"));
        assert!(has_meta_verb("translate to Urdu"));
        assert!(!has_meta_verb("what are the brake problems"));
    }

    #[test]
    fn format_gate_skips_plain_questions() {
        assert!(has_format_trigger("Summarize the issues in 200 words"));
        assert!(has_format_trigger("as a bulleted list please"));
        assert!(!has_format_trigger("Why does the AC fail?"));
    }
}
