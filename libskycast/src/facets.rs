//! Hashtag annotations over post text
//!
//! Annotations carry UTF-8 byte offsets, which is what the record API
//! expects. `&str` indices in Rust are already byte offsets, so the ranges
//! reported by the regex engine are used as-is; counting `chars()` instead
//! would drift as soon as a multi-byte character precedes a tag.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Annotation;

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#\w+").expect("hashtag pattern is valid"))
}

/// Scan `text` for hashtags, left to right
///
/// Each maximal `#` + word-character run becomes one tag annotation whose
/// value omits the `#`. The iterator is lazy and never fails.
pub fn annotate(text: &str) -> impl Iterator<Item = Annotation> + '_ {
    hashtag_pattern()
        .find_iter(text)
        .map(|m| Annotation::tag(m.start(), m.end(), &m.as_str()[1..]))
}

/// Normalize a template's hashtag list
///
/// Leading `#` marks and surrounding whitespace are stripped; empty entries and
/// duplicates are dropped. First occurrence wins.
pub fn normalize_hashtags<S: AsRef<str>>(hashtags: &[S]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(hashtags.len());
    for tag in hashtags {
        let tag = tag.as_ref().trim().trim_start_matches('#').trim();
        if !tag.is_empty() && !seen.iter().any(|t| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

/// Build the final post text: the user's text, a blank line, then `#a #b ...`
pub fn compose_text<S: AsRef<str>>(text: &str, hashtags: &[S]) -> String {
    let tags = normalize_hashtags(hashtags);
    if tags.is_empty() {
        return text.to_string();
    }

    let tag_line = tags
        .iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        tag_line
    } else {
        format!("{}\n\n{}", text.trim_end(), tag_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotationKind;

    fn collect(text: &str) -> Vec<Annotation> {
        annotate(text).collect()
    }

    fn assert_well_formed(text: &str) {
        let annotations = collect(text);
        let bytes = text.as_bytes();
        let mut last_end = 0;
        for a in &annotations {
            assert!(a.byte_start < a.byte_end);
            assert!(a.byte_end <= bytes.len());
            assert!(a.byte_start >= last_end, "overlap or out of order in {:?}", text);
            let slice = std::str::from_utf8(&bytes[a.byte_start..a.byte_end]).unwrap();
            assert_eq!(slice, format!("#{}", a.value));
            last_end = a.byte_end;
        }
    }

    #[test]
    fn test_no_tags_is_empty() {
        assert!(collect("just some words").is_empty());
        assert!(collect("").is_empty());
        assert!(collect("# not a tag").is_empty());
    }

    #[test]
    fn test_two_ascii_tags() {
        let annotations = collect("Great day #hiking #fuji");
        assert_eq!(
            annotations,
            vec![Annotation::tag(10, 17, "hiking"), Annotation::tag(18, 23, "fuji")]
        );
        assert!(annotations.iter().all(|a| a.kind == AnnotationKind::Tag));
    }

    #[test]
    fn test_multibyte_prefix_uses_byte_offsets() {
        let annotations = collect("café #sun");
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].byte_start, "café ".len());
        assert_eq!(annotations[0].byte_start, 6);
        assert_eq!(annotations[0].byte_end, 10);
        assert_eq!(annotations[0].value, "sun");
    }

    #[test]
    fn test_emoji_and_cjk_before_tags() {
        let text = "🏔️ 富士山 #登山 and #fuji_2024";
        let annotations = collect(text);
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].value, "登山");
        assert_eq!(annotations[1].value, "fuji_2024");
        assert_well_formed(text);
    }

    #[test]
    fn test_adjacent_hashes_split_into_runs() {
        let annotations = collect("#one#two ##three");
        let values: Vec<_> = annotations.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["one", "two", "three"]);
        assert_well_formed("#one#two ##three");
    }

    #[test]
    fn test_tag_stops_at_punctuation() {
        let annotations = collect("see #rust, #tokio!");
        assert_eq!(annotations[0].value, "rust");
        assert_eq!(annotations[1].value, "tokio");
    }

    #[test]
    fn test_ranges_well_formed_on_mixed_inputs() {
        for text in [
            "naïve #tag",
            "#start middle #end",
            "ü#x ö#y",
            "tabs\t#a\n#b\r\n#c",
            "Ελληνικά #λέξη",
        ] {
            assert_well_formed(text);
        }
    }

    #[test]
    fn test_annotate_is_lazy() {
        let mut iter = annotate("#a #b #c");
        assert_eq!(iter.next().map(|a| a.value), Some("a".to_string()));
    }

    #[test]
    fn test_normalize_hashtags() {
        let tags = normalize_hashtags(&["#rust", " tokio ", "", "##rust", "#", "serde"]);
        assert_eq!(tags, vec!["rust", "tokio", "serde"]);
    }

    #[test]
    fn test_compose_text_appends_tag_line() {
        let composed = compose_text("Great day", &["hiking", "#fuji"]);
        assert_eq!(composed, "Great day\n\n#hiking #fuji");
    }

    #[test]
    fn test_compose_text_without_tags_is_unchanged() {
        let empty: [&str; 0] = [];
        assert_eq!(compose_text("hello", &empty), "hello");
    }

    #[test]
    fn test_compose_text_with_only_tags() {
        assert_eq!(compose_text("  ", &["a", "b"]), "#a #b");
    }

    #[test]
    fn test_composed_tags_are_annotated() {
        let composed = compose_text("café", &["sun"]);
        let annotations = collect(&composed);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].byte_start, "café\n\n".len());
        assert_well_formed(&composed);
    }
}
