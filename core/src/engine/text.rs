//! Utterance segmentation.

/// Texts longer than this are synthesized clause by clause.
pub const SEGMENT_THRESHOLD: usize = 50;

/// Split after each of `.,!?:;`, keeping the delimiter with its clause.
/// Short texts come back whole.
pub fn segments(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= SEGMENT_THRESHOLD {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | ',' | '!' | '?' | ':' | ';') {
            push_trimmed(&mut out, &current);
            current.clear();
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_segment() {
        assert_eq!(segments("  Hello, world! "), vec!["Hello, world!"]);
        assert!(segments("   ").is_empty());
    }

    #[test]
    fn long_text_splits_on_punctuation() {
        let text = "Welcome to the bank of Gielinor, how may I help you today? Please wait";
        assert_eq!(
            segments(text),
            vec![
                "Welcome to the bank of Gielinor,",
                "how may I help you today?",
                "Please wait"
            ]
        );
    }
}
