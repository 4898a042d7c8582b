// Profanity filter - exact-token word matching with masking.
//
// Only whole tokens are matched. "class" never matches "ass", which keeps false
// positives down at the cost of missing creative spellings.

use std::collections::HashSet;

pub struct ProfanityFilter {
    /// Lowercased terms
    terms: HashSet<String>,
}

impl ProfanityFilter {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| normalize_token(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Scan `text` and return whether anything matched plus a masked copy.
    ///
    /// Each matching token is replaced in full (punctuation included) by the same
    /// number of `*` characters. Whitespace and non-matching tokens are copied
    /// through untouched.
    pub fn contains(&self, text: &str) -> (bool, String) {
        if text.is_empty() || self.terms.is_empty() {
            return (false, text.to_string());
        }

        let mut matched = false;
        let mut masked = String::with_capacity(text.len());
        let mut token_start: Option<usize> = None;

        for (idx, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if let Some(start) = token_start.take() {
                    matched |= self.push_token(&text[start..idx], &mut masked);
                }
                masked.push(ch);
            } else if token_start.is_none() {
                token_start = Some(idx);
            }
        }
        if let Some(start) = token_start {
            matched |= self.push_token(&text[start..], &mut masked);
        }

        (matched, masked)
    }

    fn push_token(&self, token: &str, out: &mut String) -> bool {
        if self.terms.contains(&normalize_token(token)) {
            out.extend(std::iter::repeat('*').take(token.chars().count()));
            true
        } else {
            out.push_str(token);
            false
        }
    }
}

/// Strip everything but word characters and lowercase the rest.
fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ProfanityFilter {
        ProfanityFilter::new(["damn", "Crap"])
    }

    #[test]
    fn test_masks_whole_token_with_punctuation() {
        let (matched, masked) = filter().contains("well DAMN! that hurt");

        assert!(matched);
        assert_eq!(masked, "well ***** that hurt");
    }

    #[test]
    fn test_preserves_other_tokens_and_spacing() {
        let (matched, masked) = filter().contains("  oh   crap,\tfriend ");

        assert!(matched);
        assert_eq!(masked, "  oh   *****\tfriend ");
    }

    #[test]
    fn test_substrings_are_not_matched() {
        let (matched, masked) = filter().contains("damnation and scrappy");

        assert!(!matched);
        assert_eq!(masked, "damnation and scrappy");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(filter().contains(""), (false, String::new()));
    }

    #[test]
    fn test_mask_length_counts_chars_not_bytes() {
        let filter = ProfanityFilter::new(["zürn"]);
        let (matched, masked) = filter.contains("so zürn");

        assert!(matched);
        assert_eq!(masked, "so ****");
    }
}
