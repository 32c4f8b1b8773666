//! Query normalization shared by the caches and the gazetteer

/// Derive the cache/correction lookup key for a query.
///
/// Lower-cases, replaces punctuation with spaces and collapses whitespace, so
/// queries differing only in casing, spacing or punctuation share a key.
pub fn normalize_key(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize for phrase matching. Arrows become the word "to" before
/// punctuation is stripped so route separators survive normalization.
pub fn route_tokens(query: &str) -> Vec<String> {
    let with_words = query
        .replace('→', " to ")
        .replace("->", " to ")
        .replace('–', " to ");
    normalize_key(&with_words)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casing_and_spacing_share_key() {
        assert_eq!(
            normalize_key("  Frankfurt   nach Costa Rica, LIBERIA!"),
            normalize_key("frankfurt nach costa rica liberia")
        );
    }

    #[test]
    fn test_non_ascii_letters_survive() {
        assert_eq!(normalize_key("Flüge nach Zürich"), "flüge nach zürich");
    }

    #[test]
    fn test_route_tokens_keep_arrow_as_separator() {
        assert_eq!(route_tokens("Berlin→Wien"), vec!["berlin", "to", "wien"]);
        assert_eq!(route_tokens("Berlin -> Wien"), vec!["berlin", "to", "wien"]);
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(normalize_key("   ?! "), "");
        assert!(route_tokens("").is_empty());
    }
}
