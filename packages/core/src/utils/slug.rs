use regex::Regex;
use std::sync::OnceLock;

const SEPARATOR_PATTERN: &str = r#"[?&=%#@!$^*()+\[\]{}|\\"'<>;:.,_\s]"#;
static SEPARATOR_REGEX: OnceLock<Regex> = OnceLock::new();
static DASHES_REGEX: OnceLock<Regex> = OnceLock::new();

/// URL path segment for a page title
///
/// Punctuation and whitespace become `-`, runs of `-` collapse and the
/// result is trimmed and lowercased.
pub fn slugify(title: &str) -> String {
    let separators = SEPARATOR_REGEX.get_or_init(|| Regex::new(SEPARATOR_PATTERN).unwrap());
    let dashes = DASHES_REGEX.get_or_init(|| Regex::new("-+").unwrap());

    let replaced = separators.replace_all(title, "-");
    let collapsed = dashes.replace_all(&replaced, "-");

    collapsed.trim_matches('-').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  What's new? (2025)  "), "what-s-new-2025");
        assert_eq!(slugify("a__b..c"), "a-b-c");
    }

    #[test]
    fn test_slugify_keeps_unicode_letters() {
        assert_eq!(slugify("Über uns"), "über-uns");
        assert_eq!(slugify("---"), "");
    }
}
