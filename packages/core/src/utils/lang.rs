use std::collections::BTreeMap;

/// Per-language values keyed by language code (`en`, `en-GB`, ...)
pub type LangMap = BTreeMap<String, String>;

/// Value for `lang`, falling back to its two letter base language
pub fn localized<'a>(values: &'a LangMap, lang: &str) -> Option<&'a str> {
    if let Some(value) = values.get(lang) {
        return Some(value);
    }

    let base: String = lang.chars().take(2).collect();
    values.get(&base).map(String::as_str)
}
