use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Fallback for names that sanitize away to nothing.
pub const UNTITLED: &str = "Untitled";

static FORBIDDEN_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid forbidden-chars regex"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// 更新管理器拒絕的顯示名稱。 / A display name the update manager rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty after trimming")]
    Empty,
}

/// Checks that a user-supplied display name is usable at all. Sanitizing is
/// a separate step; this only rejects names with no content.
pub fn validate_display_name(name: &str) -> Result<&str, NameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    Ok(trimmed)
}

/// Maps an arbitrary display name onto something every filesystem accepts:
/// reserved punctuation and whitespace runs become `_`, an empty result
/// becomes [`UNTITLED`]. Idempotent.
pub fn safe_filename(name: &str) -> String {
    let trimmed = name.trim();
    let no_reserved = FORBIDDEN_CHARS.replace_all(trimmed, "_");
    let flattened = WHITESPACE_RUN.replace_all(&no_reserved, "_");
    if flattened.is_empty() {
        UNTITLED.to_string()
    } else {
        flattened.into_owned()
    }
}

/// Case-insensitive uniqueness check against a sibling list, both sides
/// trimmed first.
pub fn is_unique<S: AsRef<str>>(name: &str, siblings: &[S]) -> bool {
    let wanted = name.trim().to_lowercase();
    !siblings
        .iter()
        .any(|sibling| sibling.as_ref().trim().to_lowercase() == wanted)
}

/// Finds a free variation of `base` among `siblings`: the base itself, then
/// `base (2)` through `base (100)`, then a time-of-day suffix as the last
/// resort.
pub fn suggest_alternative<S: AsRef<str>>(base: &str, siblings: &[S]) -> String {
    let mut suggestion = base.trim().to_string();
    if suggestion.is_empty() {
        suggestion = UNTITLED.to_string();
    }
    if is_unique(&suggestion, siblings) {
        return suggestion;
    }
    for n in 2..=100u32 {
        let numbered = format!("{suggestion} ({n})");
        if is_unique(&numbered, siblings) {
            return numbered;
        }
    }
    format!("{suggestion}_{}", Local::now().format("%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_replaces_reserved_and_whitespace() {
        assert_eq!(safe_filename("My: Novel / Draft?"), "My__Novel___Draft_");
        assert_eq!(safe_filename("  spaced   out  "), "spaced_out");
    }

    #[test]
    fn safe_filename_is_idempotent() {
        for input in ["My: Novel", "  a  b  ", "<>*?", ""] {
            let once = safe_filename(input);
            assert_eq!(safe_filename(&once), once);
        }
    }

    #[test]
    fn empty_names_become_untitled() {
        assert_eq!(safe_filename("   "), "Untitled");
        assert_eq!(validate_display_name("   "), Err(NameError::Empty));
    }

    #[test]
    fn uniqueness_ignores_case_and_padding() {
        let siblings = ["Alpha", "  beta "];
        assert!(!is_unique("alpha", &siblings));
        assert!(!is_unique("BETA", &siblings));
        assert!(is_unique("gamma", &siblings));
    }

    #[test]
    fn suggestion_counts_up_from_two() {
        let siblings = ["A", "A (2)"];
        assert_eq!(suggest_alternative("A", &siblings), "A (3)");
        assert_eq!(suggest_alternative("B", &siblings), "B");
    }

    #[test]
    fn suggestion_is_never_a_sibling() {
        let siblings: Vec<String> = std::iter::once("A".to_string())
            .chain((2..=100).map(|n| format!("A ({n})")))
            .collect();
        let suggestion = suggest_alternative("A", &siblings);
        assert!(is_unique(&suggestion, &siblings));
        assert!(suggestion.starts_with("A_"));
    }
}
