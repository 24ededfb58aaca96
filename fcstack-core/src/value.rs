//! Boolean-like value parsing for environment toggles

/// Values treated as "off"; anything else that is non-empty counts as "on".
const FALSE_VALUES: [&str; 5] = ["false", "0", "no", "off", "n"];

/// Returns true when `value` spells a negative answer.
///
/// Matching is case-insensitive and ignores surrounding whitespace. An empty
/// string is considered false.
fn is_false_value(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || FALSE_VALUES
            .iter()
            .any(|candidate| value.eq_ignore_ascii_case(candidate))
}

/// Returns true when `value` is set to an affirmative value.
pub fn is_true_value(value: &str) -> bool {
    !is_false_value(value)
}
