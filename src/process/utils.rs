/// Values the feed uses to mean "no value reported".
const BLANK_MARKERS: &[&str] = &["NA", "N/A", "missing"];

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// True for empty cells and the feed's explicit "no value" markers.
pub fn is_blank(raw: &str) -> bool {
    let cleaned = clean_str(raw);
    cleaned.is_empty() || BLANK_MARKERS.iter().any(|m| cleaned.eq_ignore_ascii_case(m))
}

/// Outcome of coercing one cell to a typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<T> {
    Blank,
    Value(T),
    Invalid,
}

impl<T> Cell<T> {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Cell::Invalid)
    }
}

/// Parse a quantity cell such as `"1,250,000"` or `-42.5`.
/// Non-finite values (`inf`, `NaN`) are invalid.
pub fn parse_number(raw: &str) -> Cell<f64> {
    if is_blank(raw) {
        return Cell::Blank;
    }
    let digits: String = clean_str(raw).chars().filter(|c| *c != ',').collect();
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        _ => Cell::Invalid,
    }
}

/// Cleaned text, or `None` when the cell is blank.
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !is_blank(s)).map(|s| clean_str(s).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_whitespace_and_quotes() {
        assert_eq!(clean_str("  abc "), "abc");
        assert_eq!(clean_str("\" 12 \""), "12");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn blank_markers_are_case_insensitive() {
        for v in ["", "   ", "NA", "n/a", "Missing", "\"\""] {
            assert!(is_blank(v), "{v:?} should be blank");
        }
        assert!(!is_blank("0"));
        assert!(!is_blank("NAVAJO"));
    }

    #[test]
    fn numbers_accept_thousands_separators() {
        assert_eq!(parse_number("1,250,000"), Cell::Value(1_250_000.0));
        assert_eq!(parse_number(" -42.5 "), Cell::Value(-42.5));
        assert_eq!(parse_number("N/A"), Cell::Blank);
        assert_eq!(parse_number("12abc"), Cell::Invalid);
        assert_eq!(parse_number("inf"), Cell::Invalid);
        assert_eq!(parse_number("NaN"), Cell::Invalid);
    }
}
