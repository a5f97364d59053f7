//! Byte-budgeted text truncation shared by the report parser and the flake
//! statistics.

use std::borrow::Cow;

/// Marker appended to truncated text. Counts toward the byte budget.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Byte budget for stored failure messages.
pub const FAILURE_MESSAGE_BUDGET: usize = 1024;

/// Byte budget for stored failure output.
pub const FAILURE_OUTPUT_BUDGET: usize = 8192;

/// Truncate `text` to at most `budget` bytes, marker included.
///
/// Text within budget is returned untouched. Otherwise the kept prefix is cut
/// on a UTF-8 character boundary so that prefix plus [`TRUNCATION_MARKER`]
/// never exceeds `budget`. A budget smaller than the marker keeps only as
/// much of the marker as fits.
///
/// # Examples
/// ```
/// use flaketrack::domain::truncation::{truncate_with_marker, TRUNCATION_MARKER};
///
/// let long = "x".repeat(2000);
/// let kept = truncate_with_marker(&long, 1024);
/// assert_eq!(kept.len(), 1024);
/// assert!(kept.ends_with(TRUNCATION_MARKER));
/// assert_eq!(truncate_with_marker("short", 1024), "short");
/// ```
pub fn truncate_with_marker(text: &str, budget: usize) -> Cow<'_, str> {
    if text.len() <= budget {
        return Cow::Borrowed(text);
    }

    let Some(prefix_budget) = budget.checked_sub(TRUNCATION_MARKER.len()) else {
        let marker_prefix = floor_char_boundary(TRUNCATION_MARKER, budget);
        return Cow::Owned(marker_prefix.to_owned());
    };

    let prefix = floor_char_boundary(text, prefix_budget);
    let mut truncated = String::with_capacity(prefix.len() + TRUNCATION_MARKER.len());
    truncated.push_str(prefix);
    truncated.push_str(TRUNCATION_MARKER);
    Cow::Owned(truncated)
}

/// Truncate an optional value, keeping `None` as `None`.
pub fn truncate_optional(text: Option<&str>, budget: usize) -> Option<String> {
    text.map(|value| truncate_with_marker(value, budget).into_owned())
}

fn floor_char_boundary(text: &str, max_len: usize) -> &str {
    let mut end = max_len.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default()
}
