//! Logging helpers that keep claim log lines single-line and bounded.

use std::fmt::Write;

use crate::claims::types::CellCoord;

/// Cells listed individually in a batch summary before the rest is elided.
const MAX_LISTED_CELLS: usize = 16;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///
/// Other control characters become `\xNN`. Long strings are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// `(x, z), (x, z), ...` with a `+N more` tail for large batches.
pub fn format_cells(cells: &[CellCoord]) -> String {
    if cells.is_empty() {
        return "none".to_string();
    }
    let mut out = String::new();
    for (i, cell) in cells.iter().take(MAX_LISTED_CELLS).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(&mut out, "{}", cell);
    }
    if cells.len() > MAX_LISTED_CELLS {
        let _ = write!(&mut out, " +{} more", cells.len() - MAX_LISTED_CELLS);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_controls() {
        assert_eq!(escape_log("Town\nName\r\tEnd"), "Town\\nName\\r\\tEnd");
        assert_eq!(escape_log("a\u{7}b"), "a\\x07b");
    }

    #[test]
    fn cell_lists_are_capped() {
        assert_eq!(format_cells(&[]), "none");
        assert_eq!(
            format_cells(&[CellCoord::new(1, 2), CellCoord::new(-3, 4)]),
            "(1, 2), (-3, 4)"
        );
        let many: Vec<CellCoord> = (0..20).map(|x| CellCoord::new(x, 0)).collect();
        assert!(format_cells(&many).ends_with("(15, 0) +4 more"));
    }
}
