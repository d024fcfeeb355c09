// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-range expressions: `expr := token (',' token)*`,
// `token := INT | INT '-' INT`, 1-indexed and inclusive.

use pdfwerk_core::error::{PdfwerkError, Result};
use pdfwerk_core::types::PageRange;
use tracing::debug;

/// Parse a page-range expression against a document of `total_pages` pages.
///
/// Ranges come back in input order. Overlapping and repeated ranges are kept,
/// so the same page can end up in several output documents. Empty tokens (for
/// example from a trailing comma) are skipped.
pub fn parse(input: &str, total_pages: u32) -> Result<Vec<PageRange>> {
    let mut ranges = Vec::new();

    for token in input.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }

        let range = match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_page_number(start, token)?;
                let end = parse_page_number(end, token)?;
                PageRange::new(start, end, total_pages)?
            }
            None => {
                let page = parse_page_number(token, token)?;
                PageRange::new(page, page, total_pages)?
            }
        };
        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(PdfwerkError::InvalidRange("no page ranges given".into()));
    }

    debug!(count = ranges.len(), total_pages, "page ranges parsed");
    Ok(ranges)
}

/// Parse one side of a token. A leading minus sign ends up here as an empty
/// start (`-3`), which is reported against the whole token.
fn parse_page_number(text: &str, token: &str) -> Result<u32> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PdfwerkError::InvalidRange(format!(
            "invalid page range: '{token}'"
        )));
    }
    // Zero is valid syntax; PageRange::new rejects it with a bounds message.
    text.parse::<u32>().map_err(|_| {
        PdfwerkError::InvalidRange(format!("invalid page number in range: '{token}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(range: &PageRange) -> &[u32] {
        &range.pages
    }

    #[test]
    fn parses_singles_and_spans_in_order() {
        let ranges = parse("1,2-3,4-10", 12).expect("valid expression");
        assert_eq!(ranges.len(), 3);

        assert_eq!((ranges[0].start, ranges[0].end), (1, 1));
        assert_eq!(pages(&ranges[0]), &[0]);

        assert_eq!((ranges[1].start, ranges[1].end), (2, 3));
        assert_eq!(pages(&ranges[1]), &[1, 2]);

        assert_eq!((ranges[2].start, ranges[2].end), (4, 10));
        assert_eq!(pages(&ranges[2]), &[3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn whitespace_is_ignored() {
        let ranges = parse("  2 - 4 ,  6 ", 6).expect("valid expression");
        assert_eq!(ranges[0].label(), "2-4");
        assert_eq!(ranges[1].label(), "6");
    }

    #[test]
    fn empty_tokens_are_skipped() {
        let ranges = parse("1,,3,", 3).expect("valid expression");
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn zero_start_is_rejected() {
        let err = parse("0-2", 5).unwrap_err();
        assert!(matches!(err, PdfwerkError::InvalidRange(_)));
    }

    #[test]
    fn reversed_span_is_rejected() {
        assert!(matches!(parse("3-2", 5), Err(PdfwerkError::InvalidRange(_))));
    }

    #[test]
    fn single_page_out_of_bounds_is_rejected() {
        assert!(matches!(parse("5", 3), Err(PdfwerkError::InvalidRange(_))));
        assert!(matches!(parse("0", 3), Err(PdfwerkError::InvalidRange(_))));
    }

    #[test]
    fn span_past_the_end_is_rejected() {
        assert!(parse("2-9", 8).is_err());
        assert!(parse("2-8", 8).is_ok());
    }

    #[test]
    fn non_numeric_token_is_named_in_the_error() {
        let err = parse("1,abc,3", 5).unwrap_err();
        assert!(err.to_string().contains("abc"), "message was: {err}");

        let err = parse("2-x", 5).unwrap_err();
        assert!(err.to_string().contains("2-x"), "message was: {err}");
    }

    #[test]
    fn negative_numbers_are_rejected() {
        assert!(parse("-3", 5).is_err());
        assert!(parse("1--3", 5).is_err());
    }

    #[test]
    fn overlapping_ranges_are_kept() {
        let ranges = parse("1-3,2-4,2-4", 5).expect("overlaps allowed");
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1], ranges[2]);
    }

    #[test]
    fn blank_expression_is_rejected() {
        assert!(parse("", 5).is_err());
        assert!(parse(" , ,", 5).is_err());
    }
}
