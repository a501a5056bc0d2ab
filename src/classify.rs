//! Keyword-heuristic document classification and language detection.
//!
//! This is the fast tier of the two-tier classifier: a fixed-priority
//! phrase match over the head of the extracted text. The LLM-assisted
//! tier lives in the extraction engine and is only invoked on demand.

use crate::models::DocumentCategory;

/// How much of the document head the keyword heuristic inspects.
const CLASSIFY_HEAD_CHARS: usize = 5000;

/// Category-indicative phrases in priority order. The first group with
/// a hit wins.
const KEYWORD_RULES: &[(DocumentCategory, &[&str])] = &[
    (
        DocumentCategory::Itt,
        &["invitation to tender", "itt", "request for proposal", "rfp"],
    ),
    (
        DocumentCategory::Specs,
        &["specification", "technical requirement", "spec"],
    ),
    (
        DocumentCategory::Boq,
        &["bill of quantities", "boq", "schedule of rates"],
    ),
    (
        DocumentCategory::Drawings,
        &["drawing", "dwg", "elevation", "section", "plan"],
    ),
    (
        DocumentCategory::Contract,
        &["contract", "agreement", "terms and conditions"],
    ),
    (
        DocumentCategory::Addendum,
        &["addendum", "amendment", "revision"],
    ),
    (
        DocumentCategory::Hse,
        &["health", "safety", "environment", "hse"],
    ),
    (
        DocumentCategory::Schedule,
        &["schedule", "programme", "milestone", "gantt"],
    ),
];

/// Classify a document by keyword heuristics over the first few
/// thousand characters of its text. Defaults to
/// [`DocumentCategory::General`] when nothing matches.
pub fn classify_by_keywords(text: &str) -> DocumentCategory {
    let head: String = text
        .chars()
        .take(CLASSIFY_HEAD_CHARS)
        .collect::<String>()
        .to_lowercase();

    for (category, phrases) in KEYWORD_RULES {
        if phrases.iter().any(|p| head.contains(p)) {
            return *category;
        }
    }

    DocumentCategory::General
}

/// Detect the dominant script of the text: `ar` when Arabic characters
/// outnumber Latin ones, `en` otherwise.
pub fn detect_language(text: &str) -> &'static str {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if ('\u{0600}'..='\u{06FF}').contains(&c) {
            arabic += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    if arabic > latin {
        "ar"
    } else {
        "en"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itt_outranks_later_categories() {
        // Contains both tender and contract language; the ITT rule wins
        // because it is checked first.
        let text = "Invitation to Tender for the construction contract of Tower B";
        assert_eq!(classify_by_keywords(text), DocumentCategory::Itt);
    }

    #[test]
    fn boq_language_detected() {
        let text = "Bill of Quantities — Section 3: Concrete works";
        assert_eq!(classify_by_keywords(text), DocumentCategory::Boq);
    }

    #[test]
    fn hse_language_detected() {
        let text = "Site health and safety plan for all subcontractors";
        assert_eq!(classify_by_keywords(text), DocumentCategory::Hse);
    }

    #[test]
    fn unmatched_text_is_general() {
        let text = "Minutes of the weekly progress meeting";
        assert_eq!(classify_by_keywords(text), DocumentCategory::General);
    }

    #[test]
    fn classification_only_reads_the_head() {
        let mut text = "x".repeat(CLASSIFY_HEAD_CHARS);
        text.push_str("invitation to tender");
        assert_eq!(classify_by_keywords(&text), DocumentCategory::General);
    }

    #[test]
    fn language_detection() {
        assert_eq!(detect_language("Scope of works and general conditions"), "en");
        assert_eq!(detect_language("دعوة لتقديم العطاءات للمشروع"), "ar");
        assert_eq!(detect_language(""), "en");
    }
}
