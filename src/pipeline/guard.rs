//! Output guards: the last look at text before it leaves the service.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::plan::{CorePlan, Stage};

/// Boilerplate a reply must never carry. Any hit blocks the whole text.
pub const FORBIDDEN_TEMPLATE_PHRASES: &[&str] = &[
    "AIとして",
    "AIなので",
    "私はAIです",
    "言語モデルとして",
    "大規模言語モデル",
    "as an ai",
    "as a language model",
    "申し訳ありませんが、お答えできません",
];

/// Stock filler that says nothing about the material at hand.
pub const GENERIC_TEMPLATE_PHRASES: &[&str] = &["一般的に", "諸説あり", "人それぞれ", "様々な考え方"];

/// Reply used when a text is blocked.
pub const GUARD_FALLBACK: &str = "その問いには、資料に沿った形でもう一度お答えします。問いを少し具体的にしてください。";

static DETAIL_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#詳細").unwrap());
static PDF_PAGE_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*[-*]?\s*pdfPage\s*[:=]").unwrap());
static LAW_ID_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*[-*]?\s*lawId\s*[:=]").unwrap());
static QUOTE_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*]\s*引用\s*:").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    Passed,
    Rewritten { removed_lines: usize },
    Blocked { phrase: String, fallback: String },
}

/// First forbidden phrase found in `text`, compared case-insensitively.
pub fn find_forbidden_phrase(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    FORBIDDEN_TEMPLATE_PHRASES
        .iter()
        .copied()
        .find(|p| lower.contains(&p.to_lowercase()))
}

pub fn find_generic_phrases(text: &str) -> Vec<&'static str> {
    GENERIC_TEMPLATE_PHRASES
        .iter()
        .copied()
        .filter(|p| text.contains(p))
        .collect()
}

fn is_detail_line(line: &str) -> bool {
    DETAIL_HEADER.is_match(line)
        || PDF_PAGE_FIELD.is_match(line)
        || LAW_ID_FIELD.is_match(line)
        || QUOTE_ITEM.is_match(line)
}

/// Drop detail-block lines (header, page and law id fields, quote items)
/// that leaked into a main response.
pub fn strip_forbidden_from_response(text: &str) -> String {
    text.lines()
        .filter(|line| !is_detail_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Decide what happens to `text`. Blocking wins over rewriting.
pub fn check_output(text: &str) -> GuardOutcome {
    if let Some(phrase) = find_forbidden_phrase(text) {
        return GuardOutcome::Blocked {
            phrase: phrase.to_string(),
            fallback: GUARD_FALLBACK.to_string(),
        };
    }
    let removed_lines = text.lines().filter(|l| is_detail_line(l)).count();
    if removed_lines > 0 {
        GuardOutcome::Rewritten { removed_lines }
    } else {
        GuardOutcome::Passed
    }
}

/// Run the output guard over a composed response. The plan gains the
/// `OUTPUT_GUARD` stage and a warning whenever the text changed.
pub fn apply_output_guard(plan: CorePlan, text: &str) -> (CorePlan, String) {
    let mut plan = plan;
    plan.mark_stage(Stage::OutputGuard);

    match check_output(text) {
        GuardOutcome::Passed => (plan, text.trim().to_string()),
        GuardOutcome::Rewritten { removed_lines } => {
            plan.push_warning(format!("OUTPUT_GUARD: removed {removed_lines} detail lines"));
            let cleaned = strip_forbidden_from_response(text);
            if cleaned.is_empty() {
                plan.fallback = Some(GUARD_FALLBACK.to_string());
                (plan, GUARD_FALLBACK.to_string())
            } else {
                (plan, cleaned)
            }
        }
        GuardOutcome::Blocked { phrase, fallback } => {
            tracing::warn!(phrase = %phrase, "Output blocked by template guard");
            plan.push_warning(format!("OUTPUT_GUARD: blocked \"{phrase}\""));
            plan.fallback = Some(fallback.clone());
            (plan, fallback)
        }
    }
}
