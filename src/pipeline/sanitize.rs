use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::PipelineError;

/// Maximum user message length in characters.
pub const MAX_INPUT_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    InvisibleUnicodeRemoved,
    ControlCharacterRemoved,
    InjectionPatternRemoved,
    ExcessiveLengthTruncated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputModification {
    pub kind: ModificationKind,
    pub description: String,
}

/// A user message that is safe to hand to the classifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedInput {
    pub text: String,
    pub was_modified: bool,
    pub modifications: Vec<InputModification>,
}

/// Clean a raw chat message before any classifier sees it.
pub fn sanitize_input(raw: &str, max_chars: usize) -> Result<SanitizedInput, PipelineError> {
    let mut text = raw.to_string();
    let mut modifications = Vec::new();

    let mut step = |text: &mut String, kind: ModificationKind, description: String, f: fn(&str) -> String| {
        let next = f(text);
        if next != *text {
            *text = next;
            modifications.push(InputModification { kind, description });
        }
    };

    step(
        &mut text,
        ModificationKind::InvisibleUnicodeRemoved,
        "Stripped non-visible Unicode characters".into(),
        remove_invisible_unicode,
    );
    step(
        &mut text,
        ModificationKind::ControlCharacterRemoved,
        "Stripped control characters".into(),
        remove_control_characters,
    );
    step(
        &mut text,
        ModificationKind::InjectionPatternRemoved,
        "Replaced prompt injection patterns".into(),
        remove_injection_patterns,
    );

    let original_chars = text.chars().count();
    if original_chars > max_chars {
        text = truncate_at_boundary(&text, max_chars);
        modifications.push(InputModification {
            kind: ModificationKind::ExcessiveLengthTruncated,
            description: format!(
                "Truncated from {} to {} characters",
                original_chars,
                text.chars().count()
            ),
        });
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(SanitizedInput {
        text,
        was_modified: !modifications.is_empty(),
        modifications,
    })
}

fn remove_invisible_unicode(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(
                *c,
                '\u{200B}'..='\u{200F}'
                    | '\u{202A}'..='\u{202E}'
                    | '\u{2060}'..='\u{2064}'
                    | '\u{2066}'..='\u{2069}'
                    | '\u{FEFF}'
                    | '\u{00AD}'
                    | '\u{034F}'
                    | '\u{061C}'
                    | '\u{180E}'
            )
        })
        .collect()
}

fn remove_control_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn remove_injection_patterns(text: &str) -> String {
    static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(?i)ignore\s+(?:previous|above|all\s+prior|the\s+above)\s+(?:instructions?|rules?|prompts?)",
            r"(?i)forget\s+(?:everything|all|your)\s+(?:previous|prior)?",
            r"(?i)new\s+instructions?:",
            r"(?i)you\s+are\s+now\s+(?:a|an)\s+",
            r"(?i)system\s*:",
            r"<<SYS>>",
            r"\[INST\]",
            r"<\|im_start\|>",
            r"<\|im_end\|>",
            r"(?i)(?:DAN|do\s+anything\s+now)\s+mode",
            r"(?:これまで|以前|前)の(?:指示|命令|ルール)を(?:無視|忘れ)",
            r"システムプロンプトを(?:表示|出力|教え)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let mut result = text.to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, "[FILTERED]").to_string();
    }
    result
}

/// Cut to `max` characters, backing up to the last whitespace or Japanese
/// sentence end when one exists in the kept part.
fn truncate_at_boundary(text: &str, max: usize) -> String {
    let truncated: String = text.chars().take(max).collect();
    match truncated.rfind(|c: char| c.is_whitespace() || c == '。' || c == '、') {
        Some(pos) if pos > 0 => {
            let end = pos + truncated[pos..].chars().next().map_or(0, char::len_utf8);
            truncated[..end].to_string()
        }
        _ => truncated,
    }
}
