//! Deterministic extraction of definitions, rules and laws from free text,
//! plus parsing of pasted conversation dumps.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::enums::str_enum;

/// `X とは Y である` style statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub term: String,
    pub meaning: String,
    pub evidence: String,
}

str_enum!(RuleKind {
    Vocabulary => "vocabulary",
    Policy => "policy",
    Behavior => "behavior",
    Other => "other",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    pub confidence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Law {
    pub id: String,
    pub text: String,
    pub source: String,
}

/// Everything extracted from one body of text; consulted by the classifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub definitions: Vec<Definition>,
    pub rules: Vec<Rule>,
    pub laws: Vec<Law>,
}

impl Ruleset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str, source: &str) -> Self {
        Self {
            definitions: extract_definitions(text, source),
            rules: extract_rules(text, source),
            laws: extract_laws(text, source),
        }
    }

    /// A pasted conversation: definitions and laws from the message bodies
    /// and context, rules from the messages and explicit candidates. Text
    /// that does not parse as a conversation is read as plain text.
    pub fn from_dump(text: &str, source: &str) -> Self {
        let dump = parse_conversation_dump(text);
        if dump.messages.is_empty() && dump.context.is_none() {
            return Self::from_text(text, source);
        }
        let mut body: Vec<&str> = dump.messages.iter().map(|m| m.content.as_str()).collect();
        if let Some(context) = &dump.context {
            body.push(context);
        }
        let body = body.join("\n");
        Self {
            definitions: extract_definitions(&body, source),
            rules: extract_rules_from_dump(&dump, source),
            laws: extract_laws(&body, source),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.rules.is_empty() && self.laws.is_empty()
    }
}

const RULE_TITLE_CHARS: usize = 50;
const MIN_RULE_CHARS: usize = 10;
const MAX_RULE_TAGS: usize = 10;

static DEF_TOHA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.{1,30}?)とは[、,]?\s*(.+?)(?:である|であり|だ|なり)$").unwrap()
});
static DEF_NOKOTO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.{1,30}?)は[、,]\s*(.+?)のこと(?:である|だ)?$").unwrap());
static DEF_EQUALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^＝=]{1,30}?)\s*[＝=]\s*(.+)$").unwrap());
static LAW_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"法則|原理|理|法").unwrap());
static TAG_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\u{3040}-\u{309F}\u{30A0}-\u{30FF}\u{4E00}-\u{9FAF}]+$").unwrap());

const RULE_KEYWORDS: &[&str] = &[
    "ルール", "禁止", "絶対", "最重要", "とは", "定義", "原則", "守る", "must", "should",
    "必須", "ポリシー",
];

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['。', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn extract_definitions(text: &str, source: &str) -> Vec<Definition> {
    let mut out: Vec<Definition> = Vec::new();
    for sentence in sentences(text) {
        let caps = [&*DEF_TOHA, &*DEF_NOKOTO, &*DEF_EQUALS]
            .iter()
            .find_map(|re| re.captures(sentence));
        let Some(caps) = caps else { continue };

        let term = caps[1]
            .trim()
            .trim_start_matches(['「', '『', '・', '-'])
            .trim_end_matches(['」', '』'])
            .to_string();
        let meaning = caps[2].trim().to_string();
        if term.is_empty() || meaning.is_empty() {
            continue;
        }
        if out.iter().any(|d| d.term == term && d.meaning == meaning) {
            continue;
        }
        out.push(Definition {
            term,
            meaning,
            evidence: format!("{source}: {sentence}"),
        });
    }
    out
}

/// Sentences that read like rules. Repeats merge into one rule with a
/// higher confidence.
pub fn extract_rules(text: &str, _source: &str) -> Vec<Rule> {
    let mut rules: Vec<Rule> = Vec::new();
    for sentence in sentences(text) {
        let lower = sentence.to_lowercase();
        if !RULE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            continue;
        }
        if sentence.chars().count() <= MIN_RULE_CHARS {
            continue;
        }
        merge_rule(&mut rules, sentence, 1, 1);
    }
    rules
}

/// Rules from a parsed dump: its messages plus explicit `[RULE_CANDIDATES]`,
/// which weigh more.
pub fn extract_rules_from_dump(dump: &ParsedDump, source: &str) -> Vec<Rule> {
    let mut rules = Vec::new();
    for message in &dump.messages {
        for rule in extract_rules(&message.content, source) {
            merge_rule(&mut rules, &rule.text, 1, 1);
        }
    }
    for candidate in &dump.rule_candidates {
        let candidate = candidate.trim();
        if candidate.chars().count() < MIN_RULE_CHARS {
            continue;
        }
        merge_rule(&mut rules, candidate, 3, 2);
    }
    rules
}

fn merge_rule(rules: &mut Vec<Rule>, sentence: &str, initial: u32, bump: u32) {
    let text = sentence.trim();
    let title: String = text.chars().take(RULE_TITLE_CHARS).collect::<String>().replace('\n', " ");
    if let Some(existing) = rules.iter_mut().find(|r| r.text == text || r.title == title) {
        existing.confidence += bump;
        return;
    }
    rules.push(Rule {
        kind: classify_rule_kind(text),
        title,
        text: text.to_string(),
        tags: extract_tags(text),
        confidence: initial,
    });
}

fn classify_rule_kind(text: &str) -> RuleKind {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["とは", "定義", "意味", "語彙", "用語"]) {
        RuleKind::Vocabulary
    } else if has(&[
        "禁止", "絶対", "必須", "原則", "ポリシー", "ルール", "守る", "してはいけない", "must",
    ]) {
        RuleKind::Policy
    } else if has(&["振る舞い", "行動", "動作", "習慣", "癖", "behavior", "should"]) {
        RuleKind::Behavior
    } else {
        RuleKind::Other
    }
}

/// Words longer than two characters that occur at least twice, most frequent first.
fn extract_tags(text: &str) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for word in text
        .split(|c: char| c.is_whitespace() || matches!(c, '。' | '、' | '！' | '？'))
        .filter(|w| w.chars().count() > 2 && TAG_WORD.is_match(w))
    {
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }
    let mut tags: Vec<(&str, usize)> = order
        .into_iter()
        .map(|w| (w, counts[w]))
        .filter(|(_, c)| *c >= 2)
        .collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1));
    tags.into_iter()
        .take(MAX_RULE_TAGS)
        .map(|(w, _)| w.to_string())
        .collect()
}

pub fn extract_laws(text: &str, source: &str) -> Vec<Law> {
    sentences(text)
        .filter(|s| LAW_MARKER.is_match(s))
        .enumerate()
        .map(|(i, s)| Law {
            id: format!("{source}-L{:03}", i + 1),
            text: s.to_string(),
            source: source.to_string(),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Conversation dumps
// ═══════════════════════════════════════════════════════════

str_enum!(DumpRole {
    User => "user",
    Assistant => "assistant",
    System => "system",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMessage {
    pub role: DumpRole,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDump {
    pub messages: Vec<DumpMessage>,
    pub title: Option<String>,
    pub context: Option<String>,
    pub rule_candidates: Vec<String>,
}

#[derive(Deserialize)]
struct RawDumpMessage {
    role: Option<String>,
    content: Option<serde_json::Value>,
}

static USER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:user|ユーザー)\s*[:：]\s*(.+)$").unwrap());
static ASSISTANT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:assistant|アシスタント)\s*[:：]\s*(.+)$").unwrap());
static SYSTEM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:system|システム)\s*[:：]\s*(.+)$").unwrap());
static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([A-Z_]+)\]\s*$").unwrap());

/// Parse a pasted conversation. Accepts a JSON array of `{role, content}`,
/// the `[SESSION_TITLE]/[CONTEXT]/[LOG]/[RULE_CANDIDATES]` sectioned form, or
/// plain `User:` / `Assistant:` lines where unprefixed lines continue the
/// previous message.
pub fn parse_conversation_dump(text: &str) -> ParsedDump {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedDump::default();
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') && !trimmed.contains("[SESSION_TITLE]") {
        if let Ok(raw) = serde_json::from_str::<Vec<RawDumpMessage>>(trimmed) {
            let messages = raw
                .into_iter()
                .filter_map(|m| {
                    let role = m.role?.parse::<DumpRole>().ok()?;
                    let content = match m.content? {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (!content.is_empty()).then_some(DumpMessage { role, content })
                })
                .collect();
            return ParsedDump {
                messages,
                ..ParsedDump::default()
            };
        }
    }

    if trimmed.contains("[SESSION_TITLE]") || trimmed.contains("[LOG]") {
        return parse_sectioned(trimmed);
    }

    ParsedDump {
        messages: parse_log_lines(trimmed.lines()),
        ..ParsedDump::default()
    }
}

fn parse_sectioned(text: &str) -> ParsedDump {
    let mut sections: HashMap<String, Vec<&str>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        if let Some(caps) = SECTION_HEADER.captures(line.trim()) {
            current = Some(caps[1].to_string());
            continue;
        }
        if let Some(name) = &current {
            sections.entry(name.clone()).or_default().push(line);
        }
    }

    let joined = |name: &str| {
        sections
            .get(name)
            .map(|lines| lines.join("\n").trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let rule_candidates = sections
        .get("RULE_CANDIDATES")
        .map(|lines| {
            lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| l.starts_with(['-', '•', '*']))
                .map(|l| l.trim_start_matches(['-', '•', '*']).trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();

    ParsedDump {
        messages: sections
            .get("LOG")
            .map(|lines| parse_log_lines(lines.iter().copied()))
            .unwrap_or_default(),
        title: joined("SESSION_TITLE").and_then(|t| t.lines().next().map(str::to_string)),
        context: joined("CONTEXT"),
        rule_candidates,
    }
}

fn parse_log_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<DumpMessage> {
    let mut messages: Vec<DumpMessage> = Vec::new();
    for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
        let role_line = [
            (&*USER_LINE, DumpRole::User),
            (&*ASSISTANT_LINE, DumpRole::Assistant),
            (&*SYSTEM_LINE, DumpRole::System),
        ]
        .iter()
        .find_map(|(re, role)| re.captures(line).map(|c| (*role, c[1].trim().to_string())));

        match role_line {
            Some((role, content)) => messages.push(DumpMessage { role, content }),
            None => {
                if let Some(last) = messages.last_mut() {
                    last.content.push('\n');
                    last.content.push_str(line);
                }
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_from_toha_sentence() {
        let defs = extract_definitions("火とは熱の状態である。", "test");
        assert_eq!(defs.len(), 1);
        assert!(defs[0].term.contains('火'));
        assert!(defs[0].meaning.contains('熱'));
        assert!(defs[0].evidence.starts_with("test:"));
    }

    #[test]
    fn definition_variants() {
        let defs = extract_definitions("水は、冷えて降るもののことである。\n躰＝骨格", "s");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].term, "水");
        assert_eq!(defs[0].meaning, "冷えて降るもの");
        assert_eq!(defs[1].term, "躰");
        assert_eq!(defs[1].meaning, "骨格");
    }

    #[test]
    fn no_definitions_in_plain_text() {
        assert!(extract_definitions("", "s").is_empty());
        assert!(extract_definitions("今日は晴れています。", "s").is_empty());
    }

    #[test]
    fn rules_are_classified_and_merged() {
        let text = "断定的な言い切りは禁止とする原則がある。\n断定的な言い切りは禁止とする原則がある。\n用語の定義を最初に置くというルール。";
        let rules = extract_rules(text, "s");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, RuleKind::Policy);
        assert_eq!(rules[0].confidence, 2);
        assert_eq!(rules[1].kind, RuleKind::Vocabulary);
    }

    #[test]
    fn short_rule_sentences_are_skipped() {
        assert!(extract_rules("禁止です", "s").is_empty());
    }

    #[test]
    fn laws_need_a_law_marker() {
        let laws = extract_laws("水火の法則がある。空は青い。生成の原理。", "KHS");
        assert_eq!(laws.len(), 2);
        assert_eq!(laws[0].id, "KHS-L001");
        assert_eq!(laws[1].text, "生成の原理");
    }

    #[test]
    fn ruleset_from_text_collects_everything() {
        let rs = Ruleset::from_text("火とは熱の状態である。水火の法則を守るのが原則である。", "doc");
        assert!(!rs.definitions.is_empty());
        assert!(!rs.rules.is_empty());
        assert!(!rs.laws.is_empty());
        assert!(Ruleset::empty().is_empty());
    }

    #[test]
    fn dump_json_array() {
        let dump = parse_conversation_dump(
            r#"[{"role":"user","content":"こんにちは"},{"role":"assistant","content":"はい"},{"role":"tool","content":"x"}]"#,
        );
        assert_eq!(dump.messages.len(), 2);
        assert_eq!(dump.messages[1].role, DumpRole::Assistant);
    }

    #[test]
    fn dump_plain_lines_with_continuation() {
        let dump = parse_conversation_dump("User: 一行目\n続き\nアシスタント：返答\nユーザー: 次");
        assert_eq!(dump.messages.len(), 3);
        assert_eq!(dump.messages[0].content, "一行目\n続き");
        assert_eq!(dump.messages[1].role, DumpRole::Assistant);
        assert_eq!(dump.messages[2].role, DumpRole::User);
    }

    #[test]
    fn dump_sectioned_format() {
        let text = "[SESSION_TITLE]\n水火の整理\n[CONTEXT]\n背景の説明\n[LOG]\nUser: 質問\nAssistant: 回答\n[RULE_CANDIDATES]\n- 断定は禁止する原則を守ること\n- 短い\nメモ";
        let dump = parse_conversation_dump(text);
        assert_eq!(dump.title.as_deref(), Some("水火の整理"));
        assert_eq!(dump.context.as_deref(), Some("背景の説明"));
        assert_eq!(dump.messages.len(), 2);
        assert_eq!(dump.rule_candidates, vec!["断定は禁止する原則を守ること", "短い"]);

        let rules = extract_rules_from_dump(&dump, "dump");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].confidence, 3);
    }

    #[test]
    fn empty_dump() {
        assert_eq!(parse_conversation_dump("  "), ParsedDump::default());
    }

    #[test]
    fn ruleset_from_dump_reads_message_bodies() {
        let ruleset = Ruleset::from_dump("User: 火とは熱の状態である\nAssistant: 了解です", "dump");
        assert_eq!(ruleset.definitions.len(), 1);
        assert!(ruleset.definitions[0].term.contains('火'));

        let plain = Ruleset::from_dump("水とは冷の状態である", "plain");
        assert_eq!(plain, Ruleset::from_text("水とは冷の状態である", "plain"));
    }
}
