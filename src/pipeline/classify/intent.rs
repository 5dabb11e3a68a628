use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::RuleTable;
use crate::models::enums::str_enum;

/// What the user is asking the orchestrator to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Status,
    /// `#search [doc=X] query`. The query may be empty.
    Search { doc: Option<String>, query: String },
    Pin { doc: String, page: u32 },
    /// `#pin` without a usable `doc=… pdfPage=…` pair.
    PinUsage,
    DocPage { doc: String, page: u32 },
    NumberPick(usize),
    PassphraseRecall,
    PassphraseRegister(String),
    Greeting,
    LowSignal,
    Stress,
    Consult,
    Domain,
    General,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Status => "status",
            Intent::Search { .. } => "search",
            Intent::Pin { .. } | Intent::PinUsage => "pin",
            Intent::DocPage { .. } => "doc_page",
            Intent::NumberPick(_) => "number_pick",
            Intent::PassphraseRecall => "passphrase_recall",
            Intent::PassphraseRegister(_) => "passphrase_register",
            Intent::Greeting => "greeting",
            Intent::LowSignal => "low_signal",
            Intent::Stress => "stress",
            Intent::Consult => "consult",
            Intent::Domain => "domain",
            Intent::General => "general",
        }
    }
}

str_enum!(
    /// Shape of a general-chat answer.
    ResponseMode {
        Design => "design",
        Confirm => "confirm",
        Advice => "advice",
        Answer => "answer",
    }
);

/// Longest message (in characters) still treated as a short Japanese remark.
const SHORT_REMARK_CHARS: usize = 24;

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(こんにちは|こんばんは|おはよう|やあ|hi|hello|hey)\s*[！!。．.]?$").unwrap()
});
static SEARCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^#search\b\s*(.*)$").unwrap());
static DOC_HINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdoc\s*=\s*(\S+)").unwrap());
static PIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)doc\s*=\s*(\S+)\s+pdfPage\s*=\s*(\d+)").unwrap());
static PAGE_HINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpdfPage\s*=\s*(\d+)").unwrap());
static NUMBER_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}$").unwrap());
static JAPANESE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ぁ-んァ-ン一-龯]").unwrap());
static SHORT_ASCII: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z]{1,3}$").unwrap());
static STRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"不安|動けない|しんどい|つらい|焦り|詰んだ|多すぎ|やること|タスク|間に合わない|疲れた").unwrap()
});
static CONSULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"どうすれば|どうしたら|何をすれば|なにをすれば|助けて|相談|迷ってる|困ってる|どうしよう")
        .unwrap()
});
static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)言灵|言霊|ことだま|kotodama|法則|カタカムナ|天津金木|水火|與合|古事記|法華経|真言|布斗麻邇|フトマニ|水穂伝|虚空蔵",
    )
    .unwrap()
});
static PASSPHRASE_IS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"合言葉\s*は\s*[「『"]?(.+?)[」』"]?\s*(?:です。|だ。|です|だ)?$"#).unwrap()
});
static PASSPHRASE_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"合言葉\s*[:：]\s*[「『"]?(.+?)[」』"]?\s*$"#).unwrap());
static PASSPHRASE_RECALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"覚えてる|何だっけ|は\?|は？").unwrap());

static RESPONSE_MODE_RULES: LazyLock<RuleTable<ResponseMode>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"(?i)設計|構成|アーキテクチャ|仕様|組み立て|design", ResponseMode::Design),
        (r"(?i)確認|合ってる|正しい\?|正しい？|本当|confirm|check", ResponseMode::Confirm),
        (r"(?i)どうすれば|どうしたら|アドバイス|助言|べきか|advice", ResponseMode::Advice),
    ])
});

const LOW_SIGNAL_WORDS: &[&str] = &["ping", "test", "ok", "yes", "no"];
const LOW_SIGNAL_JA: &[&str] = &["はい", "いいえ", "うん", "ううん"];

/// Classify a sanitized message. Rules are checked in a fixed order and the
/// first one that applies wins; an empty message is `General`.
pub fn classify_intent(text: &str) -> Intent {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Intent::General;
    }

    if trimmed.starts_with("#status") {
        return Intent::Status;
    }
    if let Some(caps) = SEARCH.captures(trimmed) {
        let raw = caps.get(1).map_or("", |m| m.as_str()).trim();
        let (doc, query) = match DOC_HINT.captures(raw) {
            Some(doc_caps) => (
                Some(doc_caps[1].to_string()),
                raw.replacen(&doc_caps[0], "", 1).trim().to_string(),
            ),
            None => (None, raw.to_string()),
        };
        return Intent::Search { doc, query };
    }
    if trimmed.starts_with("#pin") {
        return match parse_doc_page(&PIN, trimmed) {
            Some((doc, page)) => Intent::Pin { doc, page },
            None => Intent::PinUsage,
        };
    }
    if let (Some(doc), Some(page)) = (DOC_HINT.captures(trimmed), PAGE_HINT.captures(trimmed)) {
        if let Ok(page) = page[1].parse::<u32>() {
            if page > 0 {
                return Intent::DocPage {
                    doc: doc[1].to_string(),
                    page,
                };
            }
        }
    }
    if NUMBER_ONLY.is_match(trimmed) {
        if let Ok(n) = trimmed.parse::<usize>() {
            return Intent::NumberPick(n);
        }
    }
    if trimmed.contains("合言葉") {
        if PASSPHRASE_RECALL.is_match(trimmed) {
            return Intent::PassphraseRecall;
        }
        if let Some(p) = extract_passphrase(trimmed) {
            return Intent::PassphraseRegister(p);
        }
    }
    if GREETING.is_match(trimmed) {
        return Intent::Greeting;
    }
    if is_low_signal(trimmed) {
        return Intent::LowSignal;
    }

    let short_japanese =
        JAPANESE.is_match(trimmed) && trimmed.chars().count() <= SHORT_REMARK_CHARS && !trimmed.starts_with('#');
    if short_japanese && STRESS.is_match(trimmed) {
        return Intent::Stress;
    }
    if short_japanese && CONSULT.is_match(trimmed) {
        return Intent::Consult;
    }
    if DOMAIN.is_match(trimmed) {
        return Intent::Domain;
    }
    Intent::General
}

/// Pull a passphrase out of `合言葉は…です` or `合言葉: …`.
pub fn extract_passphrase(text: &str) -> Option<String> {
    let t = text.trim();
    [&*PASSPHRASE_IS, &*PASSPHRASE_COLON]
        .iter()
        .find_map(|re| re.captures(t))
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty())
}

/// The user asked for the `#詳細` detail block.
pub fn wants_detail(text: &str) -> bool {
    text.contains("#詳細")
}

pub fn classify_response_mode(text: &str) -> ResponseMode {
    RESPONSE_MODE_RULES.first_match(text, ResponseMode::Answer)
}

fn is_low_signal(trimmed: &str) -> bool {
    let low = trimmed.to_lowercase();
    LOW_SIGNAL_WORDS.contains(&low.as_str())
        || LOW_SIGNAL_JA.contains(&trimmed)
        || SHORT_ASCII.is_match(trimmed)
}

fn parse_doc_page(re: &Regex, text: &str) -> Option<(String, u32)> {
    let caps = re.captures(text)?;
    let page = caps[2].parse::<u32>().ok().filter(|p| *p > 0)?;
    Some((caps[1].to_string(), page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_general() {
        assert_eq!(classify_intent(""), Intent::General);
        assert_eq!(classify_intent("   "), Intent::General);
        assert_eq!(classify_response_mode(""), ResponseMode::Answer);
    }

    #[test]
    fn commands() {
        assert_eq!(classify_intent("#status"), Intent::Status);
        assert_eq!(
            classify_intent("#search doc=KHS 言霊 水火"),
            Intent::Search {
                doc: Some("KHS".into()),
                query: "言霊 水火".into()
            }
        );
        assert_eq!(
            classify_intent("#search"),
            Intent::Search {
                doc: None,
                query: String::new()
            }
        );
        assert_eq!(
            classify_intent("#pin doc=言霊秘書.pdf pdfPage=35"),
            Intent::Pin {
                doc: "言霊秘書.pdf".into(),
                page: 35
            }
        );
        assert_eq!(classify_intent("#pin 35"), Intent::PinUsage);
    }

    #[test]
    fn doc_page_and_number_pick() {
        assert_eq!(
            classify_intent("doc=KHS pdfPage=6 を見せて"),
            Intent::DocPage {
                doc: "KHS".into(),
                page: 6
            }
        );
        assert_eq!(classify_intent("doc=KHS pdfPage=0"), Intent::General);
        assert_eq!(classify_intent("3"), Intent::NumberPick(3));
        assert_eq!(classify_intent("123"), Intent::General);
    }

    #[test]
    fn passphrase_register_and_recall() {
        assert_eq!(
            classify_intent("合言葉は「あまてらす」です"),
            Intent::PassphraseRegister("あまてらす".into())
        );
        assert_eq!(
            classify_intent("合言葉：やまと"),
            Intent::PassphraseRegister("やまと".into())
        );
        assert_eq!(classify_intent("合言葉覚えてる？"), Intent::PassphraseRecall);
        assert_eq!(classify_intent("合言葉は？"), Intent::PassphraseRecall);
    }

    #[test]
    fn greeting_and_low_signal() {
        assert_eq!(classify_intent("こんにちは！"), Intent::Greeting);
        assert_eq!(classify_intent("Hello."), Intent::Greeting);
        assert_eq!(classify_intent("ping"), Intent::LowSignal);
        assert_eq!(classify_intent("うん"), Intent::LowSignal);
        assert_eq!(classify_intent("abc"), Intent::LowSignal);
        assert_eq!(classify_intent("abcd"), Intent::General);
    }

    #[test]
    fn short_japanese_stress_and_consult() {
        assert_eq!(classify_intent("やることが多すぎて動けない"), Intent::Stress);
        assert_eq!(classify_intent("どうしたらいい？"), Intent::Consult);
        let long = format!("{}どうしたらいい？", "長い前置きの文章".repeat(4));
        assert_ne!(classify_intent(&long), Intent::Consult);
    }

    #[test]
    fn domain_and_detail() {
        assert_eq!(classify_intent("言霊とは何か教えてほしい、詳しく長めに"), Intent::Domain);
        assert!(wants_detail("水火の法則 #詳細"));
        assert!(!wants_detail("水火の法則"));
    }

    #[test]
    fn response_modes() {
        assert_eq!(classify_response_mode("システムの設計を考えたい"), ResponseMode::Design);
        assert_eq!(classify_response_mode("この理解で本当に合ってる"), ResponseMode::Confirm);
        assert_eq!(classify_response_mode("どうすれば続けられる"), ResponseMode::Advice);
        assert_eq!(classify_response_mode("今日は晴れ"), ResponseMode::Answer);
    }
}
