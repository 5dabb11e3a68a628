//! Final text: fixed templates filled from plan and evidence fields.
//!
//! Quotes only ever come from the evidence pack, cut to a budget. Template
//! wording and plan fields carry everything else.

use serde::Serialize;

use super::classify::intent::ResponseMode;
use super::evidence::retriever::truncate_chars;
use super::evidence::{
    doc_prefix, normalize_spirit_notation, pick_tai_yo, scrub_evidence_like, DocStatus, EvidencePack, SearchCandidate,
    TaiYoPart,
};
use super::plan::passes::KOKAKECHU_PREFIX;
use super::plan::{validate_claim_links, CorePlan};

/// Characters of quoted material allowed in a hybrid answer.
pub const HYBRID_QUOTE_BUDGET: usize = 800;
/// Characters of each quote shown in the `#詳細` block.
pub const DETAIL_EXCERPT_BUDGET: usize = 100;
/// Characters of page text quoted for an explicitly pinned page.
pub const GROUNDED_HEAD_BUDGET: usize = 400;

/// Search hits shown in a reply.
pub const SEARCH_SHOWN: usize = 5;
const SEARCH_SNIPPET_CHARS: usize = 100;
const DETAIL_FALLBACK_LAWS: usize = 3;
const TOPIC_CHARS: usize = 60;

pub const INSUFFICIENT_MATERIAL: &str =
    "資料が不足しているため、資料に基づいてお答えできません。doc と pdfPage を指定するか、#search で該当ページを探してください。";

/// Snapshot rendered by the `#status` reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub docs: Vec<DocStatus>,
    pub store_backend: &'static str,
    pub sessions: usize,
    pub safe_mode: Option<String>,
    pub llm_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NaturalKind {
    Greeting,
    LowSignal,
    Stress,
    Consult,
    PassphraseRegistered(String),
    PassphraseRecalled(Option<String>),
    SearchEmptyQuery,
    SearchResults { query: String, hits: Vec<SearchCandidate> },
    PinUsage,
    CandidateMissing(usize),
    Status(StatusReport),
    /// Reply from the chat model, before scrubbing.
    Chat(String),
    /// No chat model: a fixed shape chosen by response mode.
    General { mode: ResponseMode, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerType {
    HybridSynth,
    Grounded,
    NaturalTemplate(NaturalKind),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composed {
    pub response: String,
    pub detail: Option<String>,
}

impl Composed {
    fn plain(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            detail: None,
        }
    }
}

pub fn compose(plan: &CorePlan, pack: Option<&EvidencePack>, answer_type: &AnswerType) -> Composed {
    if let Some(fallback) = &plan.fallback {
        return Composed::plain(fallback.clone());
    }

    match answer_type {
        AnswerType::HybridSynth => match pack.filter(|p| !p.is_empty()) {
            Some(pack) => Composed {
                response: compose_hybrid(plan, pack),
                detail: Some(compose_detail(plan, pack)),
            },
            None => Composed::plain(INSUFFICIENT_MATERIAL),
        },
        AnswerType::Grounded => match pack {
            Some(pack) if !pack.page_text.trim().is_empty() => compose_grounded(pack),
            Some(pack) => Composed::plain(format!("{INSUFFICIENT_MATERIAL}（{} P{}）", pack.doc, pack.page)),
            None => Composed::plain(INSUFFICIENT_MATERIAL),
        },
        AnswerType::NaturalTemplate(kind) => Composed::plain(compose_natural(kind)),
    }
}

/// Spends a character budget across several quotes.
struct QuoteBudget(usize);

impl QuoteBudget {
    fn take(&mut self, quote: &str) -> String {
        let cut = truncate_chars(quote, self.0);
        self.0 -= cut.chars().count();
        cut
    }
}

fn kokakechu_flags(plan: &CorePlan) -> Vec<&str> {
    plan.warnings
        .iter()
        .filter_map(|w| w.strip_prefix(KOKAKECHU_PREFIX))
        .map(str::trim)
        .collect()
}

fn compose_hybrid(plan: &CorePlan, pack: &EvidencePack) -> String {
    let taiyo = pick_tai_yo(&pack.laws);
    let unlinked: Vec<String> = validate_claim_links(plan).into_iter().map(|u| u.evidence_id).collect();
    let is_hypothesis = |part: &TaiYoPart| {
        part.law_ids
            .iter()
            .any(|id| unlinked.contains(id) || !plan.evidence_ids.contains(id))
    };

    let mut budget = QuoteBudget(HYBRID_QUOTE_BUDGET);
    let mut lines = vec!["（資料準拠）".to_string()];
    if !plan.center_claim.is_empty() {
        lines.push(format!("正中命題：{}", plan.center_claim));
    }
    lines.push("まず「躰（骨格）」と「用（はたらき）」に分けて定義を立てます。".into());
    for (label, part) in [("躰", &taiyo.tai), ("用", &taiyo.yo)] {
        let marker = if is_hypothesis(part) { "（仮説）" } else { "" };
        let text = budget.take(&part.text);
        if text.is_empty() {
            lines.push(format!("{label}{marker}：（抽出不足）"));
        } else {
            lines.push(format!("{label}{marker}：{text}"));
        }
    }
    let flags = kokakechu_flags(plan);
    if !flags.is_empty() {
        lines.push(String::new());
        lines.push(format!("注意：{}が検知されました。", flags.join("、")));
    }
    lines.join("\n")
}

/// The `#詳細` block: location, estimation, center claim and a short
/// excerpt of every law the claims cite (or the first three laws).
pub fn compose_detail(plan: &CorePlan, pack: &EvidencePack) -> String {
    let mut lines = vec![
        "#詳細".to_string(),
        format!("- doc: {}", pack.doc),
        format!("- pdfPage: {}", pack.page),
        format!("- idPrefix: {}-P{:04}", doc_prefix(pack.doc_key), pack.page),
        format!("- isEstimated: {}", pack.is_estimated),
    ];
    if let Some(explain) = &pack.explain {
        lines.push(format!("- 推定根拠: {explain}"));
    }
    if !plan.center_claim.is_empty() {
        lines.push(format!("- 正中命題：{}", plan.center_claim));
    }
    let flags = kokakechu_flags(plan);
    if !flags.is_empty() {
        lines.push(format!("- 空仮中検知：{}", flags.join("、")));
    }

    lines.push("- 根拠（抜粋）:".into());
    let used = plan.used_evidence_ids();
    let picked: Vec<_> = if used.is_empty() {
        pack.laws.iter().take(DETAIL_FALLBACK_LAWS).collect()
    } else {
        pack.laws.iter().filter(|l| used.contains(&l.id.as_str())).collect()
    };
    for law in picked {
        lines.push(format!("  - {} {}", law.id, law.title));
        lines.push(format!("    引用: {}", truncate_chars(&law.quote, DETAIL_EXCERPT_BUDGET)));
    }
    lines.join("\n")
}

fn compose_grounded(pack: &EvidencePack) -> Composed {
    let head = truncate_chars(pack.page_text.trim(), GROUNDED_HEAD_BUDGET);
    let ellipsis = if pack.page_text.trim().chars().count() > GROUNDED_HEAD_BUDGET {
        "..."
    } else {
        ""
    };
    Composed {
        response: format!(
            "（資料準拠）{} P{} を指定として受け取りました。\n\n【引用（先頭{}文字）】\n{}{}",
            pack.doc, pack.page, GROUNDED_HEAD_BUDGET, head, ellipsis
        ),
        detail: Some(format!(
            "#詳細\n- doc: {}\n- pdfPage: {}\n- 状態: 本文取得済み",
            pack.doc, pack.page
        )),
    }
}

pub fn compose_natural(kind: &NaturalKind) -> String {
    match kind {
        NaturalKind::Greeting => "こんにちは。天聞アークです。今日はどんなことを整えましょうか。".into(),
        NaturalKind::LowSignal => {
            "了解しました。何かお手伝いできることはありますか？気になることがあれば、そのまま書いてください。".into()
        }
        NaturalKind::Stress => [
            "【天聞の所見】やることが重なって、気持ちが先に疲れているようです。",
            "",
            "まず一つだけ選びましょう：",
            "1) 今日中に終わらせたいこと",
            "2) 後回しにできること",
            "3) 誰かに頼めること",
            "",
            "番号でもOK。一言で返してください。",
        ]
        .join("\n"),
        NaturalKind::Consult => [
            "【天聞の所見】短文の相談は、まず方向を一つに絞ると進みやすくなります。",
            "",
            "1) 予定・タスクの整理",
            "2) 迷いの整理",
            "3) 気持ちを整えたい",
            "",
            "番号でもOK。一言で返してください。",
        ]
        .join("\n"),
        NaturalKind::PassphraseRegistered(p) => format!("登録しました。合言葉は「{p}」です。"),
        NaturalKind::PassphraseRecalled(Some(p)) => format!("覚えています。合言葉は「{p}」です。"),
        NaturalKind::PassphraseRecalled(None) => {
            "まだ合言葉が登録されていません。先に『合言葉は◯◯です』と教えてください。".into()
        }
        NaturalKind::SearchEmptyQuery => {
            "検索語が空です。#search doc=KHS 言霊 のように検索語も指定してください。".into()
        }
        NaturalKind::SearchResults { query, hits } if hits.is_empty() => {
            format!("【検索結果】「{query}」に該当するページが見つかりませんでした。")
        }
        NaturalKind::SearchResults { query, hits } => {
            let mut out = format!("【検索結果】「{query}」\n");
            for (i, hit) in hits.iter().take(SEARCH_SHOWN).enumerate() {
                out.push_str(&format!(
                    "\n{}. {} P{}: {}...",
                    i + 1,
                    hit.doc,
                    hit.page,
                    truncate_chars(&hit.snippet, SEARCH_SNIPPET_CHARS)
                ));
            }
            out.push_str("\n\n※ 番号を選択すると詳細を表示します。");
            out
        }
        NaturalKind::PinUsage => "エラー: #pin doc=<filename> pdfPage=<number> の形式で指定してください".into(),
        NaturalKind::CandidateMissing(n) => {
            format!("番号 {n} に当たる候補がありません。先に #search で候補を表示してください。")
        }
        NaturalKind::Status(report) => compose_status(report),
        NaturalKind::Chat(text) => normalize_spirit_notation(&scrub_evidence_like(text)),
        NaturalKind::General { mode, message } => compose_general(*mode, message),
    }
}

fn compose_status(report: &StatusReport) -> String {
    let yes_no = |b: bool| if b { "あり" } else { "なし" };
    let mut lines = vec!["【KOKUZO 状態】".to_string()];
    for doc in &report.docs {
        lines.push(format!(
            "- {}: 法則候補 {} / 本文 {}",
            doc.doc,
            yes_no(doc.law_candidates),
            yes_no(doc.page_text)
        ));
    }
    lines.push(format!("- 記憶: {} (セッション {})", report.store_backend, report.sessions));
    lines.push(format!("- 対話モデル: {}", if report.llm_enabled { "接続" } else { "未設定" }));
    match &report.safe_mode {
        Some(reason) => lines.push(format!("- セーフモード: 作動中 ({reason})")),
        None => lines.push("- セーフモード: 停止".into()),
    }
    lines.join("\n")
}

fn compose_general(mode: ResponseMode, message: &str) -> String {
    let topic = truncate_chars(message.trim(), TOPIC_CHARS);
    match mode {
        ResponseMode::Design => format!(
            "扱う対象: {topic}\n\n提案（設計者型）:\n1) 目的と制約を一行で書く\n2) 構成要素を三つまでに分ける\n3) 最初に作る一つを決める"
        ),
        ResponseMode::Confirm => format!(
            "確認対象: {topic}\n\n- 事実: 何が起きているか\n- 期待値: どうなるはずだったか\n- 差分: その間にあるもの\n\nこの三点があれば、一緒に確かめられます。"
        ),
        ResponseMode::Advice => format!(
            "課題: {topic}\n\n進め方（伴走型）:\n1) いま一番気になる点を一つ選ぶ\n2) それを小さな一歩にする\n3) やってみて、また教えてください"
        ),
        ResponseMode::Answer => {
            format!("受理: {topic}\n\nもう少し状況を教えてもらえれば、要点から整理してお返しします。")
        }
    }
}
