use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::estimate::Estimate;
use super::retriever::{truncate_chars, CorpusRetriever, MAX_LAWS};
use super::{doc_prefix, infer_doc_key, DocKey, EvidenceError};

/// One law quoted from the corpus, or cut from page text as a fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceLaw {
    pub id: String,
    pub title: String,
    pub quote: String,
}

/// All evidence gathered for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePack {
    pub doc: String,
    pub doc_key: DocKey,
    #[serde(rename = "pdfPage")]
    pub page: u32,
    pub page_text: String,
    pub laws: Vec<EvidenceLaw>,
    pub is_estimated: bool,
    pub explain: Option<String>,
}

impl EvidencePack {
    /// Neither laws nor page text were found.
    pub fn is_empty(&self) -> bool {
        self.laws.is_empty() && self.page_text.trim().is_empty()
    }

    pub fn id_prefix(&self) -> String {
        format!("{}-P{:04}", doc_prefix(self.doc_key), self.page)
    }

    /// The pack holds this exact text as a law quote or inside the page text.
    pub fn contains_quote(&self, quote: &str) -> bool {
        self.laws.iter().any(|l| l.quote.contains(quote)) || self.page_text.contains(quote)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaiYoPart {
    pub text: String,
    pub law_ids: Vec<String>,
}

/// Structure (躰) and function (用) halves picked from a law list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaiYo {
    pub tai: TaiYoPart,
    pub yo: TaiYoPart,
}

const FALLBACK_LAW_LIMIT: usize = 6;
const FALLBACK_BEFORE: usize = 90;
const FALLBACK_AFTER: usize = 190;
const FALLBACK_HEAD: usize = 220;

const FALLBACK_KEYWORDS: &[&str] = &[
    "言灵", "言霊", "ことだま", "真言", "躰", "体", "用", "正中", "水火", "生成", "辞", "テニヲハ",
    "空仮中", "メシア", "天津金木", "布斗麻邇",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TAI_MARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"躰|体|正中|生成|法則").unwrap());
static YO_MARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"用|働|はたらき|運用|水|流").unwrap());

/// Gather law candidates and page text for `(doc, page)`. When the corpus
/// has no candidates for the page, laws are cut from the page text instead.
pub fn build_evidence_pack(
    retriever: &CorpusRetriever,
    doc: &str,
    page: u32,
    message: &str,
    estimated: Option<&Estimate>,
) -> Result<EvidencePack, EvidenceError> {
    let records = retriever.get_page_candidates(doc, page, MAX_LAWS)?;
    let page_text = retriever.load_page_text(doc, page)?.unwrap_or_default();
    let doc_key = infer_doc_key(doc);

    let mut laws: Vec<EvidenceLaw> = records
        .into_iter()
        .enumerate()
        .map(|(i, r)| EvidenceLaw {
            id: r
                .law_id
                .unwrap_or_else(|| format!("{}-P{:04}-C{:03}", doc_prefix(doc_key), page, i + 1)),
            title: r.title,
            quote: r.quote,
        })
        .collect();

    if laws.is_empty() && !page_text.is_empty() {
        laws = make_fallback_laws(doc_key, page, &page_text, message, FALLBACK_LAW_LIMIT);
        tracing::debug!(doc = %doc, page, count = laws.len(), "No law candidates, cut fallback laws from page text");
    }

    if laws.is_empty() && page_text.is_empty() {
        tracing::warn!(doc = %doc, page, "No evidence found for page");
    }

    Ok(EvidencePack {
        doc: doc.to_string(),
        doc_key,
        page,
        page_text,
        laws,
        is_estimated: estimated.is_some(),
        explain: estimated.map(|e| e.explain.clone()),
    })
}

/// Cut up to `limit` windows of page text around domain keywords that the
/// message mentions. With no keyword hit, the page head becomes the one law.
pub fn make_fallback_laws(
    doc_key: DocKey,
    page: u32,
    page_text: &str,
    message: &str,
    limit: usize,
) -> Vec<EvidenceLaw> {
    let prefix = doc_prefix(doc_key);
    let mut laws: Vec<EvidenceLaw> = Vec::new();

    for keyword in FALLBACK_KEYWORDS.iter().filter(|k| message.contains(**k)) {
        let Some(byte_idx) = page_text.find(keyword) else {
            continue;
        };
        let idx = page_text[..byte_idx].chars().count();
        let start = idx.saturating_sub(FALLBACK_BEFORE);
        let window: String = page_text
            .chars()
            .skip(start)
            .take(idx + FALLBACK_AFTER - start)
            .collect();
        let quote = collapse_whitespace(&window);
        if quote.is_empty() {
            continue;
        }
        laws.push(EvidenceLaw {
            id: format!("{prefix}-P{page:04}-T{:03}", laws.len() + 1),
            title: format!("fallback: {keyword}"),
            quote,
        });
        if laws.len() >= limit {
            break;
        }
    }

    if laws.is_empty() {
        let quote = collapse_whitespace(&truncate_chars(page_text, FALLBACK_HEAD));
        if !quote.is_empty() {
            laws.push(EvidenceLaw {
                id: format!("{prefix}-P{page:04}-T001"),
                title: "fallback: head".into(),
                quote,
            });
        }
    }
    laws
}

/// First law reading as structure and first reading as function, falling
/// back to the first and second laws. Texts are whole quotes; callers cut
/// them to their own budget.
pub fn pick_tai_yo(laws: &[EvidenceLaw]) -> TaiYo {
    let marked = |re: &Regex| laws.iter().find(|l| re.is_match(&format!("{}{}", l.title, l.quote)));
    let tai = marked(&TAI_MARK).or_else(|| laws.first());
    let yo = marked(&YO_MARK).or_else(|| laws.get(1)).or_else(|| laws.first());

    let part = |law: Option<&EvidenceLaw>| match law {
        Some(l) => TaiYoPart {
            text: l.quote.clone(),
            law_ids: vec![l.id.clone()],
        },
        None => TaiYoPart::default(),
    };
    TaiYo {
        tai: part(tai),
        yo: part(yo),
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::evidence::retriever::test_corpus;

    fn law(id: &str, title: &str, quote: &str) -> EvidenceLaw {
        EvidenceLaw {
            id: id.into(),
            title: title.into(),
            quote: quote.into(),
        }
    }

    #[test]
    fn pack_with_candidates() {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let r = CorpusRetriever::new(dir.path());
        let pack = build_evidence_pack(&r, "言霊秘書.pdf", 6, "言灵の躰", None).unwrap();
        assert_eq!(pack.laws.len(), 2);
        assert_eq!(pack.doc_key, DocKey::Khs);
        assert!(!pack.is_estimated);
        assert_eq!(pack.id_prefix(), "KHS-P0006");
    }

    #[test]
    fn pack_falls_back_to_page_text() {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let r = CorpusRetriever::new(dir.path());
        let est = Estimate {
            doc: "言霊秘書.pdf".into(),
            page: 7,
            score: 10,
            explain: "推定".into(),
        };
        let pack = build_evidence_pack(&r, "言霊秘書.pdf", 7, "正中とは", Some(&est)).unwrap();
        assert_eq!(pack.laws.len(), 1);
        assert_eq!(pack.laws[0].id, "KHS-P0007-T001");
        assert_eq!(pack.laws[0].title, "fallback: 正中");
        assert!(pack.is_estimated);
        assert_eq!(pack.explain.as_deref(), Some("推定"));
    }

    #[test]
    fn empty_page_gives_empty_pack() {
        let dir = tempfile::tempdir().unwrap();
        let r = CorpusRetriever::new(dir.path());
        let pack = build_evidence_pack(&r, "KHS", 3, "言灵", None).unwrap();
        assert!(pack.is_empty());
    }

    #[test]
    fn fallback_windows_and_head() {
        let text = format!("{}水火{}", "前".repeat(100), "後".repeat(300));
        let laws = make_fallback_laws(DocKey::Ktk, 31, &text, "水火と正中", 6);
        assert_eq!(laws.len(), 1);
        assert_eq!(laws[0].id, "KTK-P0031-T001");
        assert_eq!(laws[0].quote.chars().count(), FALLBACK_BEFORE + FALLBACK_AFTER);

        let head = make_fallback_laws(DocKey::Unknown, 2, &"字".repeat(500), "無関係", 6);
        assert_eq!(head[0].title, "fallback: head");
        assert_eq!(head[0].id, "DOC-P0002-T001");
        assert_eq!(head[0].quote.chars().count(), FALLBACK_HEAD);

        assert!(make_fallback_laws(DocKey::Khs, 1, "", "言灵", 6).is_empty());
    }

    #[test]
    fn tai_yo_split() {
        let laws = vec![
            law("L1", "a", "水の流れ"),
            law("L2", "b", "躰は骨格である"),
        ];
        let ty = pick_tai_yo(&laws);
        assert_eq!(ty.tai.law_ids, vec!["L2".to_string()]);
        assert_eq!(ty.yo.law_ids, vec!["L1".to_string()]);

        let plain = vec![law("X", "", "甲"), law("Y", "", "乙")];
        let ty = pick_tai_yo(&plain);
        assert_eq!(ty.tai.law_ids, vec!["X".to_string()]);
        assert_eq!(ty.yo.law_ids, vec!["Y".to_string()]);

        assert_eq!(pick_tai_yo(&[]), TaiYo::default());
    }
}
