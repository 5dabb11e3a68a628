//! Read-only evidence from the static JSONL corpora.

pub mod estimate;
pub mod pack;
pub mod retriever;
pub mod search;

pub use estimate::{estimate_doc_and_page, Estimate};
pub use pack::{build_evidence_pack, make_fallback_laws, pick_tai_yo, EvidenceLaw, EvidencePack, TaiYo, TaiYoPart};
pub use retriever::{CorpusRetriever, DocStatus, EvidenceRecord};
pub use search::{SearchCandidate, SearchIndex};

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::models::enums::str_enum;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Corpus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

str_enum!(DocKey {
    Khs => "khs",
    Ktk => "ktk",
    Iroha => "iroha",
    Unknown => "unknown",
});

/// One source document known to the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocInfo {
    /// Name as it appears in the corpus `doc` field.
    pub name: &'static str,
    pub key: DocKey,
    /// Upper-case prefix used in law ids.
    pub prefix: &'static str,
}

impl DocInfo {
    pub fn law_file(&self) -> String {
        format!("{}_law_candidates.jsonl", self.key.as_str())
    }

    pub fn text_file(&self) -> String {
        format!("{}_text.jsonl", self.key.as_str())
    }
}

pub const DOCS: &[DocInfo] = &[
    DocInfo {
        name: "言霊秘書.pdf",
        key: DocKey::Khs,
        prefix: "KHS",
    },
    DocInfo {
        name: "カタカムナ言灵解.pdf",
        key: DocKey::Ktk,
        prefix: "KTK",
    },
    DocInfo {
        name: "いろは最終原稿.pdf",
        key: DocKey::Iroha,
        prefix: "IROHA",
    },
];

/// Resolve a document reference: full name, file stem, key or prefix
/// (case-insensitive for the ASCII forms).
pub fn resolve_doc(doc: &str) -> Option<&'static DocInfo> {
    let doc = doc.trim();
    if doc.is_empty() {
        return None;
    }
    DOCS.iter().find(|info| {
        info.name == doc
            || info.name.trim_end_matches(".pdf") == doc
            || info.key.as_str().eq_ignore_ascii_case(doc)
            || info.prefix.eq_ignore_ascii_case(doc)
    })
}

/// Key for a document name that is not necessarily in the table.
pub fn infer_doc_key(doc: &str) -> DocKey {
    if let Some(info) = resolve_doc(doc) {
        return info.key;
    }
    if doc.contains("言霊秘書") {
        DocKey::Khs
    } else if doc.contains("カタカムナ") {
        DocKey::Ktk
    } else if doc.contains("いろは") {
        DocKey::Iroha
    } else {
        DocKey::Unknown
    }
}

pub fn doc_prefix(key: DocKey) -> &'static str {
    match key {
        DocKey::Khs => "KHS",
        DocKey::Ktk => "KTK",
        DocKey::Iroha => "IROHA",
        DocKey::Unknown => "DOC",
    }
}

/// Opaque evidence id for a whole page.
pub fn page_evidence_id(doc: &str, page: u32) -> String {
    format!("KZPAGE:{doc}:P{page}")
}

/// Reply used when scrubbing leaves nothing to say.
pub const SCRUB_FALLBACK: &str = "了解しました。もう少し状況を教えてください。";

static DOC_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdoc\s*=\s*\S+").unwrap());
static PAGE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpdfPage\s*=\s*\d+").unwrap());
static SHORT_PAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bP\d{1,4}\b").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Remove anything that looks like a document or page citation from free
/// text (used on LLM output, which has no evidence behind it).
pub fn scrub_evidence_like(text: &str) -> String {
    let t = DOC_REF.replace_all(text, "");
    let t = PAGE_REF.replace_all(&t, "");
    let t = SHORT_PAGE.replace_all(&t, "");
    let t = BLANK_RUN.replace_all(&t, "\n\n");
    let t = t.trim();
    if t.is_empty() {
        SCRUB_FALLBACK.to_string()
    } else {
        t.to_string()
    }
}

/// Unify spirit-character spelling in generated prose. Never applied to quotes.
pub fn normalize_spirit_notation(text: &str) -> String {
    text.replace("言霊", "言灵").replace('霊', "灵")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_doc_aliases() {
        assert_eq!(resolve_doc("言霊秘書.pdf").unwrap().key, DocKey::Khs);
        assert_eq!(resolve_doc("言霊秘書").unwrap().key, DocKey::Khs);
        assert_eq!(resolve_doc("KHS").unwrap().key, DocKey::Khs);
        assert_eq!(resolve_doc("ktk").unwrap().key, DocKey::Ktk);
        assert_eq!(resolve_doc("Iroha").unwrap().key, DocKey::Iroha);
        assert!(resolve_doc("unknown.pdf").is_none());
        assert!(resolve_doc("  ").is_none());
    }

    #[test]
    fn corpus_file_names() {
        let khs = resolve_doc("KHS").unwrap();
        assert_eq!(khs.law_file(), "khs_law_candidates.jsonl");
        assert_eq!(khs.text_file(), "khs_text.jsonl");
    }

    #[test]
    fn infer_key_from_partial_name() {
        assert_eq!(infer_doc_key("カタカムナ言灵解(改).pdf"), DocKey::Ktk);
        assert_eq!(infer_doc_key("other.pdf"), DocKey::Unknown);
        assert_eq!(doc_prefix(DocKey::Unknown), "DOC");
    }

    #[test]
    fn page_id_format() {
        assert_eq!(page_evidence_id("KHS", 6), "KZPAGE:KHS:P6");
    }

    #[test]
    fn scrub_removes_citations() {
        let out = scrub_evidence_like("言灵は doc=KHS pdfPage=6 にある。P12 も参照。");
        assert!(!out.contains("doc="));
        assert!(!out.contains("pdfPage"));
        assert!(!out.contains("P12"));
        assert!(out.starts_with("言灵は"));
    }

    #[test]
    fn scrub_falls_back_when_empty() {
        assert_eq!(scrub_evidence_like("doc=KHS pdfPage=3"), SCRUB_FALLBACK);
    }

    #[test]
    fn spirit_notation() {
        assert_eq!(normalize_spirit_notation("言霊と霊性"), "言灵と灵性");
    }
}
