use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::DOCS;

/// A guessed document and page for a message that named neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub doc: String,
    #[serde(rename = "pdfPage")]
    pub page: u32,
    pub score: u32,
    pub explain: String,
}

const MATCH_SCORE: u32 = 10;
const DEFAULT_SCORE: u32 = 1;

struct Band {
    pattern: Regex,
    doc: &'static str,
    page_hints: &'static [u32],
}

static BANDS: LazyLock<Vec<Band>> = LazyLock::new(|| {
    vec![
        Band {
            pattern: Regex::new(r"言[霊靈灵]|ことだま").unwrap(),
            doc: "言霊秘書.pdf",
            page_hints: &[6, 13, 26, 50],
        },
        Band {
            pattern: Regex::new(r"カタカムナ|天津金木|布斗麻邇|フトマニ").unwrap(),
            doc: "カタカムナ言灵解.pdf",
            page_hints: &[1, 18, 26, 50],
        },
        Band {
            pattern: Regex::new(r"いろは|辞|テニヲハ|てにをは").unwrap(),
            doc: "いろは最終原稿.pdf",
            page_hints: &[1, 13, 26, 50],
        },
    ]
});

/// Keyword bands pick a document and its first hint page; the first band
/// that matches wins. Without a match the first document's first page is
/// returned with a low score.
pub fn estimate_doc_and_page(message: &str) -> Estimate {
    for band in BANDS.iter() {
        if let Some(m) = band.pattern.find(message) {
            let page = band.page_hints.first().copied().unwrap_or(1);
            return Estimate {
                doc: band.doc.to_string(),
                page,
                score: MATCH_SCORE,
                explain: format!("キーワード「{}」に一致、{} P{} を推定", m.as_str(), band.doc, page),
            };
        }
    }

    let doc = DOCS[0].name;
    Estimate {
        doc: doc.to_string(),
        page: 1,
        score: DEFAULT_SCORE,
        explain: format!("キーワード一致なし、{doc} P1 を簡易推定"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kotodama_band() {
        let e = estimate_doc_and_page("言灵とは何か");
        assert_eq!(e.doc, "言霊秘書.pdf");
        assert_eq!(e.page, 6);
        assert_eq!(e.score, 10);
        assert!(e.explain.contains("言灵"));
    }

    #[test]
    fn katakamuna_and_iroha_bands() {
        assert_eq!(estimate_doc_and_page("天津金木の構造").doc, "カタカムナ言灵解.pdf");
        let iroha = estimate_doc_and_page("テニヲハの働き");
        assert_eq!(iroha.doc, "いろは最終原稿.pdf");
        assert_eq!(iroha.page, 1);
    }

    #[test]
    fn first_band_wins_on_overlap() {
        assert_eq!(estimate_doc_and_page("カタカムナと言霊").doc, "言霊秘書.pdf");
    }

    #[test]
    fn default_estimate() {
        let e = estimate_doc_and_page("");
        assert_eq!(e.doc, "言霊秘書.pdf");
        assert_eq!(e.page, 1);
        assert_eq!(e.score, 1);
    }
}
