use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::retriever::{truncate_chars, CorpusRetriever, LawLine, TextLine};
use super::{resolve_doc, DOCS};

/// Weight of a term occurrence in page text.
const TEXT_WEIGHT: u32 = 1;
/// Weight of a term occurrence in a law candidate title or quote.
const LAW_WEIGHT: u32 = 2;
const SNIPPET_BEFORE: usize = 40;
const SNIPPET_CHARS: usize = 240;

static TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[一-龠々〆〤]+|[ァ-ヶー]+|[ぁ-ん]+").unwrap());

const STOPWORDS: &[&str] = &[
    "ある", "いる", "から", "ため", "これ", "それ", "あれ", "この", "その", "あの", "これら",
    "それら", "という", "こと", "もの", "よう", "ところ", "とき", "場合", "あるいは", "または",
    "しかし", "でも", "ただし", "なお", "とは", "です", "ます", "について", "ください", "教えて",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCandidate {
    pub doc: String,
    #[serde(rename = "pdfPage")]
    pub page: u32,
    pub score: u32,
    pub snippet: String,
}

/// Term → page → weight, per document, plus the page texts for snippets.
#[derive(Debug, Default)]
pub struct SearchIndex {
    docs: Vec<(&'static str, HashMap<String, BTreeMap<u32, u32>>)>,
    pages: HashMap<(&'static str, u32), String>,
}

/// Distinct index terms of a text: runs of kanji, katakana or hiragana
/// longer than one character, minus stop words.
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in TERM.find_iter(text) {
        let term = m.as_str();
        if term.chars().count() <= 1 || STOPWORDS.contains(&term) {
            continue;
        }
        if !out.iter().any(|t| t == term) {
            out.push(term.to_string());
        }
    }
    out
}

impl SearchIndex {
    pub fn build(retriever: &CorpusRetriever) -> Self {
        let mut index = SearchIndex::default();
        for info in DOCS {
            let mut terms: HashMap<String, BTreeMap<u32, u32>> = HashMap::new();
            let mut add = |text: &str, page: u32, weight: u32| {
                for term in extract_terms(text) {
                    *terms.entry(term).or_default().entry(page).or_insert(0) += weight;
                }
            };

            let text_result = retriever.read_doc_lines::<TextLine>(&info.text_file(), |rec| {
                if rec.doc == info.name && rec.pdf_page > 0 && !rec.text.is_empty() {
                    add(&rec.text, rec.pdf_page, TEXT_WEIGHT);
                    index
                        .pages
                        .entry((info.name, rec.pdf_page))
                        .or_insert(rec.text);
                }
            });
            let law_result = retriever.read_doc_lines::<LawLine>(&info.law_file(), |rec| {
                if rec.doc == info.name && rec.pdf_page > 0 {
                    add(&format!("{} {}", rec.title, rec.quote), rec.pdf_page, LAW_WEIGHT);
                }
            });
            for result in [text_result, law_result] {
                if let Err(e) = result {
                    tracing::warn!(doc = info.name, error = %e, "Corpus file unreadable, index incomplete");
                }
            }

            tracing::info!(doc = info.name, terms = terms.len(), "Built search index");
            index.docs.push((info.name, terms));
        }
        index
    }

    pub fn term_count(&self) -> usize {
        self.docs.iter().map(|(_, t)| t.len()).sum()
    }

    /// Pages ranked by summed term weight, best first. A hint that names a
    /// known document restricts the search to it.
    pub fn search(&self, query: &str, doc_hint: Option<&str>, limit: usize) -> Vec<SearchCandidate> {
        let query_terms = extract_terms(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }
        let only = doc_hint.and_then(resolve_doc).map(|info| info.name);

        let mut results: Vec<(usize, SearchCandidate)> = Vec::new();
        for (doc_order, (doc, terms)) in self.docs.iter().enumerate() {
            if only.is_some_and(|d| d != *doc) {
                continue;
            }
            let mut scores: BTreeMap<u32, u32> = BTreeMap::new();
            for term in &query_terms {
                if let Some(pages) = terms.get(term) {
                    for (page, weight) in pages {
                        *scores.entry(*page).or_insert(0) += weight;
                    }
                }
            }
            for (page, score) in scores {
                results.push((
                    doc_order,
                    SearchCandidate {
                        doc: doc.to_string(),
                        page,
                        score,
                        snippet: self.snippet(doc, page, &query_terms),
                    },
                ));
            }
        }

        results.sort_by(|(da, a), (db, b)| {
            b.score
                .cmp(&a.score)
                .then(da.cmp(db))
                .then(a.page.cmp(&b.page))
        });
        results.into_iter().take(limit).map(|(_, c)| c).collect()
    }

    fn snippet(&self, doc: &'static str, page: u32, terms: &[String]) -> String {
        let Some(text) = self.pages.get(&(doc, page)) else {
            return String::new();
        };
        let start = terms
            .iter()
            .filter_map(|t| text.find(t.as_str()))
            .min()
            .map(|byte| text[..byte].chars().count().saturating_sub(SNIPPET_BEFORE))
            .unwrap_or(0);
        let tail: String = text.chars().skip(start).collect();
        truncate_chars(&tail, SNIPPET_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::evidence::retriever::test_corpus;

    #[test]
    fn terms_are_script_runs() {
        let terms = extract_terms("言灵の躰とは水火である");
        assert!(terms.contains(&"言灵".to_string()));
        assert!(terms.contains(&"水火".to_string()));
        assert!(!terms.iter().any(|t| t == "とは"));
        assert!(extract_terms("").is_empty());
        assert!(extract_terms("a b c").is_empty());
    }

    #[test]
    fn law_lines_weigh_more() {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let retriever = CorpusRetriever::new(dir.path());

        let hits = retriever.search("水火", None, 5);
        assert_eq!(hits[0].doc, "言霊秘書.pdf");
        assert_eq!(hits[0].page, 6);
        // one text occurrence plus one law occurrence
        assert_eq!(hits[0].score, TEXT_WEIGHT + LAW_WEIGHT);
        assert!(hits[0].snippet.contains("水火"));
    }

    #[test]
    fn ranking_and_hint() {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let retriever = CorpusRetriever::new(dir.path());

        let hits = retriever.search("正中", None, 5);
        let pages: Vec<u32> = hits.iter().map(|h| h.page).collect();
        assert_eq!(pages, vec![9, 7]);
        assert!(retriever.search("正中", Some("KTK"), 5).is_empty());
        assert_eq!(retriever.search("正中", Some("KHS"), 1).len(), 1);
    }

    #[test]
    fn empty_corpus_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = CorpusRetriever::new(dir.path());
        assert!(retriever.search("言灵", None, 5).is_empty());
        assert_eq!(retriever.index().term_count(), 0);
    }

    #[test]
    fn corpus_added_after_first_search_is_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = CorpusRetriever::new(dir.path());
        assert!(retriever.search("水火", None, 5).is_empty());

        test_corpus::write(dir.path());
        let hits = retriever.search("水火", None, 5);
        assert_eq!(hits[0].page, 6);
    }

    #[test]
    fn unchanged_corpus_reuses_index() {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let retriever = CorpusRetriever::new(dir.path());
        let first = retriever.index();
        let second = retriever.index();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }
}
