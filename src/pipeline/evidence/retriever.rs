use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::search::{SearchCandidate, SearchIndex};
use super::{resolve_doc, EvidenceError, DOCS};

/// Longest quote kept from a law-candidate line.
pub const MAX_QUOTE_CHARS: usize = 500;
/// Longest page text kept from a text line.
pub const MAX_PAGE_TEXT_CHARS: usize = 2_000;
/// Default number of law candidates per page.
pub const MAX_LAWS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    pub doc: String,
    pub page: u32,
    /// `<file>:<line>` of the corpus line the record came from.
    pub source_id: String,
    pub title: String,
    pub quote: String,
    pub law_id: Option<String>,
    pub score: Option<f64>,
}

#[derive(Deserialize)]
pub(crate) struct LawLine {
    pub doc: String,
    #[serde(rename = "pdfPage")]
    pub pdf_page: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quote: String,
}

#[derive(Deserialize)]
pub(crate) struct TextLine {
    pub doc: String,
    #[serde(rename = "pdfPage")]
    pub pdf_page: u32,
    #[serde(default)]
    pub text: String,
}

/// Presence of one document's corpus files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocStatus {
    pub doc: &'static str,
    pub law_candidates: bool,
    pub page_text: bool,
}

/// Size and modification time of one corpus file, `None` when absent.
type FileStamp = Option<(u64, Option<SystemTime>)>;

struct CachedIndex {
    stamps: Vec<FileStamp>,
    index: Arc<SearchIndex>,
}

/// Reads law candidates and page text from `<corpus>/<key>_*.jsonl`.
pub struct CorpusRetriever {
    dir: PathBuf,
    index: RwLock<Option<CachedIndex>>,
}

impl CorpusRetriever {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Law candidates recorded for exactly `(doc, page)`, in file order,
    /// at most `limit`. Unknown documents and missing files yield nothing.
    pub fn get_page_candidates(
        &self,
        doc: &str,
        page: u32,
        limit: usize,
    ) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        if doc.trim().is_empty() {
            return Err(EvidenceError::InvalidArgument("doc must not be blank".into()));
        }
        if page == 0 {
            return Err(EvidenceError::InvalidArgument("page numbers start at 1".into()));
        }
        if limit == 0 {
            return Err(EvidenceError::InvalidArgument("limit must be positive".into()));
        }

        let Some(info) = resolve_doc(doc) else {
            tracing::debug!(doc = %doc, "Unknown document, no candidates");
            return Ok(Vec::new());
        };
        let file_name = info.law_file();
        let mut out = Vec::new();
        for_each_line::<LawLine>(&self.dir.join(&file_name), |line_no, rec| {
            if rec.doc != info.name || rec.pdf_page != page {
                return true;
            }
            out.push(EvidenceRecord {
                doc: rec.doc,
                page,
                source_id: format!("{file_name}:{line_no}"),
                title: rec.title,
                quote: truncate_chars(&rec.quote, MAX_QUOTE_CHARS),
                law_id: Some(rec.id).filter(|id| !id.is_empty()),
                score: None,
            });
            out.len() < limit
        })?;
        Ok(out)
    }

    /// Text of one page, capped at 2000 characters.
    pub fn load_page_text(&self, doc: &str, page: u32) -> Result<Option<String>, EvidenceError> {
        let Some(info) = resolve_doc(doc) else {
            return Ok(None);
        };
        let mut found = None;
        for_each_line::<TextLine>(&self.dir.join(info.text_file()), |_, rec| {
            if rec.doc == info.name && rec.pdf_page == page && !rec.text.is_empty() {
                found = Some(truncate_chars(&rec.text, MAX_PAGE_TEXT_CHARS));
                return false;
            }
            true
        })?;
        Ok(found)
    }

    pub fn status(&self) -> Vec<DocStatus> {
        DOCS.iter()
            .map(|info| DocStatus {
                doc: info.name,
                law_candidates: self.dir.join(info.law_file()).is_file(),
                page_text: self.dir.join(info.text_file()).is_file(),
            })
            .collect()
    }

    /// At least one corpus file is present.
    pub fn is_available(&self) -> bool {
        self.status()
            .iter()
            .any(|s| s.law_candidates || s.page_text)
    }

    /// The term index. Built on first use and rebuilt whenever a corpus
    /// file appears, disappears or changes size or mtime.
    pub fn index(&self) -> Arc<SearchIndex> {
        let stamps = self.file_stamps();
        {
            let cached = self.index.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(c) = cached.as_ref().filter(|c| c.stamps == stamps) {
                return c.index.clone();
            }
        }

        let index = Arc::new(SearchIndex::build(self));
        let mut cached = self.index.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(CachedIndex {
            stamps,
            index: index.clone(),
        });
        index
    }

    fn file_stamps(&self) -> Vec<FileStamp> {
        DOCS.iter()
            .flat_map(|info| [info.law_file(), info.text_file()])
            .map(|name| {
                std::fs::metadata(self.dir.join(name))
                    .ok()
                    .filter(|m| m.is_file())
                    .map(|m| (m.len(), m.modified().ok()))
            })
            .collect()
    }

    pub fn search(&self, query: &str, doc_hint: Option<&str>, limit: usize) -> Vec<SearchCandidate> {
        self.index().search(query, doc_hint, limit)
    }

    pub(crate) fn read_doc_lines<T: for<'de> Deserialize<'de>>(
        &self,
        file_name: &str,
        mut f: impl FnMut(T),
    ) -> Result<(), EvidenceError> {
        for_each_line::<T>(&self.dir.join(file_name), |_, rec| {
            f(rec);
            true
        })
    }
}

/// Stream a JSONL file. Malformed and non UTF-8 lines are skipped; a
/// missing file is an empty corpus. The callback returns `false` to stop early.
fn for_each_line<T: for<'de> Deserialize<'de>>(
    path: &Path,
    mut f: impl FnMut(usize, T) -> bool,
) -> Result<(), EvidenceError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Corpus file missing");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for (i, raw) in BufReader::new(file).split(b'\n').enumerate() {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), line = i + 1, error = %e, "Corpus read failed, keeping lines read so far");
                break;
            }
        };
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(path = %path.display(), line = i + 1, error = %e, "Skipping non UTF-8 corpus line");
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(rec) => {
                if !f(i + 1, rec) {
                    break;
                }
            }
            Err(e) => tracing::debug!(path = %path.display(), line = i + 1, error = %e, "Skipping malformed corpus line"),
        }
    }
    Ok(())
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn retriever() -> (tempfile::TempDir, CorpusRetriever) {
        let dir = tempfile::tempdir().unwrap();
        test_corpus::write(dir.path());
        let r = CorpusRetriever::new(dir.path());
        (dir, r)
    }

    #[test]
    fn candidates_for_exact_page() {
        let (_dir, r) = retriever();
        let got = r.get_page_candidates("言霊秘書.pdf", 6, MAX_LAWS).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].law_id.as_deref(), Some("KHS-P0006-T001"));
        assert_eq!(got[0].source_id, "khs_law_candidates.jsonl:1");
        assert_eq!(got[1].source_id, "khs_law_candidates.jsonl:3");
    }

    #[test]
    fn alias_and_limit() {
        let (_dir, r) = retriever();
        let got = r.get_page_candidates("KHS", 6, 1).unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn page_without_lines_is_empty() {
        let (_dir, r) = retriever();
        assert!(r.get_page_candidates("KHS", 8, MAX_LAWS).unwrap().is_empty());
        assert!(r.get_page_candidates("KTK", 1, MAX_LAWS).unwrap().is_empty());
        assert!(r.get_page_candidates("nowhere.pdf", 1, MAX_LAWS).unwrap().is_empty());
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let (dir, r) = retriever();
        let path = dir.path().join("khs_law_candidates.jsonl");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"\n\xff\xfe broken\n");
        std::fs::write(&path, bytes).unwrap();

        let got = r.get_page_candidates("KHS", 6, MAX_LAWS).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].source_id, "khs_law_candidates.jsonl:3");
    }

    #[test]
    fn malformed_arguments_are_errors() {
        let (_dir, r) = retriever();
        assert!(matches!(
            r.get_page_candidates("KHS", 0, 5),
            Err(EvidenceError::InvalidArgument(_))
        ));
        assert!(matches!(
            r.get_page_candidates(" ", 1, 5),
            Err(EvidenceError::InvalidArgument(_))
        ));
        assert!(matches!(
            r.get_page_candidates("KHS", 1, 0),
            Err(EvidenceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn quotes_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let quote = "あ".repeat(800);
        std::fs::write(
            dir.path().join("khs_law_candidates.jsonl"),
            format!(r#"{{"doc":"言霊秘書.pdf","pdfPage":1,"id":"x","title":"t","quote":"{quote}"}}"#),
        )
        .unwrap();
        let r = CorpusRetriever::new(dir.path());
        let got = r.get_page_candidates("KHS", 1, 5).unwrap();
        assert_eq!(got[0].quote.chars().count(), MAX_QUOTE_CHARS);
    }

    #[test]
    fn page_text_lookup() {
        let (_dir, r) = retriever();
        assert!(r.load_page_text("KHS", 7).unwrap().unwrap().starts_with("序文"));
        assert!(r.load_page_text("KHS", 8).unwrap().is_none());
        assert!(r.load_page_text("KTK", 7).unwrap().is_none());
    }

    #[test]
    fn status_reports_present_files() {
        let (_dir, r) = retriever();
        let status = r.status();
        assert!(status[0].law_candidates && status[0].page_text);
        assert!(!status[1].law_candidates);
        assert!(r.is_available());

        let empty = tempfile::tempdir().unwrap();
        assert!(!CorpusRetriever::new(empty.path()).is_available());
    }
}
