//! Shared application state for the HTTP surface.
//!
//! `CoreState` owns every long-lived collaborator: the session store, the
//! corpus retriever, the optional chat model, safe mode, the orchestrator
//! and the Kanagi reasoner. It is built once at startup and shared behind
//! an `Arc`.

use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ServerConfig, APP_VERSION};
use crate::db::{self, SharedDb};
use crate::llm::{HttpLlmClient, LlmError, LlmGenerate};
use crate::pipeline::evidence::CorpusRetriever;
use crate::pipeline::orchestrator::{ChatDeps, ChatOrchestrator};
use crate::pipeline::reasoner::KanagiReasoner;
use crate::pipeline::loop_detect::LoopDetector;
use crate::pipeline::truths::verify_integrity;
use crate::safe_mode::SafeMode;
use crate::store::{MemorySessionStore, SessionStore, SqliteSessionStore, StoreError, TtlStore};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Audit rows older than this are pruned on flush.
const AUDIT_RETENTION_DAYS: i64 = 90;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: ServerConfig,
    /// `None` when running on the in-memory stores.
    db: Option<Arc<SharedDb>>,
    retriever: Arc<CorpusRetriever>,
    llm: Option<Arc<dyn LlmGenerate>>,
    safe_mode: Arc<SafeMode>,
    orchestrator: ChatOrchestrator,
    reasoner: KanagiReasoner,
    audit: AuditLogger,
}

impl CoreState {
    /// Open the configured database, build the chat model client and wire
    /// everything together.
    pub fn from_config(config: ServerConfig) -> Result<Self, CoreError> {
        let db = match &config.db_path {
            Some(path) => {
                let conn = db::open_database(path)?;
                tracing::info!(path = %path.display(), "Opened session database");
                Some(Arc::new(SharedDb::new(conn)))
            }
            None => None,
        };

        let llm: Option<Arc<dyn LlmGenerate>> = match &config.llm {
            Some(llm_config) => {
                let client = HttpLlmClient::new(llm_config)?;
                tracing::info!(model = %llm_config.model, base_url = %llm_config.base_url, "Chat model configured");
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("No LLM API key configured, general chat uses templates");
                None
            }
        };

        Ok(Self::assemble(config, db, llm))
    }

    /// In-memory stores and the given chat model. The database path in
    /// `config` is ignored.
    pub fn in_memory(config: ServerConfig, llm: Option<Arc<dyn LlmGenerate>>) -> Self {
        Self::assemble(config, None, llm)
    }

    fn assemble(config: ServerConfig, db: Option<Arc<SharedDb>>, llm: Option<Arc<dyn LlmGenerate>>) -> Self {
        let sessions: Arc<dyn SessionStore> = match &db {
            Some(db) => Arc::new(SqliteSessionStore::new(db.clone())),
            None => Arc::new(MemorySessionStore::new()),
        };
        let retriever = Arc::new(CorpusRetriever::new(config.corpus_dir.clone()));
        if !retriever.is_available() {
            tracing::warn!(dir = %retriever.dir().display(), "No corpus files found, evidence answers will be empty");
        }

        let safe_mode = Arc::new(SafeMode::new());
        if let Err(e) = verify_integrity() {
            safe_mode.engage(&e.to_string());
        }

        let orchestrator = ChatOrchestrator::new(ChatDeps {
            sessions,
            retriever: retriever.clone(),
            llm: llm.clone(),
            llm_timeout: config.llm_timeout,
            safe_mode: safe_mode.clone(),
            state_ttl: config.state_ttl,
            state_capacity: config.state_capacity,
        });
        let reasoner = KanagiReasoner::new(
            LoopDetector::new(Arc::new(TtlStore::new(config.state_ttl, config.state_capacity))),
            Arc::new(TtlStore::new(config.state_ttl, config.state_capacity)),
        );

        let state = Self {
            config,
            db,
            retriever,
            llm,
            safe_mode,
            orchestrator,
            reasoner,
            audit: AuditLogger::new(),
        };
        state.log_access(AccessSource::Internal, "startup", APP_VERSION, None);
        state
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }

    pub fn reasoner(&self) -> &KanagiReasoner {
        &self.reasoner
    }

    pub fn safe_mode(&self) -> &SafeMode {
        &self.safe_mode
    }

    pub fn retriever(&self) -> &CorpusRetriever {
        &self.retriever
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        self.orchestrator.sessions()
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Clear a session's history and every piece of volatile state kept
    /// for it. Returns the number of turns removed.
    pub fn clear_session(&self, session_id: &str) -> Result<usize, CoreError> {
        let removed = self.sessions().clear(session_id)?;
        self.orchestrator.forget(session_id);
        self.reasoner.reset(session_id);
        tracing::info!(session_id = %session_id, removed, "Session cleared");
        Ok(removed)
    }

    /// Log an access event. Auto-flushes when the buffer is full.
    pub fn log_access(&self, source: AccessSource, action: &str, entity: &str, session_id: Option<&str>) {
        let needs_flush = self.audit.log(source, action, entity, session_id);
        if needs_flush {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush the audit buffer to the database and prune old rows. Without a
    /// database the buffer is simply emptied.
    pub fn flush_and_prune_audit(&self) -> Result<(), CoreError> {
        let Some(db) = &self.db else {
            let dropped = self.audit.drain().len();
            tracing::debug!(dropped, "No database, audit buffer discarded");
            return Ok(());
        };
        let conn = db.conn();
        self.audit.flush_to_db(&conn)?;
        if let Err(e) = db::prune_audit_log(&conn, AUDIT_RETENTION_DAYS) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),
}

// ═══════════════════════════════════════════════════════════
// Access source tracking
// ═══════════════════════════════════════════════════════════

/// Who caused an audited event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// An HTTP client, keyed by peer address.
    Api { client: String },
    /// The service itself (startup, maintenance).
    Internal,
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api { client } => write!(f, "api:{client}"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// In-memory audit log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity or on explicit flush.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: AccessSource,
    pub action: String,
    pub entity: String,
    pub session_id: Option<String>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Buffer an event. Returns `true` once the flush threshold is reached.
    pub fn log(&self, source: AccessSource, action: &str, entity: &str, session_id: Option<&str>) -> bool {
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buf.push(AuditEntry {
            timestamp: chrono::Utc::now(),
            source,
            action: action.to_string(),
            entity: entity.to_string(),
            session_id: session_id.map(str::to_string),
        });
        buf.len() >= AUDIT_BUFFER_CAPACITY
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Write buffered entries to the audit_log table.
    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        // SQLite's own datetime format, so retention pruning compares cleanly.
        let rows: Vec<db::AuditRow> = entries
            .iter()
            .map(|e| db::AuditRow {
                timestamp: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                source: e.source.to_string(),
                action: e.action.clone(),
                entity: e.entity.clone(),
                session_id: e.session_id.clone(),
            })
            .collect();

        db::insert_audit_entries(conn, &rows)?;
        tracing::debug!(count = rows.len(), "Flushed audit entries to database");
        Ok(rows.len())
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
