//! One chat turn, end to end: sanitize, classify, route, run the plan
//! passes, compose, guard and persist.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classify::intent::{classify_intent, classify_response_mode, wants_detail};
use super::classify::{
    classify_iki, classify_mood, estimate_phase, extract_domain_tags, extract_four_layer_tags, extract_kojiki_tags,
    map_to_form, tokenize, DomainTag, FormResult, FourLayerTag, IkiResult, Intent, Mood, PhaseResult, ResponseMode,
};
use super::compose::{compose, compose_natural, AnswerType, NaturalKind, StatusReport};
use super::evidence::{
    build_evidence_pack, estimate_doc_and_page, resolve_doc, CorpusRetriever, EvidencePack, SearchCandidate,
};
use super::extract::Ruleset;
use super::guard::apply_output_guard;
use super::loop_detect::{LoopCheck, LoopDetector};
use super::persona::{PersonaSnapshot, ToneState, ToneTracker};
use super::plan::{run_passes, CorePlan, PassContext};
use super::sanitize::{sanitize_input, InputModification, MAX_INPUT_CHARS};
use super::truths::constitution_prompt;
use super::PipelineError;
use crate::llm::{generate_with_fallback, LlmGenerate};
use crate::models::{ConversationLogEntry, DecisionFrame, DecisionMode, TurnRole};
use crate::safe_mode::SafeMode;
use crate::store::{validate_session_id, KeyValueStore, SessionStore, TtlStore};

/// Hits fetched for a `#search`.
const SEARCH_FETCHED: usize = 12;
/// Hits remembered for a later number pick.
const SEARCH_STORED: usize = 10;
/// Turns scanned, newest first, when recalling a passphrase.
const PASSPHRASE_SCAN_TURNS: usize = 80;
/// Turns of history handed to the chat model.
const LLM_HISTORY_TURNS: usize = 8;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

/// Everything the classifiers saw in this turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTrace {
    pub intent: Intent,
    pub mood: Mood,
    pub response_mode: ResponseMode,
    pub four_layer_tags: Vec<FourLayerTag>,
    pub kojiki_tags: Vec<&'static str>,
    pub domain_tags: Vec<DomainTag>,
    pub iki: IkiResult,
    pub phase: PhaseResult,
    pub form: FormResult,
    pub loop_check: LoopCheck,
    pub tone: ToneState,
    pub modifications: Vec<InputModification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub thread_id: String,
    pub decision_frame: DecisionFrame,
    pub trace: ChatTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidencePack>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<SearchCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub plan: CorePlan,
}

/// Collaborators of the orchestrator. Volatile per-session state is built
/// from `state_ttl` and `state_capacity`.
pub struct ChatDeps {
    pub sessions: Arc<dyn SessionStore>,
    pub retriever: Arc<CorpusRetriever>,
    pub llm: Option<Arc<dyn LlmGenerate>>,
    pub llm_timeout: Duration,
    pub safe_mode: Arc<SafeMode>,
    pub state_ttl: Duration,
    pub state_capacity: usize,
}

/// Where a turn was routed, before the passes run.
struct Routed {
    mode: DecisionMode,
    reason: &'static str,
    plan: CorePlan,
    answer: AnswerType,
    pack: Option<EvidencePack>,
    candidates: Vec<SearchCandidate>,
    llm: Option<String>,
    show_detail: bool,
}

impl Routed {
    fn natural(mode: DecisionMode, reason: &'static str, kind: NaturalKind) -> Self {
        Self {
            mode,
            reason,
            plan: CorePlan::natural(&compose_natural(&kind)),
            answer: AnswerType::NaturalTemplate(kind),
            pack: None,
            candidates: Vec::new(),
            llm: None,
            show_detail: false,
        }
    }
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    sessions: Arc<dyn SessionStore>,
    retriever: Arc<CorpusRetriever>,
    llm: Option<Arc<dyn LlmGenerate>>,
    llm_timeout: Duration,
    safe_mode: Arc<SafeMode>,
    loops: LoopDetector,
    tones: ToneTracker,
    candidates: Arc<dyn KeyValueStore<Vec<SearchCandidate>>>,
    centers: Arc<dyn KeyValueStore<String>>,
}

impl ChatOrchestrator {
    pub fn new(deps: ChatDeps) -> Self {
        let ttl = deps.state_ttl;
        let cap = deps.state_capacity;
        Self {
            sessions: deps.sessions,
            retriever: deps.retriever,
            llm: deps.llm,
            llm_timeout: deps.llm_timeout,
            safe_mode: deps.safe_mode,
            loops: LoopDetector::new(Arc::new(TtlStore::new(ttl, cap))),
            tones: ToneTracker::new(Arc::new(TtlStore::new(ttl, cap))),
            candidates: Arc::new(TtlStore::new(ttl, cap)),
            centers: Arc::new(TtlStore::new(ttl, cap)),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Drop the volatile state kept for a session: loop signature, tone,
    /// search candidates and the remembered center claim.
    pub fn forget(&self, session_id: &str) {
        self.loops.reset(session_id);
        self.tones.reset(session_id);
        self.candidates.remove(session_id);
        self.centers.remove(session_id);
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatOutcome, PipelineError> {
        let session_id = request.session_id.as_str();
        // Rejected requests must leave no per-session state behind.
        validate_session_id(session_id)?;
        let sanitized = sanitize_input(&request.message, MAX_INPUT_CHARS)?;
        let message = sanitized.text.as_str();

        let intent = classify_intent(message);
        let ruleset = Ruleset::empty();
        let iki = classify_iki(&tokenize(message), &ruleset);
        let phase = estimate_phase(message, &ruleset);
        let form = map_to_form(&iki, &phase);
        let loop_check = self.loops.detect_loop(
            session_id,
            message,
            &[intent.label(), iki.state.as_str(), phase.phase.as_str()],
        );
        let tone = self.tones.observe(session_id, message);

        let trace = ChatTrace {
            intent: intent.clone(),
            mood: classify_mood(message),
            response_mode: classify_response_mode(message),
            four_layer_tags: extract_four_layer_tags(message),
            kojiki_tags: extract_kojiki_tags(message),
            domain_tags: extract_domain_tags(message),
            iki,
            phase,
            form,
            loop_check,
            tone,
            modifications: sanitized.modifications.clone(),
        };

        let routed = self.route(session_id, message, &intent, trace.response_mode).await?;
        tracing::debug!(
            session_id = %session_id,
            mode = ?routed.mode,
            intent = intent.label(),
            reason = routed.reason,
            "Routed chat turn"
        );

        let mut plan = routed.plan;
        if loop_check.loop_detected {
            plan.push_warning(format!("LOOP_DETECTED: count={}", loop_check.count));
        }
        let ctx = PassContext {
            persona: PersonaSnapshot::from_state(&tone),
            previous_center: self.centers.get(session_id),
        };
        let plan = run_passes(plan, &ctx);
        let composed = compose(&plan, routed.pack.as_ref(), &routed.answer);
        let (plan, response) = apply_output_guard(plan, &composed.response);

        let decision_frame = DecisionFrame::new(routed.mode, intent.label(), routed.reason).with_llm(routed.llm);
        let timestamp = Utc::now();
        let log = ConversationLogEntry {
            session_id: session_id.to_string(),
            mode: decision_frame.mode,
            intent: decision_frame.intent.clone(),
            route_reason: decision_frame.route_reason.clone(),
            center_claim: plan.center_claim.clone(),
            warnings: plan.warnings.clone(),
            created_at: timestamp,
        };
        self.sessions.append_exchange(session_id, message, &response, &log)?;
        if !plan.center_claim.is_empty() {
            self.centers.put(session_id, plan.center_claim.clone());
        }

        Ok(ChatOutcome {
            response,
            timestamp,
            thread_id: session_id.to_string(),
            decision_frame,
            trace,
            evidence: routed.pack,
            candidates: routed.candidates,
            detail: composed.detail.filter(|_| routed.show_detail),
            plan,
        })
    }

    async fn route(
        &self,
        session_id: &str,
        message: &str,
        intent: &Intent,
        response_mode: ResponseMode,
    ) -> Result<Routed, PipelineError> {
        use DecisionMode::{Hybrid, Natural};

        let routed = match intent {
            Intent::Status => Routed::natural(Natural, "status", NaturalKind::Status(self.status_report()?)),
            Intent::Search { query, .. } if query.trim().is_empty() => {
                Routed::natural(Natural, "search_empty_query", NaturalKind::SearchEmptyQuery)
            }
            Intent::Search { doc, query } => {
                let hits = self.retriever.search(query, doc.as_deref(), SEARCH_FETCHED);
                let stored: Vec<SearchCandidate> = hits.iter().take(SEARCH_STORED).cloned().collect();
                self.candidates.put(session_id, stored.clone());
                let mut routed = Routed::natural(
                    Hybrid,
                    "search",
                    NaturalKind::SearchResults {
                        query: query.clone(),
                        hits,
                    },
                );
                routed.candidates = stored;
                routed
            }
            Intent::Pin { doc, page } => self.grounded(doc, *page, message, "pin")?,
            Intent::PinUsage => Routed::natural(Natural, "pin_usage", NaturalKind::PinUsage),
            Intent::DocPage { doc, page } => self.grounded(doc, *page, message, "doc_page")?,
            Intent::NumberPick(n) => match self.candidates.get(session_id) {
                Some(stored) => match n.checked_sub(1).and_then(|i| stored.get(i)) {
                    Some(pick) => self.grounded(&pick.doc, pick.page, message, "number_pick")?,
                    None => Routed::natural(Natural, "number_pick_missing", NaturalKind::CandidateMissing(*n)),
                },
                None => self.general(session_id, message, response_mode).await,
            },
            Intent::PassphraseRegister(p) => {
                Routed::natural(Natural, "passphrase_register", NaturalKind::PassphraseRegistered(p.clone()))
            }
            Intent::PassphraseRecall => Routed::natural(
                Natural,
                "passphrase_recall",
                NaturalKind::PassphraseRecalled(self.recall_passphrase(session_id)?),
            ),
            Intent::Greeting => Routed::natural(Natural, "greeting", NaturalKind::Greeting),
            Intent::LowSignal => Routed::natural(Natural, "low_signal", NaturalKind::LowSignal),
            Intent::Stress => Routed::natural(Natural, "stress", NaturalKind::Stress),
            Intent::Consult => Routed::natural(Natural, "consult", NaturalKind::Consult),
            Intent::Domain => self.hybrid(message, "domain")?,
            Intent::General if wants_detail(message) => self.hybrid(message, "detail_requested")?,
            Intent::General => self.general(session_id, message, response_mode).await,
        };
        Ok(routed)
    }

    /// A page the user named or picked. The doc reference is canonicalized
    /// when it resolves to a known document.
    fn grounded(&self, doc: &str, page: u32, message: &str, reason: &'static str) -> Result<Routed, PipelineError> {
        let doc = resolve_doc(doc).map_or(doc, |info| info.name);
        let pack = build_evidence_pack(&self.retriever, doc, page, message, None)?;
        let plan = CorePlan::grounded(doc, page, !pack.page_text.trim().is_empty());
        Ok(Routed {
            mode: DecisionMode::Grounded,
            reason,
            plan,
            answer: AnswerType::Grounded,
            pack: Some(pack),
            candidates: Vec::new(),
            llm: None,
            show_detail: true,
        })
    }

    fn hybrid(&self, message: &str, reason: &'static str) -> Result<Routed, PipelineError> {
        let estimate = estimate_doc_and_page(message);
        let pack = build_evidence_pack(&self.retriever, &estimate.doc, estimate.page, message, Some(&estimate))?;
        if pack.is_empty() {
            tracing::warn!(doc = %pack.doc, page = pack.page, "Corpus has nothing for the estimated page");
        }
        Ok(Routed {
            mode: DecisionMode::Hybrid,
            reason,
            plan: CorePlan::from_evidence(message, &pack),
            answer: AnswerType::HybridSynth,
            pack: Some(pack),
            candidates: Vec::new(),
            llm: None,
            show_detail: wants_detail(message),
        })
    }

    async fn general(&self, session_id: &str, message: &str, mode: ResponseMode) -> Routed {
        let template = NaturalKind::General {
            mode,
            message: message.to_string(),
        };
        let Some(llm) = &self.llm else {
            return Routed::natural(DecisionMode::Natural, "general_template", template);
        };

        let prompt = self.chat_prompt(session_id, message);
        let fallback = compose_natural(&template);
        let outcome = generate_with_fallback(
            llm.as_ref(),
            &constitution_prompt(),
            &prompt,
            self.llm_timeout,
            &fallback,
        )
        .await;

        let kind = if outcome.used_fallback {
            template
        } else {
            NaturalKind::Chat(outcome.text)
        };
        let mut routed = Routed::natural(DecisionMode::LlmChat, "general_llm", kind);
        routed.llm = Some(llm.model().to_string());
        if let Some(reason) = outcome.reason {
            routed.plan.push_warning(format!("LLM_FALLBACK: {reason}"));
        }
        routed
    }

    /// Recent history followed by the new message. A history read failure
    /// only costs context.
    fn chat_prompt(&self, session_id: &str, message: &str) -> String {
        let turns = self
            .sessions
            .read_recent_turns(session_id, LLM_HISTORY_TURNS)
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %session_id, error = %e, "History unavailable for chat prompt");
                Vec::new()
            });
        let mut prompt = String::new();
        for turn in &turns {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.text));
        }
        prompt.push_str(&format!("{}: {}", TurnRole::User, message));
        prompt
    }

    fn recall_passphrase(&self, session_id: &str) -> Result<Option<String>, PipelineError> {
        let turns = self.sessions.read_recent_turns(session_id, PASSPHRASE_SCAN_TURNS)?;
        Ok(turns
            .iter()
            .rev()
            .filter(|t| t.role == TurnRole::User)
            .find_map(|t| match classify_intent(&t.text) {
                Intent::PassphraseRegister(p) => Some(p),
                _ => None,
            }))
    }

    fn status_report(&self) -> Result<StatusReport, PipelineError> {
        Ok(StatusReport {
            docs: self.retriever.status(),
            store_backend: self.sessions.backend(),
            sessions: self.sessions.session_count()?,
            safe_mode: self.safe_mode.reason().filter(|_| self.safe_mode.is_active()),
            llm_enabled: self.llm.is_some(),
        })
    }
}
