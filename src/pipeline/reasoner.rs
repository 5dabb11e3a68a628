//! Kanagi reasoner: breath, phase, form and row for one input, closed by an
//! observation that is never a conclusion.
//!
//! Each session keeps a spiral. The previous observation comes back as a
//! fact on the next turn and the depth grows by one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::classify::form::{map_to_form, Form, FormResult};
use super::classify::iki::{classify_iki, IkiResult, IkiState};
use super::classify::kotodama::{determine_role, map_to_kotodama, KotodamaResult, Role};
use super::classify::phase::{estimate_phase, Phase, PhaseResult};
use super::classify::tokenize;
use super::extract::Ruleset;
use super::loop_detect::{LoopCheck, LoopDetector};
use super::plan::{Claim, ClaimLevel, CorePlan};
use crate::store::KeyValueStore;

/// What a session's spiral remembers between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiralState {
    pub depth: u32,
    pub last_observation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub description: String,
    /// Always at least one entry.
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spiral {
    pub depth: u32,
    pub previous_observation: Option<String>,
    /// Question handed to the next turn.
    pub seed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanagiStep {
    pub step: usize,
    pub stage: &'static str,
    pub output: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanagiTrace {
    pub input: String,
    pub iki: IkiResult,
    pub phase: PhaseResult,
    pub form: FormResult,
    pub role: Role,
    pub kotodama: KotodamaResult,
    pub loop_check: LoopCheck,
    pub contradictions: Vec<String>,
    pub observation: Observation,
    pub spiral: Spiral,
    pub facts: Vec<String>,
    pub steps: Vec<KanagiStep>,
    pub provisional: bool,
}

impl KanagiTrace {
    /// Plan view of the trace: the observation as center claim, facts as
    /// FACT claims and every unresolved point as a QUESTION.
    pub fn to_plan(&self) -> CorePlan {
        let mut plan = CorePlan::new(self.observation.description.clone());
        for fact in &self.facts {
            plan.add_claim(Claim::new(fact.clone(), Vec::new(), ClaimLevel::Fact));
        }
        for question in &self.observation.unresolved {
            plan.add_claim(Claim::new(question.clone(), Vec::new(), ClaimLevel::Question));
        }
        for contradiction in &self.contradictions {
            plan.push_warning(format!("CONTRADICTION: {contradiction}"));
        }
        if self.loop_check.loop_detected {
            plan.push_warning(format!("LOOP: count={}", self.loop_check.count));
        }
        plan
    }
}

#[derive(Clone)]
pub struct KanagiReasoner {
    loops: LoopDetector,
    spirals: Arc<dyn KeyValueStore<SpiralState>>,
}

impl KanagiReasoner {
    pub fn new(loops: LoopDetector, spirals: Arc<dyn KeyValueStore<SpiralState>>) -> Self {
        Self { loops, spirals }
    }

    pub fn reason(&self, input: &str, session_id: &str, ruleset: &Ruleset) -> KanagiTrace {
        let tokens = tokenize(input);
        let iki = classify_iki(&tokens, ruleset);
        let mut phase = estimate_phase(input, ruleset);
        let loop_check = self
            .loops
            .detect_loop(session_id, input, &[iki.state.as_str(), phase.phase.as_str()]);

        if loop_check.loop_detected {
            phase.phase = Phase::Center;
            phase.flags.center = true;
            phase.evidence.push(format!("loop:count={}", loop_check.count));
        }
        let mut form = map_to_form(&iki, &phase);
        if loop_check.loop_detected {
            form.form = Form::Well;
        }
        let role = determine_role(form.form);
        let kotodama = map_to_kotodama(form.form, role);

        let previous = self.spirals.get(session_id);
        let mut facts = vec![format!("入力: {input}")];
        if let Some(prev) = &previous {
            facts.push(format!("前回の観測: {}", prev.last_observation));
        }

        let contradictions = find_contradictions(&iki, &phase);
        let observation = observe(&iki, &phase, &form, role, &kotodama, &contradictions, loop_check);
        let depth = previous.as_ref().map_or(1, |p| p.depth.saturating_add(1));
        let seed = observation
            .unresolved
            .first()
            .cloned()
            .unwrap_or_default();
        let spiral = Spiral {
            depth,
            previous_observation: previous.map(|p| p.last_observation),
            seed,
        };
        self.spirals.put(
            session_id,
            SpiralState {
                depth,
                last_observation: observation.description.clone(),
            },
        );

        let steps = vec![
            KanagiStep {
                step: 1,
                stage: "input",
                output: input.to_string(),
                confidence: None,
            },
            KanagiStep {
                step: 2,
                stage: "iki",
                output: format!("Iki State: {}", iki.state),
                confidence: Some(iki.confidence),
            },
            KanagiStep {
                step: 3,
                stage: "phase",
                output: format!("Phase: {}", phase.phase),
                confidence: Some(phase.confidence),
            },
            KanagiStep {
                step: 4,
                stage: "form",
                output: format!("Form: {}", form.form),
                confidence: Some(form.confidence),
            },
            KanagiStep {
                step: 5,
                stage: "kotodama",
                output: format!("Kotodama: {} (Role: {})", kotodama.row, role),
                confidence: Some(kotodama.confidence),
            },
            KanagiStep {
                step: 6,
                stage: "observation",
                output: observation.description.clone(),
                confidence: None,
            },
        ];

        tracing::debug!(
            session_id = %session_id,
            depth,
            form = %form.form,
            loop_detected = loop_check.loop_detected,
            "Kanagi spiral turned"
        );

        KanagiTrace {
            input: input.to_string(),
            iki,
            phase,
            form,
            role,
            kotodama,
            loop_check,
            contradictions,
            observation,
            spiral,
            facts,
            steps,
            provisional: true,
        }
    }

    pub fn reset(&self, session_id: &str) {
        self.loops.reset(session_id);
        self.spirals.remove(session_id);
    }
}

fn find_contradictions(iki: &IkiResult, phase: &PhaseResult) -> Vec<String> {
    let mut out = Vec::new();
    if iki.state == IkiState::Both {
        out.push(format!("水火同在 (火 {} / 水 {})", iki.fire, iki.water));
    }
    if phase.flags.rise && phase.flags.fall {
        out.push("昇降同時".to_string());
    }
    if phase.flags.open && phase.flags.close {
        out.push("開閉同時".to_string());
    }
    out
}

fn observe(
    iki: &IkiResult,
    phase: &PhaseResult,
    form: &FormResult,
    role: Role,
    kotodama: &KotodamaResult,
    contradictions: &[String],
    loop_check: LoopCheck,
) -> Observation {
    let description = format!(
        "息は {}、相は {}、形は {}（{} / {} 行）として観測される。",
        iki.state, phase.phase, form.form, role, kotodama.row
    );

    let mut unresolved: Vec<String> = contradictions
        .iter()
        .map(|c| format!("{c} はどちらへ収まるか"))
        .collect();
    if loop_check.loop_detected {
        unresolved.push(format!(
            "同じ問いが {} 回続いている。問いの置き方を変えると何が見えるか",
            loop_check.count
        ));
    }
    if iki.state == IkiState::Neutral {
        unresolved.push("火と水のどちらの働きが先に立つか".to_string());
    }
    if unresolved.is_empty() {
        unresolved.push(format!("{} の形は次の入力でどう動くか", form.form));
    }

    Observation {
        description,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::loop_detect::LoopState;
    use crate::store::memory::TtlStore;
    use std::time::Duration;

    fn reasoner() -> KanagiReasoner {
        let ttl = Duration::from_secs(60);
        KanagiReasoner::new(
            LoopDetector::new(Arc::new(TtlStore::<LoopState>::new(ttl, 64))),
            Arc::new(TtlStore::<SpiralState>::new(ttl, 64)),
        )
    }

    #[test]
    fn trace_is_provisional_with_unresolved_points() {
        let trace = reasoner().reason("火が上昇する", "s1", &Ruleset::empty());
        assert!(trace.provisional);
        assert_eq!(trace.iki.state, IkiState::Fire);
        assert_eq!(trace.phase.phase, Phase::Rise);
        assert_eq!(trace.form.form, Form::Line);
        assert!(!trace.observation.unresolved.is_empty());
        assert_eq!(trace.spiral.depth, 1);
        assert!(trace.spiral.previous_observation.is_none());
        assert_eq!(trace.steps.len(), 6);
    }

    #[test]
    fn empty_input_still_observes() {
        let trace = reasoner().reason("", "s1", &Ruleset::empty());
        assert_eq!(trace.iki.state, IkiState::Neutral);
        assert!(!trace.observation.unresolved.is_empty());
    }

    #[test]
    fn spiral_reinjects_previous_observation() {
        let r = reasoner();
        let first = r.reason("水が流れる", "s1", &Ruleset::empty());
        let second = r.reason("火が上がる", "s1", &Ruleset::empty());
        assert_eq!(second.spiral.depth, 2);
        assert_eq!(
            second.spiral.previous_observation.as_deref(),
            Some(first.observation.description.as_str())
        );
        assert!(second
            .facts
            .contains(&format!("前回の観測: {}", first.observation.description)));
    }

    #[test]
    fn loop_forces_center_and_well() {
        let r = reasoner();
        r.reason("火が上昇する", "s1", &Ruleset::empty());
        r.reason("火が上昇する", "s1", &Ruleset::empty());
        let third = r.reason("火が上昇する", "s1", &Ruleset::empty());
        assert!(third.loop_check.loop_detected);
        assert_eq!(third.loop_check.count, 3);
        assert_eq!(third.phase.phase, Phase::Center);
        assert_eq!(third.form.form, Form::Well);
        assert_eq!(third.role, Role::Human);
        assert!(third.observation.unresolved.iter().any(|u| u.contains("3 回")));
    }

    #[test]
    fn fresh_sessions_reproduce() {
        let r = reasoner();
        let a = r.reason("火と水が開いて閉じる", "a", &Ruleset::empty());
        let b = r.reason("火と水が開いて閉じる", "b", &Ruleset::empty());
        assert_eq!(a, b);
        assert_eq!(a.iki.state, IkiState::Both);
        assert!(a.contradictions.iter().any(|c| c == "開閉同時"));
    }

    #[test]
    fn reset_starts_a_new_spiral() {
        let r = reasoner();
        r.reason("水", "s1", &Ruleset::empty());
        r.reset("s1");
        assert_eq!(r.reason("水", "s1", &Ruleset::empty()).spiral.depth, 1);
    }

    #[test]
    fn plan_view_holds_questions_and_contradictions() {
        let trace = reasoner().reason("火と水", "s1", &Ruleset::empty());
        let plan = trace.to_plan();
        assert_eq!(plan.center_claim, trace.observation.description);
        assert!(plan.claims.iter().any(|c| c.level == ClaimLevel::Question));
        assert!(plan.warnings.iter().any(|w| w.starts_with("CONTRADICTION:")));
    }
}
