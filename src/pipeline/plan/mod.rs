//! The CorePlan: one record threaded through every pass of a chat turn.
//!
//! A plan only grows. Warnings, claims and stages are appended; nothing a
//! pass adds is ever taken away by a later pass.

pub mod passes;

pub use passes::{
    kokuzo_recall, persona_governor, policy_guard, run_passes, truth_core, verifier, PassContext,
};

use serde::Serialize;

use crate::models::enums::str_enum;
use crate::pipeline::evidence::{page_evidence_id, pick_tai_yo, retriever::truncate_chars, EvidencePack, TaiYo};

/// Longest center claim kept after the truth-core pass.
pub const CENTER_CLAIM_MAX_CHARS: usize = 120;

/// Claim texts drawn from a tai/yo half are cut to this length.
const CLAIM_TEXT_CHARS: usize = 100;

str_enum!(ClaimLevel {
    Fact => "FACT",
    Hypothesis => "HYPOTHESIS",
    Question => "QUESTION",
});

str_enum!(
    /// Stage names recorded in `chain_order`.
    Stage {
        GroundedSpecified => "GROUNDED_SPECIFIED",
        HybridAssembly => "HYBRID_ASSEMBLY",
        TruthCore => "TRUTH_CORE",
        Verifier => "VERIFIER",
        PersonaGovernor => "PERSONA_GOVERNOR",
        KokuzoRecall => "KOKUZO_RECALL",
        PolicyGuard => "POLICY_GUARD",
        OutputGuard => "OUTPUT_GUARD",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub text: String,
    pub evidence_ids: Vec<String>,
    pub level: ClaimLevel,
}

impl Claim {
    pub fn new(text: impl Into<String>, evidence_ids: Vec<String>, level: ClaimLevel) -> Self {
        Self {
            text: text.into(),
            evidence_ids,
            level,
        }
    }
}

/// A claim that cites an evidence id the plan does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkedEvidence {
    pub claim_index: usize,
    pub evidence_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorePlan {
    pub center_claim: String,
    pub claims: Vec<Claim>,
    /// Insertion ordered, no duplicates.
    pub evidence_ids: Vec<String>,
    pub warnings: Vec<String>,
    pub chain_order: Vec<Stage>,
    pub persona_tags: Vec<String>,
    /// Set by a guard; replaces whatever the composer would have produced.
    pub fallback: Option<String>,
}

impl CorePlan {
    pub fn new(center_claim: impl Into<String>) -> Self {
        Self {
            center_claim: center_claim.into(),
            ..Self::default()
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_evidence(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.evidence_ids.contains(&id) {
            self.evidence_ids.push(id);
        }
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn mark_stage(&mut self, stage: Stage) {
        if !self.chain_order.contains(&stage) {
            self.chain_order.push(stage);
        }
    }

    pub fn has_stage(&self, stage: Stage) -> bool {
        self.chain_order.contains(&stage)
    }

    /// Hybrid assembly: a 躰 claim and a 用 claim, each backed by the law it
    /// was cut from, plus every law id of the pack as evidence.
    pub fn from_evidence(message: &str, pack: &EvidencePack) -> Self {
        let taiyo = pick_tai_yo(&pack.laws);
        let mut plan = CorePlan::new(thesis_of(message, &taiyo));
        plan.mark_stage(Stage::HybridAssembly);

        for law in &pack.laws {
            plan.add_evidence(law.id.clone());
        }
        if !taiyo.tai.law_ids.is_empty() {
            plan.add_claim(Claim::new(
                format!("躰（骨格）：{}", truncate_chars(&taiyo.tai.text, CLAIM_TEXT_CHARS)),
                taiyo.tai.law_ids.clone(),
                ClaimLevel::Fact,
            ));
        }
        if !taiyo.yo.law_ids.is_empty() {
            plan.add_claim(Claim::new(
                format!("用（はたらき）：{}", truncate_chars(&taiyo.yo.text, CLAIM_TEXT_CHARS)),
                taiyo.yo.law_ids.clone(),
                ClaimLevel::Fact,
            ));
        }

        if pack.laws.is_empty() {
            plan.push_warning("EVIDENCE_EMPTY");
        }
        if pack.is_estimated {
            plan.push_warning(format!("ESTIMATED: {} P{}", pack.doc, pack.page));
        }
        plan
    }

    /// A page the user named explicitly. Without page text the plan holds
    /// no evidence and says so.
    pub fn grounded(doc: &str, page: u32, has_text: bool) -> Self {
        let mut plan = CorePlan::new(format!("GROUNDED {doc} P{page}"));
        plan.mark_stage(Stage::GroundedSpecified);
        if has_text {
            let id = page_evidence_id(doc, page);
            plan.add_evidence(id.clone());
            plan.add_claim(Claim::new(
                format!("{doc} P{page} の本文"),
                vec![id],
                ClaimLevel::Fact,
            ));
        } else {
            plan.push_warning("KOKUZO_PAGE_MISSING");
        }
        plan
    }

    /// Template and chat replies: no evidence, the text itself is the claim.
    pub fn natural(text: &str) -> Self {
        CorePlan::new(text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().trim())
    }

    /// Law ids cited by claims, in first-cited order.
    pub fn used_evidence_ids(&self) -> Vec<&str> {
        let mut used: Vec<&str> = Vec::new();
        for id in self.claims.iter().flat_map(|c| c.evidence_ids.iter()) {
            if !used.contains(&id.as_str()) {
                used.push(id);
            }
        }
        used
    }
}

/// Center claim for a hybrid plan: the 躰 half up to its first sentence end,
/// or the question itself when no law was found.
fn thesis_of(message: &str, taiyo: &TaiYo) -> String {
    let source = if taiyo.tai.text.trim().is_empty() {
        message
    } else {
        taiyo.tai.text.as_str()
    };
    let first = match source.find('。') {
        Some(end) => &source[..end + '。'.len_utf8()],
        None => source,
    };
    truncate_chars(first.trim(), CENTER_CLAIM_MAX_CHARS)
}

/// Every `(claim, evidence id)` pair whose id is missing from the plan's
/// evidence set.
pub fn validate_claim_links(plan: &CorePlan) -> Vec<UnlinkedEvidence> {
    plan.claims
        .iter()
        .enumerate()
        .flat_map(|(i, claim)| {
            claim
                .evidence_ids
                .iter()
                .filter(|id| !plan.evidence_ids.contains(id))
                .map(move |id| UnlinkedEvidence {
                    claim_index: i,
                    evidence_id: id.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::evidence::{DocKey, EvidenceLaw};

    fn pack_with(laws: Vec<EvidenceLaw>) -> EvidencePack {
        EvidencePack {
            doc: "言霊秘書.pdf".into(),
            doc_key: DocKey::Khs,
            page: 6,
            page_text: "水火の與合によって言灵の躰が生成する。".into(),
            laws,
            is_estimated: false,
            explain: None,
        }
    }

    fn law(id: &str, quote: &str) -> EvidenceLaw {
        EvidenceLaw {
            id: id.into(),
            title: String::new(),
            quote: quote.into(),
        }
    }

    #[test]
    fn mark_stage_is_idempotent() {
        let mut plan = CorePlan::new("x");
        plan.mark_stage(Stage::TruthCore);
        plan.mark_stage(Stage::TruthCore);
        plan.mark_stage(Stage::Verifier);
        assert_eq!(plan.chain_order, vec![Stage::TruthCore, Stage::Verifier]);
    }

    #[test]
    fn evidence_has_set_semantics_and_warnings_do_not() {
        let mut plan = CorePlan::new("x");
        plan.add_evidence("A");
        plan.add_evidence("A");
        plan.push_warning("W");
        plan.push_warning("W");
        assert_eq!(plan.evidence_ids, vec!["A".to_string()]);
        assert_eq!(plan.warnings.len(), 2);
    }

    #[test]
    fn from_evidence_builds_tai_yo_claims() {
        let pack = pack_with(vec![
            law("KHS-P0006-T001", "躰は生成の骨格である。次の文。"),
            law("KHS-P0006-T002", "用は水の流れ。"),
        ]);
        let plan = CorePlan::from_evidence("言灵の躰とは", &pack);
        assert_eq!(plan.center_claim, "躰は生成の骨格である。");
        assert_eq!(plan.claims.len(), 2);
        assert!(plan.claims[0].text.starts_with("躰（骨格）："));
        assert!(plan.claims[1].text.starts_with("用（はたらき）："));
        assert_eq!(plan.chain_order, vec![Stage::HybridAssembly]);
        assert!(validate_claim_links(&plan).is_empty());
    }

    #[test]
    fn from_empty_pack_warns() {
        let plan = CorePlan::from_evidence("言灵とは", &pack_with(vec![]));
        assert!(plan.claims.is_empty());
        assert_eq!(plan.center_claim, "言灵とは");
        assert!(plan.warnings.contains(&"EVIDENCE_EMPTY".to_string()));
    }

    #[test]
    fn grounded_plan_with_and_without_text() {
        let plan = CorePlan::grounded("KHS", 6, true);
        assert_eq!(plan.center_claim, "GROUNDED KHS P6");
        assert_eq!(plan.evidence_ids, vec!["KZPAGE:KHS:P6".to_string()]);

        let missing = CorePlan::grounded("KHS", 99, false);
        assert!(missing.evidence_ids.is_empty());
        assert_eq!(missing.warnings, vec!["KOKUZO_PAGE_MISSING".to_string()]);
    }

    #[test]
    fn unlinked_claims_are_reported() {
        let mut plan = CorePlan::new("x");
        plan.add_evidence("A");
        plan.add_claim(Claim::new("c", vec!["A".into(), "B".into()], ClaimLevel::Fact));
        let unlinked = validate_claim_links(&plan);
        assert_eq!(
            unlinked,
            vec![UnlinkedEvidence {
                claim_index: 0,
                evidence_id: "B".into()
            }]
        );
    }

    #[test]
    fn natural_plan_uses_first_line() {
        let plan = CorePlan::natural("\n了解しました。\n次の行");
        assert_eq!(plan.center_claim, "了解しました。");
        assert!(plan.evidence_ids.is_empty());
    }
}
