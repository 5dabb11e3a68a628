//! Plan passes. Each one takes a plan and returns it with its own stage
//! marked and its findings appended.

use super::{validate_claim_links, ClaimLevel, CorePlan, Stage, CENTER_CLAIM_MAX_CHARS};
use crate::pipeline::evidence::retriever::truncate_chars;
use crate::pipeline::guard::{find_forbidden_phrase, find_generic_phrases, GUARD_FALLBACK};
use crate::pipeline::persona::PersonaSnapshot;

/// Prefix of warnings that flag an empty, templated or circular claim.
pub const KOKAKECHU_PREFIX: &str = "KOKAKECHU:";

/// Inputs the passes need besides the plan itself.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    pub persona: PersonaSnapshot,
    /// Center claim remembered from the previous turn of this thread.
    pub previous_center: Option<String>,
}

/// Normalize the center claim to one line of at most 120 characters and
/// flag claims that carry nothing.
pub fn truth_core(plan: CorePlan) -> CorePlan {
    let mut plan = plan;
    plan.mark_stage(Stage::TruthCore);

    let collapsed = plan.center_claim.split_whitespace().collect::<Vec<_>>().join(" ");
    plan.center_claim = truncate_chars(&collapsed, CENTER_CLAIM_MAX_CHARS);

    if plan.center_claim.is_empty() {
        let replacement = plan
            .claims
            .iter()
            .find(|c| !c.text.trim().is_empty())
            .map(|c| truncate_chars(c.text.trim(), CENTER_CLAIM_MAX_CHARS));
        match replacement {
            Some(text) => plan.center_claim = text,
            None => plan.push_warning("TRUTH_CORE: empty center claim"),
        }
    }

    let mut flags: Vec<String> = Vec::new();
    for (i, claim) in plan.claims.iter().enumerate() {
        if claim.text.trim().is_empty() {
            flags.push(format!("TRUTH_CORE: claim {i} is empty"));
        }
        if claim.level == ClaimLevel::Fact && claim.evidence_ids.is_empty() {
            flags.push(format!("{KOKAKECHU_PREFIX} 根拠なし断定 (claim {i})"));
        }
        if claim.text.trim() == plan.center_claim {
            flags.push(format!("{KOKAKECHU_PREFIX} 循環説明 (claim {i})"));
        }
    }
    for phrase in find_generic_phrases(&plan.center_claim) {
        flags.push(format!("{KOKAKECHU_PREFIX} 一般テンプレ「{phrase}」"));
    }
    for flag in flags {
        plan.push_warning(flag);
    }
    plan
}

/// Flag missing evidence and claims citing ids the plan does not hold.
/// Claims keep their level; the composer renders unlinked ones as
/// hypotheses.
pub fn verifier(plan: CorePlan) -> CorePlan {
    let mut plan = plan;
    plan.mark_stage(Stage::Verifier);

    if plan.evidence_ids.is_empty() && !plan.claims.is_empty() {
        plan.push_warning("VERIFIER: no evidence");
    }
    for unlinked in validate_claim_links(&plan) {
        plan.push_warning(format!(
            "EVIDENCE_UNLINKED: claim {} cites {}",
            unlinked.claim_index, unlinked.evidence_id
        ));
    }
    plan
}

pub fn persona_governor(plan: CorePlan, persona: &PersonaSnapshot) -> CorePlan {
    let mut plan = plan;
    plan.mark_stage(Stage::PersonaGovernor);
    for tag in persona.tags() {
        if !plan.persona_tags.contains(&tag) {
            plan.persona_tags.push(tag);
        }
    }
    plan
}

/// Note that the previous turn's center claim was recalled. The stage is
/// only marked when there was something to recall.
pub fn kokuzo_recall(plan: CorePlan, previous: Option<&str>) -> CorePlan {
    let mut plan = plan;
    if let Some(prev) = previous.filter(|p| !p.is_empty()) {
        plan.mark_stage(Stage::KokuzoRecall);
        plan.push_warning(format!("KOKUZO: recalled centerClaim={}", truncate_chars(prev, 40)));
    }
    plan
}

/// A plan whose own claims carry forbidden boilerplate gets the fallback
/// text; its claims stay for the trace.
pub fn policy_guard(plan: CorePlan) -> CorePlan {
    let mut plan = plan;
    plan.mark_stage(Stage::PolicyGuard);

    let hit = find_forbidden_phrase(&plan.center_claim)
        .or_else(|| plan.claims.iter().find_map(|c| find_forbidden_phrase(&c.text)));
    if let Some(phrase) = hit {
        plan.push_warning(format!("POLICY_GUARD: forbidden phrase \"{phrase}\""));
        plan.fallback = Some(GUARD_FALLBACK.to_string());
    }
    plan
}

/// All passes, left to right.
pub fn run_passes(plan: CorePlan, ctx: &PassContext) -> CorePlan {
    let plan = truth_core(plan);
    let plan = verifier(plan);
    let plan = persona_governor(plan, &ctx.persona);
    let plan = kokuzo_recall(plan, ctx.previous_center.as_deref());
    policy_guard(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::plan::Claim;
    use std::collections::HashSet;

    fn sample() -> CorePlan {
        let mut plan = CorePlan::new("  躰は\n骨格である。  ");
        plan.add_evidence("L1");
        plan.add_claim(Claim::new("躰（骨格）：骨格", vec!["L1".into()], ClaimLevel::Fact));
        plan.add_claim(Claim::new("用（はたらき）：流れ", vec!["L9".into()], ClaimLevel::Fact));
        plan
    }

    #[test]
    fn truth_core_normalizes_center_claim() {
        let plan = truth_core(CorePlan::new(format!("一 {}", "長".repeat(300))));
        assert_eq!(plan.center_claim.chars().count(), CENTER_CLAIM_MAX_CHARS);
        assert_eq!(truth_core(sample()).center_claim, "躰は 骨格である。");
    }

    #[test]
    fn truth_core_flags_empty_and_unbacked_claims() {
        let mut plan = CorePlan::new("");
        plan.add_claim(Claim::new("", vec![], ClaimLevel::Hypothesis));
        plan.add_claim(Claim::new("断定", vec![], ClaimLevel::Fact));
        let plan = truth_core(plan);
        assert_eq!(plan.center_claim, "断定");
        assert!(plan.warnings.iter().any(|w| w == "TRUTH_CORE: claim 0 is empty"));
        assert!(plan.warnings.iter().any(|w| w.contains("根拠なし断定")));
        assert!(plan.warnings.iter().any(|w| w.contains("循環説明")));
    }

    #[test]
    fn truth_core_flags_generic_center_claim() {
        let plan = truth_core(CorePlan::new("一般的に言灵は大切です"));
        assert!(plan.warnings.iter().any(|w| w.starts_with(KOKAKECHU_PREFIX) && w.contains("一般的に")));
    }

    #[test]
    fn verifier_reports_unlinked_evidence() {
        let plan = verifier(sample());
        assert_eq!(plan.warnings, vec!["EVIDENCE_UNLINKED: claim 1 cites L9".to_string()]);
        assert_eq!(plan.claims.len(), 2);

        let mut bare = CorePlan::new("x");
        bare.add_claim(Claim::new("c", vec![], ClaimLevel::Hypothesis));
        assert!(verifier(bare).warnings.contains(&"VERIFIER: no evidence".to_string()));
    }

    #[test]
    fn kokuzo_recall_only_with_previous() {
        let plan = kokuzo_recall(CorePlan::new("x"), None);
        assert!(plan.chain_order.is_empty());
        let plan = kokuzo_recall(plan, Some("前".repeat(60).as_str()));
        assert_eq!(plan.chain_order, vec![Stage::KokuzoRecall]);
        assert_eq!(plan.warnings[0], format!("KOKUZO: recalled centerClaim={}", "前".repeat(40)));
    }

    #[test]
    fn policy_guard_sets_fallback() {
        let plan = policy_guard(CorePlan::new("AIとしてお答えします"));
        assert_eq!(plan.fallback.as_deref(), Some(GUARD_FALLBACK));
        assert!(policy_guard(CorePlan::new("躰と用")).fallback.is_none());
    }

    #[test]
    fn chain_order_has_no_duplicates_after_repeated_passes() {
        let ctx = PassContext {
            previous_center: Some("前回".into()),
            ..PassContext::default()
        };
        let mut plan = sample();
        for _ in 0..4 {
            plan = run_passes(plan, &ctx);
        }
        let unique: HashSet<Stage> = plan.chain_order.iter().copied().collect();
        assert_eq!(unique.len(), plan.chain_order.len());
        assert_eq!(
            plan.chain_order,
            vec![
                Stage::TruthCore,
                Stage::Verifier,
                Stage::PersonaGovernor,
                Stage::KokuzoRecall,
                Stage::PolicyGuard
            ]
        );
    }

    #[test]
    fn warnings_and_claims_never_shrink() {
        let ctx = PassContext::default();
        let mut plan = sample();
        let steps: [fn(CorePlan, &PassContext) -> CorePlan; 5] = [
            |p, _| truth_core(p),
            |p, _| verifier(p),
            |p, c| persona_governor(p, &c.persona),
            |p, _| kokuzo_recall(p, Some("前")),
            |p, _| policy_guard(p),
        ];
        for step in steps {
            let (w, c) = (plan.warnings.len(), plan.claims.len());
            plan = step(plan, &ctx);
            assert!(plan.warnings.len() >= w);
            assert!(plan.claims.len() >= c);
        }
        assert_eq!(plan.persona_tags.len(), 3);
    }
}
