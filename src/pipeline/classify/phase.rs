use std::sync::LazyLock;

use serde::Serialize;

use super::RuleTable;
use crate::models::enums::str_enum;
use crate::pipeline::extract::Ruleset;

str_enum!(Phase {
    Rise => "RISE",
    Fall => "FALL",
    Open => "OPEN",
    Close => "CLOSE",
    Center => "CENTER",
    Neutral => "NEUTRAL",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseFlags {
    pub rise: bool,
    pub fall: bool,
    pub open: bool,
    pub close: bool,
    pub center: bool,
}

impl PhaseFlags {
    fn set(&mut self, phase: Phase) {
        match phase {
            Phase::Rise => self.rise = true,
            Phase::Fall => self.fall = true,
            Phase::Open => self.open = true,
            Phase::Close => self.close = true,
            Phase::Center => self.center = true,
            Phase::Neutral => {}
        }
    }

    pub fn count(&self) -> usize {
        [self.rise, self.fall, self.open, self.close, self.center]
            .iter()
            .filter(|f| **f)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub flags: PhaseFlags,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

static PHASE_RULES: LazyLock<RuleTable<Phase>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"正中|中心|統合|調和", Phase::Center),
        (r"上昇|昇|上が|高ま|伸び|成長", Phase::Rise),
        (r"下降|降|下が|沈|落ち|衰", Phase::Fall),
        (r"開|広が|発散|外へ|始", Phase::Open),
        (r"閉|収束|まとま|内へ|終", Phase::Close),
    ])
});

/// Movement phase of a message. The first matching rule picks `phase`;
/// `flags` records every rule that matched. Meanings of ruleset terms that
/// appear in the text are read alongside it.
pub fn estimate_phase(text: &str, ruleset: &Ruleset) -> PhaseResult {
    let mut haystack = text.to_string();
    for def in &ruleset.definitions {
        if !def.term.is_empty() && text.contains(def.term.as_str()) {
            haystack.push('\n');
            haystack.push_str(&def.meaning);
        }
    }

    let phase = PHASE_RULES.first_match(&haystack, Phase::Neutral);
    let mut flags = PhaseFlags::default();
    let mut evidence = Vec::new();
    for (label, matched) in PHASE_RULES.matches_with_text(&haystack) {
        flags.set(label);
        evidence.push(format!("{}:{}", label.as_str(), matched));
    }

    let confidence = match flags.count() {
        0 => 0.0,
        n => 1.0 / n as f64,
    };

    PhaseResult {
        phase,
        flags,
        confidence,
        evidence,
    }
}
