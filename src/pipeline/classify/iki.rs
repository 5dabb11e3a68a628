use serde::Serialize;

use crate::models::enums::str_enum;
use crate::pipeline::extract::Ruleset;

str_enum!(
    /// Elemental breath state of a message.
    IkiState {
        Fire => "FIRE",
        Water => "WATER",
        Both => "BOTH",
        Neutral => "NEUTRAL",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IkiResult {
    pub state: IkiState,
    pub fire: usize,
    pub water: usize,
    /// Share of the dominant side in `[0, 1]`.
    pub confidence: f64,
    /// Markers that fired, in token order.
    pub evidence: Vec<String>,
}

pub const FIRE_MARKERS: &[&str] = &[
    "火", "熱", "昇", "陽", "明", "光", "外", "発", "動", "開", "燃", "上",
];
pub const WATER_MARKERS: &[&str] = &[
    "水", "冷", "降", "陰", "暗", "静", "内", "集", "流", "閉", "潤", "下",
];

/// Count fire and water markers across the tokens. Definitions in the
/// ruleset whose meaning carries a marker add their term to that side.
pub fn classify_iki<S: AsRef<str>>(tokens: &[S], ruleset: &Ruleset) -> IkiResult {
    let mut fire_lexicon: Vec<&str> = FIRE_MARKERS.to_vec();
    let mut water_lexicon: Vec<&str> = WATER_MARKERS.to_vec();
    for def in &ruleset.definitions {
        if FIRE_MARKERS.iter().any(|m| def.meaning.contains(m)) {
            fire_lexicon.push(def.term.as_str());
        }
        if WATER_MARKERS.iter().any(|m| def.meaning.contains(m)) {
            water_lexicon.push(def.term.as_str());
        }
    }

    let mut fire = 0;
    let mut water = 0;
    let mut evidence = Vec::new();
    for token in tokens.iter().map(AsRef::as_ref) {
        for marker in fire_lexicon.iter().filter(|m| !m.is_empty() && token.contains(**m)) {
            fire += 1;
            evidence.push(format!("fire:{marker}"));
        }
        for marker in water_lexicon.iter().filter(|m| !m.is_empty() && token.contains(**m)) {
            water += 1;
            evidence.push(format!("water:{marker}"));
        }
    }

    let total = fire + water;
    let (state, confidence) = if total == 0 {
        (IkiState::Neutral, 0.0)
    } else if fire == water {
        (IkiState::Both, 0.5)
    } else if fire > water {
        (IkiState::Fire, fire as f64 / total as f64)
    } else {
        (IkiState::Water, water as f64 / total as f64)
    };

    IkiResult {
        state,
        fire,
        water,
        confidence,
        evidence,
    }
}
