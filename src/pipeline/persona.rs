//! Per-session tone accumulators and the thinking axis derived from them.
//!
//! Tone state is volatile: it lives in an injected key-value store and is
//! gone after a restart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::truths::PERSONA_NAME;
use crate::models::enums::str_enum;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneState {
    /// Warmth of the exchange, `[-1, 1]`.
    pub tone: f64,
    /// Reflective (negative) to decisive (positive), `[-1, 1]`.
    pub stance: f64,
    /// How guarded replies should be, `[-1, 1]`.
    pub boundary: f64,
    pub turns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Tone,
    Stance,
    Boundary,
}

/// `(keywords, axis, delta)`; every row whose keyword appears applies once.
const TONE_DELTAS: &[(&[&str], Axis, f64)] = &[
    (&["ありがとう", "嬉しい", "助かる", "感謝", "よかった"], Axis::Tone, 0.1),
    (&["イライラ", "最悪", "ふざけ", "うんざり", "むかつ"], Axis::Tone, -0.15),
    (&["イライラ", "最悪", "ふざけ"], Axis::Boundary, 0.1),
    (&["決め", "実行", "やる", "進め", "決断"], Axis::Stance, 0.1),
    (&["なぜ", "考え", "迷", "振り返", "どうして"], Axis::Stance, -0.1),
    (&["住所", "電話番号", "パスワード", "本名", "個人情報"], Axis::Boundary, 0.2),
];

const LEVEL_THRESHOLD: f64 = 0.3;

impl ToneState {
    fn nudge(&mut self, axis: Axis, delta: f64) {
        let slot = match axis {
            Axis::Tone => &mut self.tone,
            Axis::Stance => &mut self.stance,
            Axis::Boundary => &mut self.boundary,
        };
        *slot = (*slot + delta).clamp(-1.0, 1.0);
    }

    pub fn tone_label(&self) -> ToneLabel {
        if self.tone >= LEVEL_THRESHOLD {
            ToneLabel::Warm
        } else if self.tone <= -LEVEL_THRESHOLD {
            ToneLabel::Tense
        } else {
            ToneLabel::Even
        }
    }

    pub fn is_guarded(&self) -> bool {
        self.boundary >= LEVEL_THRESHOLD
    }
}

str_enum!(ToneLabel {
    Warm => "warm",
    Even => "even",
    Tense => "tense",
});

str_enum!(ThinkingAxis {
    Observational => "observational",
    Introspective => "introspective",
    Constructive => "constructive",
    Executive => "executive",
});

/// Few turns keep the persona observing; a leaning stance pulls it inward
/// or toward action; a long conversation turns to building.
pub fn determine_thinking_axis(tone: &ToneState, turn_count: u32) -> ThinkingAxis {
    if turn_count < 5 {
        return ThinkingAxis::Observational;
    }
    if tone.stance <= -LEVEL_THRESHOLD {
        return ThinkingAxis::Introspective;
    }
    if tone.stance >= LEVEL_THRESHOLD {
        return ThinkingAxis::Executive;
    }
    if turn_count >= 20 {
        return ThinkingAxis::Constructive;
    }
    ThinkingAxis::Observational
}

/// What the persona governor attaches to a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaSnapshot {
    pub name: &'static str,
    pub tone: ToneLabel,
    pub axis: ThinkingAxis,
    pub guarded: bool,
}

impl PersonaSnapshot {
    pub fn from_state(state: &ToneState) -> Self {
        Self {
            name: PERSONA_NAME,
            tone: state.tone_label(),
            axis: determine_thinking_axis(state, state.turns),
            guarded: state.is_guarded(),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags = vec![
            format!("persona:{}", self.name),
            format!("tone:{}", self.tone),
            format!("axis:{}", self.axis),
        ];
        if self.guarded {
            tags.push("boundary:guarded".into());
        }
        tags
    }
}

impl Default for PersonaSnapshot {
    fn default() -> Self {
        Self::from_state(&ToneState::default())
    }
}

#[derive(Clone)]
pub struct ToneTracker {
    store: Arc<dyn KeyValueStore<ToneState>>,
}

impl ToneTracker {
    pub fn new(store: Arc<dyn KeyValueStore<ToneState>>) -> Self {
        Self { store }
    }

    /// Apply this turn's deltas and return the updated state.
    pub fn observe(&self, session_id: &str, text: &str) -> ToneState {
        let mut state = self.store.get(session_id).unwrap_or_default();
        for (keywords, axis, delta) in TONE_DELTAS {
            if keywords.iter().any(|k| text.contains(k)) {
                state.nudge(*axis, *delta);
            }
        }
        state.turns = state.turns.saturating_add(1);
        self.store.put(session_id, state);
        state
    }

    pub fn current(&self, session_id: &str) -> ToneState {
        self.store.get(session_id).unwrap_or_default()
    }

    pub fn reset(&self, session_id: &str) {
        self.store.remove(session_id);
    }
}
