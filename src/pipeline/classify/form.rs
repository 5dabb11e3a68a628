use serde::Serialize;

use super::iki::{IkiResult, IkiState};
use super::phase::{Phase, PhaseResult};
use crate::models::enums::str_enum;

str_enum!(Form {
    Circle => "CIRCLE",
    Line => "LINE",
    Dot => "DOT",
    Spiral => "SPIRAL",
    Well => "WELL",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormResult {
    pub form: Form,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Decision table from (breath state, phase) to form.
pub fn map_to_form(iki: &IkiResult, phase: &PhaseResult) -> FormResult {
    use IkiState::*;
    use Phase::*;

    let form = match (iki.state, phase.phase) {
        (_, Center) => Form::Well,
        (Both, _) => Form::Circle,
        (Fire, Rise | Open) => Form::Line,
        (Water, Fall | Close) => Form::Dot,
        (Fire, Fall | Close) | (Water, Rise | Open) => Form::Spiral,
        (Fire, Phase::Neutral) => Form::Line,
        (Water, Phase::Neutral) => Form::Dot,
        (IkiState::Neutral, Rise | Open) => Form::Line,
        (IkiState::Neutral, Fall | Close) => Form::Dot,
        (IkiState::Neutral, Phase::Neutral) => Form::Circle,
    };

    let confidence = match phase.phase {
        Center => phase.confidence.max(0.5),
        _ => ((iki.confidence + phase.confidence) / 2.0).clamp(0.0, 1.0),
    };

    FormResult {
        form,
        confidence,
        evidence: vec![format!(
            "iki={} phase={} -> {}",
            iki.state.as_str(),
            phase.phase.as_str(),
            form.as_str()
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::phase::PhaseFlags;

    fn iki(state: IkiState, confidence: f64) -> IkiResult {
        IkiResult {
            state,
            fire: 0,
            water: 0,
            confidence,
            evidence: vec![],
        }
    }

    fn phase(p: Phase, confidence: f64) -> PhaseResult {
        PhaseResult {
            phase: p,
            flags: PhaseFlags::default(),
            confidence,
            evidence: vec![],
        }
    }

    #[test]
    fn decision_table() {
        let cases = [
            (IkiState::Fire, Phase::Center, Form::Well),
            (IkiState::Both, Phase::Rise, Form::Circle),
            (IkiState::Fire, Phase::Rise, Form::Line),
            (IkiState::Fire, Phase::Open, Form::Line),
            (IkiState::Water, Phase::Fall, Form::Dot),
            (IkiState::Water, Phase::Close, Form::Dot),
            (IkiState::Fire, Phase::Fall, Form::Spiral),
            (IkiState::Water, Phase::Open, Form::Spiral),
            (IkiState::Fire, Phase::Neutral, Form::Line),
            (IkiState::Water, Phase::Neutral, Form::Dot),
            (IkiState::Neutral, Phase::Rise, Form::Line),
            (IkiState::Neutral, Phase::Close, Form::Dot),
            (IkiState::Neutral, Phase::Neutral, Form::Circle),
        ];
        for (state, p, expected) in cases {
            let result = map_to_form(&iki(state, 1.0), &phase(p, 1.0));
            assert_eq!(result.form, expected, "{state:?} + {p:?}");
        }
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        let result = map_to_form(&iki(IkiState::Neutral, 0.0), &phase(Phase::Neutral, 0.0));
        assert_eq!(result.confidence, 0.0);
        let well = map_to_form(&iki(IkiState::Neutral, 0.0), &phase(Phase::Center, 0.2));
        assert_eq!(well.confidence, 0.5);
    }
}
