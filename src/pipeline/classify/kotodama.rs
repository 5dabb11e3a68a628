use serde::Serialize;

use super::form::Form;
use crate::models::enums::str_enum;

str_enum!(Role {
    Heaven => "HEAVEN",
    Earth => "EARTH",
    Human => "HUMAN",
    Minister => "MINISTER",
});

str_enum!(
    /// Row of the fifty-sound table.
    KotodamaRow {
        A => "A",
        Ka => "KA",
        Sa => "SA",
        Ta => "TA",
        Na => "NA",
        Ha => "HA",
        Ma => "MA",
        Ya => "YA",
        Ra => "RA",
        Wa => "WA",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KotodamaResult {
    pub row: KotodamaRow,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

pub fn determine_role(form: Form) -> Role {
    match form {
        Form::Well => Role::Human,
        Form::Circle => Role::Heaven,
        Form::Line | Form::Spiral => Role::Minister,
        Form::Dot => Role::Earth,
    }
}

/// Row for a form. When the supplied role is not the form's own role the
/// row follows the role instead, at lower confidence.
pub fn map_to_kotodama(form: Form, role: Role) -> KotodamaResult {
    if determine_role(form) == role {
        let row = match form {
            Form::Well => KotodamaRow::Ya,
            Form::Circle => KotodamaRow::A,
            Form::Dot => KotodamaRow::Wa,
            Form::Line => KotodamaRow::Ka,
            Form::Spiral => KotodamaRow::Ma,
        };
        return KotodamaResult {
            row,
            confidence: 1.0,
            evidence: vec![format!("form={} role={}", form.as_str(), role.as_str())],
        };
    }

    let row = match role {
        Role::Heaven => KotodamaRow::A,
        Role::Earth => KotodamaRow::Wa,
        Role::Human => KotodamaRow::Ya,
        Role::Minister => KotodamaRow::Ka,
    };
    KotodamaResult {
        row,
        confidence: 0.6,
        evidence: vec![format!(
            "form={} role={} (role override)",
            form.as_str(),
            role.as_str()
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_by_form() {
        assert_eq!(determine_role(Form::Well), Role::Human);
        assert_eq!(determine_role(Form::Circle), Role::Heaven);
        assert_eq!(determine_role(Form::Line), Role::Minister);
        assert_eq!(determine_role(Form::Dot), Role::Earth);
        assert_eq!(determine_role(Form::Spiral), Role::Minister);
    }

    #[test]
    fn canonical_rows() {
        for (form, row) in [
            (Form::Well, KotodamaRow::Ya),
            (Form::Circle, KotodamaRow::A),
            (Form::Dot, KotodamaRow::Wa),
            (Form::Line, KotodamaRow::Ka),
            (Form::Spiral, KotodamaRow::Ma),
        ] {
            let result = map_to_kotodama(form, determine_role(form));
            assert_eq!(result.row, row);
            assert_eq!(result.confidence, 1.0);
        }
    }

    #[test]
    fn role_override_lowers_confidence() {
        let result = map_to_kotodama(Form::Line, Role::Earth);
        assert_eq!(result.row, KotodamaRow::Wa);
        assert!(result.confidence < 1.0);
    }
}
