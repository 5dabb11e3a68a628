use thiserror::Error;

/// Error returned when a stored or requested label does not name a variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid enum value for {field}: {value}")]
pub struct EnumParseError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string label doubles as the serde name.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::enums::EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err($crate::models::enums::EnumParseError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(TurnRole {
    User => "user",
    Assistant => "assistant",
});

str_enum!(
    /// Which lane of the orchestrator produced a reply.
    DecisionMode {
        Natural => "NATURAL",
        Hybrid => "HYBRID",
        Grounded => "GROUNDED",
        LlmChat => "LLM_CHAT",
    }
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn turn_role_round_trip() {
        for role in [TurnRole::User, TurnRole::Assistant] {
            assert_eq!(TurnRole::from_str(role.as_str()).unwrap(), role);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = TurnRole::from_str("system").unwrap_err();
        assert_eq!(err.field, "TurnRole");
        assert_eq!(err.value, "system");
    }

    #[test]
    fn decision_mode_serializes_with_label() {
        let json = serde_json::to_string(&DecisionMode::LlmChat).unwrap();
        assert_eq!(json, "\"LLM_CHAT\"");
        assert_eq!(DecisionMode::Grounded.to_string(), "GROUNDED");
    }
}
