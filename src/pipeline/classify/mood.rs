use std::sync::LazyLock;

use super::RuleTable;
use crate::models::enums::str_enum;

str_enum!(Mood {
    Calm => "calm",
    Anxious => "anxious",
    Curious => "curious",
    Frustrated => "frustrated",
    Neutral => "neutral",
});

static MOOD_RULES: LazyLock<RuleTable<Mood>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"不安|心配|怖い|焦|こわい|落ち着かない", Mood::Anxious),
        (r"(?i)イライラ|むかつ|うんざり|もういい|ふざけ|最悪", Mood::Frustrated),
        (r"(?i)なぜ|どうして|知りたい|気になる|教えて|why", Mood::Curious),
        (r"落ち着|穏やか|安心|ゆっくり|ありがとう", Mood::Calm),
    ])
});

pub fn classify_mood(text: &str) -> Mood {
    MOOD_RULES.first_match(text, Mood::Neutral)
}
