use std::sync::LazyLock;

use super::RuleTable;
use crate::models::enums::str_enum;

str_enum!(
    /// The four reading layers a passage can touch.
    FourLayerTag {
        Kotodama => "KOTODAMA",
        Iki => "IKI",
        TaiYo => "TAIYO",
        Seichu => "SEICHU",
    }
);

str_enum!(
    /// Source-document domains a message can point at.
    DomainTag {
        Kotodama => "KOTODAMA",
        Katakamuna => "KATAKAMUNA",
        Iroha => "IROHA",
        Kojiki => "KOJIKI",
        Mantra => "MANTRA",
    }
);

static FOUR_LAYER_RULES: LazyLock<RuleTable<FourLayerTag>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"言灵|言霊|ことだま|五十音|音義", FourLayerTag::Kotodama),
        (r"水火|火水|イキ|息|呼吸|與合|与合", FourLayerTag::Iki),
        (r"躰|体|用|はたらき", FourLayerTag::TaiYo),
        (r"正中|中心|空仮中|ス[のノ]", FourLayerTag::Seichu),
    ])
});

static KOJIKI_RULES: LazyLock<RuleTable<&'static str>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"天之御中主|アメノミナカヌシ", "アメノミナカヌシ"),
        (r"高御産巣日|タカミムスビ", "タカミムスビ"),
        (r"神産巣日|カミムスビ", "カミムスビ"),
        (r"伊邪那岐|伊弉諾|イザナギ", "イザナギ"),
        (r"伊邪那美|伊弉冉|イザナミ", "イザナミ"),
        (r"天照|アマテラス", "アマテラス"),
        (r"月読|ツクヨミ", "ツクヨミ"),
        (r"須佐之男|素戔嗚|スサノ[オヲ]", "スサノヲ"),
        (r"淤能碁呂|オノゴロ", "オノゴロ"),
        (r"天[のノ]?浮橋", "天浮橋"),
        (r"黄泉|ヨミ", "黄泉"),
        (r"天岩戸|天の岩戸|岩戸", "岩戸"),
    ])
});

static DOMAIN_RULES: LazyLock<RuleTable<DomainTag>> = LazyLock::new(|| {
    RuleTable::new(vec![
        (r"(?i)言灵|言霊|ことだま|kotodama|水穂伝|水火|與合", DomainTag::Kotodama),
        (r"カタカムナ|天津金木|布斗麻邇|フトマニ", DomainTag::Katakamuna),
        (r"いろは|テニヲハ|辞", DomainTag::Iroha),
        (r"古事記|神代", DomainTag::Kojiki),
        (r"真言|法華経|虚空蔵", DomainTag::Mantra),
    ])
});

pub fn extract_four_layer_tags(text: &str) -> Vec<FourLayerTag> {
    FOUR_LAYER_RULES.all_matches(text)
}

/// Names from the myth cycle mentioned in the text, canonical katakana form.
pub fn extract_kojiki_tags(text: &str) -> Vec<&'static str> {
    KOJIKI_RULES.all_matches(text)
}

pub fn extract_domain_tags(text: &str) -> Vec<DomainTag> {
    DOMAIN_RULES.all_matches(text)
}
