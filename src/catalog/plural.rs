//! CLDR风格复数规则
//!
//! 按语言家族实现Unicode复数类别选择，覆盖主要规则形态。
//! 规则只针对整数计数实现，分数形态不在范围内。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 复数类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl fmt::Display for PluralCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluralCategory::Zero => "zero",
            PluralCategory::One => "one",
            PluralCategory::Two => "two",
            PluralCategory::Few => "few",
            PluralCategory::Many => "many",
            PluralCategory::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// 语言的复数规则集
///
/// 每个变体对应一个CLDR规则家族，语言注册表负责语言到家族的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluralRuleSet {
    /// 无复数区分（日语、中文、韩语、泰语、越南语、印尼语等）
    OnlyOther,
    /// one: n = 1（英语、德语、西班牙语、意大利语等）
    OneOther,
    /// one: n = 0,1（法语、葡萄牙语巴西变体等）
    ZeroOneAsOne,
    /// 东斯拉夫规则（俄语、乌克兰语、塞尔维亚语、克罗地亚语）
    EastSlavic,
    /// 波兰语规则
    Polish,
    /// 捷克语/斯洛伐克语规则
    Czech,
    /// 立陶宛语规则
    Lithuanian,
    /// 拉脱维亚语规则
    Latvian,
    /// 罗马尼亚语规则
    Romanian,
    /// 阿拉伯语六类别规则
    Arabic,
    /// 希伯来语规则
    Hebrew,
}

impl PluralRuleSet {
    /// 按整数计数选择复数类别
    pub fn select(&self, n: u64) -> PluralCategory {
        let n10 = n % 10;
        let n100 = n % 100;

        match self {
            PluralRuleSet::OnlyOther => PluralCategory::Other,

            PluralRuleSet::OneOther => {
                if n == 1 {
                    PluralCategory::One
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::ZeroOneAsOne => {
                if n == 0 || n == 1 {
                    PluralCategory::One
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::EastSlavic => {
                if n10 == 1 && n100 != 11 {
                    PluralCategory::One
                } else if (2..=4).contains(&n10) && !(12..=14).contains(&n100) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Many
                }
            }

            PluralRuleSet::Polish => {
                if n == 1 {
                    PluralCategory::One
                } else if (2..=4).contains(&n10) && !(12..=14).contains(&n100) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Many
                }
            }

            PluralRuleSet::Czech => {
                if n == 1 {
                    PluralCategory::One
                } else if (2..=4).contains(&n) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::Lithuanian => {
                if n10 == 1 && !(11..=19).contains(&n100) {
                    PluralCategory::One
                } else if (2..=9).contains(&n10) && !(11..=19).contains(&n100) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::Latvian => {
                if n == 0 {
                    PluralCategory::Zero
                } else if n10 == 1 && n100 != 11 {
                    PluralCategory::One
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::Romanian => {
                if n == 1 {
                    PluralCategory::One
                } else if n == 0 || (2..=19).contains(&n100) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::Arabic => {
                if n == 0 {
                    PluralCategory::Zero
                } else if n == 1 {
                    PluralCategory::One
                } else if n == 2 {
                    PluralCategory::Two
                } else if (3..=10).contains(&n100) {
                    PluralCategory::Few
                } else if (11..=99).contains(&n100) {
                    PluralCategory::Many
                } else {
                    PluralCategory::Other
                }
            }

            PluralRuleSet::Hebrew => {
                if n == 1 {
                    PluralCategory::One
                } else if n == 2 {
                    PluralCategory::Two
                } else {
                    PluralCategory::Other
                }
            }
        }
    }

    /// 该规则集可能产生的全部类别
    pub fn categories(&self) -> &'static [PluralCategory] {
        use PluralCategory::*;
        match self {
            PluralRuleSet::OnlyOther => &[Other],
            PluralRuleSet::OneOther | PluralRuleSet::ZeroOneAsOne => &[One, Other],
            PluralRuleSet::EastSlavic | PluralRuleSet::Polish => &[One, Few, Many],
            PluralRuleSet::Czech => &[One, Few, Other],
            PluralRuleSet::Lithuanian => &[One, Few, Other],
            PluralRuleSet::Latvian => &[Zero, One, Other],
            PluralRuleSet::Romanian => &[One, Few, Other],
            PluralRuleSet::Arabic => &[Zero, One, Two, Few, Many, Other],
            PluralRuleSet::Hebrew => &[One, Two, Other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PluralCategory::*;

    #[test]
    fn test_english_boundaries() {
        let rules = PluralRuleSet::OneOther;
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(0), Other);
        assert_eq!(rules.select(5), Other);
    }

    #[test]
    fn test_french_zero_counts_as_one() {
        let rules = PluralRuleSet::ZeroOneAsOne;
        assert_eq!(rules.select(0), One);
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(2), Other);
    }

    #[test]
    fn test_russian_boundaries() {
        let rules = PluralRuleSet::EastSlavic;
        // 1, 21, 101 → one；11是例外
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(21), One);
        assert_eq!(rules.select(101), One);
        assert_eq!(rules.select(11), Many);
        // 2-4, 22-24 → few；12-14是例外
        assert_eq!(rules.select(2), Few);
        assert_eq!(rules.select(4), Few);
        assert_eq!(rules.select(22), Few);
        assert_eq!(rules.select(12), Many);
        assert_eq!(rules.select(14), Many);
        // 0, 5-20, 25-30 → many
        assert_eq!(rules.select(0), Many);
        assert_eq!(rules.select(5), Many);
        assert_eq!(rules.select(19), Many);
        assert_eq!(rules.select(25), Many);
    }

    #[test]
    fn test_polish_one_is_exact() {
        let rules = PluralRuleSet::Polish;
        assert_eq!(rules.select(1), One);
        // 波兰语的21不是one，区别于俄语
        assert_eq!(rules.select(21), Many);
        assert_eq!(rules.select(22), Few);
        assert_eq!(rules.select(5), Many);
    }

    #[test]
    fn test_arabic_six_categories() {
        let rules = PluralRuleSet::Arabic;
        assert_eq!(rules.select(0), Zero);
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(2), Two);
        assert_eq!(rules.select(3), Few);
        assert_eq!(rules.select(10), Few);
        assert_eq!(rules.select(103), Few);
        assert_eq!(rules.select(11), Many);
        assert_eq!(rules.select(99), Many);
        assert_eq!(rules.select(100), Other);
        assert_eq!(rules.select(102), Other);
    }

    #[test]
    fn test_czech_few_range() {
        let rules = PluralRuleSet::Czech;
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(2), Few);
        assert_eq!(rules.select(4), Few);
        assert_eq!(rules.select(5), Other);
        assert_eq!(rules.select(0), Other);
    }

    #[test]
    fn test_romanian_few_range() {
        let rules = PluralRuleSet::Romanian;
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(0), Few);
        assert_eq!(rules.select(2), Few);
        assert_eq!(rules.select(19), Few);
        assert_eq!(rules.select(119), Few);
        assert_eq!(rules.select(20), Other);
        // 101的n%100=1，属于other而不是few
        assert_eq!(rules.select(101), Other);
        assert_eq!(rules.select(201), Other);
    }

    #[test]
    fn test_latvian_zero_category() {
        let rules = PluralRuleSet::Latvian;
        assert_eq!(rules.select(0), Zero);
        assert_eq!(rules.select(1), One);
        assert_eq!(rules.select(21), One);
        assert_eq!(rules.select(11), Other);
    }
}
