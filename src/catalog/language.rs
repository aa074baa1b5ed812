//! 语言注册表
//!
//! 提供语言描述符、回退链校验和区域代码规范化。
//! 注册表在启动时构建一次，核心逻辑从不修改它。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::plural::PluralRuleSet;
use crate::error::{I18nError, I18nResult};

/// 回退链的最大跳数，用于检测环
const MAX_FALLBACK_HOPS: usize = 8;

/// 文字方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

/// 日期字段顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    Mdy,
    Dmy,
    Ymd,
}

/// 数字和货币的本地化书写约定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberConventions {
    pub decimal_separator: char,
    pub group_separator: char,
    pub currency_symbol: String,
    /// 货币符号是否在数值之前
    pub symbol_first: bool,
    pub date_order: DateOrder,
}

impl NumberConventions {
    fn new(
        decimal_separator: char,
        group_separator: char,
        currency_symbol: &str,
        symbol_first: bool,
        date_order: DateOrder,
    ) -> Self {
        Self {
            decimal_separator,
            group_separator,
            currency_symbol: currency_symbol.to_string(),
            symbol_first,
            date_order,
        }
    }

    /// 英语式约定：1,234.56 / $1,234.56 / MM/DD/YYYY
    pub fn anglo() -> Self {
        Self::new('.', ',', "$", true, DateOrder::Mdy)
    }

    /// 欧陆式约定：1.234,56 / 1.234,56 € / DD.MM.YYYY
    pub fn continental() -> Self {
        Self::new(',', '.', "€", false, DateOrder::Dmy)
    }

    /// 法语式约定：1 234,56 / 1 234,56 €
    pub fn french() -> Self {
        Self::new(',', '\u{a0}', "€", false, DateOrder::Dmy)
    }
}

/// 语言描述符
///
/// 启动时加载，之后保持不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    pub code: String,
    pub name: String,
    pub native_name: String,
    pub direction: Direction,
    /// 键缺失时尝试的下一个语言
    pub fallback: String,
    pub plural_rules: PluralRuleSet,
    pub conventions: NumberConventions,
    pub enabled: bool,
    pub priority: u32,
}

impl LanguageDescriptor {
    pub fn new(
        code: &str,
        name: &str,
        native_name: &str,
        direction: Direction,
        fallback: &str,
        plural_rules: PluralRuleSet,
        conventions: NumberConventions,
        priority: u32,
    ) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            native_name: native_name.to_string(),
            direction,
            fallback: fallback.to_string(),
            plural_rules,
            conventions,
            enabled: true,
            priority,
        }
    }
}

/// 语言注册表
///
/// 构建时校验每个启用语言的回退链都能在有界跳数内到达默认语言
#[derive(Debug)]
pub struct LanguageRegistry {
    languages: HashMap<String, LanguageDescriptor>,
    default_language: String,
}

impl LanguageRegistry {
    /// 从描述符列表构建注册表
    pub fn new(
        languages: Vec<LanguageDescriptor>,
        default_language: &str,
    ) -> I18nResult<Self> {
        let mut map = HashMap::with_capacity(languages.len());
        for descriptor in languages {
            map.insert(descriptor.code.clone(), descriptor);
        }

        if !map.contains_key(default_language) {
            return Err(I18nError::ConfigError(format!(
                "默认语言 '{default_language}' 不在注册表中"
            )));
        }

        let registry = Self {
            languages: map,
            default_language: default_language.to_string(),
        };
        registry.validate_fallback_chains()?;
        Ok(registry)
    }

    /// 校验所有启用语言的回退链无环且终止于默认语言
    fn validate_fallback_chains(&self) -> I18nResult<()> {
        for descriptor in self.languages.values().filter(|d| d.enabled) {
            let mut current = descriptor.code.as_str();
            let mut hops = 0;
            while current != self.default_language {
                let next = match self.languages.get(current) {
                    Some(d) => d.fallback.as_str(),
                    None => {
                        return Err(I18nError::ConfigError(format!(
                            "语言 '{}' 的回退链引用了未注册语言 '{current}'",
                            descriptor.code
                        )))
                    }
                };
                // 只有默认语言允许指向自身
                if next == current {
                    return Err(I18nError::ConfigError(format!(
                        "语言 '{current}' 的回退指向自身但不是默认语言"
                    )));
                }
                current = next;
                hops += 1;
                if hops > MAX_FALLBACK_HOPS {
                    return Err(I18nError::ConfigError(format!(
                        "语言 '{}' 的回退链超过 {MAX_FALLBACK_HOPS} 跳，疑似存在环",
                        descriptor.code
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// 查找描述符，带区域代码规范化（"pt-BR" → "pt"）
    pub fn descriptor(&self, code: &str) -> Option<&LanguageDescriptor> {
        if let Some(d) = self.languages.get(code) {
            return Some(d);
        }
        let base = code.split(['-', '_']).next().unwrap_or(code);
        self.languages.get(base)
    }

    /// 从给定语言到默认语言的回退链（含两端）
    pub fn fallback_chain(&self, code: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let start = match self.descriptor(code) {
            Some(d) => d.code.as_str(),
            None => {
                chain.push(self.default_language.clone());
                return chain;
            }
        };

        let mut current = start;
        let mut hops = 0;
        loop {
            chain.push(current.to_string());
            if current == self.default_language || hops > MAX_FALLBACK_HOPS {
                break;
            }
            current = match self.languages.get(current) {
                Some(d) => d.fallback.as_str(),
                None => break,
            };
            hops += 1;
        }
        chain
    }

    /// 启用的语言代码，按优先级排序
    pub fn enabled_codes(&self) -> Vec<String> {
        let mut codes: Vec<&LanguageDescriptor> =
            self.languages.values().filter(|d| d.enabled).collect();
        codes.sort_by_key(|d| d.priority);
        codes.into_iter().map(|d| d.code.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// 内置的默认语言目录
    ///
    /// 覆盖主要语言家族；应用可以在组合根处传入自定义目录替换它
    pub fn builtin() -> Self {
        use DateOrder::*;
        use Direction::*;
        use PluralRuleSet::*;

        let anglo = NumberConventions::anglo;
        let cont = NumberConventions::continental;

        let langs = vec![
            LanguageDescriptor::new("en", "English", "English", Ltr, "en", OneOther, anglo(), 1),
            LanguageDescriptor::new("fr", "French", "Français", Ltr, "en", ZeroOneAsOne, NumberConventions::french(), 2),
            LanguageDescriptor::new("de", "German", "Deutsch", Ltr, "en", OneOther, cont(), 3),
            LanguageDescriptor::new("es", "Spanish", "Español", Ltr, "en", OneOther, cont(), 4),
            LanguageDescriptor::new("it", "Italian", "Italiano", Ltr, "en", OneOther, cont(), 5),
            LanguageDescriptor::new("pt", "Portuguese", "Português", Ltr, "es", ZeroOneAsOne, cont(), 6),
            LanguageDescriptor::new("nl", "Dutch", "Nederlands", Ltr, "en", OneOther, cont(), 7),
            LanguageDescriptor::new("sv", "Swedish", "Svenska", Ltr, "en", OneOther, cont(), 8),
            LanguageDescriptor::new("da", "Danish", "Dansk", Ltr, "en", OneOther, cont(), 9),
            LanguageDescriptor::new("no", "Norwegian", "Norsk", Ltr, "da", OneOther, cont(), 10),
            LanguageDescriptor::new("fi", "Finnish", "Suomi", Ltr, "sv", OneOther, cont(), 11),
            LanguageDescriptor::new("el", "Greek", "Ελληνικά", Ltr, "en", OneOther, cont(), 12),
            LanguageDescriptor::new("tr", "Turkish", "Türkçe", Ltr, "en", OneOther, cont(), 13),
            LanguageDescriptor::new("hu", "Hungarian", "Magyar", Ltr, "de", OneOther, cont(), 14),
            LanguageDescriptor::new("ro", "Romanian", "Română", Ltr, "fr", Romanian, cont(), 15),
            LanguageDescriptor::new("bg", "Bulgarian", "Български", Ltr, "ru", OneOther, cont(), 16),
            LanguageDescriptor::new("ru", "Russian", "Русский", Ltr, "en", EastSlavic, cont(), 17),
            LanguageDescriptor::new("uk", "Ukrainian", "Українська", Ltr, "ru", EastSlavic, cont(), 18),
            LanguageDescriptor::new("pl", "Polish", "Polski", Ltr, "en", Polish, cont(), 19),
            LanguageDescriptor::new("cs", "Czech", "Čeština", Ltr, "en", Czech, cont(), 20),
            LanguageDescriptor::new("sk", "Slovak", "Slovenčina", Ltr, "cs", Czech, cont(), 21),
            LanguageDescriptor::new("sr", "Serbian", "Српски", Ltr, "en", EastSlavic, cont(), 22),
            LanguageDescriptor::new("hr", "Croatian", "Hrvatski", Ltr, "sr", EastSlavic, cont(), 23),
            LanguageDescriptor::new("lt", "Lithuanian", "Lietuvių", Ltr, "en", Lithuanian, cont(), 24),
            LanguageDescriptor::new("lv", "Latvian", "Latviešu", Ltr, "lt", Latvian, cont(), 25),
            LanguageDescriptor::new("ar", "Arabic", "العربية", Rtl, "en", Arabic, NumberConventions::new(',', '.', "ر.س", true, Dmy), 26),
            LanguageDescriptor::new("he", "Hebrew", "עברית", Rtl, "en", Hebrew, NumberConventions::new('.', ',', "₪", true, Dmy), 27),
            LanguageDescriptor::new("fa", "Persian", "فارسی", Rtl, "ar", ZeroOneAsOne, NumberConventions::new(',', '.', "﷼", false, Ymd), 28),
            LanguageDescriptor::new("hi", "Hindi", "हिन्दी", Ltr, "en", ZeroOneAsOne, NumberConventions::new('.', ',', "₹", true, Dmy), 29),
            LanguageDescriptor::new("ja", "Japanese", "日本語", Ltr, "en", OnlyOther, NumberConventions::new('.', ',', "¥", true, Ymd), 30),
            LanguageDescriptor::new("zh", "Chinese", "中文", Ltr, "en", OnlyOther, NumberConventions::new('.', ',', "¥", true, Ymd), 31),
            LanguageDescriptor::new("ko", "Korean", "한국어", Ltr, "en", OnlyOther, NumberConventions::new('.', ',', "₩", true, Ymd), 32),
            LanguageDescriptor::new("th", "Thai", "ไทย", Ltr, "en", OnlyOther, NumberConventions::new('.', ',', "฿", true, Dmy), 33),
            LanguageDescriptor::new("vi", "Vietnamese", "Tiếng Việt", Ltr, "en", OnlyOther, NumberConventions::new(',', '.', "₫", false, Dmy), 34),
            LanguageDescriptor::new("id", "Indonesian", "Bahasa Indonesia", Ltr, "en", OnlyOther, NumberConventions::new(',', '.', "Rp", true, Dmy), 35),
            LanguageDescriptor::new("ms", "Malay", "Bahasa Melayu", Ltr, "id", OnlyOther, NumberConventions::new('.', ',', "RM", true, Dmy), 36),
            LanguageDescriptor::new("sw", "Swahili", "Kiswahili", Ltr, "en", OneOther, anglo(), 37),
        ];

        Self::new(langs, "en").expect("内置语言目录必须通过回退链校验")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_valid() {
        let registry = LanguageRegistry::builtin();
        assert!(registry.len() >= 30);
        assert_eq!(registry.default_language(), "en");
    }

    #[test]
    fn test_all_fallback_chains_terminate() {
        let registry = LanguageRegistry::builtin();
        for code in registry.enabled_codes() {
            let chain = registry.fallback_chain(&code);
            assert!(
                chain.len() <= MAX_FALLBACK_HOPS + 1,
                "语言 {code} 的回退链过长: {chain:?}"
            );
            assert_eq!(
                chain.last().map(String::as_str),
                Some("en"),
                "语言 {code} 的回退链没有终止于默认语言: {chain:?}"
            );
        }
    }

    #[test]
    fn test_multi_hop_chain() {
        let registry = LanguageRegistry::builtin();
        // hr → sr → en
        assert_eq!(registry.fallback_chain("hr"), vec!["hr", "sr", "en"]);
        // lv → lt → en
        assert_eq!(registry.fallback_chain("lv"), vec!["lv", "lt", "en"]);
    }

    #[test]
    fn test_regional_code_normalization() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.descriptor("pt-BR").map(|d| d.code.as_str()), Some("pt"));
        assert_eq!(registry.descriptor("zh_CN").map(|d| d.code.as_str()), Some("zh"));
        assert!(registry.descriptor("xx").is_none());
    }

    #[test]
    fn test_cycle_detected() {
        let mut a = LanguageDescriptor::new(
            "aa",
            "A",
            "A",
            Direction::Ltr,
            "bb",
            PluralRuleSet::OneOther,
            NumberConventions::anglo(),
            1,
        );
        a.enabled = true;
        let b = LanguageDescriptor::new(
            "bb",
            "B",
            "B",
            Direction::Ltr,
            "aa",
            PluralRuleSet::OneOther,
            NumberConventions::anglo(),
            2,
        );
        let en = LanguageDescriptor::new(
            "en",
            "English",
            "English",
            Direction::Ltr,
            "en",
            PluralRuleSet::OneOther,
            NumberConventions::anglo(),
            0,
        );

        let result = LanguageRegistry::new(vec![a, b, en], "en");
        assert!(result.is_err());
    }
}
