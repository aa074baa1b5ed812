//! 翻译目录：文档模型、语言注册表和复数规则

pub mod document;
pub mod language;
pub mod plural;

pub use document::{Node, PluralForms, TranslationDocument};
pub use language::{
    DateOrder, Direction, LanguageDescriptor, LanguageRegistry, NumberConventions,
};
pub use plural::{PluralCategory, PluralRuleSet};
