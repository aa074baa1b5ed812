//! 翻译文档模型
//!
//! 线上格式是每个「语言+命名空间」一棵JSON树：字符串叶子、
//! 复数形态对象、嵌套分组对象。内存中用带标签的枚举表示，
//! 解析时做结构校验，避免把格式问题推迟到查找阶段。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::plural::PluralCategory;
use crate::error::{I18nError, I18nResult};

/// 复数对象允许出现的全部键
const PLURAL_KEYS: [&str; 6] = ["zero", "one", "two", "few", "many", "other"];

/// 一个键的复数形态集合
///
/// `one` 和 `other` 是必填的，其余按语言需要出现
#[derive(Debug, Clone, PartialEq)]
pub struct PluralForms {
    pub zero: Option<String>,
    pub one: String,
    pub two: Option<String>,
    pub few: Option<String>,
    pub many: Option<String>,
    pub other: String,
}

impl PluralForms {
    /// 按类别取形态，缺失的类别回退到 `other`
    pub fn form(&self, category: PluralCategory) -> &str {
        let selected = match category {
            PluralCategory::Zero => self.zero.as_deref(),
            PluralCategory::One => Some(self.one.as_str()),
            PluralCategory::Two => self.two.as_deref(),
            PluralCategory::Few => self.few.as_deref(),
            PluralCategory::Many => self.many.as_deref(),
            PluralCategory::Other => Some(self.other.as_str()),
        };
        selected.unwrap_or(&self.other)
    }
}

/// 文档树节点
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// 单条翻译文本
    Leaf(String),
    /// 复数形态集合
    Plural(PluralForms),
    /// 嵌套分组
    Group(BTreeMap<String, Node>),
}

impl Node {
    /// 从JSON值解析节点，同时做结构校验
    ///
    /// 判定规则：字符串是叶子；键全部属于复数键集合且值全是
    /// 字符串的对象是复数集合；其余对象是分组
    pub fn from_value(value: &Value, path: &str) -> I18nResult<Node> {
        match value {
            Value::String(text) => Ok(Node::Leaf(text.clone())),
            Value::Object(map) => {
                if !map.is_empty() && Self::looks_like_plural(map) {
                    Self::parse_plural(map, path).map(Node::Plural)
                } else {
                    let mut children = BTreeMap::new();
                    for (key, child) in map {
                        let child_path = if path.is_empty() {
                            key.clone()
                        } else {
                            format!("{path}.{key}")
                        };
                        children.insert(key.clone(), Node::from_value(child, &child_path)?);
                    }
                    Ok(Node::Group(children))
                }
            }
            other => Err(I18nError::MalformedDocument(format!(
                "路径 '{path}' 处出现不支持的JSON类型: {other}"
            ))),
        }
    }

    fn looks_like_plural(map: &serde_json::Map<String, Value>) -> bool {
        map.iter()
            .all(|(k, v)| PLURAL_KEYS.contains(&k.as_str()) && v.is_string())
    }

    fn parse_plural(
        map: &serde_json::Map<String, Value>,
        path: &str,
    ) -> I18nResult<PluralForms> {
        let get = |key: &str| -> Option<String> {
            map.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let one = get("one").ok_or_else(|| {
            I18nError::MalformedDocument(format!("路径 '{path}' 的复数对象缺少 'one' 形态"))
        })?;
        let other = get("other").ok_or_else(|| {
            I18nError::MalformedDocument(format!("路径 '{path}' 的复数对象缺少 'other' 形态"))
        })?;

        Ok(PluralForms {
            zero: get("zero"),
            one,
            two: get("two"),
            few: get("few"),
            many: get("many"),
            other,
        })
    }

    /// 序列化回线上JSON格式
    pub fn to_value(&self) -> Value {
        match self {
            Node::Leaf(text) => Value::String(text.clone()),
            Node::Plural(forms) => {
                let mut map = serde_json::Map::new();
                if let Some(zero) = &forms.zero {
                    map.insert("zero".into(), Value::String(zero.clone()));
                }
                map.insert("one".into(), Value::String(forms.one.clone()));
                if let Some(two) = &forms.two {
                    map.insert("two".into(), Value::String(two.clone()));
                }
                if let Some(few) = &forms.few {
                    map.insert("few".into(), Value::String(few.clone()));
                }
                if let Some(many) = &forms.many {
                    map.insert("many".into(), Value::String(many.clone()));
                }
                map.insert("other".into(), Value::String(forms.other.clone()));
                Value::Object(map)
            }
            Node::Group(children) => {
                let mut map = serde_json::Map::new();
                for (key, child) in children {
                    map.insert(key.clone(), child.to_value());
                }
                Value::Object(map)
            }
        }
    }

    /// 粗略的内存占用估计，供本地层按字节数限流
    pub fn size_estimate(&self) -> usize {
        match self {
            Node::Leaf(text) => text.len() + 24,
            Node::Plural(forms) => {
                let opt = |s: &Option<String>| s.as_ref().map_or(0, |s| s.len() + 24);
                forms.one.len()
                    + forms.other.len()
                    + opt(&forms.zero)
                    + opt(&forms.two)
                    + opt(&forms.few)
                    + opt(&forms.many)
                    + 64
            }
            Node::Group(children) => children
                .iter()
                .map(|(key, child)| key.len() + 24 + child.size_estimate())
                .sum::<usize>()
                .max(32),
        }
    }
}

/// 一个语言+命名空间对应的翻译文档
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationDocument {
    pub language: String,
    pub namespace: String,
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub root: Node,
}

impl TranslationDocument {
    /// 从JSON值构建并校验文档
    pub fn from_json(
        language: &str,
        namespace: &str,
        version: &str,
        value: &Value,
    ) -> I18nResult<Self> {
        if !value.is_object() {
            return Err(I18nError::MalformedDocument(format!(
                "语言 '{language}' 命名空间 '{namespace}' 的文档根节点必须是对象"
            )));
        }
        Ok(Self {
            language: language.to_string(),
            namespace: namespace.to_string(),
            version: version.to_string(),
            updated_at: Utc::now(),
            root: Node::from_value(value, "")?,
        })
    }

    /// 空文档，完全降级时的最终结果
    pub fn empty(language: &str) -> Self {
        Self {
            language: language.to_string(),
            namespace: String::new(),
            version: "0".to_string(),
            updated_at: Utc::now(),
            root: Node::Group(BTreeMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.root, Node::Group(children) if children.is_empty())
    }

    /// 按点分路径查找节点
    pub fn lookup(&self, key: &str) -> Option<&Node> {
        let mut current = &self.root;
        for segment in key.split('.') {
            match current {
                Node::Group(children) => {
                    current = children.get(segment)?;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    /// 深度合并另一个文档，对方的叶子覆盖本方同路径节点
    ///
    /// 用于把多个命名空间的文档合并成一份语言快照
    pub fn merge_from(&mut self, other: &TranslationDocument) {
        fn merge_node(target: &mut BTreeMap<String, Node>, source: &BTreeMap<String, Node>) {
            for (key, node) in source {
                match (target.get_mut(key), node) {
                    (Some(Node::Group(existing)), Node::Group(incoming)) => {
                        merge_node(existing, incoming);
                    }
                    _ => {
                        target.insert(key.clone(), node.clone());
                    }
                }
            }
        }

        if let (Node::Group(target), Node::Group(source)) = (&mut self.root, &other.root) {
            merge_node(target, source);
        }
        if other.updated_at > self.updated_at {
            self.updated_at = other.updated_at;
        }
    }

    /// 整棵树的字节占用估计
    pub fn size_estimate(&self) -> usize {
        self.language.len() + self.namespace.len() + self.version.len() + self.root.size_estimate()
    }

    /// 序列化为线上JSON（持久化层的存储格式）
    pub fn to_bytes(&self) -> I18nResult<Vec<u8>> {
        let envelope = serde_json::json!({
            "language": self.language,
            "namespace": self.namespace,
            "version": self.version,
            "updated_at": self.updated_at.to_rfc3339(),
            "tree": self.root.to_value(),
        });
        serde_json::to_vec(&envelope)
            .map_err(|e| I18nError::MalformedDocument(format!("文档序列化失败: {e}")))
    }

    /// 从持久化层的字节流还原文档
    pub fn from_bytes(bytes: &[u8]) -> I18nResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| I18nError::MalformedDocument(format!("文档反序列化失败: {e}")))?;

        let field = |name: &str| -> I18nResult<String> {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    I18nError::MalformedDocument(format!("文档信封缺少字段 '{name}'"))
                })
        };

        let language = field("language")?;
        let namespace = field("namespace")?;
        let version = field("version")?;
        let updated_at = field("updated_at")?
            .parse::<DateTime<Utc>>()
            .map_err(|e| I18nError::MalformedDocument(format!("时间戳无效: {e}")))?;
        let tree = value
            .get("tree")
            .ok_or_else(|| I18nError::MalformedDocument("文档信封缺少字段 'tree'".to_string()))?;

        Ok(Self {
            language,
            namespace,
            version,
            updated_at,
            root: Node::from_value(tree, "")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_and_group() {
        let value = json!({
            "common": {
                "greeting": "Hello {name}",
                "farewell": "Goodbye"
            }
        });
        let doc = TranslationDocument::from_json("en", "common", "1", &value).unwrap();
        assert_eq!(
            doc.lookup("common.greeting"),
            Some(&Node::Leaf("Hello {name}".to_string()))
        );
        assert!(doc.lookup("common.unknown").is_none());
    }

    #[test]
    fn test_parse_plural_object() {
        let value = json!({
            "items": { "one": "{count} item", "other": "{count} items" }
        });
        let doc = TranslationDocument::from_json("en", "common", "1", &value).unwrap();
        match doc.lookup("items") {
            Some(Node::Plural(forms)) => {
                assert_eq!(forms.form(PluralCategory::One), "{count} item");
                // 缺失的类别回退到other
                assert_eq!(forms.form(PluralCategory::Few), "{count} items");
            }
            other => panic!("期望复数节点，得到 {other:?}"),
        }
    }

    #[test]
    fn test_plural_missing_other_rejected() {
        let value = json!({
            "items": { "one": "{count} item" }
        });
        let result = TranslationDocument::from_json("en", "common", "1", &value);
        assert!(matches!(result, Err(I18nError::MalformedDocument(_))));
    }

    #[test]
    fn test_non_string_leaf_rejected() {
        let value = json!({ "count": 42 });
        let result = TranslationDocument::from_json("en", "common", "1", &value);
        assert!(matches!(result, Err(I18nError::MalformedDocument(_))));
    }

    #[test]
    fn test_deep_merge_namespaces() {
        let base = json!({ "nav": { "home": "Home" } });
        let extra = json!({ "nav": { "about": "About" }, "footer": "Footer" });
        let mut doc = TranslationDocument::from_json("en", "common", "1", &base).unwrap();
        let other = TranslationDocument::from_json("en", "navigation", "1", &extra).unwrap();

        doc.merge_from(&other);
        assert_eq!(doc.lookup("nav.home"), Some(&Node::Leaf("Home".to_string())));
        assert_eq!(doc.lookup("nav.about"), Some(&Node::Leaf("About".to_string())));
        assert_eq!(doc.lookup("footer"), Some(&Node::Leaf("Footer".to_string())));
    }

    #[test]
    fn test_envelope_round_trip() {
        let value = json!({
            "items": { "one": "one item", "other": "many items" },
            "title": "Library"
        });
        let doc = TranslationDocument::from_json("fr", "pages", "3", &value).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let restored = TranslationDocument::from_bytes(&bytes).unwrap();
        assert_eq!(restored.language, "fr");
        assert_eq!(restored.root, doc.root);
    }

    #[test]
    fn test_empty_document() {
        let doc = TranslationDocument::empty("de");
        assert!(doc.is_empty());
        assert!(doc.lookup("anything").is_none());
    }
}
