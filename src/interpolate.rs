//! 参数插值
//!
//! 支持 `{name}` 和 `{{name}}` 两种占位符写法，以及可选的
//! 格式提示 `{name, number|currency|percent|date}`。格式化按
//! 语言描述符的书写约定进行。无法匹配或格式错误的占位符
//! 原样保留，插值永不失败。

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::catalog::language::{DateOrder, NumberConventions};

/// 占位符参数值
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(DateTime<Utc>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Integer(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Date(value)
    }
}

/// 插值参数表
pub type Params = HashMap<String, ParamValue>;

/// 格式提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatHint {
    Number,
    Currency,
    Percent,
    Date,
}

impl FormatHint {
    fn parse(hint: &str) -> Option<Self> {
        match hint {
            "number" => Some(FormatHint::Number),
            "currency" => Some(FormatHint::Currency),
            "percent" => Some(FormatHint::Percent),
            "date" => Some(FormatHint::Date),
            _ => None,
        }
    }
}

/// 参数插值器
///
/// 正则首次使用时编译，之后在实例内复用
#[derive(Debug, Default)]
pub struct Interpolator {
    placeholder_regex: OnceLock<Regex>,
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            placeholder_regex: OnceLock::new(),
        }
    }

    fn placeholder_regex(&self) -> &Regex {
        self.placeholder_regex.get_or_init(|| {
            // 双花括号写法优先于单花括号匹配
            Regex::new(
                r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:,\s*([a-z]+)\s*)?\}\}|\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:,\s*([a-z]+)\s*)?\}",
            )
            .unwrap_or_else(|_| Regex::new(r"").unwrap())
        })
    }

    /// 渲染模板，替换所有能解析的占位符
    pub fn render(
        &self,
        template: &str,
        params: &Params,
        conventions: &NumberConventions,
    ) -> String {
        if !template.contains('{') {
            return template.to_string();
        }

        self.placeholder_regex()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                let hint = caps.get(2).or_else(|| caps.get(4)).map(|m| m.as_str());
                self.render_placeholder(&caps[0], name, hint, params, conventions)
            })
            .into_owned()
    }

    fn render_placeholder(
        &self,
        original: &str,
        name: &str,
        hint: Option<&str>,
        params: &Params,
        conventions: &NumberConventions,
    ) -> String {
        let value = match params.get(name) {
            Some(v) => v,
            None => return original.to_string(),
        };

        let hint = match hint {
            Some(word) => match FormatHint::parse(word) {
                Some(h) => Some(h),
                // 未知提示词视为格式错误，原样保留
                None => return original.to_string(),
            },
            None => None,
        };

        match hint {
            None => self.plain(value, conventions),
            Some(FormatHint::Number) => match self.as_number(value) {
                Some(n) => format_number(n, conventions),
                None => original.to_string(),
            },
            Some(FormatHint::Currency) => match self.as_number(value) {
                Some(n) => format_currency(n, conventions),
                None => original.to_string(),
            },
            Some(FormatHint::Percent) => match self.as_number(value) {
                Some(n) => format_percent(n, conventions),
                None => original.to_string(),
            },
            Some(FormatHint::Date) => match value {
                ParamValue::Date(dt) => format_date(dt, conventions.date_order),
                _ => original.to_string(),
            },
        }
    }

    fn plain(&self, value: &ParamValue, conventions: &NumberConventions) -> String {
        match value {
            ParamValue::Text(text) => text.clone(),
            ParamValue::Integer(n) => n.to_string(),
            ParamValue::Float(n) => format_number(*n, conventions),
            ParamValue::Date(dt) => format_date(dt, conventions.date_order),
        }
    }

    fn as_number(&self, value: &ParamValue) -> Option<f64> {
        match value {
            ParamValue::Integer(n) => Some(*n as f64),
            ParamValue::Float(n) => Some(*n),
            ParamValue::Text(text) => text.trim().parse().ok(),
            ParamValue::Date(_) => None,
        }
    }
}

/// 整数部分按三位分组
fn group_digits(digits: &str, separator: char) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(ch);
    }
    grouped
}

fn format_number(n: f64, conventions: &NumberConventions) -> String {
    let negative = n < 0.0;
    let abs = n.abs();
    let is_integral = abs.fract() < f64::EPSILON && abs < 1e15;

    let rendered = if is_integral {
        format!("{:.0}", abs)
    } else {
        format!("{:.2}", abs)
    };

    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (rendered, None),
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_digits(&int_part, conventions.group_separator));
    if let Some(frac) = frac_part {
        out.push(conventions.decimal_separator);
        out.push_str(&frac);
    }
    out
}

fn format_currency(n: f64, conventions: &NumberConventions) -> String {
    let negative = n < 0.0;
    let abs = n.abs();
    let rendered = format!("{:.2}", abs);
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, "00"));

    let mut amount = String::new();
    if negative {
        amount.push('-');
    }
    amount.push_str(&group_digits(int_part, conventions.group_separator));
    amount.push(conventions.decimal_separator);
    amount.push_str(frac_part);

    if conventions.symbol_first {
        format!("{}{}", conventions.currency_symbol, amount)
    } else {
        format!("{} {}", amount, conventions.currency_symbol)
    }
}

fn format_percent(n: f64, conventions: &NumberConventions) -> String {
    format!("{}%", format_number(n * 100.0, conventions))
}

fn format_date(dt: &DateTime<Utc>, order: DateOrder) -> String {
    let pattern = match order {
        DateOrder::Mdy => "%m/%d/%Y",
        DateOrder::Dmy => "%d/%m/%Y",
        DateOrder::Ymd => "%Y-%m-%d",
    };
    dt.format(pattern).to_string()
}
