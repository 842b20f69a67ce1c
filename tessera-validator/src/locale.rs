//! 区域设置
//!
//! 只覆盖类型转换需要的部分：数字分隔符与日期字段顺序

use std::fmt;

/// 数字日期中年月日的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    /// 月/日/年（en_US）
    MonthDayYear,
    /// 日.月.年 或 日/月/年（大部分欧洲语言）
    DayMonthYear,
    /// 年/月/日（zh、ja、ko 等）
    YearMonthDay,
}

/// 区域设置，例如 `en_US`、`de_DE`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    country: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>, country: Option<&str>) -> Self {
        Self {
            language: language.into().to_lowercase(),
            country: country.map(|c| c.to_uppercase()),
        }
    }

    /// 解析 `en_US` / `de-DE` / `fr` 形式的标签，无法识别的部分被忽略
    pub fn parse(tag: &str) -> Self {
        let mut parts = tag.trim().split(['_', '-']);
        let language = parts.next().filter(|l| !l.is_empty()).unwrap_or("en");
        let country = parts.next().filter(|c| !c.is_empty());
        Self::new(language, country)
    }

    /// 美式英语，框架默认区域
    pub fn us() -> Self {
        Self::new("en", Some("US"))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    /// 小数点字符
    pub fn decimal_separator(&self) -> char {
        match (self.language.as_str(), self.country()) {
            (_, Some("CH")) if self.language == "de" => '.',
            ("de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" | "el" | "fr" | "ru" | "pl"
            | "cs" | "sv" | "fi" | "nb" | "no" | "uk" | "sk" | "hu" | "ro", _) => ',',
            _ => '.',
        }
    }

    /// 千位分组字符
    pub fn grouping_separator(&self) -> char {
        match (self.language.as_str(), self.country()) {
            ("de", Some("CH")) => '\'',
            ("de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" | "el" | "ro", _) => '.',
            ("fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" | "no" | "uk" | "sk" | "hu", _) => {
                '\u{a0}'
            }
            _ => ',',
        }
    }

    /// 数字日期的字段顺序
    pub fn date_order(&self) -> DateOrder {
        match (self.language.as_str(), self.country()) {
            ("en", Some("US")) | ("en", None) => DateOrder::MonthDayYear,
            ("zh" | "ja" | "ko" | "hu" | "lt", _) => DateOrder::YearMonthDay,
            _ => DateOrder::DayMonthYear,
        }
    }

    /// 把本地化的数字字符串规范化为 Rust 可以解析的形式
    ///
    /// 去掉分组分隔符，把本地小数点替换为 `.`；出现任何其它字符
    /// （包括数字之后的多余字符）都返回 `None`，而不是截断。
    pub fn normalize_number(&self, input: &str) -> Option<String> {
        let decimal = self.decimal_separator();
        let grouping = self.grouping_separator();
        let input = input.trim();

        let mut out = String::with_capacity(input.len());
        let mut seen_decimal = false;
        let mut seen_digit = false;
        let mut prev_digit = false;

        for (i, ch) in input.chars().enumerate() {
            if ch.is_ascii_digit() {
                out.push(ch);
                seen_digit = true;
                prev_digit = true;
                continue;
            }

            if (ch == '-' || ch == '+') && i == 0 {
                if ch == '-' {
                    out.push('-');
                }
                prev_digit = false;
            } else if ch == decimal && !seen_decimal {
                out.push('.');
                seen_decimal = true;
                prev_digit = false;
            } else if is_grouping(ch, grouping) && !seen_decimal && prev_digit {
                // 分组符只允许出现在整数部分的数字之间
                prev_digit = false;
            } else {
                return None;
            }
        }

        if !seen_digit || !prev_digit && !seen_decimal {
            return None;
        }

        Some(out)
    }

    /// 按本地格式输出数字（添加分组符、替换小数点）
    ///
    /// 输入使用 Rust 的 `Display` 表示，例如 `-1234.5` 在 `de_DE` 下输出 `-1.234,5`
    pub fn format_number(&self, value: impl fmt::Display) -> String {
        let plain = value.to_string();
        let (sign, digits) = match plain.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", plain.as_str()),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (digits, None),
        };

        let grouping = self.grouping_separator();
        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(grouping);
            }
            grouped.push(ch);
        }

        match frac_part {
            Some(frac) => format!("{}{}{}{}", sign, grouped, self.decimal_separator(), frac),
            None => format!("{}{}", sign, grouped),
        }
    }
}

/// 不间断空格作为分组符时，同时接受普通空格
fn is_grouping(ch: char, grouping: char) -> bool {
    ch == grouping || (grouping == '\u{a0}' && (ch == ' ' || ch == '\u{202f}'))
}

impl Default for Locale {
    fn default() -> Self {
        Self::us()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}_{}", self.language, country),
            None => f.write_str(&self.language),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(Locale::parse("de-DE").to_string(), "de_DE");
        assert_eq!(Locale::parse("FR").to_string(), "fr");
        assert_eq!(Locale::parse("").to_string(), "en");
    }

    #[test]
    fn test_normalize_number_per_locale() {
        let us = Locale::us();
        let de = Locale::parse("de_DE");

        assert_eq!(us.normalize_number(" 1,234.5 ").as_deref(), Some("1234.5"));
        assert_eq!(de.normalize_number("1.234,5").as_deref(), Some("1234.5"));
        assert_eq!(us.normalize_number("+42").as_deref(), Some("42"));
        assert_eq!(us.normalize_number("-0.25").as_deref(), Some("-0.25"));
    }

    #[test]
    fn test_normalize_rejects_trailing_garbage() {
        let us = Locale::us();
        assert_eq!(us.normalize_number("12abc"), None);
        assert_eq!(us.normalize_number("1.2.3"), None);
        assert_eq!(us.normalize_number("1,"), None);
        assert_eq!(us.normalize_number("-"), None);
        assert_eq!(us.normalize_number(""), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(Locale::us().format_number(-1234567.25), "-1,234,567.25");
        assert_eq!(Locale::parse("de_DE").format_number(1234.5), "1.234,5");
        assert_eq!(Locale::us().format_number(999), "999");
    }
}
