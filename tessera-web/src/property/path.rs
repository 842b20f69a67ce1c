//! 属性路径解析
//!
//! 支持的形式：`user.name`、`items[0].name`、`map['key']`、`map["key"]`、`map[key]`、`grid[0][1]`

use std::fmt;
use thiserror::Error;

/// 路径中的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// 简单属性
    Property(String),
    /// 索引或键（引号已去掉）
    Index(String),
}

impl Segment {
    /// 属性名或键的文本
    pub fn key(&self) -> &str {
        match self {
            Segment::Property(name) | Segment::Index(name) => name,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Property(name) => f.write_str(name),
            Segment::Index(key) => write!(f, "[{}]", key),
        }
    }
}

/// 路径解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("property path is empty")]
    Empty,

    #[error("empty property name at position {position}")]
    EmptySegment { position: usize },

    #[error("unclosed '[' at position {position}")]
    UnclosedBracket { position: usize },

    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },
}

/// 已解析的属性路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.trim().is_empty() {
            return Err(PathError::Empty);
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut segments = Vec::new();
        let mut name = String::new();
        let mut i = 0;
        // 上一段是否以 `]` 结束（之后只允许 `.` 或 `[`）
        let mut after_index = false;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    if name.is_empty() && !after_index {
                        return Err(PathError::EmptySegment { position: i });
                    }
                    if !name.is_empty() {
                        segments.push(Segment::Property(std::mem::take(&mut name)));
                    }
                    after_index = false;
                    i += 1;
                    if i == chars.len() {
                        return Err(PathError::EmptySegment { position: i });
                    }
                }
                '[' => {
                    if !name.is_empty() {
                        segments.push(Segment::Property(std::mem::take(&mut name)));
                    }
                    let (key, next) = Self::parse_index(&chars, i)?;
                    segments.push(Segment::Index(key));
                    after_index = true;
                    i = next;
                }
                ']' => return Err(PathError::UnexpectedCharacter { found: ']', position: i }),
                c if after_index => {
                    return Err(PathError::UnexpectedCharacter { found: c, position: i })
                }
                c => {
                    name.push(c);
                    i += 1;
                }
            }
        }

        if !name.is_empty() {
            segments.push(Segment::Property(name));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// 解析 `[...]`，返回键文本与 `]` 之后的位置
    fn parse_index(chars: &[char], open: usize) -> Result<(String, usize), PathError> {
        let mut i = open + 1;
        let quote = match chars.get(i) {
            Some(&q @ ('\'' | '"')) => {
                i += 1;
                Some(q)
            }
            _ => None,
        };

        let mut key = String::new();
        loop {
            let Some(&c) = chars.get(i) else {
                return Err(PathError::UnclosedBracket { position: open });
            };

            match quote {
                Some(q) if c == q => {
                    return match chars.get(i + 1) {
                        Some(']') => Ok((key, i + 2)),
                        Some(&found) => Err(PathError::UnexpectedCharacter {
                            found,
                            position: i + 1,
                        }),
                        None => Err(PathError::UnclosedBracket { position: open }),
                    };
                }
                None if c == ']' => {
                    let key = key.trim().to_string();
                    if key.is_empty() {
                        return Err(PathError::EmptySegment { position: i });
                    }
                    return Ok((key, i + 1));
                }
                _ => key.push(c),
            }
            i += 1;
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str) -> Segment {
        Segment::Property(name.to_string())
    }

    fn index(key: &str) -> Segment {
        Segment::Index(key.to_string())
    }

    #[test]
    fn test_parse_nested_and_indexed() {
        let path = PropertyPath::parse("user.address[0].city").unwrap();
        assert_eq!(
            path.segments(),
            &[prop("user"), prop("address"), index("0"), prop("city")]
        );
    }

    #[test]
    fn test_parse_quoted_keys() {
        let path = PropertyPath::parse("beans['a.b'].value").unwrap();
        assert_eq!(path.segments(), &[prop("beans"), index("a.b"), prop("value")]);

        let path = PropertyPath::parse("beans[\"x]y\"]").unwrap();
        assert_eq!(path.segments(), &[prop("beans"), index("x]y")]);
    }

    #[test]
    fn test_parse_consecutive_indexes() {
        let path = PropertyPath::parse("grid[1][2]").unwrap();
        assert_eq!(path.segments(), &[prop("grid"), index("1"), index("2")]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PropertyPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            PropertyPath::parse("items[0"),
            Err(PathError::UnclosedBracket { .. })
        ));
        assert!(matches!(
            PropertyPath::parse("user..name"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PropertyPath::parse("items[0]name"),
            Err(PathError::UnexpectedCharacter { found: 'n', .. })
        ));
        assert!(matches!(
            PropertyPath::parse("user."),
            Err(PathError::EmptySegment { .. })
        ));
    }
}
