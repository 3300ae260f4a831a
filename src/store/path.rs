//! 存储路径：`subject.property`，或仅 `subject`（只用于整体删除）

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path {0:?} contains whitespace")]
    Whitespace(String),
    #[error("path {0:?} has more than one '.' separator")]
    TooManySegments(String),
    #[error("path {0:?} has an empty segment")]
    EmptySegment(String),
    #[error("path {0:?} contains invalid character {1:?}; use letters, digits, '_' or '-'")]
    InvalidChar(String, char),
    #[error("path {0:?} must be in subject.property form")]
    MissingProperty(String),
}

/// 已校验的路径；区分大小写
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    raw: String,
    dot: Option<usize>,
}

impl StorePath {
    /// 解析路径，允许只有 subject
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PathError::Whitespace(raw.to_string()));
        }
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() > 2 {
            return Err(PathError::TooManySegments(raw.to_string()));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
            if let Some(c) = segment
                .chars()
                .find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(PathError::InvalidChar(raw.to_string(), c));
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            dot: raw.find('.'),
        })
    }

    /// 解析并要求 `subject.property` 形式（get / set / add / remove）
    pub fn parse_property(raw: &str) -> Result<Self, PathError> {
        let path = Self::parse(raw)?;
        if path.dot.is_none() {
            return Err(PathError::MissingProperty(raw.to_string()));
        }
        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn subject(&self) -> &str {
        match self.dot {
            Some(i) => &self.raw[..i],
            None => &self.raw,
        }
    }

    pub fn property(&self) -> Option<&str> {
        self.dot.map(|i| &self.raw[i + 1..])
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
