//! 文本归一化
//!
//! 清理标记与控制字符、折叠空白，并按长度上限截断或拒绝

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::job::ValidationError;

/// 默认最大字符数
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 5000;

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>")
        .expect("static regex is valid")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex is valid"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("static regex is valid")
});
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex is valid"));

/// 超长文本处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// 返回 TextTooLong
    #[default]
    Reject,
    /// 在不超过上限的最后一个词边界处截断
    Truncate,
}

/// 归一化配置
#[derive(Debug, Clone, Copy)]
pub struct NormalizeConfig {
    pub max_length: usize,
    pub overflow: OverflowPolicy,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_TEXT_LENGTH,
            overflow: OverflowPolicy::Reject,
        }
    }
}

/// 归一化文本
///
/// 处理顺序：
/// 1. 删除 script/style 块和其余标签
/// 2. 解码常见 HTML 实体
/// 3. 控制字符替换为空白，空白折叠为单个空格并去掉首尾
/// 4. 按 overflow 策略处理超长文本
pub fn normalize_text(text: &str, config: &NormalizeConfig) -> Result<String, ValidationError> {
    let without_blocks = BLOCK_RE.replace_all(text, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);

    let printable: String = decoded
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = WHITESPACE_RE.replace_all(&printable, " ");
    let cleaned = collapsed.trim();

    if cleaned.is_empty() {
        return Err(ValidationError::EmptyText);
    }

    let length = cleaned.chars().count();
    if length <= config.max_length {
        return Ok(cleaned.to_string());
    }

    match config.overflow {
        OverflowPolicy::Reject => Err(ValidationError::TextTooLong {
            length,
            max: config.max_length,
        }),
        OverflowPolicy::Truncate => {
            let truncated = truncate_at_word(cleaned, config.max_length);
            if truncated.is_empty() {
                Err(ValidationError::EmptyText)
            } else {
                Ok(truncated)
            }
        }
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    // &amp; 最后处理，避免 "&amp;lt;" 被解码两次
    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// 截断到 max_chars 以内，优先在空白处断开
fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];

    // 截断点恰好落在词边界上
    if text[cut..].starts_with(' ') {
        return head.trim_end().to_string();
    }

    match head.rfind(' ') {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}
