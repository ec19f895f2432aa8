//! Job Context - Value Objects

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::ValidationError;

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    /// 出队顺序，数值越小越先出队
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
        }
    }
}

pub const VOICE_ID: &str = "voice_id";
pub const LANGUAGE: &str = "language";
pub const STABILITY: &str = "stability";
pub const SPEED: &str = "speed";
pub const PITCH: &str = "pitch";

/// 数值选项的合法区间
const NUMERIC_RANGES: &[(&str, f64, f64)] = &[
    (STABILITY, 0.0, 1.0),
    (SPEED, 0.25, 4.0),
    (PITCH, -20.0, 20.0),
];

/// 音色选项
///
/// provider 相关的键值对（voice_id、language、stability、speed、pitch 等）。
/// 使用 BTreeMap 保证遍历顺序稳定，指纹不受插入顺序影响。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceOptions(BTreeMap<String, Value>);

impl VoiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn number_option(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.str_option(VOICE_ID)
    }

    pub fn language(&self) -> Option<&str> {
        self.str_option(LANGUAGE)
    }

    pub fn stability(&self) -> Option<f64> {
        self.number_option(STABILITY)
    }

    pub fn speed(&self) -> Option<f64> {
        self.number_option(SPEED)
    }

    pub fn pitch(&self) -> Option<f64> {
        self.number_option(PITCH)
    }

    /// 校验已知选项的类型与取值范围，未知键原样透传给 provider
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, min, max) in NUMERIC_RANGES {
            let Some(value) = self.0.get(*name) else {
                continue;
            };
            let number = value.as_f64().ok_or_else(|| ValidationError::InvalidOption {
                name: name.to_string(),
                message: "expected a number".to_string(),
            })?;
            if !number.is_finite() || number < *min || number > *max {
                return Err(ValidationError::OptionOutOfRange {
                    name: name.to_string(),
                    value: number,
                    min: *min,
                    max: *max,
                });
            }
        }

        for name in [VOICE_ID, LANGUAGE] {
            if let Some(value) = self.0.get(name) {
                match value.as_str() {
                    Some(s) if !s.trim().is_empty() => {}
                    _ => {
                        return Err(ValidationError::InvalidOption {
                            name: name.to_string(),
                            message: "expected a non-empty string".to_string(),
                        })
                    }
                }
            }
        }

        Ok(())
    }
}

/// 请求指纹（幂等 key）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// md5(normalized_text, provider_preference, voice_options)
    ///
    /// priority 不参与计算：同一段文本换个优先级仍是同一个请求
    pub fn compute(text: &str, provider_preference: &[String], options: &VoiceOptions) -> Self {
        let mut canonical = String::with_capacity(text.len() + 64);
        canonical.push_str(text);
        canonical.push('\u{1f}');
        canonical.push_str(&provider_preference.join("\u{1e}"));
        canonical.push('\u{1f}');
        for (key, value) in options.iter() {
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(&value.to_string());
            canonical.push('\u{1e}');
        }

        let digest = md5::compute(canonical.as_bytes());
        Self(format!("{:x}", digest))
    }

    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 合成请求，受理后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// 归一化后的文本
    pub text: String,
    /// 调用方指定的 provider（按顺序优先）
    #[serde(default)]
    pub provider_preference: Vec<String>,
    #[serde(default)]
    pub voice_options: VoiceOptions,
    #[serde(default)]
    pub priority: Priority,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider_preference: Vec::new(),
            voice_options: VoiceOptions::default(),
            priority: Priority::Normal,
        }
    }

    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.provider_preference = providers;
        self
    }

    pub fn with_voice_options(mut self, options: VoiceOptions) -> Self {
        self.voice_options = options;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn fingerprint(&self) -> RequestFingerprint {
        RequestFingerprint::compute(&self.text, &self.provider_preference, &self.voice_options)
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
