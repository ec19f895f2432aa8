//! Voice Queries

/// 列出音色目录
#[derive(Debug, Clone, Default)]
pub struct ListVoices {
    /// 只查询指定 provider，为空时汇总所有可达 provider
    pub provider: Option<String>,
}
