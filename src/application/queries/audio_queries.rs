//! Audio Queries - 签名 URL 访问

/// 获取音频查询
#[derive(Debug, Clone)]
pub struct GetAudioQuery {
    pub key: String,
    pub expires: i64,
    pub signature: String,
}

/// 获取音频响应
#[derive(Debug, Clone)]
pub struct GetAudioResponse {
    pub audio_data: Vec<u8>,
    pub content_type: String,
}
