//! Audio Query Handlers

use std::sync::Arc;

use crate::application::ports::{ObjectStorePort, StorageError};
use crate::application::queries::{GetAudioQuery, GetAudioResponse};

/// GetAudio Handler - 校验签名后读取音频
pub struct GetAudioHandler {
    object_store: Arc<dyn ObjectStorePort>,
}

impl GetAudioHandler {
    pub fn new(object_store: Arc<dyn ObjectStorePort>) -> Self {
        Self { object_store }
    }

    /// 签名错误或过期返回 StorageError，由 HTTP 层映射为 403
    pub async fn handle(&self, query: GetAudioQuery) -> Result<GetAudioResponse, StorageError> {
        self.object_store
            .verify(&query.key, query.expires, &query.signature)?;

        let audio = self.object_store.read(&query.key).await?;
        Ok(GetAudioResponse {
            audio_data: audio.data,
            content_type: audio.content_type,
        })
    }
}
