//! 签名 URL
//!
//! `{public_base_url}/tts/audio/{key}?expires={unix}&signature={hex}`，
//! signature = hex(hmac-sha256(secret, "{key}:{expires}"))

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::application::ports::StorageError;

type HmacSha256 = Hmac<Sha256>;

/// URL 签名器
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
    public_base_url: String,
    ttl: Duration,
}

impl UrlSigner {
    pub fn new(
        secret: &str,
        public_base_url: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, StorageError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StorageError::IoError(format!("HMAC initialization failed: {}", e)))?;
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            mac,
            public_base_url,
            ttl,
        })
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("{}:{}", key, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 以当前时间签发
    pub fn sign(&self, key: &str) -> String {
        self.sign_at(key, Utc::now().timestamp())
    }

    pub fn sign_at(&self, key: &str, now: i64) -> String {
        let expires = now + self.ttl.as_secs() as i64;
        format!(
            "{}/tts/audio/{}?expires={}&signature={}",
            self.public_base_url,
            key,
            expires,
            self.signature(key, expires)
        )
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), StorageError> {
        self.verify_at(key, expires, signature, Utc::now().timestamp())
    }

    /// 先校验签名（常量时间比较），再校验过期时间
    pub fn verify_at(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), StorageError> {
        let provided = hex::decode(signature).map_err(|_| StorageError::InvalidSignature)?;

        let mut mac = self.mac.clone();
        mac.update(format!("{}:{}", key, expires).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| StorageError::InvalidSignature)?;

        if now > expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}
