//! Storage Adapter - 音频对象存储与签名 URL

mod file_object_store;
mod url_signer;

pub use file_object_store::{FileObjectStore, FileObjectStoreConfig};
pub use url_signer::UrlSigner;
