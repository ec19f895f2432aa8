//! HTTP Handlers

mod audio;
mod health;
mod ping;
mod tts;
mod voice;
mod websocket;

pub use audio::*;
pub use health::*;
pub use ping::*;
pub use tts::*;
pub use voice::*;
pub use websocket::*;
