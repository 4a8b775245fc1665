//! Typed client for the Apple Music catalog endpoints consumed by the
//! download pipelines: albums, songs, playlists, stations, artists,
//! music videos, search, lyrics, and the webplayback exchange.

mod client;
mod error;
mod lyrics;
mod models;
mod token;
mod webplayback;

pub use client::AmpClient;
pub use error::AmpError;
pub use lyrics::{LyricsRequest, ttml_to_lrc};
pub use models::*;
pub use token::fetch_web_token;
pub use webplayback::{WebPlaybackAsset, WebPlaybackSong};

/// Browser user agent sent on every catalog request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Origin required by the amp-api gateway.
pub const ORIGIN: &str = "https://music.apple.com";

pub(crate) const AMP_API_BASE: &str = "https://amp-api.music.apple.com/v1/catalog";
