use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::AmpClient;
use crate::error::AmpError;
use crate::{ORIGIN, USER_AGENT};

const WEBPLAYBACK_URL: &str =
    "https://play.itunes.apple.com/WebObjects/MZPlay.woa/wa/webPlayback";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPlaybackAsset {
    #[serde(default)]
    pub flavor: String,
    #[serde(default, rename = "URL")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPlaybackSong {
    #[serde(default, rename = "hls-playlist-url")]
    pub hls_playlist_url: String,
    #[serde(default)]
    pub assets: Vec<WebPlaybackAsset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebPlaybackResp {
    #[serde(default)]
    song_list: Vec<WebPlaybackSong>,
}

impl AmpClient {
    /// The webplayback exchange: resolves a salable adam id into its
    /// playback descriptor (HLS manifest URL, key server, single-file
    /// assets). Requires a valid media-user-token.
    pub async fn webplayback(
        &self,
        adam_id: &str,
        media_user_token: &str,
    ) -> Result<WebPlaybackSong, AmpError> {
        let body = json!({ "salableAdamId": adam_id });
        let response = self
            .http()
            .post(WEBPLAYBACK_URL)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.token()),
            )
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ORIGIN, ORIGIN)
            .header(
                reqwest::header::COOKIE,
                format!("media-user-token={media_user_token}"),
            )
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AmpError::status(response.status(), "webplayback"));
        }
        let parsed = response.json::<WebPlaybackResp>().await?;
        let song = parsed
            .song_list
            .into_iter()
            .next()
            .ok_or_else(|| AmpError::NoAsset {
                id: adam_id.to_string(),
            })?;
        debug!(
            adam_id,
            assets = song.assets.len(),
            has_hls = !song.hls_playlist_url.is_empty(),
            "webplayback resolved"
        );
        Ok(song)
    }
}
