use m3u8_rs::{MasterPlaylist, Playlist};
use reqwest::Client;
use url::Url;

use crate::error::PickError;

/// Fetch and parse a master playlist, returning it with its resolved URL
/// for relative-URI joins.
pub async fn fetch_master(client: &Client, url: &str) -> Result<(MasterPlaylist, Url), PickError> {
    let parsed_url = Url::parse(url).map_err(|e| PickError::invalid_url(url, e.to_string()))?;
    let body = fetch_playlist_text(client, url).await?;
    match m3u8_rs::parse_playlist_res(body.as_bytes()) {
        Ok(Playlist::MasterPlaylist(pl)) => Ok((pl, parsed_url)),
        Ok(Playlist::MediaPlaylist(_)) => Err(PickError::NotMaster),
        Err(e) => Err(PickError::parse(e.to_string())),
    }
}

/// Fetch a playlist body as text, mapping non-2xx to [`PickError::Status`].
pub async fn fetch_playlist_text(client: &Client, url: &str) -> Result<String, PickError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(PickError::Status {
            status: response.status(),
        });
    }
    Ok(response.text().await?)
}
