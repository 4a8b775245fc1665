use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AmpError;
use crate::models::*;
use crate::{AMP_API_BASE, ORIGIN, USER_AGENT};

/// Catalog gateway. One instance per run; album lookups made through
/// [`AmpClient::album`] are not cached here — memoization is owned by the
/// playlist pipeline, which bounds its own request count.
#[derive(Debug, Clone)]
pub struct AmpClient {
    http: Client,
    token: String,
    language: String,
}

impl AmpClient {
    pub fn new(http: Client, token: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            http,
            token: token.into(),
            language: language.into(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(ORIGIN));
        headers
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<T, AmpError> {
        debug!(url, operation, "catalog request");
        let response = self
            .http
            .get(url)
            .headers(self.headers())
            .query(query)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(AmpError::status(response.status(), operation));
        }
        Ok(response.json::<T>().await?)
    }

    pub async fn album(&self, storefront: &str, id: &str) -> Result<AlbumResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/albums/{id}");
        self.get_json(&url, &[("l", &self.language)], "album lookup")
            .await
    }

    pub async fn song(&self, storefront: &str, id: &str) -> Result<SongResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/songs/{id}");
        self.get_json(
            &url,
            &[("l", &self.language), ("extend", "extendedAssetUrls")],
            "song lookup",
        )
        .await
    }

    pub async fn playlist(&self, storefront: &str, id: &str) -> Result<PlaylistResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/playlists/{id}");
        self.get_json(&url, &[("l", &self.language)], "playlist lookup")
            .await
    }

    pub async fn station(&self, storefront: &str, id: &str) -> Result<StationResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/stations/{id}");
        self.get_json(&url, &[("l", &self.language)], "station lookup")
            .await
    }

    pub async fn artist(&self, storefront: &str, id: &str) -> Result<ArtistResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/artists/{id}");
        self.get_json(
            &url,
            &[("l", &self.language), ("fields[artists]", "name,artwork")],
            "artist lookup",
        )
        .await
    }

    pub async fn music_video(&self, storefront: &str, id: &str) -> Result<MusicVideoResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/music-videos/{id}");
        self.get_json(&url, &[("l", &self.language)], "music video lookup")
            .await
    }

    /// One page of an artist's `albums` or `music-videos` relationship.
    pub async fn artist_page(
        &self,
        storefront: &str,
        artist_id: &str,
        relationship: &str,
        offset: u32,
    ) -> Result<ArtistResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/artists/{artist_id}/{relationship}");
        let offset = offset.to_string();
        self.get_json(
            &url,
            &[("limit", "100"), ("offset", &offset), ("l", &self.language)],
            "artist relationship page",
        )
        .await
    }

    /// All pages of an artist's `albums` or `music-videos` relationship.
    pub async fn artist_all(
        &self,
        storefront: &str,
        artist_id: &str,
        relationship: &str,
    ) -> Result<Vec<ArtistData>, AmpError> {
        let mut out = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self
                .artist_page(storefront, artist_id, relationship, offset)
                .await?;
            let done = page.next.is_none();
            out.extend(page.data);
            if done {
                break;
            }
            offset += 100;
        }
        Ok(out)
    }

    pub async fn search(
        &self,
        storefront: &str,
        query: &str,
        types: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResp, AmpError> {
        let url = format!("{AMP_API_BASE}/{storefront}/search");
        let limit = limit.to_string();
        let offset = offset.to_string();
        self.get_json(
            &url,
            &[
                ("term", query),
                ("types", types),
                ("limit", &limit),
                ("offset", &offset),
                ("l", &self.language),
            ],
            "search",
        )
        .await
    }
}
