//! Response shapes for the catalog endpoints. Only the fields the
//! pipelines consume are modeled; everything else is ignored and every
//! field is defaulted because the gateway omits attributes freely.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artwork {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionVideo {
    #[serde(default)]
    pub video: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorialVideo {
    #[serde(default)]
    pub motion_detail_square: MotionVideo,
    #[serde(default)]
    pub motion_square: MotionVideo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAssetUrls {
    #[serde(default)]
    pub enhanced_hls: String,
}

/// A paged relationship or top-level collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            next: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Artists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artwork: Artwork,
    #[serde(default)]
    pub genre_names: Vec<String>,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistData {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: ArtistAttributes,
}

pub type ArtistResp = Page<ArtistData>;

// ---------------------------------------------------------------------------
// Albums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub upc: String,
    #[serde(default)]
    pub record_label: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub is_single: bool,
    #[serde(default)]
    pub is_compilation: bool,
    #[serde(default)]
    pub is_mastered_for_itunes: bool,
    #[serde(default)]
    pub is_apple_digital_master: bool,
    #[serde(default)]
    pub content_rating: String,
    #[serde(default)]
    pub artwork: Artwork,
    #[serde(default)]
    pub editorial_video: EditorialVideo,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumRelationships {
    #[serde(default)]
    pub artists: Page<ArtistData>,
    #[serde(default)]
    pub tracks: Page<TrackData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumData {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: AlbumAttributes,
    #[serde(default)]
    pub relationships: AlbumRelationships,
}

pub type AlbumResp = Page<AlbumData>;

// ---------------------------------------------------------------------------
// Tracks (songs and music videos share the shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub isrc: String,
    #[serde(default)]
    pub duration_in_millis: i64,
    #[serde(default)]
    pub content_rating: String,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub genre_names: Vec<String>,
    #[serde(default)]
    pub composer_name: String,
    #[serde(default)]
    pub audio_traits: Vec<String>,
    #[serde(default)]
    pub is_apple_digital_master: bool,
    #[serde(default)]
    pub artwork: Artwork,
    #[serde(default)]
    pub extended_asset_urls: ExtendedAssetUrls,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackRelationships {
    #[serde(default)]
    pub albums: Page<AlbumData>,
    #[serde(default)]
    pub artists: Page<ArtistData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackData {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: TrackAttributes,
    #[serde(default)]
    pub relationships: TrackRelationships,
}

pub type SongResp = Page<TrackData>;

// ---------------------------------------------------------------------------
// Playlists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "curatorName")]
    pub artist_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistRelationships {
    #[serde(default)]
    pub tracks: Page<TrackData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistData {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: PlaylistAttributes,
    #[serde(default)]
    pub relationships: PlaylistRelationships,
}

pub type PlaylistResp = Page<PlaylistData>;

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationAttributes {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artwork: Artwork,
    #[serde(default)]
    pub editorial_video: EditorialVideo,
    #[serde(default)]
    pub is_live: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationRelationships {
    #[serde(default)]
    pub tracks: Page<TrackData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationData {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: StationAttributes,
    #[serde(default)]
    pub relationships: StationRelationships,
}

pub type StationResp = Page<StationData>;

pub type MusicVideoResp = Page<TrackData>;

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub albums: Option<Page<AlbumData>>,
    #[serde(default)]
    pub songs: Option<Page<TrackData>>,
    #[serde(default)]
    pub artists: Option<Page<ArtistData>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResp {
    #[serde(default)]
    pub results: SearchResults,
}
