use std::path::PathBuf;

use ampapi::{AlbumData, TrackData};

/// Per-run outcome counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counter {
    pub total: u32,
    pub success: u32,
    pub error: u32,
    pub unavailable: u32,
    pub not_song: u32,
}

/// One unit of pipeline work. Created from a catalog response; pipeline
/// stages record the resolved playlist, codec, quality, and save paths;
/// consumed by the tagger; dropped after history emission.
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub storefront: String,
    pub id: String,
    /// `songs` or `music-videos`.
    pub kind: String,

    /// Queue-item provenance: `albums`, `playlists`, or `stations`.
    pub pre_type: String,
    /// The queue item id (album/playlist/station id).
    pub pre_id: String,
    /// 1-based position within the queue item.
    pub task_num: usize,
    pub task_total: usize,

    pub resp: TrackData,
    /// Materialized value copy of the owning album's attributes, when the
    /// pipeline resolved one. An id+value copy rather than a back-pointer.
    pub album: Option<AlbumData>,
    /// Playlist name for "use playlist info" tagging.
    pub playlist_name: String,
    pub disc_total: u32,

    pub web_m3u8: String,
    pub device_m3u8: String,
    /// The playlist currently chosen for download.
    pub m3u8: String,

    /// `ALAC`, `AAC`, or `ATMOS` once resolved.
    pub codec: String,
    /// Free-text quality label, e.g. `24B-96.0kHz`.
    pub quality: String,

    pub save_dir: PathBuf,
    pub save_name: String,
    pub save_path: PathBuf,
    pub cover_path: Option<PathBuf>,
}

impl Track {
    pub fn from_catalog(
        storefront: &str,
        pre_type: &str,
        pre_id: &str,
        task_num: usize,
        task_total: usize,
        resp: TrackData,
    ) -> Self {
        let web_m3u8 = resp.attributes.extended_asset_urls.enhanced_hls.clone();
        Self {
            storefront: storefront.to_string(),
            id: resp.id.clone(),
            kind: resp.kind.clone(),
            pre_type: pre_type.to_string(),
            pre_id: pre_id.to_string(),
            task_num,
            task_total,
            m3u8: web_m3u8.clone(),
            web_m3u8,
            resp,
            ..Default::default()
        }
    }

    pub fn is_music_video(&self) -> bool {
        self.kind == "music-videos"
    }

    /// The effective track number: catalog value, or the queue position
    /// when the catalog omits one.
    pub fn effective_track_number(&self) -> usize {
        if self.resp.attributes.track_number > 0 {
            self.resp.attributes.track_number as usize
        } else {
            self.task_num
        }
    }
}
