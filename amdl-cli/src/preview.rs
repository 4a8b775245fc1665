//! Preview payloads: JSON metadata for a URL, used by front-ends to show
//! track lists (with dedupe applied) before a download.

use serde::Serialize;

use crate::context::RunContext;
use crate::error::Error;
use crate::layout::detect_release_type;
use crate::urls::{classify, UrlKind};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewTrack {
    pub num: usize,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artist: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub album: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub isrc: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub duration_ms: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewPayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artist: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub release_type: String,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub track_count: usize,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub original_track_count: usize,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub duplicates_removed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<PreviewTrack>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preselected: Vec<usize>,
}

fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

fn preview_track(num: usize, data: &ampapi::TrackData, album_name: &str) -> PreviewTrack {
    PreviewTrack {
        num,
        name: data.attributes.name.clone(),
        artist: data.attributes.artist_name.clone(),
        album: if album_name.is_empty() {
            data.attributes.album_name.clone()
        } else {
            album_name.to_string()
        },
        id: data.id.clone(),
        isrc: data.attributes.isrc.clone(),
        duration_ms: data.attributes.duration_in_millis,
    }
}

/// Build the preview payload for an album, playlist, or song URL.
pub async fn build_preview_payload(
    ctx: &RunContext,
    raw_url: &str,
) -> Result<PreviewPayload, Error> {
    let classified = classify(raw_url)?;

    match classified.kind {
        UrlKind::Album => {
            let resp = ctx.api.album(&classified.storefront, &classified.id).await?;
            let Some(meta) = resp.data.first() else {
                return Err(Error::RemoteFailure {
                    source: ampapi::AmpError::empty("album", &classified.id),
                });
            };
            let mut preselected = Vec::new();
            let tracks: Vec<PreviewTrack> = meta
                .relationships
                .tracks
                .data
                .iter()
                .enumerate()
                .map(|(i, track)| {
                    if let Some(hint) = &classified.track_hint
                        && track.id == *hint
                    {
                        preselected = vec![i + 1];
                    }
                    preview_track(i + 1, track, &meta.attributes.name)
                })
                .collect();
            Ok(PreviewPayload {
                kind: "Album".to_string(),
                artist: meta.attributes.artist_name.clone(),
                title: meta.attributes.name.clone(),
                release_type: detect_release_type(
                    &meta.attributes.name,
                    meta.attributes.track_count,
                    meta.attributes.is_single,
                )
                .to_string(),
                track_count: meta.attributes.track_count as usize,
                tracks,
                preselected,
                ..Default::default()
            })
        }
        UrlKind::Playlist => {
            let resp = ctx
                .api
                .playlist(&classified.storefront, &classified.id)
                .await?;
            let Some(meta) = resp.data.first() else {
                return Err(Error::RemoteFailure {
                    source: ampapi::AmpError::empty("playlist", &classified.id),
                });
            };
            let original_count = meta.relationships.tracks.data.len();
            let dedupe = playlist_dedupe::dedupe_tracks(
                &meta.relationships.tracks.data,
                playlist_dedupe::Options {
                    enabled: !ctx.flags.no_playlist_dedupe,
                    duration_tolerance_ms: 2000,
                },
            );
            let tracks: Vec<PreviewTrack> = dedupe
                .tracks
                .iter()
                .enumerate()
                .map(|(i, track)| preview_track(i + 1, track, ""))
                .collect();
            let artist = if meta.attributes.artist_name.is_empty() {
                "Apple Music".to_string()
            } else {
                meta.attributes.artist_name.clone()
            };
            let mut payload = PreviewPayload {
                kind: "Playlist".to_string(),
                artist,
                title: meta.attributes.name.clone(),
                release_type: "Playlists".to_string(),
                track_count: tracks.len(),
                tracks,
                ..Default::default()
            };
            if dedupe.removed_count > 0 {
                payload.original_track_count = original_count;
                payload.duplicates_removed = dedupe.removed_count;
            }
            Ok(payload)
        }
        UrlKind::Song => {
            let resp = ctx.api.song(&classified.storefront, &classified.id).await?;
            let Some(data) = resp.data.first() else {
                return Err(Error::RemoteFailure {
                    source: ampapi::AmpError::empty("song", &classified.id),
                });
            };
            let release_type = data
                .relationships
                .albums
                .data
                .first()
                .map(|album| {
                    detect_release_type(
                        &album.attributes.name,
                        album.attributes.track_count,
                        album.attributes.is_single,
                    )
                })
                .unwrap_or("Singles");
            Ok(PreviewPayload {
                kind: "Song".to_string(),
                artist: data.attributes.artist_name.clone(),
                title: data.attributes.name.clone(),
                release_type: release_type.to_string(),
                track_count: 1,
                tracks: vec![preview_track(1, data, "")],
                preselected: vec![1],
                ..Default::default()
            })
        }
        _ => Err(Error::InvalidUrl {
            input: raw_url.to_string(),
        }),
    }
}
