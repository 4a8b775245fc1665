//! Playlist pipeline: dedupe, synthetic album grouping, per-group covers,
//! and the per-track tail.

use std::collections::HashMap;
use std::path::PathBuf;

use ampapi::AlbumData;
use tracing::warn;

use crate::context::RunContext;
use crate::covers::{ensure_cover_file, handle_covers_only_album};
use crate::error::Error;
use crate::layout::{
    album_folder_name, artist_folder_name, current_root_folder, detect_release_type,
    release_folder_label, sanitize_name, tag_badges, AlbumFolderParts,
};
use crate::metadata::names::primary_artist;
use crate::model::Track;
use crate::pipeline::album::{debug_album_tracks, resolve_album_quality, show_select};
use crate::pipeline::track::{rip_lyrics_track, rip_track, track_supports_current_format};
use crate::runner::check_stop_and_warn;
use crate::selection::parse_track_selection;

const DEDUPE_TOLERANCE_MS: i64 = 2000;

/// One synthetic album folder within the playlist.
#[derive(Debug, Default)]
struct AlbumGroup {
    album_id: String,
    album_name: String,
    artist_name: String,
    artist_id: String,
    release_date: String,
    upc: String,
    record_label: String,
    artist_cover: String,
    track_count: u32,
    is_single: bool,
    audio_traits: Vec<String>,
    cover_url: String,
    sample_track: String,
    tag_string: String,
    codec: String,
    folder_path: PathBuf,
    artist_folder: PathBuf,
    track_indexes: Vec<usize>,
    skip: bool,
}

fn group_key(track: &Track) -> String {
    match track.resp.relationships.albums.data.first() {
        Some(album) if !album.id.is_empty() => album.id.clone(),
        _ => format!("unknown-{}", track.resp.attributes.album_name),
    }
}

fn album_artist_names(album: &AlbumData) -> Vec<String> {
    let names: Vec<String> = album
        .relationships
        .artists
        .data
        .iter()
        .map(|a| a.attributes.name.clone())
        .collect();
    let names = crate::metadata::names::normalized_names(names);
    if !names.is_empty() {
        return names;
    }
    crate::metadata::names::artists_from_field(&album.attributes.artist_name)
}

pub async fn rip_playlist(
    ctx: &mut RunContext,
    storefront: &str,
    playlist_id: &str,
) -> Result<(), Error> {
    if check_stop_and_warn() {
        return Ok(());
    }
    let resp = ctx.api.playlist(storefront, playlist_id).await.map_err(|e| {
        println!("Failed to get playlist response.");
        Error::from(e)
    })?;
    let Some(meta) = resp.data.into_iter().next() else {
        return Err(Error::RemoteFailure {
            source: ampapi::AmpError::empty("playlist", playlist_id),
        });
    };

    // Dedupe before numbering so task numbers reflect the kept order.
    let original_count = meta.relationships.tracks.data.len();
    let dedupe_result = playlist_dedupe::dedupe_tracks(
        &meta.relationships.tracks.data,
        playlist_dedupe::Options {
            enabled: !ctx.flags.no_playlist_dedupe,
            duration_tolerance_ms: DEDUPE_TOLERANCE_MS,
        },
    );
    if dedupe_result.removed_count > 0 {
        println!(
            "Playlist dedupe: {original_count} -> {} ({} skipped)",
            dedupe_result.tracks.len(),
            dedupe_result.removed_count
        );
    }
    let track_data = dedupe_result.tracks;

    if ctx.flags.debug {
        println!("{}", meta.attributes.artist_name);
        println!("{}", meta.attributes.name);
        debug_album_tracks(ctx, storefront, &track_data).await;
        return Ok(());
    }

    let codec = ctx.codec_label().to_string();
    let track_total = track_data.len();
    let mut tracks: Vec<Track> = track_data
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let mut track = Track::from_catalog(
                storefront,
                "playlists",
                playlist_id,
                i + 1,
                track_total,
                data.clone(),
            );
            track.playlist_name = meta.attributes.name.clone();
            track
        })
        .collect();

    let selected: Vec<usize> = if let Some(raw) = ctx.flags.select_tracks.clone() {
        match parse_track_selection(&raw, track_total) {
            Ok(Some(selection)) => selection,
            Ok(None) => (1..=track_total).collect(),
            Err(e) => {
                println!("Invalid --select-tracks: {e}");
                return Err(e);
            }
        }
    } else if !ctx.flags.select {
        (1..=track_total).collect()
    } else {
        show_select(&tracks)
    };

    let mut groups: HashMap<String, AlbumGroup> = HashMap::new();
    let mut group_order: Vec<String> = Vec::new();
    let mut album_cache: HashMap<String, AlbumData> = HashMap::new();
    let mut album_track_numbers: HashMap<String, HashMap<String, (u32, u32)>> = HashMap::new();
    let mut artist_cover_cache: HashMap<String, String> = HashMap::new();
    let root = current_root_folder(&ctx.config, ctx.flags.atmos, ctx.flags.aac).to_string();

    for idx in 0..tracks.len() {
        let order = idx + 1;
        if !selected.contains(&order) {
            continue;
        }

        let album_id = group_key(&tracks[idx]);
        let mut album_name = tracks[idx].resp.attributes.album_name.clone();
        let mut release_date = String::new();
        let mut upc = String::new();
        let mut record_label = String::new();
        let mut artist_cover = String::new();
        let mut track_count = 0u32;
        let mut is_single = false;
        let audio_traits = tracks[idx].resp.attributes.audio_traits.clone();

        if let Some(album_rel) = tracks[idx].resp.relationships.albums.data.first() {
            if !album_rel.attributes.name.is_empty() {
                album_name = album_rel.attributes.name.clone();
            }
            release_date = album_rel.attributes.release_date.clone();
            track_count = album_rel.attributes.track_count;
            is_single = album_rel.attributes.is_single;
            upc = album_rel.attributes.upc.clone();
        }

        let mut artist_id = tracks[idx]
            .resp
            .relationships
            .artists
            .data
            .first()
            .map(|a| a.id.clone())
            .unwrap_or_default();

        // Album lookups are memoized per run to bound request count.
        let mut album_data: Option<AlbumData> = None;
        if !album_id.starts_with("unknown-") {
            if let Some(cached) = album_cache.get(&album_id) {
                album_data = Some(cached.clone());
            } else {
                match ctx.api.album(storefront, &album_id).await {
                    Ok(resp) => {
                        if let Some(data) = resp.data.into_iter().next() {
                            album_cache.insert(album_id.clone(), data.clone());
                            album_data = Some(data);
                        }
                    }
                    Err(e) => println!("Failed to fetch album data for playlist item: {e}"),
                }
            }
        }

        if let Some(album) = &album_data {
            if !album.attributes.name.is_empty() {
                album_name = album.attributes.name.clone();
            }
            if !album.attributes.release_date.is_empty() {
                release_date = album.attributes.release_date.clone();
            }
            if !album.attributes.upc.is_empty() {
                upc = album.attributes.upc.clone();
            }
            if !album.attributes.record_label.is_empty() {
                record_label = album.attributes.record_label.clone();
            }
            if album.attributes.track_count > 0 {
                track_count = album.attributes.track_count;
            }
            is_single = album.attributes.is_single;
            if let Some(artist) = album.relationships.artists.data.first() {
                artist_cover = artist.attributes.artwork.url.clone();
                artist_id = artist.id.clone();
            }
            if let Some(last) = album.relationships.tracks.data.last() {
                tracks[idx].disc_total = last.attributes.disc_number;
            }
            album_track_numbers.entry(album_id.clone()).or_insert_with(|| {
                album
                    .relationships
                    .tracks
                    .data
                    .iter()
                    .map(|t| {
                        (
                            t.id.clone(),
                            (t.attributes.track_number, t.attributes.disc_number),
                        )
                    })
                    .collect()
            });
            // A value copy without the track list hangs off the track.
            let mut copy = album.clone();
            copy.relationships.tracks.data.clear();
            tracks[idx].album = Some(copy);
        }
        if release_date.is_empty() && !tracks[idx].resp.attributes.release_date.is_empty() {
            release_date = tracks[idx].resp.attributes.release_date.clone();
        }
        if artist_cover.is_empty() && !artist_id.is_empty() {
            if let Some(cached) = artist_cover_cache.get(&artist_id) {
                artist_cover = cached.clone();
            } else {
                if let Ok(resp) = ctx.api.artist(storefront, &artist_id).await
                    && let Some(artist) = resp.data.first()
                {
                    artist_cover = artist.attributes.artwork.url.clone();
                }
                artist_cover_cache.insert(artist_id.clone(), artist_cover.clone());
            }
        }

        let mut primary_album_artist = tracks[idx]
            .album
            .as_ref()
            .map(|album| primary_artist(&album_artist_names(album)))
            .unwrap_or_default();
        if primary_album_artist.is_empty() {
            primary_album_artist =
                primary_artist(&crate::metadata::mp4::artist_names(&tracks[idx]));
        }
        if primary_album_artist.is_empty() {
            primary_album_artist = tracks[idx].resp.attributes.artist_name.clone();
        }

        if let Some(track_map) = album_track_numbers.get(&album_id)
            && let Some(&(track_number, disc_number)) = track_map.get(&tracks[idx].id)
        {
            if track_number > 0 {
                tracks[idx].resp.attributes.track_number = track_number;
            }
            if disc_number > 0 {
                tracks[idx].resp.attributes.disc_number = disc_number;
            }
        }

        let tag_string = tag_badges(
            &ctx.config,
            tracks[idx].resp.attributes.is_apple_digital_master,
            &tracks[idx].resp.attributes.content_rating,
        );

        if !groups.contains_key(&album_id) {
            group_order.push(album_id.clone());
            groups.insert(
                album_id.clone(),
                AlbumGroup {
                    album_id: album_id.clone(),
                    album_name,
                    artist_name: primary_album_artist,
                    artist_id,
                    release_date,
                    upc,
                    record_label,
                    artist_cover,
                    track_count,
                    is_single,
                    audio_traits,
                    cover_url: tracks[idx].resp.attributes.artwork.url.clone(),
                    sample_track: tracks[idx].id.clone(),
                    tag_string,
                    codec: codec.clone(),
                    track_indexes: vec![idx],
                    ..Default::default()
                },
            );
        } else {
            let group = groups.get_mut(&album_id).expect("group checked above");
            group.track_indexes.push(idx);
            if group.album_name.is_empty() && !album_name.is_empty() {
                group.album_name = album_name;
            }
            if group.artist_name.is_empty() && !primary_album_artist.is_empty() {
                group.artist_name = primary_album_artist;
            }
            if group.release_date.is_empty() && !release_date.is_empty() {
                group.release_date = release_date;
            }
            if group.upc.is_empty() && !upc.is_empty() {
                group.upc = upc;
            }
            if group.record_label.is_empty() && !record_label.is_empty() {
                group.record_label = record_label;
            }
            if group.artist_cover.is_empty() && !artist_cover.is_empty() {
                group.artist_cover = artist_cover;
            }
            if group.track_count == 0 && track_count > 0 {
                group.track_count = track_count;
            }
            if group.artist_id.is_empty() && !artist_id.is_empty() {
                group.artist_id = artist_id;
            }
        }
    }

    // Resolve folders and covers per group.
    for key in &group_order {
        // Split-borrow the group out of the map for the async calls below.
        let (track_indexes, artist_name, artist_id, album_name, sample_track, group_codec, traits) = {
            let group = groups.get(key).expect("group inserted above");
            (
                group.track_indexes.clone(),
                group.artist_name.clone(),
                group.artist_id.clone(),
                group.album_name.clone(),
                group.sample_track.clone(),
                group.codec.clone(),
                group.audio_traits.clone(),
            )
        };

        if ctx.flags.atmos || ctx.flags.covers_only || ctx.flags.lyrics_only {
            let mut has_supported = false;
            for &idx in &track_indexes {
                if idx < tracks.len() && track_supports_current_format(ctx, &tracks[idx]).await {
                    has_supported = true;
                    break;
                }
            }
            if !has_supported {
                println!("No selected tracks available for this format; skipping {album_name}.");
                groups.get_mut(key).expect("group exists").skip = true;
                continue;
            }
        }

        let artist_folder_part = artist_folder_name(&ctx.config, &artist_name, &artist_id);
        let artist_folder = if artist_folder_part.is_empty() {
            PathBuf::from(&root)
        } else {
            std::path::Path::new(&root).join(sanitize_name(&artist_folder_part))
        };

        let (quality, resolved_codec) = resolve_album_quality(
            ctx,
            storefront,
            &sample_track,
            &traits,
            &group_codec,
        )
        .await;

        let group = groups.get_mut(key).expect("group exists");
        group.codec = resolved_codec;

        let release_type =
            detect_release_type(&group.album_name, group.track_count, group.is_single);
        let release_folder = release_folder_label(release_type);
        let folder_name = album_folder_name(
            &ctx.config,
            &AlbumFolderParts {
                artist_name: &group.artist_name,
                album_name: &group.album_name,
                album_id: &group.album_id,
                release_date: &group.release_date,
                upc: &group.upc,
                record_label: &group.record_label,
                copyright: "",
                quality: &quality,
                codec: &group.codec,
                tag: &group.tag_string,
            },
            ctx.flags.atmos,
        );
        group.artist_folder = artist_folder.clone();
        group.folder_path = artist_folder
            .join(release_folder)
            .join(sanitize_name(&folder_name));
        std::fs::create_dir_all(&group.folder_path)?;

        let folder_path = group.folder_path.clone();
        let cover_url = group.cover_url.clone();
        let artist_cover = group.artist_cover.clone();

        if ctx.config.save_cover_file
            && !ctx.flags.covers_only
            && let Err(e) = ensure_cover_file(ctx, &folder_path, "cover", &cover_url).await
        {
            warn!(error = %e, "failed to write cover");
        }

        if ctx.flags.covers_only {
            handle_covers_only_album(ctx, &folder_path, &artist_folder, &cover_url, &artist_cover, "")
                .await;
        }
    }

    if ctx.flags.covers_only {
        return Ok(());
    }

    let mut group_success: HashMap<String, bool> = HashMap::new();
    for idx in 0..tracks.len() {
        if check_stop_and_warn() {
            return Ok(());
        }
        let order = idx + 1;
        if !selected.contains(&order) {
            continue;
        }
        let album_id = group_key(&tracks[idx]);
        match groups.get(&album_id) {
            Some(group) if group.skip => continue,
            Some(group) => {
                tracks[idx].save_dir = group.folder_path.clone();
                tracks[idx].codec = group.codec.clone();
            }
            None => {
                if ctx.flags.covers_only || ctx.flags.lyrics_only {
                    continue;
                }
                tracks[idx].save_dir = PathBuf::from(&root);
                tracks[idx].codec = codec.clone();
            }
        }

        if ctx.already_ok(playlist_id, order) {
            ctx.counter.total += 1;
            ctx.counter.success += 1;
            continue;
        }

        let success = if ctx.flags.lyrics_only {
            rip_lyrics_track(ctx, &mut tracks[idx]).await
        } else {
            rip_track(ctx, &mut tracks[idx]).await
        };
        if success {
            group_success.insert(album_id, true);
        }
    }

    if !ctx.flags.lyrics_only && ctx.config.save_artist_cover {
        for (album_id, success) in group_success {
            if !success {
                continue;
            }
            let Some(group) = groups.get(&album_id) else {
                continue;
            };
            if group.artist_cover.is_empty() || group.artist_folder.as_os_str().is_empty() {
                continue;
            }
            let artist_folder = group.artist_folder.clone();
            let artist_cover = group.artist_cover.clone();
            if let Err(e) = ensure_cover_file(ctx, &artist_folder, "folder", &artist_cover).await {
                warn!(error = %e, "failed to write artist cover");
            }
        }
    }
    Ok(())
}
