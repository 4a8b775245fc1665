//! Album pipeline: selection, track enumeration, per-track downloads,
//! and album-level covers.

use ampapi::AlbumData;
use tracing::warn;

use crate::context::RunContext;
use crate::covers::{
    download_animated_artwork_square, ensure_cover_file, handle_covers_only_album,
};
use crate::error::Error;
use crate::layout::{
    album_folder_name, artist_folder_name, current_root_folder, detect_release_type,
    release_folder_label, sanitize_name, tag_badges, AlbumFolderParts,
};
use crate::metadata::names::primary_artist;
use crate::model::Track;
use crate::pipeline::track::{
    any_selected_track_supports_format, device_m3u8, rip_lyrics_track, rip_track,
};
use crate::runner::check_stop_and_warn;
use crate::selection::parse_track_selection;

/// A value copy of the album without its track list, cheap enough to hang
/// off every track.
fn album_value_copy(album: &AlbumData) -> AlbumData {
    let mut copy = album.clone();
    copy.relationships.tracks.data.clear();
    copy
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

/// Resolve a quality label for folder templates that reference
/// `{Quality}`, falling back to AAC when the song has no enhanced HLS.
pub async fn resolve_album_quality(
    ctx: &mut RunContext,
    storefront: &str,
    track_id: &str,
    audio_traits: &[String],
    codec: &str,
) -> (String, String) {
    let mut resolved_codec = codec.to_string();
    if !ctx.config.album_folder_format.contains("Quality") || track_id.is_empty() {
        return (String::new(), resolved_codec);
    }
    if ctx.flags.atmos {
        return (format!("{}Kbps", ctx.config.atmos_max - 2000), resolved_codec);
    }
    if ctx.is_aac_lc() {
        return ("256Kbps".to_string(), resolved_codec);
    }

    let manifest = match ctx.api.song(storefront, track_id).await {
        Ok(manifest) => manifest,
        Err(e) => {
            println!("Failed to get manifest: {e}");
            return (String::new(), resolved_codec);
        }
    };
    let Some(song) = manifest.data.first() else {
        return (String::new(), resolved_codec);
    };
    let mut m3u8_url = song.attributes.extended_asset_urls.enhanced_hls.clone();
    if m3u8_url.is_empty() {
        resolved_codec = "AAC".to_string();
        return ("256Kbps".to_string(), resolved_codec);
    }

    let need_check = match ctx.config.get_m3u8_mode.as_str() {
        "all" => true,
        "hires" => audio_traits.iter().any(|t| t == "hi-res-lossless"),
        _ => false,
    };
    if need_check
        && let Some(device) = device_m3u8(ctx, track_id).await
    {
        m3u8_url = device;
    }

    match hlspick::fetch_master(&ctx.http, &m3u8_url).await {
        Ok((master, base)) => {
            match hlspick::select_variant(&master, &base, ctx.selection_mode(), &ctx.selection_caps())
            {
                Ok(picked) => (picked.quality, resolved_codec),
                Err(e) => {
                    println!("Failed to extract quality from manifest: {e}");
                    (String::new(), resolved_codec)
                }
            }
        }
        Err(e) => {
            println!("Failed to extract quality from manifest: {e}");
            (String::new(), resolved_codec)
        }
    }
}

/// Interactive track picker. Returns 1-based selections.
pub fn show_select(tracks: &[Track]) -> Vec<usize> {
    let options: Vec<String> = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "{:02}. {} - {}",
                i + 1,
                track.resp.attributes.name,
                track.resp.attributes.artist_name
            )
        })
        .collect();
    match inquire::MultiSelect::new("Select tracks to download:", options).raw_prompt() {
        Ok(chosen) => chosen.into_iter().map(|option| option.index + 1).collect(),
        Err(_) => Vec::new(),
    }
}

/// Debug inspection: dump every variant and the per-family availability
/// summary for each track, downloading nothing.
pub(crate) async fn debug_album_tracks(
    ctx: &mut RunContext,
    storefront: &str,
    tracks: &[ampapi::TrackData],
) {
    for (num, track) in tracks.iter().enumerate() {
        let num = num + 1;
        println!("\nTrack {num} of {}:", tracks.len());
        println!("{num:02}. {}", track.attributes.name);

        let manifest = match ctx.api.song(storefront, &track.id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                println!("Failed to get manifest for track {num}: {e}");
                continue;
            }
        };
        let mut m3u8_url = manifest
            .data
            .first()
            .map(|d| d.attributes.extended_asset_urls.enhanced_hls.clone())
            .unwrap_or_default();
        let need_check = match ctx.config.get_m3u8_mode.as_str() {
            "all" => true,
            "hires" => track
                .attributes
                .audio_traits
                .iter()
                .any(|t| t == "hi-res-lossless"),
            _ => false,
        };
        if need_check {
            match device_m3u8(ctx, &track.id).await {
                Some(device) => m3u8_url = device,
                None => println!(
                    "Failed to get best quality m3u8 from device m3u8 port, will use m3u8 from Web API"
                ),
            }
        }
        if m3u8_url.is_empty() {
            println!("No manifest available for track {num}");
            continue;
        }
        match hlspick::fetch_master(&ctx.http, &m3u8_url).await {
            Ok((master, _)) => {
                println!("\nDebug: All Available Variants:");
                println!("{:<12} {:<36} {}", "Codec", "Audio", "Bandwidth");
                for row in hlspick::variant_rows(&master) {
                    println!("{:<12} {:<36} {}", row.codecs, row.audio, row.bandwidth);
                }
                let summary = hlspick::inspect_formats(&master);
                let line = |value: Option<String>| value.unwrap_or_else(|| "Not Available".to_string());
                println!("Available Audio Formats:");
                println!("------------------------");
                println!("AAC             : {}", line(summary.aac));
                println!("Lossless        : {}", line(summary.lossless));
                println!("Hi-Res Lossless : {}", line(summary.hires));
                println!("Dolby Atmos     : {}", line(summary.atmos));
                println!("Dolby Audio     : {}", line(summary.dolby_audio));
                println!("------------------------");
            }
            Err(e) => println!("Failed to extract quality info for track {num}: {e}"),
        }
    }
}

/// Download an album (or a single song of it, via the `?i=` hint).
pub async fn rip_album(
    ctx: &mut RunContext,
    storefront: &str,
    album_id: &str,
    url_track_hint: Option<String>,
) -> Result<(), Error> {
    if check_stop_and_warn() {
        return Ok(());
    }
    let resp = ctx.api.album(storefront, album_id).await.map_err(|e| {
        println!("Failed to get album response.");
        Error::from(e)
    })?;
    let Some(meta) = resp.data.into_iter().next() else {
        return Err(Error::RemoteFailure {
            source: ampapi::AmpError::empty("album", album_id),
        });
    };

    if ctx.flags.debug {
        println!("{}", meta.attributes.artist_name);
        println!("{}", meta.attributes.name);
        debug_album_tracks(ctx, storefront, &meta.relationships.tracks.data).await;
        return Ok(());
    }

    let mut codec = ctx.codec_label().to_string();
    let album_copy = album_value_copy(&meta);
    let disc_total = meta
        .relationships
        .tracks
        .data
        .last()
        .map(|t| t.attributes.disc_number)
        .unwrap_or(1);

    let track_total = meta.relationships.tracks.data.len();
    let mut tracks: Vec<Track> = meta
        .relationships
        .tracks
        .data
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let mut track = Track::from_catalog(
                storefront,
                "albums",
                album_id,
                i + 1,
                track_total,
                data.clone(),
            );
            track.album = Some(album_copy.clone());
            track.disc_total = disc_total;
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

    if (ctx.flags.covers_only || ctx.flags.lyrics_only)
        && !any_selected_track_supports_format(ctx, &tracks, &selected).await
    {
        println!("No selected tracks available for this format; skipping.");
        return Ok(());
    }

    let mut primary_album_artist = primary_artist(&album_artist_names(&meta));
    if primary_album_artist.is_empty() {
        primary_album_artist = meta.attributes.artist_name.clone();
    }
    let artist_id = meta
        .relationships
        .artists
        .data
        .first()
        .map(|a| a.id.clone())
        .unwrap_or_default();

    let artist_folder_part = artist_folder_name(&ctx.config, &primary_album_artist, &artist_id);
    let root = current_root_folder(&ctx.config, ctx.flags.atmos, ctx.flags.aac).to_string();
    let artist_folder = if artist_folder_part.is_empty() {
        std::path::PathBuf::from(&root)
    } else {
        std::path::Path::new(&root).join(sanitize_name(&artist_folder_part))
    };
    std::fs::create_dir_all(&artist_folder)?;

    let release_type = detect_release_type(
        &meta.attributes.name,
        meta.attributes.track_count,
        meta.attributes.is_single,
    );
    let release_folder = release_folder_label(release_type);

    let first_track = meta.relationships.tracks.data.first();
    let (quality, resolved_codec) = resolve_album_quality(
        ctx,
        storefront,
        first_track.map(|t| t.id.as_str()).unwrap_or(""),
        first_track
            .map(|t| t.attributes.audio_traits.as_slice())
            .unwrap_or(&[]),
        &codec,
    )
    .await;
    codec = resolved_codec;

    let badge = tag_badges(
        &ctx.config,
        meta.attributes.is_apple_digital_master || meta.attributes.is_mastered_for_itunes,
        &meta.attributes.content_rating,
    );
    let folder_name = album_folder_name(
        &ctx.config,
        &AlbumFolderParts {
            artist_name: &primary_album_artist,
            album_name: &meta.attributes.name,
            album_id,
            release_date: &meta.attributes.release_date,
            upc: &meta.attributes.upc,
            record_label: &meta.attributes.record_label,
            copyright: &meta.attributes.copyright,
            quality: &quality,
            codec: &codec,
            tag: &badge,
        },
        ctx.flags.atmos,
    );
    let album_folder = artist_folder.join(release_folder).join(sanitize_name(&folder_name));
    std::fs::create_dir_all(&album_folder)?;
    println!("{folder_name}");

    let artist_cover_url = meta
        .relationships
        .artists
        .data
        .first()
        .map(|a| a.attributes.artwork.url.clone())
        .unwrap_or_default();
    let mut square_video = meta.attributes.editorial_video.motion_detail_square.video.clone();
    if square_video.is_empty() {
        square_video = meta.attributes.editorial_video.motion_square.video.clone();
    }

    if ctx.flags.covers_only {
        handle_covers_only_album(
            ctx,
            &album_folder,
            &artist_folder,
            &meta.attributes.artwork.url,
            &artist_cover_url,
            &square_video,
        )
        .await;
        return Ok(());
    }

    for track in &mut tracks {
        track.save_dir = album_folder.clone();
        track.codec = codec.clone();
    }

    if ctx.flags.song {
        if let Some(hint) = url_track_hint {
            for i in 0..tracks.len() {
                if tracks[i].id == hint {
                    if ctx.flags.lyrics_only {
                        rip_lyrics_track(ctx, &mut tracks[i]).await;
                    } else {
                        rip_track(ctx, &mut tracks[i]).await;
                    }
                    return Ok(());
                }
            }
        }
        return Ok(());
    }

    let mut any_success = false;
    for i in 0..tracks.len() {
        if check_stop_and_warn() {
            return Ok(());
        }
        let index = i + 1;
        if ctx.already_ok(album_id, index) {
            ctx.counter.total += 1;
            ctx.counter.success += 1;
            continue;
        }
        if !selected.contains(&index) {
            continue;
        }
        let success = if ctx.flags.lyrics_only {
            rip_lyrics_track(ctx, &mut tracks[i]).await
        } else {
            rip_track(ctx, &mut tracks[i]).await
        };
        if success {
            any_success = true;
        }
    }

    if any_success && !ctx.flags.lyrics_only {
        if ctx.config.save_cover_file
            && let Err(e) = ensure_cover_file(ctx, &album_folder, "cover", &meta.attributes.artwork.url).await
        {
            warn!(error = %e, "failed to write cover");
        }
        if ctx.config.save_artist_cover
            && !artist_cover_url.is_empty()
            && let Err(e) = ensure_cover_file(ctx, &artist_folder, "folder", &artist_cover_url).await
        {
            warn!(error = %e, "failed to write artist cover");
        }
        if ctx.config.save_animated_artwork && ctx.flags.atmos {
            download_animated_artwork_square(ctx, &album_folder, &square_video).await;
        }
    }

    Ok(())
}

/// Song URLs resolve to their parent album and run in single-song mode.
pub async fn rip_song(ctx: &mut RunContext, storefront: &str, song_id: &str) -> Result<(), Error> {
    let manifest = match ctx.api.song(storefront, song_id).await {
        Ok(manifest) => manifest,
        Err(e) => {
            println!("⚠ Failed to get manifest: {e}");
            ctx.counter.not_song += 1;
            return Err(e.into());
        }
    };
    let album_id = manifest
        .data
        .first()
        .and_then(|song| song.relationships.albums.data.first())
        .map(|album| album.id.clone());
    let Some(album_id) = album_id else {
        ctx.counter.not_song += 1;
        return Err(Error::RemoteFailure {
            source: ampapi::AmpError::empty("song album", song_id),
        });
    };
    ctx.flags.song = true;
    rip_album(ctx, storefront, &album_id, Some(song_id.to_string())).await
}
