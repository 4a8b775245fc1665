//! The per-track pipeline: preflight → media choice → fetch (streamed
//! decrypt) → lyrics → cover → packager → tags → conversion → history.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::RunContext;
use crate::convert;
use crate::covers::{copy_file, ensure_cover_file};
use crate::error::Error;
use crate::history;
use crate::layout::{
    fallback_aac_save_dir, sanitize_name, song_file_stem, tag_badges, SongFileParts,
};
use crate::lyricsio::{get_lyrics_with_fallback, write_lyrics};
use crate::metadata::mp4::{title_and_artists, write_mp4_tags};
use crate::model::Track;
use crate::runner::check_stop_and_warn;
use crate::tools;

/// Ask the wrapper's query port for a device m3u8. Connection-refused
/// flips the process-wide abort flag; the web playlist remains the
/// fallback.
pub async fn device_m3u8(ctx: &mut RunContext, adam_id: &str) -> Option<String> {
    if !ctx.config.get_m3u8_from_device {
        return None;
    }
    match wrapper::query_device_m3u8(&ctx.config.get_m3u8_port, adam_id).await {
        Ok(url) => url.filter(|u| u.ends_with(".m3u8")),
        Err(e) => {
            warn!(error = %e, "device m3u8 query failed");
            let err: Error = e.into();
            ctx.mark_abort_retries(&err);
            None
        }
    }
}

/// Whether the device playlist should even be requested for this track.
fn should_check_device(ctx: &RunContext, track: &Track) -> bool {
    match ctx.config.get_m3u8_mode.as_str() {
        "all" => true,
        "hires" => track
            .resp
            .attributes
            .audio_traits
            .iter()
            .any(|t| t == "hi-res-lossless"),
        _ => false,
    }
}

/// Format-support gate used by lyrics-only/covers-only passes and
/// playlist group skipping.
pub async fn track_supports_current_format(ctx: &RunContext, track: &Track) -> bool {
    if ctx.flags.atmos {
        if track.web_m3u8.is_empty() {
            return false;
        }
        return match hlspick::has_atmos_variant(&ctx.http, &track.web_m3u8).await {
            Ok(available) => available,
            Err(e) => {
                println!("Atmos availability check failed: {e}");
                false
            }
        };
    }
    if ctx.flags.aac {
        return true;
    }
    let traits = &track.resp.attributes.audio_traits;
    if ctx.config.get_m3u8_mode == "hires" {
        return traits.iter().any(|t| t == "hi-res-lossless");
    }
    if traits.is_empty() {
        return true;
    }
    traits
        .iter()
        .any(|t| t == "lossless" || t == "hi-res-lossless")
}

pub async fn any_selected_track_supports_format(
    ctx: &RunContext,
    tracks: &[Track],
    selected: &[usize],
) -> bool {
    for &idx in selected {
        if idx == 0 || idx > tracks.len() {
            continue;
        }
        if track_supports_current_format(ctx, &tracks[idx - 1]).await {
            return true;
        }
    }
    false
}

/// Resolve the media playlist URL and quality label for the current mode.
async fn extract_media(ctx: &RunContext, master_url: &str) -> Result<(String, String), Error> {
    let (master, base) = hlspick::fetch_master(&ctx.http, master_url).await?;
    let picked = hlspick::select_variant(
        &master,
        &base,
        ctx.selection_mode(),
        &ctx.selection_caps(),
    )?;
    Ok((picked.url, picked.quality))
}

/// Stream-and-decrypt through the wrapper with the one-shot transient
/// retry: wait for the wrapper to come back (bounded ping), then try once
/// more.
async fn decrypt_with_retry(
    ctx: &mut RunContext,
    adam_id: &str,
    request_url: &str,
    out_path: &PathBuf,
) -> Result<(), Error> {
    let port = ctx.config.decrypt_m3u8_port.clone();
    match wrapper::decrypt_to_file(&port, adam_id, request_url, out_path).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_transient() => {
            println!("Decryptor connection dropped; waiting for wrapper to restart...");
            if wrapper::wait_ready(&port, 5, Duration::from_secs(1)).await {
                wrapper::decrypt_to_file(&port, adam_id, request_url, out_path)
                    .await
                    .map(|_| ())
                    .map_err(Error::from)
            } else {
                Err(e.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn record_success(ctx: &mut RunContext, track: &Track) {
    ctx.counter.success += 1;
    let pre_id = track.pre_id.clone();
    ctx.record_ok(&pre_id, track.task_num);
}

/// Run the full pipeline for one track. Returns true on success (counted
/// exactly once in one of success/unavailable/error).
pub async fn rip_track(ctx: &mut RunContext, track: &mut Track) -> bool {
    if check_stop_and_warn() {
        return false;
    }
    ctx.counter.total += 1;
    println!(
        "Track {} of {}: {}",
        track.task_num, track.task_total, track.kind
    );

    // Playlist items in song-info mode materialize their album lazily.
    if track.pre_type == "playlists"
        && ctx.config.use_song_info_for_playlist
        && track.album.is_none()
        && let Some(album_rel) = track.resp.relationships.albums.data.first()
    {
        let album_id = album_rel.id.clone();
        if !album_id.is_empty() {
            match ctx.api.album(&track.storefront, &album_id).await {
                Ok(resp) => track.album = resp.data.into_iter().next(),
                Err(e) => warn!(error = %e, "failed to fetch album data for playlist item"),
            }
        }
    }

    if track.is_music_video() {
        if !ctx.has_media_user_token() {
            println!("media-user-token is not set, skip MV dl");
            ctx.counter.success += 1;
            return true;
        }
        if !tools::is_on_path("mp4decrypt") {
            println!("mp4decrypt is not found, skip MV dl");
            ctx.counter.success += 1;
            return true;
        }
        let save_dir = track.save_dir.clone();
        match super::mv::download_music_video(ctx, &track.id, &save_dir, Some(track)).await {
            Ok(()) => {
                ctx.counter.success += 1;
                return true;
            }
            Err(e) => {
                println!("⚠ Failed to dl MV: {e}");
                ctx.counter.error += 1;
                return false;
            }
        }
    }

    if ctx.flags.atmos {
        if track.web_m3u8.is_empty() {
            println!("Atmos not available for this track.");
            history::emit_unavailable(ctx, track, "atmos_unavailable");
            ctx.counter.unavailable += 1;
            return false;
        }
        match hlspick::has_atmos_variant(&ctx.http, &track.web_m3u8).await {
            Ok(true) => {}
            Ok(false) => {
                println!("Atmos not available for this track.");
                history::emit_unavailable(ctx, track, "atmos_unavailable");
                ctx.counter.unavailable += 1;
                return false;
            }
            Err(e) => {
                println!("Atmos availability check failed: {e}");
                history::emit_unavailable(ctx, track, "atmos_availability_check_failed");
                ctx.counter.unavailable += 1;
                let err: Error = e.into();
                ctx.mark_abort_retries(&err);
                return false;
            }
        }
    }

    let mut need_aac_lc = ctx.is_aac_lc();
    let mut using_lossless_fallback = false;
    if track.web_m3u8.is_empty() && !need_aac_lc {
        println!("Lossless/Hi-Res not available for this track. Falling back to AAC.");
        history::emit_unavailable(ctx, track, "lossless_unavailable");
        using_lossless_fallback = true;
        need_aac_lc = true;
    }
    if need_aac_lc {
        track.codec = "AAC".to_string();
    }
    if using_lossless_fallback {
        track.save_dir = fallback_aac_save_dir(&ctx.config, &track.save_dir);
        track.cover_path = None;
        if let Err(e) = std::fs::create_dir_all(&track.save_dir) {
            println!("Failed to create AAC fallback folder: {e}");
            ctx.counter.error += 1;
            return false;
        }
    }

    // Media choice: possibly replace the web playlist with the device one.
    if should_check_device(ctx, track) && !need_aac_lc {
        let id = track.id.clone();
        if let Some(url) = device_m3u8(ctx, &id).await {
            track.device_m3u8 = url.clone();
            track.m3u8 = url;
            debug!(device_m3u8 = %track.device_m3u8, "using device playlist");
        }
    }

    let mut quality = String::new();
    if ctx.config.song_file_format.contains("Quality") {
        if ctx.flags.atmos {
            quality = format!("{}Kbps", ctx.config.atmos_max - 2000);
        } else if need_aac_lc {
            quality = "256Kbps".to_string();
        } else {
            match extract_media(ctx, &track.m3u8).await {
                Ok((_, q)) => quality = q,
                Err(e) => {
                    println!("Failed to extract quality from manifest: {e}");
                    ctx.counter.error += 1;
                    return false;
                }
            }
        }
    }
    track.quality = quality.clone();

    let (title, _) = title_and_artists(track);
    let stem = song_file_stem(
        &ctx.config,
        &SongFileParts {
            song_id: &track.id,
            song_name: if title.is_empty() {
                &track.resp.attributes.name
            } else {
                &title
            },
            track_number: track.effective_track_number(),
            disc_number: track.resp.attributes.disc_number,
            quality: &quality,
            codec: &track.codec,
            tag: &tag_badges(
                &ctx.config,
                track.resp.attributes.is_apple_digital_master,
                &track.resp.attributes.content_rating,
            ),
        },
    );
    println!("{stem}");
    let sanitized = sanitize_name(&stem);
    track.save_name = format!("{sanitized}.m4a");
    let track_path = track.save_dir.join(&track.save_name);
    let lrc_filename = format!("{sanitized}.{}", ctx.config.lrc_format);

    // When conversion deletes the original, the post-transcode file also
    // counts as "already downloaded".
    let converted_path = {
        let target = ctx.config.convert_format.to_lowercase();
        (ctx.config.convert_after_download
            && !target.is_empty()
            && target != "copy"
            && !ctx.config.convert_keep_original)
            .then(|| track_path.with_extension(target))
    };

    if track_path.is_file() {
        println!("Track already exists locally.");
        track.save_path = track_path;
        record_success(ctx, track);
        history::emit_download(ctx, track);
        return true;
    }
    if let Some(converted) = &converted_path
        && converted.is_file()
    {
        println!("Converted track already exists locally.");
        track.save_path = converted.clone();
        record_success(ctx, track);
        history::emit_download(ctx, track);
        return true;
    }

    if need_aac_lc {
        if !ctx.has_media_user_token() {
            if using_lossless_fallback {
                println!("Lossless fallback to AAC requires a valid media-user-token. Skipping this track.");
                ctx.counter.unavailable += 1;
            } else {
                println!("Invalid media-user-token");
                ctx.counter.error += 1;
            }
            return false;
        }
        let media_user_token = ctx.media_user_token().to_string();
        let playback = match ctx.api.webplayback(&track.id, &media_user_token).await {
            Ok(playback) => playback,
            Err(e) => {
                println!("Failed to dl aac-lc: {e}");
                if using_lossless_fallback {
                    ctx.counter.unavailable += 1;
                } else {
                    ctx.counter.error += 1;
                }
                return false;
            }
        };
        let asset_url = playback
            .assets
            .iter()
            .find(|a| a.flavor == "28:ctrp256")
            .or_else(|| playback.assets.first())
            .map(|a| a.url.clone())
            .unwrap_or_default();
        if asset_url.is_empty() {
            println!("Failed to dl aac-lc: no asset");
            ctx.counter.unavailable += 1;
            return false;
        }
        let id = track.id.clone();
        match decrypt_with_retry(ctx, &id, &asset_url, &track_path).await {
            Ok(()) => {}
            Err(Error::WrapperFatal {
                source: wrapper::WrapperError::Unavailable,
            }) => {
                println!("Failed to dl aac-lc: Unavailable");
                ctx.counter.unavailable += 1;
                return false;
            }
            Err(e) => {
                println!("Failed to dl aac-lc: {e}");
                if using_lossless_fallback {
                    ctx.counter.unavailable += 1;
                } else {
                    ctx.counter.error += 1;
                }
                return false;
            }
        }
    } else {
        let (mut media_url, _) = match extract_media(ctx, &track.m3u8).await {
            Ok(picked) => picked,
            Err(e) => {
                println!("⚠ Failed to extract info from manifest: {e}");
                ctx.counter.unavailable += 1;
                return false;
            }
        };
        if ctx.config.get_m3u8_from_device {
            match hlspick::media_playlist_has_prefetch_key(&ctx.http, &media_url).await {
                Ok(true) => {
                    println!("⚠ Prefetch-only key detected; requesting device m3u8...");
                    let id = track.id.clone();
                    if let Some(url) = device_m3u8(ctx, &id).await {
                        track.device_m3u8 = url.clone();
                        track.m3u8 = url;
                        match extract_media(ctx, &track.m3u8).await {
                            Ok((url, _)) => media_url = url,
                            Err(e) => {
                                println!("⚠ Failed to extract info from device manifest: {e}");
                                ctx.counter.unavailable += 1;
                                return false;
                            }
                        }
                    } else {
                        println!("⚠ Device m3u8 unavailable; continuing with web playlist.");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    println!("⚠ Failed to inspect media playlist for prefetch key: {e}");
                }
            }
        }
        let id = track.id.clone();
        if let Err(e) = decrypt_with_retry(ctx, &id, &media_url, &track_path).await {
            println!("Failed to decrypt track: {e}");
            ctx.mark_abort_retries(&e);
            ctx.counter.error += 1;
            return false;
        }
    }
    debug!(path = %track_path.display(), "audio fetched");

    // Lyrics after audio, reusing siblings when possible.
    let mut lrc = String::new();
    let embed_lyrics = ctx.config.embed_lrc && ctx.metadata.m4a("lyrics");
    if embed_lyrics || ctx.config.save_lrc_file {
        if let Some(existing) =
            crate::layout::find_existing_sibling_file(&ctx.config, &track.save_dir, &lrc_filename)
        {
            if let Ok(content) = std::fs::read_to_string(&existing) {
                let target = track.save_dir.join(&lrc_filename);
                if ctx.config.save_lrc_file
                    && existing != target
                    && let Err(e) = copy_file(&existing, &target)
                {
                    println!("Failed to copy lyrics: {e}");
                }
                if embed_lyrics {
                    lrc = content;
                }
            }
        } else {
            match get_lyrics_with_fallback(ctx, track).await {
                Ok(lrc_str) => {
                    if ctx.config.save_lrc_file
                        && let Err(e) = write_lyrics(&track.save_dir, &lrc_filename, &lrc_str)
                    {
                        println!("Failed to write lyrics: {e}");
                    }
                    if embed_lyrics {
                        lrc = lrc_str;
                    }
                }
                Err(e) => println!("{e}"),
            }
        }
    }

    // Covers after lyrics, then the packager stamp.
    let mut itags = vec!["tool=".to_string(), "artist=AppleMusic".to_string()];
    let embed_cover = ctx.config.embed_cover && ctx.metadata.m4a("cover");
    if embed_cover {
        if track.cover_path.is_none() {
            let artwork_url = track.resp.attributes.artwork.url.clone();
            let save_dir = track.save_dir.clone();
            match ensure_cover_file(ctx, &save_dir, "cover", &artwork_url).await {
                Ok(path) => track.cover_path = Some(path),
                Err(e) => println!("Failed to write cover: {e}"),
            }
        }
        if let Some(cover) = &track.cover_path {
            itags.push(format!("cover={}", cover.display()));
        }
    }
    let mp4box = match tools::lookup("MP4Box") {
        Ok(path) => path,
        Err(e) => {
            println!("Embed failed: {e}");
            ctx.counter.error += 1;
            return false;
        }
    };
    let embed_status = tokio::process::Command::new(&mp4box)
        .arg("-itags")
        .arg(itags.join(":"))
        .arg(&track_path)
        .status()
        .await;
    match embed_status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!("Embed failed: MP4Box exited with {status}");
            ctx.counter.error += 1;
            return false;
        }
        Err(e) => {
            println!("Embed failed: {e}");
            ctx.counter.error += 1;
            return false;
        }
    }

    track.save_path = track_path;
    if let Err(e) = write_mp4_tags(ctx, track, &lrc) {
        println!("⚠ Failed to write tags in media: {e}");
        ctx.counter.unavailable += 1;
        return false;
    }

    convert::convert_if_needed(ctx, track, &lrc).await;

    record_success(ctx, track);
    history::emit_download(ctx, track);
    true
}

/// Lyrics-only variant of the pipeline: no audio, no history.
pub async fn rip_lyrics_track(ctx: &mut RunContext, track: &mut Track) -> bool {
    if check_stop_and_warn() {
        return false;
    }
    ctx.counter.total += 1;
    println!(
        "Track {} of {}: {}",
        track.task_num, track.task_total, track.kind
    );

    if !track_supports_current_format(ctx, track).await {
        println!("Format not available for this track; skipping lyrics.");
        ctx.counter.unavailable += 1;
        return false;
    }
    if track.is_music_video() {
        println!("Skipping music video for lyrics-only.");
        ctx.counter.success += 1;
        return true;
    }
    if !ctx.config.save_lrc_file {
        println!("save-lrc-file is disabled; nothing to write in lyrics-only mode.");
        ctx.counter.success += 1;
        return true;
    }

    let (title, _) = title_and_artists(track);
    let stem = song_file_stem(
        &ctx.config,
        &SongFileParts {
            song_id: &track.id,
            song_name: if title.is_empty() {
                &track.resp.attributes.name
            } else {
                &title
            },
            track_number: track.effective_track_number(),
            disc_number: track.resp.attributes.disc_number,
            quality: "",
            codec: &track.codec,
            tag: &tag_badges(
                &ctx.config,
                track.resp.attributes.is_apple_digital_master,
                &track.resp.attributes.content_rating,
            ),
        },
    );
    println!("{stem}");
    let lrc_filename = format!("{}.{}", sanitize_name(&stem), ctx.config.lrc_format);
    let target = track.save_dir.join(&lrc_filename);
    if target.is_file() {
        println!("Lyrics already exist locally.");
        ctx.counter.success += 1;
        return true;
    }

    if let Some(existing) =
        crate::layout::find_existing_sibling_file(&ctx.config, &track.save_dir, &lrc_filename)
    {
        match copy_file(&existing, &target) {
            Ok(()) => {
                println!("Lyrics copied from sibling format.");
                ctx.counter.success += 1;
                return true;
            }
            Err(e) => {
                println!("Failed to copy lyrics: {e}");
                ctx.counter.error += 1;
                return false;
            }
        }
    }

    match get_lyrics_with_fallback(ctx, track).await {
        Ok(lrc) => {
            if let Err(e) = write_lyrics(&track.save_dir, &lrc_filename, &lrc) {
                println!("Failed to write lyrics: {e}");
                ctx.counter.error += 1;
                return false;
            }
            ctx.counter.success += 1;
            true
        }
        Err(e) => {
            println!("{e}");
            ctx.counter.unavailable += 1;
            false
        }
    }
}
