//! Cover art: URL shaping per the configured format and size, sibling
//! reuse, artist covers, and animated artwork.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::RunContext;
use crate::error::Error;
use crate::layout::{cover_file_path, sibling_dirs_for_path};
use crate::tools;

/// Download a cover into `folder/name.<ext>`, shaping the artwork URL per
/// the configured format:
/// - `{w}x{h}` is replaced with the configured size;
/// - `png` rewrites the thumb filename to `.png` first;
/// - `original` switches to the raw asset host and drops the thumb
///   segment, falling back to the sized thumb on a non-200.
pub async fn write_cover(
    ctx: &RunContext,
    folder: &Path,
    name: &str,
    artwork_url: &str,
) -> Result<PathBuf, Error> {
    let config = &ctx.config;
    let original_url = artwork_url.to_string();
    let cover_path = cover_file_path(config, folder, name, artwork_url);
    if cover_path.is_file() {
        std::fs::remove_file(&cover_path)?;
    }

    let mut url = artwork_url.to_string();
    if config.cover_format == "png"
        && let Some(pos) = url.find("{w}x{h}")
    {
        let (head, tail) = url.split_at(pos + "{w}x{h}".len());
        url = format!("{head}{}", tail.replacen(".jpg", ".png", 1));
    }
    url = url.replacen("{w}x{h}", &config.cover_size, 1);
    if config.cover_format == "original" {
        url = url.replacen(
            "is1-ssl.mzstatic.com/image/thumb",
            "a5.mzstatic.com/us/r1000/0",
            1,
        );
        if let Some(pos) = url.rfind('/') {
            url.truncate(pos);
        }
    }

    let mut response = ctx
        .http
        .get(&url)
        .header(reqwest::header::USER_AGENT, ampapi::USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::RemoteFailure { source: e.into() })?;
    if !response.status().is_success() {
        if config.cover_format != "original" {
            return Err(Error::RemoteFailure {
                source: ampapi::AmpError::status(response.status(), "cover fetch"),
            });
        }
        // Raw asset host misses sometimes; retry the sized thumb with the
        // sniffed extension.
        let ext = cover_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let fallback = match original_url.rfind('.') {
            Some(pos) => format!("{}{ext}", &original_url[..pos + 1]),
            None => original_url.clone(),
        };
        let fallback = fallback.replacen("{w}x{h}", &config.cover_size, 1);
        warn!(url = %fallback, "original cover unavailable, using thumb fallback");
        response = ctx
            .http
            .get(&fallback)
            .header(reqwest::header::USER_AGENT, ampapi::USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::RemoteFailure { source: e.into() })?;
        if !response.status().is_success() {
            return Err(Error::RemoteFailure {
                source: ampapi::AmpError::status(response.status(), "cover fetch"),
            });
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::RemoteFailure { source: e.into() })?;
    if let Some(parent) = cover_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&cover_path, &bytes)?;
    debug!(path = %cover_path.display(), bytes = bytes.len(), "cover written");
    Ok(cover_path)
}

/// Ensure a cover exists in `dir`, copying from a sibling-format folder
/// before downloading fresh.
pub async fn ensure_cover_file(
    ctx: &RunContext,
    dir: &Path,
    name: &str,
    artwork_url: &str,
) -> Result<PathBuf, Error> {
    let target = cover_file_path(&ctx.config, dir, name, artwork_url);
    if target.is_file() {
        return Ok(target);
    }
    for sibling in sibling_dirs_for_path(&ctx.config, dir) {
        let candidate = cover_file_path(&ctx.config, &sibling, name, artwork_url);
        if candidate.is_file() {
            match copy_file(&candidate, &target) {
                Ok(()) => return Ok(target),
                Err(e) => warn!(from = %candidate.display(), error = %e, "sibling cover copy failed"),
            }
        }
    }
    write_cover(ctx, dir, name, artwork_url).await
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<(), Error> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

/// Download the square animated artwork for an album folder, converting
/// to an Emby-compatible GIF when configured.
pub async fn download_animated_artwork_square(ctx: &RunContext, folder: &Path, video_url: &str) {
    if video_url.is_empty() {
        return;
    }
    let stream_url = match hlspick::fetch_master(&ctx.http, video_url).await {
        Ok((master, base)) => match hlspick::pick_mv_video(&master, &base, ctx.config.mv_max) {
            Ok((url, _)) => url,
            Err(e) => {
                warn!(error = %e, "no motion video square");
                return;
            }
        },
        Err(e) => {
            warn!(error = %e, "no motion video square");
            return;
        }
    };

    let out = folder.join("square_animated_artwork.mp4");
    if out.is_file() {
        println!("Animated artwork square already exists locally.");
        return;
    }
    let Ok(ffmpeg) = tools::resolve_ffmpeg(&ctx.config) else {
        warn!("ffmpeg unavailable; skipping animated artwork");
        return;
    };
    println!("Animation Artwork Square Downloading...");
    let status = tokio::process::Command::new(&ffmpeg)
        .args(["-loglevel", "quiet", "-y", "-i", &stream_url, "-c", "copy"])
        .arg(&out)
        .status()
        .await;
    match status {
        Ok(code) if code.success() => println!("Animation Artwork Square Downloaded"),
        Ok(code) => {
            warn!(%code, "animated artwork download failed");
            return;
        }
        Err(e) => {
            warn!(error = %e, "animated artwork download failed");
            return;
        }
    }

    if ctx.config.emby_animated_artwork {
        let gif = folder.join("folder.jpg");
        let status = tokio::process::Command::new(&ffmpeg)
            .arg("-i")
            .arg(&out)
            .args(["-vf", "scale=440:-1", "-r", "24", "-f", "gif"])
            .arg(&gif)
            .status()
            .await;
        if let Err(e) = status {
            warn!(error = %e, "animated artwork gif conversion failed");
        }
    }
}

/// Covers-only handling for one album folder: artist cover, album cover,
/// and (Atmos runs) animated artwork.
pub async fn handle_covers_only_album(
    ctx: &RunContext,
    album_folder: &Path,
    artist_folder: &Path,
    cover_url: &str,
    artist_cover_url: &str,
    animated_square_url: &str,
) {
    if ctx.config.save_artist_cover && !artist_cover_url.is_empty() {
        if let Err(e) = ensure_cover_file(ctx, artist_folder, "folder", artist_cover_url).await {
            warn!(error = %e, "failed to write artist cover");
        }
    }
    if let Err(e) = ensure_cover_file(ctx, album_folder, "cover", cover_url).await {
        warn!(error = %e, "failed to write cover");
    }
    if ctx.config.save_animated_artwork && ctx.flags.atmos {
        download_animated_artwork_square(ctx, album_folder, animated_square_url).await;
    }
}
