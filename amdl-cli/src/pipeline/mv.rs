//! Music-video pipeline: webplayback manifest, separate video/audio
//! variant decryption into temp files, then a tagged remux.

use std::path::Path;

use tracing::warn;

use crate::context::RunContext;
use crate::covers::write_cover;
use crate::error::Error;
use crate::layout::{sanitize_folder_name, sanitize_name};
use crate::metadata::names::{format_artist_list, normalized_names, primary_artist};
use crate::model::Track;
use crate::tools;

fn mv_artist_names(video: &ampapi::TrackData) -> Vec<String> {
    let names: Vec<String> = video
        .relationships
        .artists
        .data
        .iter()
        .map(|a| a.attributes.name.clone())
        .collect();
    let names = normalized_names(names);
    if !names.is_empty() {
        return names;
    }
    crate::metadata::names::artists_from_field(&video.attributes.artist_name)
}

/// Download one music video into `save_dir`. `track` carries queue
/// provenance for numbering and collection tags when the MV came from an
/// album, playlist, or station.
pub async fn download_music_video(
    ctx: &mut RunContext,
    adam_id: &str,
    save_dir: &Path,
    track: Option<&Track>,
) -> Result<(), Error> {
    let info = match ctx
        .api
        .music_video(
            track.map(|t| t.storefront.as_str()).unwrap_or(&ctx.config.storefront),
            adam_id,
        )
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            println!("⚠ Failed to get MV manifest: {e}");
            return Ok(());
        }
    };
    let Some(video) = info.data.first() else {
        println!("⚠ Failed to get MV manifest: empty response");
        return Ok(());
    };

    let save_dir = sanitize_folder_name(&save_dir.to_string_lossy());
    let save_dir = Path::new(&save_dir);

    let vid_path = save_dir.join(format!("{adam_id}_vid.mp4"));
    let aud_path = save_dir.join(format!("{adam_id}_aud.mp4"));
    let mv_save_name = match track {
        Some(track) => format!("{:02}. {}", track.task_num, video.attributes.name),
        None => format!("{} ({adam_id})", video.attributes.name),
    };
    let out_path = save_dir.join(format!("{}.mp4", sanitize_name(&mv_save_name)));

    println!("{}", video.attributes.name);
    if out_path.is_file() {
        println!("MV already exists locally.");
        return Ok(());
    }

    let media_user_token = ctx.media_user_token().to_string();
    let playback = ctx.api.webplayback(adam_id, &media_user_token).await?;
    if playback.hls_playlist_url.is_empty() {
        return Err(Error::unavailable("media-user-token may be wrong or expired"));
    }

    std::fs::create_dir_all(save_dir)?;
    let (master, base) = hlspick::fetch_master(&ctx.http, &playback.hls_playlist_url).await?;
    let (video_url, video_label) = hlspick::pick_mv_video(&master, &base, ctx.config.mv_max)?;
    println!("Video: {video_label}");
    let (audio_url, audio_group) =
        hlspick::pick_mv_audio(&master, &base, &ctx.config.mv_audio_type)?;
    println!("Audio: {audio_group}");

    let decrypt_port = ctx.config.decrypt_m3u8_port.clone();
    wrapper::decrypt_to_file(&decrypt_port, adam_id, &video_url, &vid_path).await?;
    wrapper::decrypt_to_file(&decrypt_port, adam_id, &audio_url, &aud_path).await?;

    let mut itags = vec![
        "tool=".to_string(),
        format!("artist={}", {
            let list = format_artist_list(&mv_artist_names(video));
            if list.is_empty() {
                video.attributes.artist_name.clone()
            } else {
                list
            }
        }),
        format!("title={}", video.attributes.name),
        format!("created={}", video.attributes.release_date),
        format!("ISRC={}", video.attributes.isrc),
    ];
    if let Some(genre) = video.attributes.genre_names.first() {
        itags.push(format!("genre={genre}"));
    }

    let mv_primary_artist = {
        let primary = primary_artist(&mv_artist_names(video));
        if primary.is_empty() {
            video.attributes.artist_name.clone()
        } else {
            primary
        }
    };

    itags.push(match video.attributes.content_rating.as_str() {
        "explicit" => "rating=1".to_string(),
        "clean" => "rating=2".to_string(),
        _ => "rating=0".to_string(),
    });

    match track {
        Some(track) if track.pre_type == "playlists" && !ctx.config.use_song_info_for_playlist => {
            itags.push("disk=1/1".to_string());
            itags.push(format!("album={}", track.playlist_name));
            itags.push(format!("track={}", track.task_num));
            itags.push(format!("tracknum={}/{}", track.task_num, track.task_total));
            itags.push(format!("album_artist={mv_primary_artist}"));
            itags.push(format!("performer={mv_primary_artist}"));
        }
        Some(track) => {
            if let Some(album) = &track.album {
                itags.push(format!("album={}", album.attributes.name));
                itags.push(format!(
                    "disk={}/{}",
                    track.resp.attributes.disc_number, track.disc_total
                ));
                itags.push(format!("track={}", track.resp.attributes.track_number));
                itags.push(format!(
                    "tracknum={}/{}",
                    track.resp.attributes.track_number, album.attributes.track_count
                ));
                itags.push(format!("copyright={}", album.attributes.copyright));
                itags.push(format!("UPC={}", album.attributes.upc));
            } else {
                itags.push(format!("album={}", track.resp.attributes.album_name));
            }
            itags.push(format!("album_artist={mv_primary_artist}"));
            itags.push(format!("performer={mv_primary_artist}"));
        }
        None => {
            itags.push(format!("album={}", video.attributes.album_name));
            itags.push(format!("disk={}", video.attributes.disc_number));
            itags.push(format!("track={}", video.attributes.track_number));
            itags.push(format!("tracknum={}", video.attributes.track_number));
            itags.push(format!("performer={mv_primary_artist}"));
        }
    }

    let thumb_name = format!("{}_thumbnail", sanitize_name(&mv_save_name));
    let cover_path = match write_cover(ctx, save_dir, &thumb_name, &video.attributes.artwork.url).await
    {
        Ok(path) => {
            itags.push(format!("cover={}", path.display()));
            Some(path)
        }
        Err(e) => {
            println!("Failed to save MV thumbnail: {e}");
            None
        }
    };

    let mp4box = tools::lookup("MP4Box")?;
    print!("MV Remuxing...");
    let status = tokio::process::Command::new(&mp4box)
        .arg("-itags")
        .arg(itags.join(":"))
        .arg("-quiet")
        .arg("-add")
        .arg(&vid_path)
        .arg("-add")
        .arg(&aud_path)
        .arg("-keep-utc")
        .arg("-new")
        .arg(&out_path)
        .status()
        .await;

    // Intermediates go regardless of the mux outcome.
    for temp in [&vid_path, &aud_path] {
        if let Err(e) = std::fs::remove_file(temp) {
            warn!(path = %temp.display(), error = %e, "failed to remove MV intermediate");
        }
    }
    if let Some(cover) = cover_path {
        let _ = std::fs::remove_file(cover);
    }

    match status {
        Ok(code) if code.success() => {
            println!("\rMV Remuxed.   ");
            Ok(())
        }
        Ok(code) => {
            println!("MV mux failed: exited with {code}");
            Err(Error::transcode(format!("MP4Box exited with {code}")))
        }
        Err(e) => {
            println!("MV mux failed: {e}");
            Err(Error::Io { source: e })
        }
    }
}
