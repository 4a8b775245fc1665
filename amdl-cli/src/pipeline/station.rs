//! Station pipeline: live streams capture a single AAC radio file via the
//! webplayback path; episode stations enumerate tracks like a playlist.

use std::path::Path;

use tracing::warn;

use crate::context::RunContext;
use crate::covers::{download_animated_artwork_square, ensure_cover_file};
use crate::error::Error;
use crate::layout::{
    apply_template, current_root_folder, limit_string, sanitize_folder_name, sanitize_name,
};
use crate::model::Track;
use crate::pipeline::track::rip_track;
use crate::runner::check_stop_and_warn;
use crate::tools;

pub async fn rip_station(
    ctx: &mut RunContext,
    storefront: &str,
    station_id: &str,
) -> Result<(), Error> {
    if check_stop_and_warn() {
        return Ok(());
    }
    let resp = ctx.api.station(storefront, station_id).await?;
    let Some(meta) = resp.data.into_iter().next() else {
        return Err(Error::RemoteFailure {
            source: ampapi::AmpError::empty("station", station_id),
        });
    };
    let is_stream = meta.attributes.is_live || meta.relationships.tracks.data.is_empty();
    println!(" - {}", if is_stream { "stream" } else { "episode" });

    let codec = ctx.codec_label().to_string();

    let artist_folder_name = if ctx.config.artist_folder_format.is_empty() {
        String::new()
    } else {
        let folder = apply_template(
            &ctx.config.artist_folder_format,
            &[
                ("{ArtistName}", "Apple Music Station"),
                ("{ArtistId}", ""),
                ("{UrlArtistName}", "Apple Music Station"),
            ],
        );
        let folder = sanitize_folder_name(&folder);
        println!("{folder}");
        folder
    };
    let root = current_root_folder(&ctx.config, ctx.flags.atmos, ctx.flags.aac).to_string();
    let artist_folder = if artist_folder_name.is_empty() {
        std::path::PathBuf::from(&root)
    } else {
        Path::new(&root).join(sanitize_name(&artist_folder_name))
    };
    std::fs::create_dir_all(&artist_folder)?;

    let playlist_folder = sanitize_folder_name(&apply_template(
        &ctx.config.playlist_folder_format,
        &[
            ("{ArtistName}", "Apple Music Station"),
            (
                "{PlaylistName}",
                &limit_string(&meta.attributes.name, ctx.config.limit_max),
            ),
            ("{PlaylistId}", station_id),
            ("{Quality}", ""),
            ("{Codec}", &codec),
            ("{Tag}", ""),
        ],
    ));
    let playlist_folder_path = artist_folder.join(sanitize_name(&playlist_folder));
    std::fs::create_dir_all(&playlist_folder_path)?;
    println!("{playlist_folder}");

    let mut station_cover = None;
    if ctx.config.save_cover_file || ctx.config.embed_cover {
        match ensure_cover_file(
            ctx,
            &playlist_folder_path,
            "cover",
            &meta.attributes.artwork.url,
        )
        .await
        {
            Ok(path) => station_cover = Some(path),
            Err(e) => println!("Failed to write cover: {e}"),
        }
    }

    if ctx.config.save_animated_artwork
        && ctx.flags.atmos
        && !meta.attributes.editorial_video.motion_square.video.is_empty()
    {
        println!("Found Animation Artwork.");
        download_animated_artwork_square(
            ctx,
            &playlist_folder_path,
            &meta.attributes.editorial_video.motion_square.video,
        )
        .await;
    }

    if is_stream {
        ctx.counter.total += 1;
        if ctx.already_ok(station_id, 1) {
            ctx.counter.success += 1;
            return Ok(());
        }
        let stem = apply_template(
            &ctx.config.song_file_format,
            &[
                ("{SongId}", station_id),
                ("{SongNumer}", "01"),
                (
                    "{SongName}",
                    &limit_string(&meta.attributes.name, ctx.config.limit_max),
                ),
                ("{DiscNumber}", "1"),
                ("{TrackNumber}", "1"),
                ("{Quality}", "256Kbps"),
                ("{Tag}", ""),
                ("{Codec}", "AAC"),
            ],
        );
        println!("{stem}");
        let track_path = playlist_folder_path.join(format!("{}.m4a", sanitize_name(&stem)));
        if track_path.is_file() {
            ctx.counter.success += 1;
            ctx.record_ok(station_id, 1);
            println!("Radio already exists locally.");
            return Ok(());
        }

        let media_user_token = ctx.media_user_token().to_string();
        let playback = match ctx.api.webplayback(station_id, &media_user_token).await {
            Ok(playback) => playback,
            Err(e) => {
                println!("Failed to get station assets url: {e}");
                ctx.counter.error += 1;
                return Err(e.into());
            }
        };
        if playback.hls_playlist_url.is_empty() {
            println!("Failed to get station assets url.");
            ctx.counter.error += 1;
            return Err(Error::unavailable("station stream has no playlist"));
        }
        let stream_m3u8 = playback
            .hls_playlist_url
            .replace("index.m3u8", "256/prog_index.m3u8");
        let decrypt_port = ctx.config.decrypt_m3u8_port.clone();
        if let Err(e) =
            wrapper::decrypt_to_file(&decrypt_port, station_id, &stream_m3u8, &track_path).await
        {
            println!("Failed to download station stream: {e}");
            ctx.counter.error += 1;
            return Err(e.into());
        }

        let mut itags = vec![
            "tool=".to_string(),
            "disk=1/1".to_string(),
            "track=1".to_string(),
            "tracknum=1/1".to_string(),
            "artist=Apple Music Station".to_string(),
            "performer=Apple Music Station".to_string(),
            "album_artist=Apple Music Station".to_string(),
            format!("album={}", meta.attributes.name),
            format!("title={}", meta.attributes.name),
        ];
        if ctx.config.embed_cover
            && let Some(cover) = &station_cover
        {
            itags.push(format!("cover={}", cover.display()));
        }
        match tools::lookup("MP4Box") {
            Ok(mp4box) => {
                let status = tokio::process::Command::new(&mp4box)
                    .arg("-itags")
                    .arg(itags.join(":"))
                    .arg(&track_path)
                    .status()
                    .await;
                match status {
                    Ok(code) if code.success() => {}
                    Ok(code) => println!("Embed failed: MP4Box exited with {code}"),
                    Err(e) => println!("Embed failed: {e}"),
                }
            }
            Err(e) => println!("Embed failed: {e}"),
        }
        ctx.counter.success += 1;
        ctx.record_ok(station_id, 1);
        return Ok(());
    }

    // Episode stations: enumerate the derived track list.
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
                "stations",
                station_id,
                i + 1,
                track_total,
                data.clone(),
            );
            track.playlist_name = meta.attributes.name.clone();
            track.cover_path = station_cover.clone();
            track.save_dir = playlist_folder_path.clone();
            track.codec = codec.clone();
            track
        })
        .collect();

    for track in &mut tracks {
        if check_stop_and_warn() {
            return Ok(());
        }
        rip_track(ctx, track).await;
    }
    if tracks.is_empty() {
        warn!(station = station_id, "episode station carried no tracks");
    }
    Ok(())
}
