//! Queue runner: URL dispatch, stop-signal polling, the end-of-queue
//! summary, and the interactive retry loop.

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;

use chrono::NaiveDate;
use colored::Colorize;

use crate::context::RunContext;
use crate::error::Error;
use crate::layout::{apply_template, limit_string, sanitize_name};
use crate::model::Counter;
use crate::pipeline::{album, mv, playlist, station};
use crate::selection::parse_track_selection;
use crate::tools;
use crate::urls::{classify, UrlKind};

const STOP_SIGNAL: &str = "stop.signal";

pub fn clear_stop_signal() {
    if Path::new(STOP_SIGNAL).exists() {
        let _ = std::fs::remove_file(STOP_SIGNAL);
    }
}

pub fn stop_requested() -> bool {
    Path::new(STOP_SIGNAL).exists()
}

/// Cooperative cancellation point: checked between queue items and before
/// each track, never mid-fragment.
pub fn check_stop_and_warn() -> bool {
    if stop_requested() {
        println!("🛑 Stop signal detected, exiting gracefully.");
        return true;
    }
    false
}

pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal()
}

/// Expand an artist URL into its album and music-video URLs, date-sorted,
/// honoring `--all-album` or an interactive selection.
pub async fn expand_artist(ctx: &mut RunContext, artist_url: &str) -> Result<Vec<String>, Error> {
    let classified = classify(artist_url)?;
    let artist = ctx
        .api
        .artist(&classified.storefront, &classified.id)
        .await?;
    let Some(artist) = artist.data.first() else {
        return Err(Error::RemoteFailure {
            source: ampapi::AmpError::empty("artist", &classified.id),
        });
    };

    // Later album/playlist folder building sees the concrete artist.
    ctx.config.artist_folder_format = apply_template(
        &ctx.config.artist_folder_format,
        &[
            (
                "{UrlArtistName}",
                limit_string(&artist.attributes.name, ctx.config.limit_max).as_str(),
            ),
            ("{ArtistId}", artist.id.as_str()),
        ],
    );

    let mut out = Vec::new();
    for relationship in ["albums", "music-videos"] {
        let items = match ctx
            .api
            .artist_all(&classified.storefront, &classified.id, relationship)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                println!("Failed to get artist {relationship}: {e}");
                if relationship == "albums" {
                    return Err(e.into());
                }
                continue;
            }
        };
        let mut options: Vec<(String, String, String, String)> = items
            .into_iter()
            .map(|item| {
                (
                    item.attributes.name,
                    item.attributes.release_date,
                    item.id,
                    item.attributes.url,
                )
            })
            .collect();
        options.sort_by_key(|(_, date, _, _)| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
        });

        if options.is_empty() {
            continue;
        }
        let header = if relationship == "albums" {
            "Album Name"
        } else {
            "MV Name"
        };
        println!(
            "{:>4}  {:<50} {:<12} {}",
            "",
            header.red().bold(),
            "Date".bold(),
            "ID".bold()
        );
        for (i, (name, date, id, _)) in options.iter().enumerate() {
            println!(
                "{:>4}  {:<50} {:<12} {}",
                (i + 1).to_string().cyan(),
                name.red().bold(),
                date,
                id
            );
        }

        if ctx.flags.all_album {
            println!("You have selected all options:");
            out.extend(options.into_iter().map(|(_, _, _, url)| url));
            continue;
        }

        println!(
            "Please select from the {relationship} options above (multiple options separated by commas, ranges supported, or type 'all' to select all)"
        );
        print!("{}", "Enter your choice: ".cyan());
        let _ = std::io::stdout().flush();
        let mut input = String::new();
        if std::io::stdin().lock().read_line(&mut input).is_err() {
            continue;
        }
        match parse_track_selection(input.trim(), options.len()) {
            Ok(Some(selection)) => {
                println!("You have selected the following options:");
                for num in selection {
                    let (name, date, id, url) = &options[num - 1];
                    println!("[{name} {date} {id}]");
                    out.push(url.clone());
                }
            }
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }
    Ok(out)
}

/// Dispatch one queue item to its pipeline.
async fn dispatch(ctx: &mut RunContext, url_raw: &str) {
    let classified = match classify(url_raw) {
        Ok(classified) => classified,
        Err(_) => {
            println!("Invalid type");
            return;
        }
    };

    match classified.kind {
        UrlKind::MusicVideo => {
            println!("Music Video");
            if ctx.flags.lyrics_only || ctx.flags.covers_only {
                println!("Skipping music videos in lyrics/covers-only mode.");
                return;
            }
            if ctx.flags.debug {
                return;
            }
            ctx.counter.total += 1;
            if !ctx.has_media_user_token() {
                println!(": media-user-token is not set, skip MV dl");
                ctx.counter.success += 1;
                return;
            }
            if !tools::is_on_path("mp4decrypt") {
                println!(": mp4decrypt is not found, skip MV dl");
                ctx.counter.success += 1;
                return;
            }
            let mv_dir_part = apply_template(
                &ctx.config.artist_folder_format,
                &[("{ArtistName}", ""), ("{UrlArtistName}", ""), ("{ArtistId}", "")],
            );
            let mv_dir = if mv_dir_part.is_empty() {
                std::path::PathBuf::from(&ctx.config.alac_save_folder)
            } else {
                Path::new(&ctx.config.alac_save_folder).join(sanitize_name(&mv_dir_part))
            };
            match mv::download_music_video(ctx, &classified.id, &mv_dir, None).await {
                Ok(()) => ctx.counter.success += 1,
                Err(e) => {
                    println!("⚠ Failed to dl MV: {e}");
                    ctx.counter.error += 1;
                }
            }
        }
        UrlKind::Song => {
            print!("Song->");
            if let Err(e) = album::rip_song(ctx, &classified.storefront, &classified.id).await {
                println!("Failed to rip song: {e}");
            }
        }
        UrlKind::Album => {
            println!("Album");
            if let Err(e) = album::rip_album(
                ctx,
                &classified.storefront,
                &classified.id,
                classified.track_hint.clone(),
            )
            .await
            {
                println!("Failed to rip album: {e}");
            }
        }
        UrlKind::Playlist => {
            println!("Playlist");
            if let Err(e) =
                playlist::rip_playlist(ctx, &classified.storefront, &classified.id).await
            {
                println!("Failed to rip playlist: {e}");
            }
        }
        UrlKind::Station => {
            print!("Station");
            if ctx.flags.lyrics_only || ctx.flags.covers_only {
                println!(": skipping stations in lyrics/covers-only mode");
                return;
            }
            if !ctx.has_media_user_token() {
                println!(": media-user-token is not set, skip station dl");
                return;
            }
            println!();
            if let Err(e) = station::rip_station(ctx, &classified.storefront, &classified.id).await
            {
                println!("Failed to rip station: {e}");
            }
        }
        UrlKind::Artist => {
            // Artist URLs are expanded before queueing; one landing here
            // is a mis-ordered queue entry.
            println!("Invalid type");
        }
    }
}

fn print_summary(counter: &Counter) {
    println!(
        "=======  [{}] Completed: {}/{}  |  [{}] Warnings: {}  |  [{}] Errors: {}  =======",
        "✔".green(),
        counter.success,
        counter.total,
        "⚠".yellow(),
        counter.unavailable + counter.not_song,
        "✖".red(),
        counter.error,
    );
}

/// Iterate the queue; on errors in an interactive session, offer a full
/// re-run with a zeroed counter (idempotence skips completed tracks).
pub async fn run_queue(ctx: &mut RunContext, queue: &[String]) {
    let total = queue.len();
    loop {
        for (num, url_raw) in queue.iter().enumerate() {
            if check_stop_and_warn() {
                return;
            }
            print!("Queue {} of {}: ", num + 1, total);
            dispatch(ctx, url_raw).await;
        }
        print_summary(&ctx.counter);
        if ctx.counter.error == 0 {
            break;
        }
        if !is_interactive() || ctx.abort_retries {
            println!("Error detected; aborting retries in non-interactive mode.");
            break;
        }
        println!("Error detected, press Enter to try again...");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        println!("Start trying again...");
        ctx.counter = Counter::default();
    }
}
