mod cli;
mod config;
mod context;
mod convert;
mod covers;
mod error;
mod history;
mod layout;
mod lyricsio;
mod metadata;
mod model;
mod pipeline;
mod preview;
mod runner;
mod search;
mod selection;
mod tools;
mod urls;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;
use crate::config::Config;
use crate::context::{ModeFlags, RunContext};
use crate::error::{Error, Result};

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(debug))
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load("config.yaml")?;

    // CLI overrides over the config values.
    if let Some(alac_max) = args.alac_max {
        config.alac_max = alac_max;
    }
    if let Some(atmos_max) = args.atmos_max {
        config.atmos_max = atmos_max;
    }
    if let Some(aac_type) = &args.aac_type {
        config.aac_type = aac_type.clone();
    }
    if let Some(mv_audio_type) = &args.mv_audio_type {
        config.mv_audio_type = mv_audio_type.clone();
    }
    if let Some(mv_max) = args.mv_max {
        config.mv_max = mv_max;
    }

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| Error::config(format!("http client: {e}")))?;

    let token = match ampapi::fetch_web_token(&http).await {
        Ok(token) => token,
        Err(_) => {
            let configured = config.authorization_token.trim();
            if configured.is_empty() || configured == "your-authorization-token" {
                return Err(Error::config("failed to get token"));
            }
            configured.replace("Bearer ", "")
        }
    };
    let api = ampapi::AmpClient::new(http.clone(), token, config.language.clone());

    runner::clear_stop_signal();

    let flags = ModeFlags {
        atmos: args.atmos,
        aac: args.aac,
        select: args.select || args.select_tracks.is_some(),
        song: args.song,
        debug: args.debug,
        lyrics_only: args.lyrics_only,
        covers_only: args.covers_only,
        no_playlist_dedupe: args.no_playlist_dedupe,
        all_album: args.all_album,
        select_tracks: args.select_tracks.clone(),
    };
    if !runner::is_interactive() && flags.select && flags.select_tracks.is_none() {
        return Err(Error::config(
            "selective downloads require --select-tracks when running non-interactively",
        ));
    }

    let mut ctx = RunContext::new(config, flags, api, http);

    let mut queue: Vec<String>;
    if let Some(search_type) = &args.search {
        if args.urls.is_empty() {
            return Err(Error::config("--search flag requires a query"));
        }
        let Some(url) = search::handle_search(&mut ctx, search_type, &args.urls).await? else {
            println!("\nExiting.");
            return Ok(());
        };
        queue = vec![url];
    } else {
        if args.urls.is_empty() {
            return Err(Error::config(
                "no URLs provided; please provide at least one URL",
            ));
        }
        queue = args.urls.clone();
    }

    if args.preview {
        let payload = preview::build_preview_payload(&ctx, &queue[0]).await?;
        let rendered = serde_json::to_string_pretty(&payload)
            .map_err(|e| Error::config(format!("preview output failed: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    // Artist URLs expand into their albums and music videos up front.
    if queue[0].contains("/artist/") {
        queue = runner::expand_artist(&mut ctx, &queue[0]).await?;
    }

    runner::run_queue(&mut ctx, &queue).await;
    Ok(())
}
