//! Interactive search browser: paged catalog search, one selection, and
//! a quality prompt that flips the download mode.

use inquire::Select;

use crate::context::RunContext;
use crate::error::Error;

const PAGE_LIMIT: u32 = 15;
const PREV_PAGE: &str = "⬅️  Previous Page";
const NEXT_PAGE: &str = "➡️  Next Page";

#[derive(Debug, Clone)]
struct SearchHit {
    kind: &'static str,
    url: String,
}

/// Apply a quality choice to the run flags.
fn set_dl_flags(ctx: &mut RunContext, quality: &str) {
    ctx.flags.atmos = false;
    ctx.flags.aac = false;
    match quality {
        "atmos" => {
            ctx.flags.atmos = true;
            println!("Quality set to: Dolby Atmos");
        }
        "aac" => {
            ctx.flags.aac = true;
            ctx.config.aac_type = "aac".to_string();
            println!("Quality set to: High-Quality (AAC)");
        }
        "alac" => println!("Quality set to: Lossless (ALAC)"),
        _ => {}
    }
}

fn prompt_for_quality(item_kind: &str, item_name: &str) -> Option<&'static str> {
    if item_kind == "Artist" {
        println!("Artist selected. Proceeding to list all albums/videos.");
        return Some("default");
    }
    println!("\nFetching available qualities for: {item_name}");
    let options = vec![
        "Lossless (ALAC)",
        "High-Quality (AAC)",
        "Dolby Atmos",
    ];
    match Select::new("Select a quality to download:", options).prompt() {
        Ok("High-Quality (AAC)") => Some("aac"),
        Ok("Dolby Atmos") => Some("atmos"),
        Ok(_) => Some("alac"),
        Err(_) => None,
    }
}

/// Run the interactive search flow. Returns the chosen catalog URL, or
/// `None` when the user cancels.
pub async fn handle_search(
    ctx: &mut RunContext,
    search_type: &str,
    query_parts: &[String],
) -> Result<Option<String>, Error> {
    if !matches!(search_type, "album" | "song" | "artist") {
        return Err(Error::config(format!(
            "invalid search type: {search_type}. Use 'album', 'song', or 'artist'"
        )));
    }
    let query = query_parts.join(" ");
    println!(
        "Searching for {search_type}s: \"{query}\" in storefront \"{}\"",
        ctx.config.storefront
    );

    let api_type = format!("{search_type}s");
    let mut offset = 0u32;

    loop {
        let storefront = ctx.config.storefront.clone();
        let resp = ctx
            .api
            .search(&storefront, &query, &api_type, PAGE_LIMIT, offset)
            .await?;

        let mut hits: Vec<SearchHit> = Vec::new();
        let mut display: Vec<String> = Vec::new();
        let mut has_next = false;

        if offset > 0 {
            display.push(PREV_PAGE.to_string());
        }

        match search_type {
            "album" => {
                if let Some(albums) = &resp.results.albums {
                    for item in &albums.data {
                        let year = item.attributes.release_date.get(..4).unwrap_or("");
                        display.push(format!(
                            "{} - {} ({}, {} tracks)",
                            item.attributes.name,
                            item.attributes.artist_name,
                            year,
                            item.attributes.track_count
                        ));
                        hits.push(SearchHit {
                            kind: "Album",
                            url: item.attributes.url.clone(),
                        });
                    }
                    has_next = albums.next.is_some();
                }
            }
            "song" => {
                if let Some(songs) = &resp.results.songs {
                    for item in &songs.data {
                        display.push(format!(
                            "{} - {} ({})",
                            item.attributes.name,
                            item.attributes.artist_name,
                            item.attributes.album_name
                        ));
                        hits.push(SearchHit {
                            kind: "Song",
                            url: item.attributes.url.clone(),
                        });
                    }
                    has_next = songs.next.is_some();
                }
            }
            _ => {
                if let Some(artists) = &resp.results.artists {
                    for item in &artists.data {
                        display.push(format!(
                            "{} ({})",
                            item.attributes.name,
                            item.attributes.genre_names.join(", ")
                        ));
                        hits.push(SearchHit {
                            kind: "Artist",
                            url: item.attributes.url.clone(),
                        });
                    }
                    has_next = artists.next.is_some();
                }
            }
        }

        if hits.is_empty() && offset == 0 {
            println!("No results found.");
            return Ok(None);
        }
        if has_next {
            display.push(NEXT_PAGE.to_string());
        }

        let chosen = match Select::new("Use arrow keys to navigate, Enter to select:", display)
            .with_page_size(PAGE_LIMIT as usize)
            .raw_prompt()
        {
            Ok(option) => option,
            Err(_) => return Ok(None),
        };

        if chosen.value == NEXT_PAGE {
            offset += PAGE_LIMIT;
            continue;
        }
        if chosen.value == PREV_PAGE {
            offset -= PAGE_LIMIT;
            continue;
        }

        let mut index = chosen.index;
        if offset > 0 {
            index -= 1;
        }
        let hit = hits[index].clone();

        if hit.kind == "Song" {
            ctx.flags.song = true;
        }
        let Some(quality) = prompt_for_quality(hit.kind, &chosen.value) else {
            println!("Selection cancelled.");
            return Ok(None);
        };
        if quality != "default" {
            set_dl_flags(ctx, quality);
        }
        return Ok(Some(hit.url));
    }
}
