//! Lyrics acquisition with language fallback, plus the on-disk `.lrc`
//! handling shared by the track pipeline and lyrics-only mode.

use std::path::Path;

use ampapi::LyricsRequest;
use tracing::debug;

use crate::context::RunContext;
use crate::error::Error;
use crate::model::Track;

/// Fetch lyrics for a track, retrying once with an empty language when
/// the configured language yields an error or an empty document.
pub async fn get_lyrics_with_fallback(ctx: &RunContext, track: &Track) -> Result<String, Error> {
    let request = LyricsRequest {
        storefront: &track.storefront,
        track_id: &track.id,
        lrc_type: &ctx.config.lrc_type,
        language: &ctx.config.language,
        format: &ctx.config.lrc_format,
        media_user_token: ctx.media_user_token(),
    };
    let primary = ctx.api.lyrics(&request).await;
    if let Ok(lrc) = &primary
        && !lrc.is_empty()
    {
        return Ok(lrc.clone());
    }

    if !ctx.config.language.is_empty() {
        debug!(track = track.id, "retrying lyrics with default language");
        let fallback = ctx
            .api
            .lyrics(&LyricsRequest {
                language: "",
                ..request
            })
            .await;
        if let Ok(lrc) = fallback
            && !lrc.is_empty()
        {
            return Ok(lrc);
        }
    }

    match primary {
        Ok(_) => Err(Error::unavailable("no lyrics found")),
        Err(e) => Err(e.into()),
    }
}

pub fn write_lyrics(dir: &Path, filename: &str, lrc: &str) -> Result<(), Error> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(filename), lrc)?;
    Ok(())
}
