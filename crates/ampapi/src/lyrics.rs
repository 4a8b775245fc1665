use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::client::AmpClient;
use crate::error::AmpError;
use crate::{AMP_API_BASE, ORIGIN, USER_AGENT};

#[derive(Debug, Clone, Default, Deserialize)]
struct LyricsAttributes {
    #[serde(default)]
    ttml: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LyricsData {
    #[serde(default)]
    attributes: LyricsAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LyricsResp {
    #[serde(default)]
    data: Vec<LyricsData>,
}

/// Parameters for a lyrics fetch. `lrc_type` selects the catalog endpoint
/// (`lyrics` or `syllable-lyrics`); `format` selects the returned text
/// (`ttml` raw, `lrc` converted).
#[derive(Debug, Clone)]
pub struct LyricsRequest<'a> {
    pub storefront: &'a str,
    pub track_id: &'a str,
    pub lrc_type: &'a str,
    pub language: &'a str,
    pub format: &'a str,
    pub media_user_token: &'a str,
}

impl AmpClient {
    /// Fetch lyrics for a track. Requires a valid media-user-token cookie;
    /// an empty result is reported as [`AmpError::Empty`].
    pub async fn lyrics(&self, req: &LyricsRequest<'_>) -> Result<String, AmpError> {
        let endpoint = if req.lrc_type == "syllable-lyrics" {
            "syllable-lyrics"
        } else {
            "lyrics"
        };
        let url = format!(
            "{AMP_API_BASE}/{}/songs/{}/{endpoint}",
            req.storefront, req.track_id
        );
        let response = self
            .http()
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.token()),
            )
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ORIGIN, ORIGIN)
            .header(
                reqwest::header::COOKIE,
                format!("media-user-token={}", req.media_user_token),
            )
            .query(&[("l", req.language)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AmpError::status(response.status(), "lyrics fetch"));
        }
        let parsed = response.json::<LyricsResp>().await?;
        let ttml = parsed
            .data
            .first()
            .map(|d| d.attributes.ttml.clone())
            .unwrap_or_default();
        if ttml.is_empty() {
            return Err(AmpError::empty("lyrics", req.track_id));
        }
        debug!(track = req.track_id, bytes = ttml.len(), "lyrics fetched");
        if req.format.eq_ignore_ascii_case("ttml") {
            Ok(ttml)
        } else {
            Ok(ttml_to_lrc(&ttml))
        }
    }
}

/// Convert a TTML lyrics document into LRC lines.
///
/// Each `<p begin="...">text</p>` becomes `[mm:ss.cc]text`. Lines without
/// a parsable timestamp are emitted bare, which also covers unsynced
/// lyrics documents.
pub fn ttml_to_lrc(ttml: &str) -> String {
    let p_re = Regex::new(r#"<p[^>]*?begin="([^"]*)"[^>]*>(.*?)</p>"#).expect("static regex");
    let unsynced_re = Regex::new(r"<p[^>]*>(.*?)</p>").expect("static regex");
    let tag_re = Regex::new(r"<[^>]+>").expect("static regex");

    let mut out = String::new();
    let mut matched = false;
    for cap in p_re.captures_iter(ttml) {
        matched = true;
        let text = decode_entities(&tag_re.replace_all(&cap[2], ""));
        match parse_ttml_time(&cap[1]) {
            Some(ms) => {
                let minutes = ms / 60_000;
                let seconds = (ms % 60_000) / 1000;
                let centis = (ms % 1000) / 10;
                out.push_str(&format!("[{minutes:02}:{seconds:02}.{centis:02}]{text}\n"));
            }
            None => {
                out.push_str(&text);
                out.push('\n');
            }
        }
    }
    if !matched {
        for cap in unsynced_re.captures_iter(ttml) {
            out.push_str(&decode_entities(&tag_re.replace_all(&cap[1], "")));
            out.push('\n');
        }
    }
    out
}

/// Parse `ss.fff`, `mm:ss.fff`, or `hh:mm:ss.fff` into milliseconds.
fn parse_ttml_time(raw: &str) -> Option<u64> {
    let raw = raw.trim().trim_end_matches('s');
    let mut parts: Vec<&str> = raw.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let seconds_part = parts.pop()?;
    let seconds: f64 = seconds_part.parse().ok()?;
    let mut total = (seconds * 1000.0).round() as u64;
    if let Some(minutes) = parts.pop() {
        total += minutes.parse::<u64>().ok()? * 60_000;
    }
    if let Some(hours) = parts.pop() {
        total += hours.parse::<u64>().ok()? * 3_600_000;
    }
    Some(total)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttml_times_parse_in_all_three_shapes() {
        assert_eq!(parse_ttml_time("12.5"), Some(12_500));
        assert_eq!(parse_ttml_time("1:02.250"), Some(62_250));
        assert_eq!(parse_ttml_time("1:01:01.000"), Some(3_661_000));
        assert_eq!(parse_ttml_time("20.010s"), Some(20_010));
        assert_eq!(parse_ttml_time("bogus"), None);
    }

    #[test]
    fn synced_ttml_becomes_lrc() {
        let ttml = r#"<tt><body><div>
            <p begin="0.0" end="4.0">First line</p>
            <p begin="1:05.500" end="1:08.0">Second &amp; third</p>
        </div></body></tt>"#;
        let lrc = ttml_to_lrc(ttml);
        assert!(lrc.contains("[00:00.00]First line"));
        assert!(lrc.contains("[01:05.50]Second & third"));
    }

    #[test]
    fn unsynced_ttml_keeps_bare_lines() {
        let ttml = "<tt><body><p>Only text</p></body></tt>";
        assert_eq!(ttml_to_lrc(ttml), "Only text\n");
    }
}
