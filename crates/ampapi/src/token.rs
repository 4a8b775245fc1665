use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::error::AmpError;
use crate::{ORIGIN, USER_AGENT};

/// Recover the developer bearer token from the music.apple.com web bundle.
///
/// The index page references a versioned JS bundle which embeds the token
/// as a JWT literal. Callers fall back to the configured token when this
/// fails.
pub async fn fetch_web_token(http: &Client) -> Result<String, AmpError> {
    let index = http
        .get(format!("{ORIGIN}/us/browse"))
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await?
        .text()
        .await?;

    let bundle_re =
        Regex::new(r#"/assets/index(?:-legacy)?[-~][^/\s"']+\.js"#).expect("static regex");
    let bundle_path = bundle_re
        .find(&index)
        .map(|m| m.as_str().to_string())
        .ok_or(AmpError::TokenNotFound)?;
    debug!(bundle = %bundle_path, "resolved web bundle");

    let bundle = http
        .get(format!("{ORIGIN}{bundle_path}"))
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await?
        .text()
        .await?;

    let jwt_re = Regex::new(r"eyJh[\w-]+\.[\w-]+\.[\w-]+").expect("static regex");
    jwt_re
        .find(&bundle)
        .map(|m| m.as_str().to_string())
        .ok_or(AmpError::TokenNotFound)
}
