use anyhow::{Context, bail};
use chrono::DateTime;
use chrono_tz::Tz;
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// The remote side of scrobbling.
pub trait ScrobbleService {
    /// Best-effort canonical spelling of artist and title.
    fn correct(&self, artist: &str, title: &str) -> Result<(String, String)>;
    fn submit(&self, artist: &str, title: &str, played_at: DateTime<Tz>) -> Result<()>;
}

impl<S: ScrobbleService + ?Sized> ScrobbleService for &S {
    fn correct(&self, artist: &str, title: &str) -> Result<(String, String)> {
        (**self).correct(artist, title)
    }

    fn submit(&self, artist: &str, title: &str, played_at: DateTime<Tz>) -> Result<()> {
        (**self).submit(artist, title, played_at)
    }
}

pub struct LastFmClient {
    api_key: String,
    api_secret: String,
    session_key: String,
    http: Client,
}

impl LastFmClient {
    pub fn new(api_key: &str, api_secret: &str, session_key: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("npoleon")
            .build()
            .context("Failed building HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            session_key: session_key.to_string(),
            http,
        })
    }

    fn scrobble(&self, artist: &str, title: &str, played_at: DateTime<Tz>) -> anyhow::Result<()> {
        let params = vec![
            ("method".to_string(), "track.scrobble".to_string()),
            ("artist".to_string(), artist.to_string()),
            ("track".to_string(), title.to_string()),
            ("timestamp".to_string(), played_at.timestamp().to_string()),
            ("chosenByUser".to_string(), "0".to_string()),
            ("api_key".to_string(), self.api_key.clone()),
            ("sk".to_string(), self.session_key.clone()),
        ];
        let text = post_signed(&self.http, params, &self.api_secret)
            .context("Failed sending scrobble request")?;
        debug!("Scrobble response: {text}");
        check_api_error(&text)?;
        check_scrobble_result(&text)
    }

    fn fetch_correction(&self, artist: &str, title: &str) -> anyhow::Result<(String, String)> {
        let text = self
            .http
            .get(API_URL)
            .query(&[
                ("method", "track.getCorrection"),
                ("artist", artist),
                ("track", title),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .context("Failed requesting correction")?
            .text()
            .context("Failed reading correction response")?;
        check_api_error(&text)?;
        let json: Value = serde_json::from_str(&text).context("Failed parsing correction")?;
        Ok(parse_correction(&json).unwrap_or_else(|| (artist.to_string(), title.to_string())))
    }
}

impl ScrobbleService for LastFmClient {
    fn correct(&self, artist: &str, title: &str) -> Result<(String, String)> {
        self.fetch_correction(artist, title)
            .map_err(|err| Error::Fetch(format!("{err:#}")))
    }

    fn submit(&self, artist: &str, title: &str, played_at: DateTime<Tz>) -> Result<()> {
        self.scrobble(artist, title, played_at)
            .map_err(|err| Error::Submit(format!("{artist} – {title}: {err:#}")))
    }
}

/// Exchanges account credentials for a session key through
/// `auth.getMobileSession`.
pub fn fetch_mobile_session(
    api_key: &str,
    api_secret: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<String> {
    let http = Client::builder()
        .user_agent("npoleon")
        .build()
        .context("Failed building HTTP client")?;
    let params = vec![
        ("method".to_string(), "auth.getMobileSession".to_string()),
        ("username".to_string(), username.to_string()),
        ("password".to_string(), password.to_string()),
        ("api_key".to_string(), api_key.to_string()),
    ];
    let text = post_signed(&http, params, api_secret).context("Failed requesting mobile session")?;
    check_api_error(&text)?;
    let json: Value = serde_json::from_str(&text).context("Failed parsing session response")?;
    json.get("session")
        .and_then(|session| session.get("key"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing session key in response"))
}

fn post_signed(
    http: &Client,
    mut params: Vec<(String, String)>,
    secret: &str,
) -> anyhow::Result<String> {
    let api_sig = sign_params(&params, secret);
    params.push(("api_sig".to_string(), api_sig));
    params.push(("format".to_string(), "json".to_string()));
    let response = http.post(API_URL).form(&params).send()?;
    Ok(response.text()?)
}

/// md5 over every `keyvalue` pair in key order, followed by the secret.
fn sign_params(params: &[(String, String)], secret: &str) -> String {
    let mut pairs: Vec<&(String, String)> = params.iter().collect();
    pairs.sort_by(|left, right| left.0.cmp(&right.0));
    let mut payload: String = pairs
        .iter()
        .map(|(key, value)| format!("{key}{value}"))
        .collect();
    payload.push_str(secret);
    format!("{:x}", md5::compute(payload))
}

fn check_api_error(payload: &str) -> anyhow::Result<()> {
    let envelope: ApiErrorEnvelope =
        serde_json::from_str(payload).context("Failed parsing API response")?;
    let Some(code) = envelope.error else {
        return Ok(());
    };
    let message = envelope.message.as_deref().unwrap_or("no message");
    bail!("API error {code}: {message}");
}

/// Corrected `(artist, title)` when Last.fm flags either as corrected.
fn parse_correction(json: &Value) -> Option<(String, String)> {
    let correction = json.get("corrections")?.get("correction")?;
    let attr = correction.get("@attr");
    let flagged = |key: &str| {
        attr.and_then(|attr| attr.get(key))
            .and_then(Value::as_str)
            .is_some_and(|value| value == "1")
    };
    if !flagged("artistcorrected") && !flagged("trackcorrected") {
        return None;
    }
    let track = correction.get("track")?;
    let title = track.get("name")?.as_str()?;
    let artist = track.get("artist")?.get("name")?.as_str()?;
    Some((artist.to_string(), title.to_string()))
}

fn check_scrobble_result(payload: &str) -> anyhow::Result<()> {
    let parsed: ScrobbleResponse =
        serde_json::from_str(payload).context("Failed parsing scrobble response")?;
    let Some(scrobbles) = parsed.scrobbles else {
        return Ok(());
    };
    let ignored = match &scrobbles.attr {
        Some(attr) => attr.ignored.value()?,
        None => 0,
    };
    if ignored == 0 {
        return Ok(());
    }
    let (code, message) = scrobbles
        .scrobble
        .as_ref()
        .and_then(ScrobbleEntries::first_ignored_message)
        .map_or_else(
            || ("unknown".to_string(), "Scrobble rejected".to_string()),
            IgnoredMessage::code_and_text,
        );
    bail!("Scrobble ignored (code {code}): {message}");
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<LooseNumber>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleResponse {
    #[serde(default)]
    scrobbles: Option<Scrobbles>,
}

#[derive(Debug, Deserialize)]
struct Scrobbles {
    #[serde(rename = "@attr")]
    #[serde(default)]
    attr: Option<ScrobbleAttr>,
    #[serde(default)]
    scrobble: Option<ScrobbleEntries>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleAttr {
    ignored: LooseNumber,
}

/// Last.fm sends counters and codes either as JSON numbers or as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(u32),
    Text(String),
}

impl LooseNumber {
    fn value(&self) -> anyhow::Result<u32> {
        match self {
            LooseNumber::Number(value) => Ok(*value),
            LooseNumber::Text(text) => text
                .trim()
                .parse()
                .with_context(|| format!("Expected a number, got '{text}'")),
        }
    }
}

impl std::fmt::Display for LooseNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LooseNumber::Number(value) => write!(f, "{value}"),
            LooseNumber::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrobbleEntries {
    One(ScrobbleEntry),
    Many(Vec<ScrobbleEntry>),
}

impl ScrobbleEntries {
    fn first_ignored_message(&self) -> Option<&IgnoredMessage> {
        match self {
            ScrobbleEntries::One(entry) => entry.ignored_message.as_ref(),
            ScrobbleEntries::Many(entries) => entries
                .first()
                .and_then(|entry| entry.ignored_message.as_ref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrobbleEntry {
    #[serde(rename = "ignoredMessage")]
    #[serde(default)]
    ignored_message: Option<IgnoredMessage>,
}

#[derive(Debug, Deserialize)]
struct IgnoredMessage {
    #[serde(rename = "#text")]
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl IgnoredMessage {
    fn code_and_text(&self) -> (String, String) {
        (
            self.code.clone().unwrap_or_else(|| "unknown".to_string()),
            self.text
                .clone()
                .unwrap_or_else(|| "Scrobble rejected".to_string()),
        )
    }
}

#[cfg(test)]
pub use recording::{RecordingService, Submission};
