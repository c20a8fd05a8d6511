use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::http::Fetch;
use crate::play::Play;
use crate::range::{PageSource, PlayPage};
use crate::station::Station;
use crate::times;

static BUILD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""buildId":"([^"]+)""#).expect("build id pattern compiles"));

/// Finds the build identifier embedded in the station's home page. The
/// first marker wins.
pub fn discover_build_id(fetcher: &impl Fetch, station: Station) -> Result<String> {
    let body = fetcher.fetch(&station.base_url())?;
    let markup = String::from_utf8_lossy(&body);
    BUILD_ID
        .captures(&markup)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| Error::BuildIdNotFound(station.id().to_string()))
}

/// Reads the "gedraaid" (played) pages of one station.
///
/// The build identifier is looked up once. If the site is redeployed while a
/// client is alive its page requests start failing, and a new client has to
/// be created.
pub struct RadioClient<F> {
    fetcher: F,
    station: Station,
    build_id: String,
}

impl<F: Fetch> RadioClient<F> {
    pub fn new(fetcher: F, station: Station) -> Result<Self> {
        let build_id = discover_build_id(&fetcher, station)?;
        debug!("Using buildId {build_id} for {station}");
        Ok(Self {
            fetcher,
            station,
            build_id,
        })
    }

    pub fn station(&self) -> Station {
        self.station
    }

    pub fn page_url(&self, date: NaiveDate, page: u32) -> String {
        let day = date.format("%-d-%-m-%Y");
        format!(
            "{}_next/data/{}/gedraaid/{day}.json?page={page}&date={day}",
            self.station.base_url(),
            self.build_id,
        )
    }

    /// The play that started shortly before `now`, if the newest play of the
    /// day is still within its playing window.
    pub fn fetch_current(&self, now: DateTime<Tz>) -> Result<Option<Play>> {
        let page = self.fetch_page(now.date_naive(), 1)?;
        Ok(page
            .plays
            .into_iter()
            .next()
            .filter(|play| play.is_playing_at(now)))
    }
}

impl<F: Fetch> PageSource for RadioClient<F> {
    fn fetch_page(&self, date: NaiveDate, page: u32) -> Result<PlayPage> {
        let body = self.fetcher.fetch(&self.page_url(date, page))?;
        decode_page(&body, date)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    #[serde(default)]
    page_props: PageProps,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageProps {
    #[serde(default)]
    track_plays: Vec<TrackPlay>,
    #[serde(default)]
    initial_values: InitialValues,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct TrackPlay {
    #[serde(default)]
    id: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    track: String,
    #[serde(default)]
    time: String,
}

#[derive(Debug, Default, Deserialize)]
struct InitialValues {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    current_page: u32,
    #[serde(default)]
    max_page: u32,
}

fn decode_page(body: &[u8], requested: NaiveDate) -> Result<PlayPage> {
    let response: PageResponse =
        serde_json::from_slice(body).map_err(|err| Error::Decode(err.to_string()))?;
    let props = response.page_props;
    let date = props
        .initial_values
        .date
        .filter(|date| !date.trim().is_empty())
        .unwrap_or_else(|| requested.format("%Y-%m-%d").to_string());
    let plays = props
        .track_plays
        .iter()
        .map(|raw| convert_play(raw, &date))
        .collect::<Result<Vec<_>>>()?;
    Ok(PlayPage {
        plays,
        current_page: props.pagination.current_page,
        max_page: props.pagination.max_page,
    })
}

fn convert_play(raw: &TrackPlay, date: &str) -> Result<Play> {
    let id = Uuid::parse_str(&raw.id)
        .map_err(|err| Error::Decode(format!("invalid play id '{}': {err}", raw.id)))?;
    let played_at = times::parse_absolute(&format!("{date} {}", raw.time))
        .map_err(|err| Error::Decode(format!("play {id}: {err}")))?;
    Ok(Play {
        id,
        artist: raw.artist.clone(),
        title: raw.track.clone(),
        played_at,
    })
}
