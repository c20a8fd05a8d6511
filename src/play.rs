use std::fmt;

use chrono::{DateTime, NaiveDate, TimeDelta};
use chrono_tz::Tz;
use uuid::Uuid;

/// One airing of a track on a station.
///
/// Artist and title may be corrected later and do not take part in equality:
/// two plays are the same event when their id and start time match.
#[derive(Debug, Clone)]
pub struct Play {
    pub id: Uuid,
    pub artist: String,
    pub title: String,
    pub played_at: DateTime<Tz>,
}

impl Play {
    /// Ledger key, e.g. `12:10 9f2b7020-25b0-48d4-b895-d5f0c08857ca`.
    pub fn identifier(&self) -> String {
        format!("{} {}", self.played_at.format("%H:%M"), self.id)
    }

    pub fn played_on(&self) -> NaiveDate {
        self.played_at.date_naive()
    }

    /// Whether `moment` falls strictly between one minute before and three
    /// minutes after the play started.
    pub fn is_playing_at(&self, moment: DateTime<Tz>) -> bool {
        let start = self.played_at - TimeDelta::minutes(1);
        let end = self.played_at + TimeDelta::minutes(3);
        moment > start && moment < end
    }
}

impl PartialEq for Play {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.played_at == other.played_at
    }
}

impl Eq for Play {}

impl fmt::Display for Play {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} – {} ({})",
            self.artist,
            self.title,
            self.played_at.format("%Y-%m-%d %H:%M")
        )
    }
}

#[cfg(test)]
pub(crate) fn play(id: &str, artist: &str, title: &str, at: &str) -> Play {
    Play {
        id: Uuid::parse_str(id).expect("test uuid"),
        artist: artist.to_string(),
        title: title.to_string(),
        played_at: crate::times::local(at),
    }
}
