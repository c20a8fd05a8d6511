use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::play::Play;
use crate::times;

// A broadcast day has a few hundred plays; anything past this is a source
// that never reports its last page.
const MAX_PAGES_PER_DAY: u32 = 200;

/// One page of a day's plays, newest first.
#[derive(Debug, Default)]
pub struct PlayPage {
    pub plays: Vec<Play>,
    pub current_page: u32,
    pub max_page: u32,
}

impl PlayPage {
    /// True when the source says there is nothing after `page`. Sources that
    /// omit pagination are read until they return an empty page.
    pub fn is_last(&self, page: u32) -> bool {
        self.max_page != 0 && page >= self.max_page
    }
}

pub trait PageSource {
    fn fetch_page(&self, date: NaiveDate, page: u32) -> Result<PlayPage>;
}

/// Collects every play in `[from, until]`, oldest first.
///
/// Days are crawled backwards starting at `until`'s day, each from its first
/// (newest) page on, until a play older than `from` shows up or the day runs
/// out of pages. Every step moves to an earlier calendar day, so at most one
/// crawl happens per day in the window.
pub fn fetch_range(
    source: &impl PageSource,
    from: DateTime<Tz>,
    until: DateTime<Tz>,
) -> Result<Vec<Play>> {
    if from > until {
        return Err(Error::InvalidWindow);
    }
    let mut plays = Vec::new();
    let mut day_end = until;
    while day_end >= from {
        let date = day_end.date_naive();
        if crawl_day(source, date, from, &mut plays)? {
            break;
        }
        let earliest = plays.iter().map(|play| play.played_at).min();
        if earliest.is_some_and(|earliest| earliest <= from) {
            break;
        }
        let Some(previous) = date.pred_opt() else {
            break;
        };
        day_end = times::end_of_day_on(previous)?;
    }
    Ok(normalize(plays, from, until))
}

/// Reads the pages of one day into `plays`. Returns whether a play older
/// than `from` was reached.
fn crawl_day(
    source: &impl PageSource,
    date: NaiveDate,
    from: DateTime<Tz>,
    plays: &mut Vec<Play>,
) -> Result<bool> {
    for page in 1..=MAX_PAGES_PER_DAY {
        let batch = source.fetch_page(date, page)?;
        debug!(
            "{date}: page {}/{} holds {} plays",
            batch.current_page,
            batch.max_page,
            batch.plays.len()
        );
        let last_page = batch.is_last(page);
        let Some(oldest) = batch.plays.last().map(|play| play.played_at) else {
            return Ok(false);
        };
        plays.extend(batch.plays);
        if oldest < from {
            return Ok(true);
        }
        if last_page {
            return Ok(false);
        }
    }
    warn!("Stopped reading {date} after {MAX_PAGES_PER_DAY} pages");
    Ok(false)
}

fn normalize(mut plays: Vec<Play>, from: DateTime<Tz>, until: DateTime<Tz>) -> Vec<Play> {
    plays.retain(|play| play.played_at >= from && play.played_at <= until);
    // Pages shift while new plays come in, so the same play can be read twice.
    let mut seen = HashSet::new();
    plays.retain(|play| seen.insert((play.id, play.played_at)));
    plays.sort_by_key(|play| play.played_at);
    plays
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;
    use crate::http::CannedFetcher;
    use crate::play::play;
    use crate::radio::RadioClient;
    use crate::radio::fixtures::{page, uuid};
    use crate::station::Station;
    use crate::times::local;

    /// Days of plays keyed by `(date, page)`; unknown pages are empty.
    #[derive(Default)]
    struct FakePages {
        pages: HashMap<(NaiveDate, u32), (Vec<Play>, u32)>,
        requested: RefCell<Vec<(NaiveDate, u32)>>,
    }

    impl FakePages {
        fn add(&mut self, date: &str, page: u32, max_page: u32, times: &[&str]) {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
            let plays = times
                .iter()
                .enumerate()
                .map(|(n, time)| {
                    let id = uuid(page * 100 + n as u32);
                    play(&id, "Artist", "Title", &format!("{date} {time}:00"))
                })
                .collect();
            self.pages.insert((date, page), (plays, max_page));
        }

        fn requested(&self) -> Vec<(String, u32)> {
            self.requested
                .borrow()
                .iter()
                .map(|(date, page)| (date.to_string(), *page))
                .collect()
        }
    }

    impl PageSource for FakePages {
        fn fetch_page(&self, date: NaiveDate, page: u32) -> Result<PlayPage> {
            self.requested.borrow_mut().push((date, page));
            Ok(match self.pages.get(&(date, page)) {
                Some((plays, max_page)) => PlayPage {
                    plays: plays.clone(),
                    current_page: page,
                    max_page: *max_page,
                },
                None => PlayPage::default(),
            })
        }
    }

    fn times_of(plays: &[Play]) -> Vec<String> {
        plays
            .iter()
            .map(|play| play.played_at.format("%d %H:%M").to_string())
            .collect()
    }

    #[test]
    fn window_within_one_page() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 3, &["00:40", "00:35", "00:28", "00:24", "00:19", "00:12"]);

        let plays = fetch_range(&source, local("2024-01-06 00:20:00"), local("2024-01-06 00:30:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["06 00:24", "06 00:28"]);
        assert_eq!(source.requested(), [("2024-01-06".to_string(), 1)]);
    }

    #[test]
    fn window_across_midnight_reads_previous_day() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 1, &["00:12", "00:04", "00:01"]);
        source.add("2024-01-05", 1, 4, &["23:58", "23:54", "23:50"]);

        let plays = fetch_range(&source, local("2024-01-05 23:55:00"), local("2024-01-06 00:05:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["05 23:58", "06 00:01", "06 00:04"]);
        assert_eq!(
            source.requested(),
            [("2024-01-06".to_string(), 1), ("2024-01-05".to_string(), 1)]
        );
    }

    #[test]
    fn pages_through_a_day_until_from_is_passed() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 3, &["12:00", "11:50"]);
        source.add("2024-01-06", 2, 3, &["11:40", "11:30"]);
        source.add("2024-01-06", 3, 3, &["11:20", "11:10"]);

        let plays = fetch_range(&source, local("2024-01-06 11:25:00"), local("2024-01-06 11:55:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["06 11:30", "06 11:40", "06 11:50"]);
        assert_eq!(source.requested().len(), 3);
    }

    #[test]
    fn last_page_moves_on_to_previous_day() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 1, &["01:00", "00:30"]);
        source.add("2024-01-05", 1, 1, &["23:30", "22:30"]);

        let plays = fetch_range(&source, local("2024-01-05 23:00:00"), local("2024-01-06 02:00:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["05 23:30", "06 00:30", "06 01:00"]);
        assert_eq!(
            source.requested(),
            [("2024-01-06".to_string(), 1), ("2024-01-05".to_string(), 1)]
        );
    }

    #[test]
    fn empty_days_are_visited_once_each() {
        let source = FakePages::default();

        let plays = fetch_range(&source, local("2024-01-04 12:00:00"), local("2024-01-06 12:00:00"))
            .unwrap();

        assert!(plays.is_empty());
        assert_eq!(
            source.requested(),
            [
                ("2024-01-06".to_string(), 1),
                ("2024-01-05".to_string(), 1),
                ("2024-01-04".to_string(), 1),
            ]
        );
    }

    #[test]
    fn includes_both_window_edges() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 1, &["10:10", "10:05", "10:00", "09:55"]);

        let plays = fetch_range(&source, local("2024-01-06 10:00:00"), local("2024-01-06 10:05:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["06 10:00", "06 10:05"]);
    }

    #[test]
    fn rereading_a_shifted_page_does_not_duplicate_plays() {
        let mut source = FakePages::default();
        source.add("2024-01-06", 1, 2, &["10:10", "10:05"]);
        source.add("2024-01-06", 2, 2, &["10:05", "10:00", "09:50"]);
        // Same id on both pages.
        let shared = source.pages[&(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(), 1)].0[1].clone();
        source
            .pages
            .get_mut(&(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(), 2))
            .unwrap()
            .0[0] = shared;

        let plays = fetch_range(&source, local("2024-01-06 09:55:00"), local("2024-01-06 10:30:00"))
            .unwrap();

        assert_eq!(times_of(&plays), ["06 10:00", "06 10:05", "06 10:10"]);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let source = FakePages::default();
        let result = fetch_range(&source, local("2024-01-06 12:00:00"), local("2024-01-06 11:00:00"));
        assert!(matches!(result, Err(Error::InvalidWindow)));
        assert!(source.requested().is_empty());
    }

    #[test]
    fn crawls_station_pages_through_the_client() {
        let mut fetcher = CannedFetcher::new();
        fetcher.respond("https://www.npo3fm.nl/", r#"{"buildId":"fr4nkS1n4tr4"}"#);
        fetcher.respond(
            "https://www.npo3fm.nl/_next/data/fr4nkS1n4tr4/gedraaid/6-1-2024.json?page=1&date=6-1-2024",
            page(
                "06-01-2024",
                1,
                1,
                &[
                    (uuid(3).as_str(), "Goldband", "Noodgeval", "00:04"),
                    (uuid(2).as_str(), "Froukje", "Groter dan ik", "00:01"),
                ],
            ),
        );
        fetcher.respond(
            "https://www.npo3fm.nl/_next/data/fr4nkS1n4tr4/gedraaid/5-1-2024.json?page=1&date=5-1-2024",
            page(
                "05-01-2024",
                1,
                9,
                &[
                    (uuid(1).as_str(), "Flemming", "Amsterdam", "23:58"),
                    (uuid(0).as_str(), "Suzan & Freek", "Goud", "23:50"),
                ],
            ),
        );
        let client = RadioClient::new(fetcher, Station::Npo3Fm).unwrap();

        let plays = fetch_range(&client, local("2024-01-05 23:55:00"), local("2024-01-06 00:05:00"))
            .unwrap();

        let titles: Vec<_> = plays.iter().map(|play| play.title.as_str()).collect();
        assert_eq!(titles, ["Amsterdam", "Groter dan ik", "Noodgeval"]);
    }

    #[test]
    fn decode_failure_aborts_the_crawl() {
        let mut fetcher = CannedFetcher::new();
        fetcher.respond("https://www.npo3fm.nl/", r#"{"buildId":"b"}"#);
        fetcher.respond(
            "https://www.npo3fm.nl/_next/data/b/gedraaid/6-1-2024.json?page=1&date=6-1-2024",
            page("06-01-2024", 1, 1, &[("nope", "A", "B", "00:04")]),
        );
        let client = RadioClient::new(fetcher, Station::Npo3Fm).unwrap();

        let result = fetch_range(&client, local("2024-01-06 00:00:00"), local("2024-01-06 00:05:00"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
