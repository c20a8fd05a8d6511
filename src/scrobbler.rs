use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use log::{debug, info};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::http::Fetch;
use crate::lastfm::ScrobbleService;
use crate::ledger::Ledger;
use crate::play::Play;
use crate::radio::RadioClient;
use crate::range::fetch_range;

/// Granularity of every wait; cancellation is noticed within one quantum.
pub const QUANTUM: Duration = Duration::from_millis(500);
/// Quanta between two polls of the current play (15 seconds).
pub const QUANTA_PER_POLL: u32 = 30;
/// Bulk submissions pause after this many actual submissions. Plays the
/// ledger already has do not count.
pub const BATCH_SIZE: usize = 20;
pub const BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Scrobble whatever is on air right now, if anything.
    Once,
    /// Keep polling until stopped.
    Indefinitely,
    /// Keep polling until the given moment has passed.
    Until(DateTime<Tz>),
    /// Catch up from the given moment, then keep polling until stopped.
    From(DateTime<Tz>),
    /// Everything played in the window, polling for the part still ahead.
    Period(DateTime<Tz>, DateTime<Tz>),
}

impl Mode {
    pub fn select(
        once: bool,
        from: Option<DateTime<Tz>>,
        until: Option<DateTime<Tz>>,
    ) -> Result<Mode> {
        if once {
            return Ok(Mode::Once);
        }
        match (from, until) {
            (Some(from), Some(until)) if from > until => Err(Error::InvalidWindow),
            (Some(from), Some(until)) => Ok(Mode::Period(from, until)),
            (Some(from), None) => Ok(Mode::From(from)),
            (None, Some(until)) => Ok(Mode::Until(until)),
            (None, None) => Ok(Mode::Indefinitely),
        }
    }
}

/// How a mode ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
}

/// Forwards the plays of one station to a scrobble service, each play at
/// most once thanks to the ledger.
///
/// Runs on the calling thread. Any error from the station, the ledger or
/// the service ends the running mode; plays are submitted oldest first, so
/// a failed run stops at a well-defined point and a rerun picks up there.
pub struct Scrobbler<F, S, C> {
    radio: RadioClient<F>,
    service: S,
    ledger: Ledger,
    clock: C,
    cancel: CancelToken,
}

impl<F: Fetch, S: ScrobbleService, C: Clock> Scrobbler<F, S, C> {
    pub fn new(
        radio: RadioClient<F>,
        service: S,
        ledger: Ledger,
        clock: C,
        cancel: CancelToken,
    ) -> Self {
        Self {
            radio,
            service,
            ledger,
            clock,
            cancel,
        }
    }

    pub fn run(&self, mode: Mode) -> Result<Completion> {
        info!("Scrobbling {} ({mode:?})", self.radio.station().display_name());
        match mode {
            Mode::Once => self.scrobble_once(),
            Mode::Indefinitely => self.scrobble_indefinitely(),
            Mode::Until(until) => self.scrobble_until(until),
            Mode::From(from) => self.scrobble_from(from),
            Mode::Period(from, until) => self.scrobble_period(from, until),
        }
    }

    /// Nothing being on air is not an error.
    pub fn scrobble_once(&self) -> Result<Completion> {
        if !self.poll_once()? {
            info!("Nothing is being played right now.");
        }
        Ok(Completion::Finished)
    }

    pub fn scrobble_indefinitely(&self) -> Result<Completion> {
        self.run_until(|| self.poll_once().map(drop), || false)
    }

    /// Polls until `until` has passed; a poll at exactly `until` still runs.
    pub fn scrobble_until(&self, until: DateTime<Tz>) -> Result<Completion> {
        self.run_until(|| self.poll_once().map(drop), || self.clock.now() > until)
    }

    /// Open-ended: after catching up to now this never stops on its own.
    pub fn scrobble_from(&self, from: DateTime<Tz>) -> Result<Completion> {
        if self.wait_until(from)? == Completion::Cancelled {
            return Ok(Completion::Cancelled);
        }
        if self.backfill(from, self.clock.now())? == Completion::Cancelled {
            return Ok(Completion::Cancelled);
        }
        self.scrobble_indefinitely()
    }

    pub fn scrobble_period(&self, from: DateTime<Tz>, until: DateTime<Tz>) -> Result<Completion> {
        if from > until {
            return Err(Error::InvalidWindow);
        }
        if self.wait_until(from)? == Completion::Cancelled {
            return Ok(Completion::Cancelled);
        }
        let now = self.clock.now();
        if until <= now {
            return self.backfill(from, until);
        }
        if self.backfill(from, now)? == Completion::Cancelled {
            return Ok(Completion::Cancelled);
        }
        self.poll_once()?;
        self.scrobble_until(until)
    }

    /// Scrobbles `play` unless the ledger already has it. Returns whether a
    /// submission happened.
    pub fn submit_if_unseen(&self, play: &Play) -> Result<bool> {
        if self.ledger.seen(play)? {
            debug!("Already scrobbled {play}");
            return Ok(false);
        }
        let (artist, title) = match self.service.correct(&play.artist, &play.title) {
            Ok(corrected) => corrected,
            Err(err) => {
                debug!("No correction for {play}: {err}");
                (play.artist.clone(), play.title.clone())
            }
        };
        self.service.submit(&artist, &title, play.played_at)?;
        self.ledger.record(play)?;
        info!(
            "Scrobbled {artist} – {title} ({})",
            play.played_at.format("%Y-%m-%d %H:%M")
        );
        Ok(true)
    }

    /// Scrobbles the play on air, if any. Returns whether one was on air.
    pub fn poll_once(&self) -> Result<bool> {
        let Some(play) = self.radio.fetch_current(self.clock.now())? else {
            debug!("Nothing on air");
            return Ok(false);
        };
        self.submit_if_unseen(&play)?;
        Ok(true)
    }

    /// Submits every play in `[from, until]` oldest first. Cancellation is
    /// checked before every submission and every pause; the ledger keeps
    /// a stopped run resumable.
    fn backfill(&self, from: DateTime<Tz>, until: DateTime<Tz>) -> Result<Completion> {
        if self.cancel.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        let plays = fetch_range(&self.radio, from, until)?;
        info!(
            "Found {} plays between {} and {}",
            plays.len(),
            from.format("%Y-%m-%d %H:%M:%S"),
            until.format("%Y-%m-%d %H:%M:%S")
        );
        let mut submitted = 0;
        for play in &plays {
            if self.cancel.is_cancelled() {
                info!("Stopped after {submitted} new plays");
                return Ok(Completion::Cancelled);
            }
            if !self.submit_if_unseen(play)? {
                continue;
            }
            submitted += 1;
            if submitted % BATCH_SIZE == 0 {
                if self.cancel.is_cancelled() {
                    info!("Stopped after {submitted} new plays");
                    return Ok(Completion::Cancelled);
                }
                self.clock.sleep(BATCH_PAUSE);
            }
        }
        info!("Scrobbled {submitted} new plays");
        Ok(Completion::Finished)
    }

    fn wait_until(&self, moment: DateTime<Tz>) -> Result<Completion> {
        if self.clock.now() >= moment {
            return Ok(Completion::Finished);
        }
        info!("Waiting until {}", moment.format("%Y-%m-%d %H:%M:%S"));
        self.run_until(|| Ok(()), || self.clock.now() >= moment)
    }

    /// Runs `task`, then checks `done`, then sleeps for one poll interval in
    /// quanta, checking for cancellation before each step.
    fn run_until(
        &self,
        mut task: impl FnMut() -> Result<()>,
        mut done: impl FnMut() -> bool,
    ) -> Result<Completion> {
        let mut remaining_sleeps = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Completion::Cancelled);
            }
            if remaining_sleeps > 0 {
                self.clock.sleep(QUANTUM);
                remaining_sleeps -= 1;
                continue;
            }
            task()?;
            if done() {
                return Ok(Completion::Finished);
            }
            remaining_sleeps = QUANTA_PER_POLL;
        }
    }
}
