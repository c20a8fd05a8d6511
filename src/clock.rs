use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Civil zone the stations publish their playlists in. Every date and
/// time-of-day in this crate is resolved against it, never the host zone.
pub const STATION_TZ: Tz = chrono_tz::Europe::Amsterdam;

pub trait Clock {
    fn now(&self) -> DateTime<Tz>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&STATION_TZ)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Tz> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
pub use manual::ManualClock;
