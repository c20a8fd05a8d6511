use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::play::Play;

/// Per-day record of plays that have been scrobbled.
///
/// Each station-local date gets its own `YYYY-MM-DD.log` file with one
/// `HH:MM <id>` line per play. Files are created on first write and only
/// ever appended to.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn day_file(&self, play: &Play) -> PathBuf {
        self.dir
            .join(format!("{}.log", play.played_on().format("%Y-%m-%d")))
    }

    pub fn seen(&self, play: &Play) -> Result<bool> {
        let contents = match fs::read_to_string(self.day_file(play)) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        let identifier = play.identifier();
        Ok(contents.lines().any(|line| line == identifier))
    }

    pub fn record(&self, play: &Play) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_file(play))?;
        file.write_all(format!("{}\n", play.identifier()).as_bytes())?;
        Ok(())
    }
}
