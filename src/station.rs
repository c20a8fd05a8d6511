use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Station {
    NpoRadio1,
    NpoRadio2,
    Npo3Fm,
}

impl Station {
    pub const ALL: [Station; 3] = [Station::NpoRadio1, Station::NpoRadio2, Station::Npo3Fm];

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nporadio1" | "radio1" => Ok(Station::NpoRadio1),
            "nporadio2" | "radio2" => Ok(Station::NpoRadio2),
            "3fm" | "npo3fm" | "nporadio3" | "radio3" => Ok(Station::Npo3Fm),
            _ => Err(Error::UnknownStation(value.to_string())),
        }
    }

    /// Identifier used in the station's domain name.
    pub fn id(self) -> &'static str {
        match self {
            Station::NpoRadio1 => "nporadio1",
            Station::NpoRadio2 => "nporadio2",
            Station::Npo3Fm => "npo3fm",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Station::NpoRadio1 => "NPO Radio 1",
            Station::NpoRadio2 => "NPO Radio 2",
            Station::Npo3Fm => "NPO 3FM",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Station::NpoRadio1 => &["nporadio1", "radio1"],
            Station::NpoRadio2 => &["nporadio2", "radio2"],
            Station::Npo3Fm => &["3fm", "npo3fm", "nporadio3", "radio3"],
        }
    }

    pub fn base_url(self) -> String {
        format!("https://www.{}.nl/", self.id())
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
