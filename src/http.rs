use log::debug;
use reqwest::blocking::Client;

use crate::error::{Error, Result};

const USER_AGENT: &str = "npoleon";

/// A single GET-style request. Station clients only ever need the raw body.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl<T: Fetch + ?Sized> Fetch for &T {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch(url)
    }
}

pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::Fetch(format!("failed building HTTP client: {err}")))?;
        Ok(Self { http })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| Error::Fetch(format!("{url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{url}: HTTP {status}")));
        }
        let body = response
            .bytes()
            .map_err(|err| Error::Fetch(format!("{url}: {err}")))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
pub use canned::CannedFetcher;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_fetcher_serves_mapped_urls_only() {
        let mut fetcher = CannedFetcher::new();
        fetcher.respond("https://example.com/", "hello");

        assert_eq!(fetcher.fetch("https://example.com/").unwrap(), b"hello");
        assert!(matches!(
            fetcher.fetch("https://example.com/missing"),
            Err(Error::Fetch(_))
        ));
        assert_eq!(fetcher.requested().len(), 2);
    }
}
