// ~/Sentinel/sentinel-addons/rotator/src/gallery_connector.rs

use std::{
    collections::{HashMap, HashSet},
    io::Read,
    time::Duration,
};

use regex::Regex;

use crate::{error::GalleryError, warn, DEBUG_NAME};

const USER_AGENT: &str = concat!("sentinel-rotator/", env!("CARGO_PKG_VERSION"));

// Cap on a single image download; the gallery serves photographic wallpapers,
// anything past this is not an image we want.
const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// One image reference from the gallery's current listing. The source id is
/// the absolute image URL and doubles as the ledger identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub source_id: String,
    pub metadata: HashMap<String, String>,
}

impl Candidate {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            metadata: HashMap::new(),
        }
    }
}

/// The remote gallery's whole capability surface: a randomized current
/// listing, a shuffle action that re-randomizes it, and byte download for a
/// listed identifier. There is no stable catalog, no pagination, and no
/// query-by-identifier.
pub trait RemoteGallery: Send + Sync {
    fn read_listing(&self) -> Result<Vec<Candidate>, GalleryError>;
    fn shuffle(&self) -> Result<(), GalleryError>;
    fn fetch(&self, source_id: &str) -> Result<Vec<u8>, GalleryError>;
}

pub struct HttpGallery {
    agent: ureq::Agent,
    base_url: String,
    link_pattern: Regex,
}

impl HttpGallery {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        // The gallery grid marks every tile anchor with the image-link class;
        // its href carries the full-size image URL.
        let link_pattern =
            Regex::new(r#"<a\b[^>]*class="[^"]*\bimage-link\b[^"]*"[^>]*href="([^"]+)""#)
                .expect("image link pattern");

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            link_pattern,
        }
    }

    fn gallery_url(&self) -> String {
        format!("{}/gallery", self.base_url)
    }

    fn shuffle_url(&self) -> String {
        format!("{}/gallery/shuffle", self.base_url)
    }

    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        if href.starts_with('/') {
            return format!("{}{}", self.base_url, href);
        }
        format!("{}/{}", self.base_url, href)
    }

    fn extract_listing(&self, html: &str) -> Vec<Candidate> {
        let mut seen = HashSet::<String>::new();
        let mut listing = Vec::<Candidate>::new();

        for captures in self.link_pattern.captures_iter(html) {
            let Some(href) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };

            let source_id = self.absolutize(href);
            if !seen.insert(source_id.clone()) {
                continue;
            }

            let mut candidate = Candidate::new(source_id);
            candidate
                .metadata
                .insert("listing_href".to_string(), href.to_string());
            listing.push(candidate);
        }

        listing
    }

    fn get_text(&self, url: &str) -> Result<String, GalleryError> {
        let resp = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| request_error(url, e))?;

        let mut body = String::new();
        resp.into_reader()
            .take(MAX_FETCH_BYTES)
            .read_to_string(&mut body)
            .map_err(|e| GalleryError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(body)
    }
}

impl RemoteGallery for HttpGallery {
    fn read_listing(&self) -> Result<Vec<Candidate>, GalleryError> {
        let url = self.gallery_url();
        let body = self.get_text(&url)?;
        let listing = self.extract_listing(&body);
        if listing.is_empty() {
            warn!(
                "[{}][GALLERY] Listing at {} yielded no image links",
                DEBUG_NAME, url
            );
        }
        Ok(listing)
    }

    fn shuffle(&self) -> Result<(), GalleryError> {
        let url = self.shuffle_url();
        self.agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| request_error(&url, e))?;
        Ok(())
    }

    fn fetch(&self, source_id: &str) -> Result<Vec<u8>, GalleryError> {
        let resp = self
            .agent
            .get(source_id)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| request_error(source_id, e))?;

        let mut bytes = Vec::<u8>::new();
        resp.into_reader()
            .take(MAX_FETCH_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| GalleryError::Transport {
                url: source_id.to_string(),
                reason: e.to_string(),
            })?;

        if bytes.is_empty() {
            return Err(GalleryError::EmptyBody {
                url: source_id.to_string(),
            });
        }

        Ok(bytes)
    }
}

fn request_error(url: &str, err: ureq::Error) -> GalleryError {
    match err {
        ureq::Error::Status(status, _) => GalleryError::Status {
            status,
            url: url.to_string(),
        },
        ureq::Error::Transport(transport) => GalleryError::Transport {
            url: url.to_string(),
            reason: transport.to_string(),
        },
    }
}
