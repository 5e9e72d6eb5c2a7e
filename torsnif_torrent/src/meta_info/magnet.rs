use serde::{Deserialize, Serialize};

/// A compact reference to a torrent, usable without the original metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Magnet {
    pub display_name: String,
    pub info_hash: String,
    pub trackers: Vec<String>,
}

impl Magnet {
    /// Renders a `magnet:` URI. The info hash goes in verbatim, display name and trackers are
    /// form-url-encoded.
    pub fn to_uri(&self) -> String {
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(self.trackers.len() + 1);
        params.push(("dn", &self.display_name));
        params.extend(self.trackers.iter().map(|t| ("tr", t.as_str())));

        // serializing a slice of string pairs cannot fail
        let query = serde_urlencoded::to_string(&params).unwrap_or_default();

        format!("magnet:?xt=urn:btih:{}&{query}", self.info_hash)
    }
}
