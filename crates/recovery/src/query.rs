//! Image query sent to the recovery server and the answer it returns

use macfetch_config::constants::{DIAGNOSTICS_IMAGE_PATH, RECOVERY_IMAGE_PATH};
use macfetch_errors::{Error, RecoveryError};
use macfetch_types::{BoardSelection, ImageType, OsType};
use rand::Rng;
use std::collections::HashMap;

const CLIENT_ID_LEN: usize = 16;
const KEY_LEN: usize = 64;
const FINGERPRINT_LEN: usize = 64;

/// Random uppercase hex string of `len` digits
#[must_use]
pub fn random_hex(len: usize) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(DIGITS[rng.random_range(0..DIGITS.len())]))
        .collect()
}

/// Form fields of one image request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    /// `cid`
    pub client_id: String,
    /// `sn`, the MLB serial
    pub serial: String,
    /// `bid`
    pub board_id: String,
    /// `k`
    pub key: String,
    /// `fg`
    pub fingerprint: String,
    /// `os`; only sent for recovery images
    pub os_type: Option<OsType>,
    pub image_type: ImageType,
}

impl ImageQuery {
    /// Build a query for `selection` with fresh random identifiers
    #[must_use]
    pub fn for_selection(selection: &BoardSelection) -> Self {
        let image_type = selection.image_type();
        Self {
            client_id: selection
                .client_id
                .clone()
                .unwrap_or_else(|| random_hex(CLIENT_ID_LEN)),
            serial: selection.mlb().to_string(),
            board_id: selection.board_id.clone(),
            key: random_hex(KEY_LEN),
            fingerprint: random_hex(FINGERPRINT_LEN),
            os_type: (image_type == ImageType::Recovery).then_some(selection.os_type),
            image_type,
        }
    }

    /// Endpoint path relative to the recovery server root
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self.image_type {
            ImageType::Diagnostics => DIAGNOSTICS_IMAGE_PATH,
            ImageType::Recovery | ImageType::Installer => RECOVERY_IMAGE_PATH,
        }
    }

    /// Ordered `(key, value)` pairs
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("cid", self.client_id.as_str()),
            ("sn", self.serial.as_str()),
            ("bid", self.board_id.as_str()),
            ("k", self.key.as_str()),
            ("fg", self.fingerprint.as_str()),
        ];
        if let Some(os_type) = self.os_type {
            fields.push(("os", os_type.as_str()));
        }
        fields
    }

    /// Request body: one `key=value` per line
    #[must_use]
    pub fn to_body(&self) -> String {
        self.fields()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Where the image and its chunklist live, and the tokens to fetch them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// `AP`
    pub product: String,
    /// `AU`
    pub image_url: String,
    /// `AH`
    pub image_hash: String,
    /// `AT`
    pub image_token: String,
    /// `CU`
    pub chunklist_url: String,
    /// `CH`
    pub chunklist_hash: String,
    /// `CT`
    pub chunklist_token: String,
}

const REQUIRED_KEYS: [&str; 7] = ["AP", "AU", "AH", "AT", "CU", "CH", "CT"];

impl ImageInfo {
    /// Parse the `key: value` lines of an image query response.
    ///
    /// # Errors
    ///
    /// Returns `RecoveryError::MalformedResponse` when a required key is
    /// missing, a URL is not http(s), or an asset token is empty.
    pub fn parse(body: &str) -> Result<Self, Error> {
        let fields: HashMap<&str, &str> = body
            .lines()
            .filter_map(|line| line.trim_end_matches('\r').split_once(": "))
            .collect();

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !fields.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return Err(malformed(format!("missing keys {}", missing.join(", "))));
        }

        let field = |key: &str| fields.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let info = Self {
            product: field("AP"),
            image_url: field("AU"),
            image_hash: field("AH"),
            image_token: field("AT"),
            chunklist_url: field("CU"),
            chunklist_hash: field("CH"),
            chunklist_token: field("CT"),
        };

        for (key, url) in [("AU", &info.image_url), ("CU", &info.chunklist_url)] {
            macfetch_net::parse_url(url).map_err(|e| malformed(format!("{key}: {e}")))?;
        }
        for (key, token) in [("AT", &info.image_token), ("CT", &info.chunklist_token)] {
            if token.is_empty() {
                return Err(malformed(format!("{key} is empty")));
            }
        }

        Ok(info)
    }

    /// File name for the image: last URL segment, or `<image_type>.dmg`
    #[must_use]
    pub fn image_file_name(&self, image_type: ImageType) -> String {
        last_segment(&self.image_url).unwrap_or_else(|| format!("{image_type}.dmg"))
    }

    /// File name for the chunklist: last URL segment, or `<image_type>.chunklist`
    #[must_use]
    pub fn chunklist_file_name(&self, image_type: ImageType) -> String {
        last_segment(&self.chunklist_url).unwrap_or_else(|| format!("{image_type}.chunklist"))
    }
}

fn last_segment(url: &str) -> Option<String> {
    let url = url::Url::parse(url).ok()?;
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(str::to_string)
}

fn malformed(reason: String) -> Error {
    RecoveryError::MalformedResponse { reason }.into()
}
