//! Identifier classification
//!
//! Maps a raw, loosely formatted identifier string (email, ORCID, DOI,
//! profile URL, Wikidata QID) to a typed, namespaced identifier. Rules are
//! applied in strict priority order; the first match wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Path marker that distinguishes an internal profile page URL from any
/// other absolute URL.
const PROFILE_PATH_MARKER: &str = "/staff-profiles/";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());

static ORCID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[0-9Xx]$").unwrap());

static QID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Q\d+$").unwrap());

/// Classification bucket for an identifier string.
///
/// A value belongs to at most one namespace, determined by the ordered rule
/// set in [`classify`]. `Sbid` (internal directory id) is never produced by
/// classification; it only occurs as a field on entity documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierNamespace {
    Email,
    Orcid,
    Doi,
    WikidataQid,
    ProfileUrl,
    Sbid,
}

impl IdentifierNamespace {
    /// Namespace name as used in API paths and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Orcid => "orcid",
            Self::Doi => "doi",
            Self::WikidataQid => "wikidata_qid",
            Self::ProfileUrl => "profile_url",
            Self::Sbid => "sbid",
        }
    }

    /// Field on entity documents holding this namespace's value.
    pub fn entity_field(&self) -> &'static str {
        match self {
            Self::Email => "identifier_email",
            Self::Orcid => "identifier_orcid",
            Self::Doi => "identifier_doi",
            Self::WikidataQid => "identifier_wikidata",
            Self::ProfileUrl => "identifier_profile_url",
            Self::Sbid => "identifier_sbid",
        }
    }

    /// Field on claim documents holding this namespace as a claim subject,
    /// where claims can be filtered by it.
    pub fn claim_subject_field(&self) -> Option<&'static str> {
        match self {
            Self::Email => Some("subject_identifier_email"),
            Self::Orcid => Some("subject_identifier_orcid"),
            _ => None,
        }
    }

    /// Fields on claim documents where values of this namespace are
    /// mentioned at all (subject or object side). Used by the
    /// unresolved-identifier listing.
    pub fn claim_mention_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Email => &["subject_identifier_email"],
            Self::Orcid => &["subject_identifier_orcid"],
            Self::Doi => &["object_identifier_doi"],
            _ => &[],
        }
    }

    /// Whether at most one entity document may carry a given value of this
    /// namespace. Violations surface as `Ambiguous`.
    pub fn expects_unique(&self) -> bool {
        matches!(self, Self::Email | Self::Orcid)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "orcid" => Some(Self::Orcid),
            "doi" => Some(Self::Doi),
            "wikidata_qid" => Some(Self::WikidataQid),
            "profile_url" => Some(Self::ProfileUrl),
            "sbid" => Some(Self::Sbid),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifierNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified (namespace, value) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub namespace: IdentifierNamespace,
    pub value: String,
}

impl Identifier {
    pub fn new(namespace: IdentifierNamespace, value: impl Into<String>) -> Self {
        Self {
            namespace,
            value: value.into(),
        }
    }

    /// External resolver URL for namespaces that have one.
    ///
    /// The value is uppercased for DOI and ORCID to stay byte-compatible
    /// with links the system has historically emitted.
    pub fn resolver_url(&self) -> Option<String> {
        match self.namespace {
            IdentifierNamespace::Doi => {
                Some(format!("https://doi.org/{}", self.value.to_uppercase()))
            }
            IdentifierNamespace::Orcid => {
                Some(format!("https://orcid.org/{}", self.value.to_uppercase()))
            }
            IdentifierNamespace::WikidataQid => {
                Some(format!("https://www.wikidata.org/wiki/{}", self.value))
            }
            IdentifierNamespace::ProfileUrl => Some(self.value.clone()),
            _ => None,
        }
    }
}

/// Classify a raw identifier string.
///
/// Pure and total: always terminates with either exactly one namespace or
/// `None` (unclassifiable). Rules apply in priority order with no
/// fallthrough once matched:
///
/// 1. absolute URL containing the profile path marker -> `profile_url`
/// 2. email address -> `email`
/// 3. `10.<4-9 digits>/<non-whitespace>` -> `doi`
/// 4. `####-####-####-###X` -> `orcid`
/// 5. `Q<digits>` -> `wikidata_qid`
pub fn classify(raw: &str) -> Option<Identifier> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if is_profile_url(raw) {
        return Some(Identifier::new(IdentifierNamespace::ProfileUrl, raw));
    }
    if EMAIL_RE.is_match(raw) {
        return Some(Identifier::new(IdentifierNamespace::Email, raw));
    }
    if DOI_RE.is_match(raw) {
        return Some(Identifier::new(IdentifierNamespace::Doi, raw));
    }
    if ORCID_RE.is_match(raw) {
        return Some(Identifier::new(IdentifierNamespace::Orcid, raw));
    }
    if QID_RE.is_match(raw) {
        return Some(Identifier::new(IdentifierNamespace::WikidataQid, raw));
    }
    None
}

fn is_profile_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && url.path().contains(PROFILE_PATH_MARKER)
        }
        Err(_) => false,
    }
}
