//! URL handling
//!
//! Canonical URL form, crawlability checks, registrable-domain grouping
//! and scope matching.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, registrable_domain, url_registrable_domain};
pub use matcher::{matches_wildcard, ScopeMatcher};
pub use normalize::{is_valid_url, normalize_url, Normalizer, MAX_URL_LENGTH};
