// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact addresses.
//!
//! A URN is written `scheme:path`, optionally followed by `#display`. The
//! display part is a human-readable label and never takes part in identity:
//! two URNs with the same scheme and path are equal whatever their display.
//!
//! Normalization produces the canonical path for a scheme (E.164 for phone
//! numbers, lowercase handles, ...) and never fails. Validation is a
//! separate step, so a normalized URN can be stored even when it is not
//! eligible for sending.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use phonenumber::{Mode, country};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CourierError;

const MAX_PATH_LEN: usize = 255;

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]{1,15}$").expect("valid regex"));
static SCIENTIFIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?e\+?[0-9]+$").expect("valid regex"));
static NON_TEL_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-z+]").expect("valid regex"));
static TWITTER_HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,15}$").expect("valid regex"));
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static ALPHANUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Addressing schemes with dedicated normalization or validation rules.
///
/// Unknown but well-formed schemes are carried as [`Scheme::Other`] and pass
/// through normalization unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    Tel,
    Twitter,
    TwitterId,
    Telegram,
    Facebook,
    WhatsApp,
    Viber,
    Line,
    Mailto,
    Ext,
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Tel => "tel",
            Scheme::Twitter => "twitter",
            Scheme::TwitterId => "twitterid",
            Scheme::Telegram => "telegram",
            Scheme::Facebook => "facebook",
            Scheme::WhatsApp => "whatsapp",
            Scheme::Viber => "viber",
            Scheme::Line => "line",
            Scheme::Mailto => "mailto",
            Scheme::Ext => "ext",
            Scheme::Other(s) => s,
        }
    }
}

impl FromStr for Scheme {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let scheme = match lower.as_str() {
            "tel" => Scheme::Tel,
            "twitter" => Scheme::Twitter,
            "twitterid" => Scheme::TwitterId,
            "telegram" => Scheme::Telegram,
            "facebook" => Scheme::Facebook,
            "whatsapp" => Scheme::WhatsApp,
            "viber" => Scheme::Viber,
            "line" => Scheme::Line,
            "mailto" => Scheme::Mailto,
            "ext" => Scheme::Ext,
            _ if SCHEME_RE.is_match(&lower) => Scheme::Other(lower),
            _ => return Err(CourierError::InvalidUrn(format!("invalid scheme `{s}`"))),
        };
        Ok(scheme)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheme-qualified contact address.
#[derive(Debug, Clone)]
pub struct Urn {
    scheme: Scheme,
    path: String,
    display: Option<String>,
}

impl Urn {
    /// Builds a URN from its parts without normalizing.
    ///
    /// Fails only when the scheme is malformed or the path is empty.
    pub fn from_parts(scheme: &str, path: &str, display: Option<&str>) -> Result<Self, CourierError> {
        let scheme: Scheme = scheme.parse()?;
        if path.trim().is_empty() {
            return Err(CourierError::InvalidUrn(format!("empty path for scheme `{scheme}`")));
        }
        Ok(Urn {
            scheme,
            path: path.to_string(),
            display: display.filter(|d| !d.is_empty()).map(str::to_string),
        })
    }

    /// Parses the `scheme:path#display` string form.
    pub fn parse(s: &str) -> Result<Self, CourierError> {
        let Some((scheme, rest)) = s.split_once(':') else {
            return Err(CourierError::InvalidUrn(format!("`{s}` has no scheme")));
        };
        let (path, display) = match rest.split_once('#') {
            Some((path, display)) => (path, Some(display)),
            None => (rest, None),
        };
        Urn::from_parts(scheme, path, display)
    }

    /// Normalizes a raw address for `scheme`, accepting it with or without
    /// the `scheme:` prefix.
    pub fn normalize_raw(raw: &str, scheme: &str, country: Option<&str>) -> Result<Self, CourierError> {
        let trimmed = raw.trim();
        let prefix = format!("{}:", scheme.trim().to_ascii_lowercase());
        let path = match trimmed.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(&prefix) => &trimmed[prefix.len()..],
            _ => trimmed,
        };
        Ok(Urn::from_parts(scheme, path, None)?.normalize(country))
    }

    /// Builds a normalized `tel` URN for a number seen on a channel in `country`.
    pub fn tel_for_country(number: &str, country: Option<&str>) -> Result<Self, CourierError> {
        Urn::normalize_raw(number, "tel", country)
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    /// Returns a copy with the given display label.
    pub fn with_display(mut self, display: Option<&str>) -> Self {
        self.display = display.filter(|d| !d.is_empty()).map(str::to_string);
        self
    }

    /// The `scheme:path` form, without display.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.scheme, self.path)
    }

    /// Returns the canonical form of this URN. Idempotent, never fails.
    pub fn normalize(&self, country: Option<&str>) -> Urn {
        let path = self.path.trim();
        let (path, display) = match &self.scheme {
            Scheme::Tel => (normalize_number(path, country), self.display.clone()),
            Scheme::Twitter => (strip_handle(path), self.display.clone()),
            Scheme::TwitterId => (
                path.to_string(),
                self.display.as_deref().map(strip_handle),
            ),
            Scheme::Mailto => (path.to_lowercase(), self.display.clone()),
            Scheme::Other(_) => (self.path.clone(), self.display.clone()),
            _ => (path.to_string(), self.display.clone()),
        };
        Urn {
            scheme: self.scheme.clone(),
            path,
            display,
        }
    }

    /// Checks the path against the scheme's rules.
    pub fn validate(&self) -> Result<(), CourierError> {
        let invalid = |why: &str| Err(CourierError::InvalidUrn(format!("{}: {why}", self.identity())));

        if self.path.is_empty() {
            return invalid("empty path");
        }
        if self.path.len() > MAX_PATH_LEN {
            return invalid("path too long");
        }
        match &self.scheme {
            Scheme::Tel => {
                if !self.path.starts_with('+') {
                    return invalid("not in E.164 format");
                }
                match phonenumber::parse(None, &self.path) {
                    Ok(number) if phonenumber::is_valid(&number) => Ok(()),
                    _ => invalid("not a valid phone number"),
                }
            }
            Scheme::Twitter if !TWITTER_HANDLE_RE.is_match(&self.path) => invalid("invalid handle"),
            Scheme::TwitterId | Scheme::Telegram | Scheme::Facebook | Scheme::WhatsApp
                if !NUMERIC_RE.is_match(&self.path) =>
            {
                invalid("must be numeric")
            }
            Scheme::Viber if !ALPHANUMERIC_RE.is_match(&self.path) => invalid("must be alphanumeric"),
            Scheme::Mailto if !EMAIL_RE.is_match(&self.path) => invalid("not an email address"),
            _ => Ok(()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Converts a `tel` URN to the national form used in `country`.
    ///
    /// The result is only used when normalizing it again in the same country
    /// gives back this URN. Every other URN is returned unchanged.
    pub fn localize(&self, country: Option<&str>) -> Urn {
        if self.scheme != Scheme::Tel {
            return self.clone();
        }
        if country_id(country).is_none() {
            return self.clone();
        }
        let Ok(number) = phonenumber::parse(None, &self.path) else {
            return self.clone();
        };
        if !phonenumber::is_valid(&number) {
            return self.clone();
        }
        let national: String = number
            .format()
            .mode(Mode::National)
            .to_string()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();

        if national.is_empty() || normalize_number(&national, country) != self.path {
            return self.clone();
        }
        Urn {
            scheme: Scheme::Tel,
            path: national,
            display: self.display.clone(),
        }
    }

    /// Looks up a named field, as used by templated channel configs.
    pub fn resolve(&self, key: &str) -> Result<String, CourierError> {
        match key {
            "scheme" => Ok(self.scheme.to_string()),
            "path" => Ok(self.path.clone()),
            "display" => Ok(self.display.clone().unwrap_or_default()),
            "urn" => Ok(self.to_string()),
            other => Err(CourierError::UnknownUrnField(other.to_string())),
        }
    }
}

fn country_id(country: Option<&str>) -> Option<country::Id> {
    country
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .and_then(|c| c.to_ascii_uppercase().parse::<country::Id>().ok())
}

fn strip_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

/// Canonicalizes a phone number, falling back to the cleaned input.
fn normalize_number(raw: &str, country: Option<&str>) -> String {
    let mut number = raw.trim().to_lowercase();

    // Spreadsheet exports turn long numbers into 2.50788383383e+11
    if SCIENTIFIC_RE.is_match(&number) {
        if let Ok(value) = number.parse::<f64>() {
            number = format!("{value:.0}");
        }
    }

    let cleaned = NON_TEL_CHARS_RE.replace_all(&number, "");
    let mut cleaned: String = cleaned
        .char_indices()
        .filter(|&(i, c)| c != '+' || i == 0)
        .map(|(_, c)| c)
        .collect();

    let fallback = cleaned.clone();
    if cleaned.len() >= 11 && !cleaned.starts_with('+') && !cleaned.starts_with('0') {
        cleaned.insert(0, '+');
    }

    match phonenumber::parse(country_id(country), &cleaned) {
        Ok(parsed) if phonenumber::is_valid(&parsed) => parsed.format().mode(Mode::E164).to_string(),
        _ => fallback,
    }
}

impl PartialEq for Urn {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.path == other.path
    }
}

impl Eq for Urn {}

impl Hash for Urn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)?;
        if let Some(display) = &self.display {
            write!(f, "#{display}")?;
        }
        Ok(())
    }
}

impl FromStr for Urn {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urn::parse(s)
    }
}

impl Serialize for Urn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Urn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Urn::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tel(number: &str, country: &str) -> String {
        let country = (!country.is_empty()).then_some(country);
        Urn::tel_for_country(number, country).unwrap().to_string()
    }

    #[test]
    fn tel_normalization_table() {
        let cases = [
            ("0788383383", "RW", "tel:+250788383383"),
            (" +250788383383 ", "KE", "tel:+250788383383"),
            ("+250788383383", "", "tel:+250788383383"),
            ("250788383383", "", "tel:+250788383383"),
            ("(917)992-5253", "US", "tel:+19179925253"),
            ("19179925253", "", "tel:+19179925253"),
            ("07531669965", "GB", "tel:+447531669965"),
            ("12345", "RW", "tel:12345"),
            ("0788383383", "", "tel:0788383383"),
            ("0788383383", "ZZ", "tel:0788383383"),
            ("MTN", "RW", "tel:mtn"),
        ];
        for (number, country, expected) in cases {
            assert_eq!(tel(number, country), expected, "normalizing {number:?} in {country:?}");
        }
    }

    #[test]
    fn scientific_notation_is_expanded() {
        assert_eq!(tel("2.50788383383e+11", ""), "tel:+250788383383");
    }

    #[test]
    fn normalize_raw_accepts_prefixed_input() {
        let urn = Urn::normalize_raw("tel:(917)992-5253", "tel", Some("US")).unwrap();
        assert_eq!(urn.identity(), "tel:+19179925253");
    }

    #[test]
    fn normalization_is_idempotent_for_fallbacks() {
        for (raw, country) in [("MTN", Some("RW")), ("12345", Some("RW")), ("0788383383", None)] {
            let once = Urn::tel_for_country(raw, country).unwrap();
            assert_eq!(once.normalize(country), once);
        }
    }

    #[test]
    fn twitter_handles_are_lowercased_and_stripped() {
        let urn = Urn::normalize_raw("@NyaruKa", "twitter", None).unwrap();
        assert_eq!(urn.path(), "nyaruka");
        assert!(urn.is_valid());

        let urn = Urn::from_parts("twitterid", "12345", Some("@Bob")).unwrap().normalize(None);
        assert_eq!(urn.display(), Some("bob"));
    }

    #[test]
    fn mailto_lowercased_ext_preserved() {
        let mail = Urn::normalize_raw("Bob@Example.COM", "mailto", None).unwrap();
        assert_eq!(mail.path(), "bob@example.com");

        let ext = Urn::normalize_raw("CaseSensitive", "ext", None).unwrap();
        assert_eq!(ext.path(), "CaseSensitive");
    }

    #[test]
    fn unknown_schemes_pass_through() {
        let urn = Urn::from_parts("jiochat", "AbC ", None).unwrap();
        assert_eq!(urn.normalize(None).path(), "AbC ");
        assert!(urn.normalize(None).is_valid());
    }

    #[test]
    fn display_does_not_affect_equality() {
        let a = Urn::parse("telegram:12345#bob").unwrap();
        let b = Urn::parse("telegram:12345").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "telegram:12345#bob");
        assert_eq!(a.identity(), "telegram:12345");
    }

    #[test]
    fn validation_per_scheme() {
        assert!(Urn::parse("tel:+250788383383").unwrap().is_valid());
        assert!(!Urn::parse("tel:0788383383").unwrap().is_valid());
        assert!(!Urn::parse("tel:mtn").unwrap().is_valid());
        assert!(!Urn::parse("twitter:this_handle_is_too_long").unwrap().is_valid());
        assert!(!Urn::parse("telegram:abc").unwrap().is_valid());
        assert!(!Urn::parse("whatsapp:+250788383383").unwrap().is_valid());
        assert!(Urn::parse("whatsapp:250788383383").unwrap().is_valid());
        assert!(!Urn::parse("viber:abc-def").unwrap().is_valid());
        assert!(!Urn::parse("mailto:nobody").unwrap().is_valid());
    }

    #[test]
    fn from_parts_rejects_empty_path_and_bad_scheme() {
        assert!(Urn::from_parts("tel", "  ", None).is_err());
        assert!(Urn::from_parts("t el", "123", None).is_err());
        assert!(Urn::parse("no-scheme-here").is_err());
    }

    #[test]
    fn localize_round_trips_through_normalize() {
        let urn = Urn::parse("tel:+250788383383").unwrap();
        let local = urn.localize(Some("RW"));
        assert_eq!(local.path(), "0788383383");
        assert_eq!(local.normalize(Some("RW")), urn);
    }

    #[test]
    fn localize_uses_national_formats() {
        for (e164, country, national) in [
            ("tel:+19179925253", "US", "9179925253"),
            ("tel:+447531669965", "GB", "07531669965"),
            ("tel:+250788383383", "RW", "0788383383"),
        ] {
            let urn = Urn::parse(e164).unwrap();
            let local = urn.localize(Some(country));
            assert_eq!(local.path(), national, "{e164} in {country}");
            assert_eq!(local.normalize(Some(country)), urn);
        }
    }

    #[test]
    fn scheme_case_is_folded_path_case_is_kept() {
        let upper = Urn::from_parts("Tel", "+250788383383", None).unwrap();
        assert_eq!(upper, Urn::parse("tel:+250788383383").unwrap());
        assert_eq!(upper.to_string(), "tel:+250788383383");

        let ext = Urn::from_parts("EXT", "AbC", None).unwrap();
        assert_eq!(ext.to_string(), "ext:AbC");
        assert_ne!(ext, Urn::parse("ext:abc").unwrap());
    }

    #[test]
    fn localize_leaves_other_urns_unchanged() {
        let urn = Urn::parse("telegram:12345").unwrap();
        assert_eq!(urn.localize(Some("RW")), urn);

        let invalid = Urn::parse("tel:12345").unwrap();
        assert_eq!(invalid.localize(Some("RW")), invalid);

        let no_country = Urn::parse("tel:+250788383383").unwrap();
        assert_eq!(no_country.localize(None), no_country);
    }

    #[test]
    fn resolve_known_and_unknown_keys() {
        let urn = Urn::parse("tel:+250788383383#Bob").unwrap();
        assert_eq!(urn.resolve("scheme").unwrap(), "tel");
        assert_eq!(urn.resolve("path").unwrap(), "+250788383383");
        assert_eq!(urn.resolve("display").unwrap(), "Bob");
        assert_eq!(urn.resolve("urn").unwrap(), "tel:+250788383383#Bob");
        assert!(matches!(
            urn.resolve("country"),
            Err(CourierError::UnknownUrnField(k)) if k == "country"
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let urn = Urn::parse("telegram:42#alice").unwrap();
        let json = serde_json::to_string(&urn).unwrap();
        assert_eq!(json, "\"telegram:42#alice\"");
        let back: Urn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.display(), Some("alice"));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        const COUNTRIES: [&str; 4] = ["US", "RW", "EC", "GB"];

        /// Local numbers in the shapes each country hands out, plus arbitrary digits.
        fn local_number() -> impl Strategy<Value = (String, &'static str)> {
            prop_oneof![
                "[0-9]{7}".prop_map(|tail| (format!("078{tail}"), "RW")),
                "[2-9][0-9]{6}".prop_map(|tail| (format!("(917) {tail}"), "US")),
                "[0-9]{8}".prop_map(|tail| (format!("09{tail}"), "EC")),
                "[4-9][0-9]{8}".prop_map(|tail| (format!("07{tail}"), "GB")),
                ("[0-9]{3,13}", prop::sample::select(COUNTRIES.to_vec())),
            ]
        }

        proptest! {
            #[test]
            fn tel_localize_round_trips((raw, country) in local_number()) {
                let country = Some(country);
                let normalized = Urn::tel_for_country(&raw, country).unwrap();
                let local = normalized.localize(country);
                prop_assert_eq!(local.normalize(country).identity(), normalized.identity());
            }

            #[test]
            fn other_schemes_localize_round_trips(
                scheme in prop::sample::select(vec!["telegram", "twitter", "twitterid", "mailto", "ext", "viber", "jiochat"]),
                path in "[A-Za-z0-9@._]{1,15}",
                country in prop::sample::select(COUNTRIES.to_vec()),
            ) {
                let country = Some(country);
                let normalized = Urn::normalize_raw(&path, scheme, country).unwrap();
                let local = normalized.localize(country);
                prop_assert_eq!(&local, &normalized);
                prop_assert_eq!(local.normalize(country).identity(), normalized.identity());
            }

            #[test]
            fn tel_normalize_is_idempotent(raw in r"\+?[0-9]{1,15}", country in prop::sample::select(vec!["RW", "US", "GB", ""])) {
                let country = (!country.is_empty()).then_some(country);
                if let Ok(once) = Urn::tel_for_country(&raw, country) {
                    let twice = once.normalize(country);
                    prop_assert_eq!(twice.path(), once.path());
                }
            }
        }
    }
}
