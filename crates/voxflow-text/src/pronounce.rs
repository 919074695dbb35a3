//! Pronunciation normalizers
//!
//! Each normalizer rewrites one category of text into a form a TTS voice
//! reads naturally. They are selected by id from
//! `speaker.pronunciation.dictionaries` and applied in configuration order.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::numbers::number_to_words;

pub(crate) type Pronouncer = fn(&str) -> String;

/// Resolve a normalizer id; unknown ids are skipped by the caller
pub(crate) fn lookup(id: &str) -> Option<Pronouncer> {
    match id {
        "url" => Some(pronounce_urls),
        "currency" => Some(pronounce_currency),
        "date" => Some(pronounce_dates),
        "time" => Some(pronounce_times),
        "number" => Some(pronounce_numbers),
        "symbol" => Some(pronounce_symbols),
        "general" => Some(pronounce_general),
        "role" => Some(pronounce_roles),
        "tech" => Some(pronounce_tech),
        "address" => Some(pronounce_addresses),
        _ => None,
    }
}

static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}").expect("domain regex")
});

/// Spell domain dots: `www.example.com` → `www dot example dot com`
fn pronounce_urls(text: &str) -> String {
    DOMAIN
        .replace_all(text, |caps: &Captures| {
            let m = caps.get(0).unwrap().as_str();
            let (scheme, host) = match m.find("://") {
                Some(i) => m.split_at(i + 3),
                None => ("", m),
            };
            format!("{}{}", scheme, host.replace('.', " dot "))
        })
        .into_owned()
}

static CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d{1,3}(?:,\d{3})*|\d+)(?:\.(\d{2}))?").expect("currency regex"));

/// `$10.50` → `ten dollars and fifty cents`
fn pronounce_currency(text: &str) -> String {
    CURRENCY
        .replace_all(text, |caps: &Captures| {
            let dollars: u64 = caps[1].replace(',', "").parse().unwrap_or(0);
            let unit = if dollars == 1 { "dollar" } else { "dollars" };
            let mut spoken = format!("{} {}", number_to_words(dollars), unit);
            if let Some(cents) = caps.get(2) {
                let cents: u64 = cents.as_str().parse().unwrap_or(0);
                if cents > 0 {
                    let cent_unit = if cents == 1 { "cent" } else { "cents" };
                    spoken = format!("{spoken} and {} {}", number_to_words(cents), cent_unit);
                }
            }
            spoken
        })
        .into_owned()
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("date regex"));

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// `2024-01-15` → `January 15, 2024`
fn pronounce_dates(text: &str) -> String {
    ISO_DATE
        .replace_all(text, |caps: &Captures| {
            let month: usize = caps[2].parse().unwrap_or(0);
            if !(1..=12).contains(&month) {
                return caps[0].to_string();
            }
            let day: u32 = caps[3].parse().unwrap_or(0);
            format!("{} {}, {}", MONTHS[month - 1], day, &caps[1])
        })
        .into_owned()
}

static CLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("time regex"));

/// `10:30` → `ten thirty`, `10:00` → `ten o'clock`, `10:05` → `ten oh five`
fn pronounce_times(text: &str) -> String {
    CLOCK
        .replace_all(text, |caps: &Captures| {
            let hour: u64 = caps[1].parse().unwrap_or(0);
            let minute: u64 = caps[2].parse().unwrap_or(0);
            if hour > 23 || minute > 59 {
                return caps[0].to_string();
            }
            match minute {
                0 => format!("{} o'clock", number_to_words(hour)),
                m if m < 10 => format!("{} oh {}", number_to_words(hour), number_to_words(m)),
                m => format!("{} {}", number_to_words(hour), number_to_words(m)),
            }
        })
        .into_owned()
}

static BIG_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+\b|\b\d{4,9}\b").expect("number regex"));

/// Spell thousands-and-up integers
fn pronounce_numbers(text: &str) -> String {
    BIG_NUMBER
        .replace_all(text, |caps: &Captures| {
            match caps[0].replace(',', "").parse::<u64>() {
                Ok(n) => number_to_words(n),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Speak common symbols
fn pronounce_symbols(text: &str) -> String {
    text.replace('&', " and ")
        .replace('%', " percent")
        .replace('@', " at ")
        .replace('#', " number ")
        .replace('+', " plus ")
}

static GENERAL_ABBREV: &[(&str, &str)] = &[
    ("Dr.", "Doctor"),
    ("Mr.", "Mister"),
    ("Mrs.", "Misses"),
    ("Ms.", "Miss"),
    ("etc.", "et cetera"),
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("vs.", "versus"),
];

/// Expand everyday abbreviations
fn pronounce_general(text: &str) -> String {
    let mut out = text.to_string();
    for (abbrev, full) in GENERAL_ABBREV {
        out = out.replace(abbrev, full);
    }
    out
}

static ROLES: &[&str] = &["CEO", "CTO", "CFO", "COO", "CIO", "VP", "HR", "PM"];

/// Spell job-title initialisms letter by letter
fn pronounce_roles(text: &str) -> String {
    spell_words(text, ROLES)
}

static TECH_TERMS: &[&str] = &[
    "API", "URL", "HTML", "CSS", "JSON", "SQL", "SDK", "AI", "UI", "FAQ", "CLI",
];

/// Spell technical initialisms letter by letter
fn pronounce_tech(text: &str) -> String {
    spell_words(text, TECH_TERMS)
}

static ADDRESS_ABBREV: &[(&str, &str)] = &[
    ("Ave.", "Avenue"),
    ("Blvd.", "Boulevard"),
    ("Rd.", "Road"),
    ("St.", "Street"),
    ("Apt.", "Apartment"),
    ("Ste.", "Suite"),
    ("Hwy.", "Highway"),
];

/// Expand postal abbreviations
fn pronounce_addresses(text: &str) -> String {
    let mut out = text.to_string();
    for (abbrev, full) in ADDRESS_ABBREV {
        out = out.replace(abbrev, full);
    }
    out
}

fn spell_words(text: &str, words: &[&str]) -> String {
    let mut out = text.to_string();
    for word in words {
        let spelled: Vec<String> = word.chars().map(|c| c.to_string()).collect();
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(word))).expect("spell regex");
        out = pattern.replace_all(&out, spelled.join(" ")).into_owned();
    }
    out
}
