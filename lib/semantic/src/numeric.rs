//! Regex extractors for price, guest count, night count and stay dates
//!
//! All extractors return `None` when nothing is recognized; none of them
//! can fail.

use chrono::{Duration, Local, NaiveDate};
use nestfind_core::text::normalize;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

const CURRENCY: &str = r"(?:€|\$|eur|usd|euros?|dollars?)";

fn price_regex(template: &str) -> Regex {
    Regex::new(&template.replace("{CUR}", CURRENCY)).expect("valid price regex")
}

static PRICE_BETWEEN: Lazy<Regex> = Lazy::new(|| {
    price_regex(r"(?:between|from)\s*{CUR}?\s*(\d{2,6})\s*(?:and|to|-)\s*{CUR}?\s*(\d{2,6})")
});
static PRICE_AT_MOST: Lazy<Regex> = Lazy::new(|| {
    price_regex(r"(?:up to|under|below|less than|max(?:imum)?|cheaper than)\s*{CUR}?\s*(\d{2,6})")
});
static PRICE_AT_LEAST: Lazy<Regex> =
    Lazy::new(|| price_regex(r"(?:at least|min(?:imum)?|more than|above|over)\s*{CUR}?\s*(\d{2,6})"));
static PRICE_PER_NIGHT: Lazy<Regex> = Lazy::new(|| {
    price_regex(r"(?:{CUR}?\s*(\d{2,6})\s*(?:per\s*night|/night)|budget\s*{CUR}?\s*(\d{2,6}))")
});
static PRICE_BARE: Lazy<Regex> =
    Lazy::new(|| price_regex(r"(?:{CUR}\s*(\d{2,6})|(\d{2,6})\s*{CUR})"));

static GUESTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3})\s*(?:guests?|people|adults|persons?)\b").expect("valid guests regex")
});
static NIGHTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})\s*nights?\b").expect("valid nights regex"));
static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)from\s+([^\n,;]+?)\s+to\s+([^\n,;]+)").expect("valid date range regex")
});
static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid ordinal regex"));

/// Longest date phrase tried at the start of the "to ..." clause
const MAX_DATE_WORDS: usize = 4;

fn first_number(caps: &regex::Captures<'_>, groups: &[usize]) -> Option<f64> {
    groups
        .iter()
        .find_map(|&g| caps.get(g))
        .and_then(|m| m.as_str().parse().ok())
}

/// Price bounds in priority order: range, upper bound, lower bound,
/// per-night or budget amount, bare currency amount. First match wins.
pub fn extract_price_range(text: &str) -> (Option<f64>, Option<f64>) {
    let t = normalize(text);

    if let Some(caps) = PRICE_BETWEEN.captures(&t) {
        if let (Some(lo), Some(hi)) = (first_number(&caps, &[1]), first_number(&caps, &[2])) {
            return (Some(lo.min(hi)), Some(lo.max(hi)));
        }
    }
    if let Some(caps) = PRICE_AT_MOST.captures(&t) {
        return (None, first_number(&caps, &[1]));
    }
    if let Some(caps) = PRICE_AT_LEAST.captures(&t) {
        return (first_number(&caps, &[1]), None);
    }
    if let Some(caps) = PRICE_PER_NIGHT.captures(&t) {
        return (None, first_number(&caps, &[1, 2]));
    }
    if let Some(caps) = PRICE_BARE.captures(&t) {
        return (None, first_number(&caps, &[1, 2]));
    }
    (None, None)
}

pub fn extract_guests(text: &str) -> Option<u32> {
    GUESTS
        .captures(&normalize(text))
        .and_then(|c| c[1].parse().ok())
}

pub fn extract_nights(text: &str) -> Option<u32> {
    NIGHTS
        .captures(&normalize(text))
        .and_then(|c| c[1].parse().ok())
}

/// Turns a date phrase into a calendar date.
pub trait DateResolver: Send + Sync {
    fn resolve(&self, text: &str) -> Option<NaiveDate>;

    /// The day relative phrases are resolved against right now.
    fn reference(&self) -> NaiveDate;
}

/// Resolves ISO dates, `dd/mm/yyyy`, `Month d[, yyyy]`, `d Month [yyyy]`,
/// `today` and `tomorrow`. Dates without a year take the reference year.
///
/// The default resolver follows the local clock, so a long-lived index
/// keeps resolving "tomorrow" against the day the query arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChronoDateResolver {
    // None: read the local clock on every call
    fixed: Option<NaiveDate>,
}

impl ChronoDateResolver {
    /// Anchored at a fixed day.
    pub fn new(reference: NaiveDate) -> Self {
        Self {
            fixed: Some(reference),
        }
    }

    /// Anchored at the local date of each call.
    pub fn live() -> Self {
        Self { fixed: None }
    }

    pub fn is_live(&self) -> bool {
        self.fixed.is_none()
    }
}

impl DateResolver for ChronoDateResolver {
    fn reference(&self) -> NaiveDate {
        self.fixed.unwrap_or_else(|| Local::now().date_naive())
    }

    fn resolve(&self, text: &str) -> Option<NaiveDate> {
        let reference = self.reference();
        let cleaned = normalize(text);
        let cleaned = cleaned.trim_matches(|c: char| !c.is_alphanumeric());
        let cleaned = ORDINAL.replace_all(cleaned, "$1").replace(',', " ");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        match cleaned.as_str() {
            "today" | "tonight" => return Some(reference),
            "tomorrow" => return Some(reference + Duration::days(1)),
            _ => {}
        }

        const WITH_YEAR: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%B %d %Y", "%d %B %Y"];
        const WITHOUT_YEAR: &[&str] = &["%B %d %Y", "%d %B %Y"];

        WITH_YEAR
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(&cleaned, f).ok())
            .or_else(|| {
                let with_year = format!("{} {}", cleaned, reference.format("%Y"));
                WITHOUT_YEAR
                    .iter()
                    .find_map(|f| NaiveDate::parse_from_str(&with_year, f).ok())
            })
    }
}

/// A resolved "from A to B" stay range.
#[derive(Debug, Clone, PartialEq)]
pub struct StayDates {
    pub checkin: NaiveDate,
    /// Always after `checkin`
    pub checkout: NaiveDate,
    /// Byte span of the recognized phrase in the input
    pub span: Range<usize>,
}

impl StayDates {
    pub fn nights(&self) -> u32 {
        u32::try_from((self.checkout - self.checkin).num_days()).unwrap_or(0)
    }
}

/// Find a "from DATE to DATE" range. The checkout side is matched against
/// progressively shorter word prefixes so trailing text is tolerated.
pub fn extract_stay_dates(text: &str, resolver: &dyn DateResolver) -> Option<StayDates> {
    let caps = DATE_RANGE.captures(text)?;
    let whole = caps.get(0)?;
    let checkin = resolver.resolve(caps.get(1)?.as_str())?;

    let tail = caps.get(2)?;
    let word_ends: Vec<usize> = tail
        .as_str()
        .split_whitespace()
        .scan(0usize, |offset, word| {
            let start = tail.as_str()[*offset..].find(word)? + *offset;
            *offset = start + word.len();
            Some(*offset)
        })
        .take(MAX_DATE_WORDS)
        .collect();

    let (checkout, end) = word_ends.iter().rev().find_map(|&end| {
        resolver
            .resolve(&tail.as_str()[..end])
            .map(|d| (d, tail.start() + end))
    })?;

    let checkout = if checkout <= checkin {
        checkin + Duration::days(1)
    } else {
        checkout
    };
    Some(StayDates {
        checkin,
        checkout,
        span: whole.start()..end,
    })
}

/// Every regex-derived field of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericFields {
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub guests: Option<u32>,
    /// Explicit count, else the length of the stay range
    pub nights: Option<u32>,
    pub dates: Option<StayDates>,
}

pub fn extract_numeric(text: &str, resolver: &dyn DateResolver) -> NumericFields {
    let dates = extract_stay_dates(text, resolver);

    // Digits inside a recognized date range are not prices
    let price_text = match &dates {
        Some(d) => format!("{} {}", &text[..d.span.start], &text[d.span.end..]),
        None => text.to_string(),
    };
    let (price_min, price_max) = extract_price_range(&price_text);

    let nights = extract_nights(text).or_else(|| dates.as_ref().map(StayDates::nights));
    NumericFields {
        price_min,
        price_max,
        guests: extract_guests(text),
        nights,
        dates,
    }
}
