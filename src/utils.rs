use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static FISCAL_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());
/// Split fiscal years such as "2023-24" or "2023/24".
static SPLIT_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(20\d{2})\s*[-/\x{2013}]\s*(\d{2})\b").unwrap());

const YEAR_END_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
];

/// Extracts the JSON object or array from model output that may be wrapped
/// in markdown fences or surrounded by commentary. The outermost span that
/// parses wins; otherwise the object span is returned as is.
pub fn clean_json_output(raw: &str) -> String {
    let raw = raw.trim();
    let span = |open: char, close: char| -> Option<(usize, &str)> {
        let start = raw.find(open)?;
        let end = raw.rfind(close)?;
        (end > start).then(|| (start, &raw[start..=end]))
    };

    let mut spans: Vec<(usize, &str)> = [span('{', '}'), span('[', ']')].into_iter().flatten().collect();
    spans.sort_by_key(|(start, _)| *start);

    if let Some((_, parsed)) = spans
        .iter()
        .find(|(_, text)| serde_json::from_str::<serde_json::Value>(text).is_ok())
    {
        return parsed.to_string();
    }
    match span('{', '}').or_else(|| span('[', ']')) {
        Some((_, text)) => text.to_string(),
        None => raw.to_string(),
    }
}

/// Reduces an oracle year label to its 4-digit fiscal year.
///
/// `FY` prefixes are dropped and the last `20xx` year wins, so
/// "fiscal year ended January 28, 2024" and "FY2023-2024" both become
/// "2024". A split year such as "2023-24" reads as its closing year.
/// Labels without such a year are returned trimmed.
pub fn normalize_year_label(label: &str) -> String {
    let label = label.trim().replace("FY ", "").replace("FY", "");
    let label = SPLIT_YEAR.replace_all(&label, |c: &regex::Captures| {
        split_year_bounds(c).1.to_string()
    });
    FISCAL_YEAR
        .captures_iter(&label)
        .last()
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

fn split_year_bounds(captures: &regex::Captures) -> (i32, i32) {
    let start: i32 = captures[1].parse().unwrap_or_default();
    let mut end = start - start % 100 + captures[2].parse::<i32>().unwrap_or_default();
    if end <= start {
        end += 100;
    }
    (start, end)
}

/// Parses the year-end date in the formats annual reports commonly print.
pub fn parse_year_end(year_end: &str) -> Option<NaiveDate> {
    let cleaned = year_end
        .trim()
        .trim_start_matches("As at")
        .trim_start_matches("As on")
        .trim_start_matches("Year ended")
        .trim();
    YEAR_END_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

/// Year label for a record: the normalized label when it carries a 4-digit
/// year, otherwise the year of the parsed year-end date.
///
/// For a split label like "FY 2023-24" the year-end date decides between the
/// two years when it falls on one of them; otherwise the closing year is used.
pub fn resolve_year_label(label: &str, year_end: &str) -> String {
    let year_end = parse_year_end(year_end).map(|date| date.year());

    if let (Some(captures), Some(year)) = (SPLIT_YEAR.captures(label), year_end) {
        let (start, end) = split_year_bounds(&captures);
        if (start..=end).contains(&year) {
            return year.to_string();
        }
    }

    let normalized = normalize_year_label(label);
    if FISCAL_YEAR.is_match(&normalized) {
        return normalized;
    }
    match year_end {
        Some(year) => year.to_string(),
        None => normalized,
    }
}
