use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;

static ISO8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2}):(\d{2})(?:[.,](\d{1,9}))?(Z|[+-]\d{2}:?\d{2})?",
    )
    .expect("valid ISO-8601 regex")
});

static SYSLOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][a-z]{2})\s+(\d{1,2})\s+(\d{2}):(\d{2}):(\d{2})")
        .expect("valid syslog regex")
});

static EPOCH_MILLIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{13})(?:[^\d]|$)").expect("valid epoch regex"));

/// Accepted timestamp layouts, tried in configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2024-03-01 10:00:00,123`, `2024-03-01T10:00:00.123+02:00`
    Iso8601,
    /// `Mar  1 10:00:00` (year supplied by configuration)
    Syslog,
    /// `1709287200123`
    EpochMillis,
    /// `03/01/2024 01:15:00 PM`, the iostat sample time in the host's locale
    IostatLocale,
}

impl TimestampFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampFormat::Iso8601 => "iso8601",
            TimestampFormat::Syslog => "syslog",
            TimestampFormat::EpochMillis => "epoch_millis",
            TimestampFormat::IostatLocale => "iostat_locale",
        }
    }

    /// Parse a timestamp at the start of `text`.
    ///
    /// Returns the instant and the remainder of the text after the timestamp.
    pub fn parse_prefix<'a>(
        &self,
        text: &'a str,
        syslog_year: i32,
    ) -> Option<(DateTime<Utc>, &'a str)> {
        match self {
            TimestampFormat::Iso8601 => {
                let caps = ISO8601.captures(text)?;
                let end = caps.get(0)?.end();
                Some((parse_iso(&caps)?, &text[end..]))
            }
            TimestampFormat::Syslog => {
                let caps = SYSLOG.captures(text)?;
                let end = caps.get(0)?.end();
                Some((parse_syslog(&caps, syslog_year)?, &text[end..]))
            }
            TimestampFormat::EpochMillis => {
                let caps = EPOCH_MILLIS.captures(text)?;
                let digits = caps.get(1)?;
                let millis: i64 = digits.as_str().parse().ok()?;
                let at = Utc.timestamp_millis_opt(millis).single()?;
                Some((at, &text[digits.end()..]))
            }
            // Whole-line format: nothing follows the sample time
            TimestampFormat::IostatLocale => {
                let (at, _) = parse_iostat_date(text, IOSTAT_DATE_FORMATS)?;
                Some((at, ""))
            }
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn parse_iso(caps: &Captures<'_>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(num(caps, 1)?, num(caps, 2)?, num(caps, 3)?)?;
    let nanos = match caps.get(7) {
        Some(frac) => {
            let digits = frac.as_str();
            let padded = format!("{:0<9}", digits);
            padded.parse::<u32>().ok()?
        }
        None => 0,
    };
    let naive = date.and_hms_nano_opt(num(caps, 4)?, num(caps, 5)?, num(caps, 6)?, nanos)?;

    match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => Some(Utc.from_utc_datetime(&naive)),
        Some(offset) => {
            let offset = parse_offset(offset)?;
            let local = offset.from_local_datetime(&naive).single()?;
            Some(local.with_timezone(&Utc))
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_syslog(caps: &Captures<'_>, year: i32) -> Option<DateTime<Utc>> {
    let month = match caps.get(1)?.as_str() {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let date = NaiveDate::from_ymd_opt(year, month, num(caps, 2)?)?;
    let naive = date.and_hms_opt(num(caps, 3)?, num(caps, 4)?, num(caps, 5)?)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Timestamp parsing options (the `[timestamps]` configuration section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Formats tried, in order, on the first record of each file
    pub formats: Vec<TimestampFormat>,
    /// Year used for syslog-style timestamps (which carry none).
    /// Defaults to the current UTC year.
    pub syslog_year: Option<i32>,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            formats: vec![
                TimestampFormat::Iso8601,
                TimestampFormat::Syslog,
                TimestampFormat::EpochMillis,
            ],
            syslog_year: None,
        }
    }
}

impl TimestampConfig {
    /// Create a fresh per-file parser
    pub fn parser(&self) -> TimestampParser {
        TimestampParser {
            formats: self.formats.clone(),
            syslog_year: self.syslog_year.unwrap_or_else(|| Utc::now().year()),
            locked: None,
            iostat_layout: None,
        }
    }
}

/// Per-file timestamp parser.
///
/// Files are assumed internally consistent: the first format that matches is
/// locked and every later timestamp in the file must use it.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    formats: Vec<TimestampFormat>,
    syslog_year: i32,
    locked: Option<TimestampFormat>,
    iostat_layout: Option<&'static str>,
}

impl TimestampParser {
    pub fn parse_prefix<'a>(&mut self, text: &'a str) -> Option<(DateTime<Utc>, &'a str)> {
        if let Some(format) = self.locked {
            return format.parse_prefix(text, self.syslog_year);
        }
        for format in &self.formats {
            if let Some(parsed) = format.parse_prefix(text, self.syslog_year) {
                self.locked = Some(*format);
                return Some(parsed);
            }
        }
        None
    }

    /// Parse a field that must consist of a timestamp only
    pub fn parse_exact(&mut self, text: &str) -> Option<DateTime<Utc>> {
        let (at, rest) = self.parse_prefix(text.trim())?;
        rest.trim().is_empty().then_some(at)
    }

    /// Parse an iostat sample time line.
    ///
    /// The first layout that matches is locked alongside the format, so a file
    /// that started as DD/MM never reads a later date as MM/DD.
    pub fn parse_iostat(&mut self, line: &str) -> Option<DateTime<Utc>> {
        if self
            .locked
            .is_some_and(|format| format != TimestampFormat::IostatLocale)
        {
            return None;
        }
        let layouts = match &self.iostat_layout {
            Some(layout) => std::slice::from_ref(layout),
            None => IOSTAT_DATE_FORMATS,
        };
        let (at, layout) = parse_iostat_date(line, layouts)?;
        self.locked = Some(TimestampFormat::IostatLocale);
        self.iostat_layout = Some(layout);
        Some(at)
    }

    /// Format matched for this file, if any record has been parsed
    pub fn matched(&self) -> Option<TimestampFormat> {
        self.locked
    }
}

/// iostat writes its sample time in the collecting host's locale.
/// Tried in order: US 12-hour, EU 24-hour, US 24-hour.
const IOSTAT_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y %I:%M:%S %p",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%y %H:%M:%S",
];

fn parse_iostat_date(
    line: &str,
    layouts: &[&'static str],
) -> Option<(DateTime<Utc>, &'static str)> {
    let line = line.trim();
    layouts.iter().find_map(|layout| {
        let naive = NaiveDateTime::parse_from_str(line, layout).ok()?;
        Some((Utc.from_utc_datetime(&naive), *layout))
    })
}
