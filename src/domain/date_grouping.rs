use std::{collections::{BTreeMap, BTreeSet}, fmt, str::FromStr};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{entities::photo::Photo, errors::DateError};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const WEEKDAY_LABELS: [&str; 7] = ["일", "월", "화", "수", "목", "금", "토"];

pub const DEFAULT_EPOCH: DateKey = match NaiveDate::from_ymd_opt(2023, 6, 26) {
    Some(date) => DateKey(date),
    None => panic!("invalid default epoch"),
};

/// Canonical `YYYY-MM-DD` calendar day a record is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Result<Self, DateError> {
        if !(0..=9999).contains(&date.year()) {
            return Err(DateError::InvalidDateKey(date.to_string()));
        }
        Ok(DateKey(date))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DateError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| DateError::InvalidDateKey(format!("{year}-{month}-{day}")))
            .and_then(DateKey::new)
    }

    pub fn parse(raw: &str) -> Result<Self, DateError> {
        let trimmed = raw.trim();
        if trimmed.len() != 10 {
            return Err(DateError::InvalidDateKey(raw.to_string()));
        }
        NaiveDate::parse_from_str(trimmed, DATE_KEY_FORMAT)
            .map_err(|_| DateError::InvalidDateKey(raw.to_string()))
            .and_then(DateKey::new)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// CDN folder for media grouped under this day, `YYYY/MM/DD`.
    pub fn folder(&self) -> String {
        self.0.format("%Y/%m/%d").to_string()
    }

    pub fn weekday_label(&self) -> &'static str {
        WEEKDAY_LABELS[self.0.weekday().num_days_from_sunday() as usize]
    }

    pub fn next_day(&self) -> Option<DateKey> {
        self.0.succ_opt().and_then(|d| DateKey::new(d).ok())
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateKey::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateKey::parse(&raw).map_err(de::Error::custom)
    }
}

/// Time zone whose wall-clock calendar defines "local" day boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl CalendarZone {
    fn local_date<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> NaiveDate {
        match self {
            CalendarZone::Local => instant.with_timezone(&Local).date_naive(),
            CalendarZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }
}

/// Where day 0 of the elapsed-time label sits relative to the epoch.
///
/// `EpochDay` counts the epoch itself as day 0, so the following day is
/// "1일". `DayAfterEpoch` shifts the epoch forward by one day before the
/// calendar subtraction, so the day after the epoch reads "0일".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochConvention {
    #[default]
    EpochDay,
    /// Counts from the first full day after birth, as the album's web
    /// client has always labelled photos. Set `epoch_convention =
    /// "day_after_epoch"` to keep those labels.
    DayAfterEpoch,
}

/// Age / D-Day label of a day relative to the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeLabel {
    /// On or after the epoch: calendar-aware months and days elapsed.
    Elapsed { months: i32, days: i32 },
    /// Before the epoch: whole days remaining.
    Countdown { days: i64 },
}

impl fmt::Display for RelativeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeLabel::Elapsed { months, days } if *months > 0 => {
                write!(f, "{}개월 {}일", months, days)
            }
            RelativeLabel::Elapsed { days, .. } => write!(f, "{}일", days),
            RelativeLabel::Countdown { days } => write!(f, "D-{}", days),
        }
    }
}

/// Number of days in `month` (1-based) of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

fn days_in_previous_month(year: i32, month: u32) -> u32 {
    if month <= 1 {
        days_in_month(year - 1, 12)
    } else {
        days_in_month(year, month - 1)
    }
}

/// Calendar subtraction `to - from` as (total months, days).
///
/// Borrows at most one month for the day component, so month-end
/// epochs can yield a negative day count.
fn calendar_diff(from: NaiveDate, to: NaiveDate) -> (i32, i32) {
    let mut years = to.year() - from.year();
    let mut months = to.month() as i32 - from.month() as i32;
    let mut days = to.day() as i32 - from.day() as i32;

    if days < 0 {
        months -= 1;
        days += days_in_previous_month(to.year(), to.month()) as i32;
    }

    if months < 0 {
        years -= 1;
        months += 12;
    }

    (years * 12 + months, days)
}

/// Relative label of `target` against `epoch` under `convention`.
pub fn compute_relative_label(
    target: DateKey,
    epoch: DateKey,
    convention: EpochConvention,
) -> RelativeLabel {
    if target < epoch {
        let remaining = (epoch.date() - target.date()).num_days();
        return RelativeLabel::Countdown { days: remaining };
    }

    let start = match convention {
        EpochConvention::EpochDay => epoch.date(),
        EpochConvention::DayAfterEpoch => epoch.date() + Duration::days(1),
    };

    if target.date() < start {
        return RelativeLabel::Elapsed { months: 0, days: 0 };
    }

    let (months, days) = calendar_diff(start, target.date());
    RelativeLabel::Elapsed { months, days }
}

/// Photos sharing one timeline bucket.
#[derive(Debug)]
pub struct DayGroup<'a> {
    pub date: DateKey,
    pub label: RelativeLabel,
    pub photos: Vec<&'a Photo>,
    pub albums: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: DateKey,
    pub photo_count: usize,
    pub cover_photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    /// Empty cells before day 1 in a Sunday-first grid.
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
}

/// Derives day keys and relative labels. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct DateGroupingEngine {
    zone: CalendarZone,
    epoch: DateKey,
    convention: EpochConvention,
}

impl DateGroupingEngine {
    pub fn new(epoch: DateKey) -> Self {
        DateGroupingEngine {
            zone: CalendarZone::default(),
            epoch,
            convention: EpochConvention::default(),
        }
    }

    pub fn with_zone(mut self, zone: CalendarZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_convention(mut self, convention: EpochConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn epoch(&self) -> DateKey {
        self.epoch
    }

    pub fn convention(&self) -> EpochConvention {
        self.convention
    }

    pub fn set_epoch(&mut self, epoch: DateKey) {
        self.epoch = epoch;
    }

    pub fn date_key_for<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> Result<DateKey, DateError> {
        DateKey::new(self.zone.local_date(instant))
    }

    pub fn date_key_for_millis(&self, millis: i64) -> Result<DateKey, DateError> {
        let instant = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| DateError::InvalidTimestamp(millis.to_string()))?;
        self.date_key_for(&instant)
    }

    /// Local calendar day of an ISO-8601 timestamp or epoch-millisecond string.
    ///
    /// Offset-bearing timestamps are converted into the engine's zone;
    /// naive date-times and bare dates are taken as already local.
    pub fn derive_date_key(&self, timestamp: &str) -> Result<DateKey, DateError> {
        let raw = timestamp.trim();
        let invalid = || DateError::InvalidTimestamp(timestamp.to_string());

        if raw.is_empty() {
            return Err(invalid());
        }

        if raw.bytes().enumerate().all(|(i, b)| b.is_ascii_digit() || (i == 0 && b == b'-')) {
            let millis = raw.parse::<i64>().map_err(|_| invalid())?;
            return self.date_key_for_millis(millis).map_err(|_| invalid());
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return self.date_key_for(&instant).map_err(|_| invalid());
        }

        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return DateKey::new(naive.date()).map_err(|_| invalid());
            }
        }

        NaiveDate::parse_from_str(raw, DATE_KEY_FORMAT)
            .map_err(|_| invalid())
            .and_then(|d| DateKey::new(d).map_err(|_| invalid()))
    }

    pub fn today(&self) -> Result<DateKey, DateError> {
        self.date_key_for(&Utc::now())
    }

    pub fn relative_label(&self, target: DateKey) -> RelativeLabel {
        compute_relative_label(target, self.epoch, self.convention)
    }

    /// Timeline key of a photo, falling back to its upload day for legacy
    /// records written without one.
    pub fn group_key(&self, photo: &Photo) -> Option<DateKey> {
        photo
            .date_group
            .or_else(|| self.date_key_for(&photo.uploaded_at).ok())
    }

    /// Buckets photos by day, newest day first, each with its label and
    /// the union of album tags in that day.
    pub fn group_photos<'a>(&self, photos: &'a [Photo]) -> Vec<DayGroup<'a>> {
        let mut buckets: BTreeMap<DateKey, Vec<&'a Photo>> = BTreeMap::new();
        for photo in photos {
            if let Some(key) = self.group_key(photo) {
                buckets.entry(key).or_default().push(photo);
            }
        }

        buckets
            .into_iter()
            .rev()
            .map(|(date, photos)| {
                let albums = photos
                    .iter()
                    .flat_map(|p| p.albums.iter().cloned())
                    .collect();
                DayGroup {
                    date,
                    label: self.relative_label(date),
                    photos,
                    albums,
                }
            })
            .collect()
    }

    pub fn photos_on<'a>(&self, photos: &'a [Photo], date: DateKey) -> Vec<&'a Photo> {
        photos
            .iter()
            .filter(|p| self.group_key(p) == Some(date))
            .collect()
    }

    pub fn calendar_month(
        &self,
        photos: &[Photo],
        year: i32,
        month: u32,
    ) -> Result<CalendarMonth, DateError> {
        let first = DateKey::from_ymd(year, month, 1)?;
        let leading_blanks = first.date().weekday().num_days_from_sunday();

        let mut days = Vec::new();
        for day in 1..=days_in_month(year, month) {
            let date = DateKey::from_ymd(year, month, day)?;
            let on_day = self.photos_on(photos, date);
            days.push(CalendarDay {
                date,
                photo_count: on_day.len(),
                cover_photo: on_day.first().map(|p| p.record_id().to_string()),
            });
        }

        Ok(CalendarMonth { year, month, leading_blanks, days })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> DateKey {
        DateKey::parse(raw).unwrap()
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2023, 12), 31);
        assert_eq!(days_in_previous_month(2024, 1), 31);
    }

    #[test]
    fn calendar_diff_borrows_previous_month() {
        assert_eq!(calendar_diff(key("2023-06-27").date(), key("2023-08-03").date()), (1, 7));
        assert_eq!(calendar_diff(key("2023-06-27").date(), key("2024-06-27").date()), (12, 0));
    }

    #[test]
    fn date_key_rejects_wrong_shape() {
        assert!(DateKey::parse("2023-6-1").is_err());
        assert!(DateKey::parse("2023-02-30").is_err());
        assert!(DateKey::parse("yesterday").is_err());
    }
}
