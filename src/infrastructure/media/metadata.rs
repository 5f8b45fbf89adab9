use std::io::Cursor;

use chrono::{NaiveDate, NaiveDateTime};
use exif::{Exif, In, Reader, Tag, Value};

use crate::constants::EXIF_SCAN_BYTES;

/// Capture date of a photo from its EXIF block: `DateTimeOriginal`, else
/// `DateTime`. Only the first 64 KiB are read, which covers the APP1
/// segment of camera JPEGs.
pub fn capture_datetime(bytes: &[u8]) -> Option<NaiveDateTime> {
    let window = &bytes[..bytes.len().min(EXIF_SCAN_BYTES)];
    let exif = match Reader::new().read_from_container(&mut Cursor::new(window)) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!("No usable EXIF block: {}", e);
            return None;
        }
    };

    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .find_map(|tag| datetime_field(&exif, tag))
}

fn datetime_field(exif: &Exif, tag: Tag) -> Option<NaiveDateTime> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref values) = field.value else {
        return None;
    };
    let parsed = exif::DateTime::from_ascii(values.first()?).ok()?;

    NaiveDate::from_ymd_opt(parsed.year.into(), parsed.month.into(), parsed.day.into())?.and_hms_opt(
        parsed.hour.into(),
        parsed.minute.into(),
        parsed.second.into(),
    )
}
