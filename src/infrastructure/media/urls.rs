use once_cell::sync::Lazy;
use regex::Regex;

use super::MediaKind;

static VERSION_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|/)v\d+/").expect("valid regex"));
static VIDEO_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mp4|mov|webm|m4v)(\?|$)").expect("valid regex"));
static VIDEO_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(mp4|mov|webm|m4v)(\?.*)?$").expect("valid regex"));
static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.[a-z0-9]+$").expect("valid regex"));

/// CDN public id of a delivery URL: the path after `/upload/` without the
/// query, the extension or a leading version segment.
pub fn derive_public_id(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/upload/")?;
    let tail = tail.split('?').next().unwrap_or_default();
    let tail = FILE_EXTENSION.replace(tail, "");

    let tail = match VERSION_SEGMENT.find(&tail) {
        Some(m) => tail[m.end()..].to_string(),
        None => tail.into_owned(),
    };
    (!tail.is_empty()).then_some(tail)
}

pub fn is_video_url(url: &str) -> bool {
    url.contains("/video/upload/") || VIDEO_EXTENSION.is_match(url)
}

pub fn kind_of_url(url: &str) -> MediaKind {
    if is_video_url(url) {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}

/// Resized, auto-format delivery URL. Non-CDN URLs pass through.
pub fn optimize(url: &str, width: u32, height: u32) -> String {
    if !url.contains("cloudinary.com") {
        return url.to_string();
    }
    url.replacen(
        "/upload/",
        &format!("/upload/w_{},h_{},c_fill,f_auto,q_auto/", width, height),
        1,
    )
}

/// Still frame (1s in) of a CDN video as JPEG.
pub fn video_thumbnail(url: &str, width: u32, height: u32) -> String {
    if !url.contains("/video/upload/") {
        return url.to_string();
    }
    let transformed = url.replacen(
        "/video/upload/",
        &format!("/video/upload/so_1,w_{},h_{},c_fill,f_jpg,q_auto/", width, height),
        1,
    );
    VIDEO_SUFFIX.replace(&transformed, ".jpg$2").into_owned()
}

pub fn preview(url: &str, width: u32, height: u32) -> String {
    if is_video_url(url) {
        video_thumbnail(url, width, height)
    } else {
        optimize(url, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = "https://res.cloudinary.com/demo/image/upload/v1712345678/2024/05/01/abc.jpg";
    const VIDEO: &str = "https://res.cloudinary.com/demo/video/upload/v17/2024/05/01/clip.mp4?x=1";

    #[test]
    fn public_id_strips_version_and_extension() {
        assert_eq!(derive_public_id(IMAGE).as_deref(), Some("2024/05/01/abc"));
        assert_eq!(derive_public_id(VIDEO).as_deref(), Some("2024/05/01/clip"));
        assert_eq!(derive_public_id("https://example.com/a.jpg"), None);
    }

    #[test]
    fn video_detection() {
        assert!(is_video_url(VIDEO));
        assert!(is_video_url("https://cdn.example.com/a.MOV"));
        assert!(!is_video_url(IMAGE));
    }

    #[test]
    fn transforms() {
        assert_eq!(
            optimize(IMAGE, 300, 200),
            "https://res.cloudinary.com/demo/image/upload/w_300,h_200,c_fill,f_auto,q_auto/v1712345678/2024/05/01/abc.jpg"
        );
        assert_eq!(
            preview(VIDEO, 100, 100),
            "https://res.cloudinary.com/demo/video/upload/so_1,w_100,h_100,c_fill,f_jpg,q_auto/v17/2024/05/01/clip.jpg?x=1"
        );
        assert_eq!(optimize("https://example.com/a.jpg", 1, 1), "https://example.com/a.jpg");
    }
}
