use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lowercased file name without its extension.
pub fn name_base(file_name: &str) -> String {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    stem.to_lowercase()
}

/// `{name_base}_{millis}`, the id photos carry in both backends.
pub fn photo_id(file_name: &str, millis: i64) -> String {
    format!("{}_{}", name_base(file_name), millis)
}

/// `{prefix}_{millis}_{9 random chars}` for locally created records.
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}", prefix, now_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_base_strips_path_and_extension() {
        assert_eq!(name_base("IMG_0001.JPG"), "img_0001");
        assert_eq!(name_base("/tmp/clip.final.mp4"), "clip.final");
        assert_eq!(name_base(".hidden"), ".hidden");
    }

    #[test]
    fn generated_ids_carry_prefix_and_differ() {
        let a = generate_id("schedule");
        let b = generate_id("schedule");
        assert!(a.starts_with("schedule_"));
        assert_ne!(a, b);
    }
}
