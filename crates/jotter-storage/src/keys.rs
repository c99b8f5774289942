//! Storage key generation.

use jotter_core::sanitize_storage_filename;
use uuid::Uuid;

/// Generate a collision-resistant storage key for an upload.
///
/// Format: `{uuid-v4}_{sanitized-filename}`, e.g.
/// `3f2b...-..._holiday_photo.jpg`.
pub fn generate_storage_key(original_filename: Option<&str>) -> String {
    format!(
        "{}_{}",
        Uuid::new_v4(),
        sanitize_storage_filename(original_filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jotter_core::UNNAMED_FILE;

    #[test]
    fn test_key_format() {
        let key = generate_storage_key(Some("holiday photo.jpg"));
        let (prefix, name) = key.split_once('_').unwrap();
        assert!(Uuid::parse_str(prefix).is_ok());
        assert_eq!(name, "holiday_photo.jpg");
    }

    #[test]
    fn test_keys_do_not_collide_for_same_name() {
        let a = generate_storage_key(Some("a.txt"));
        let b = generate_storage_key(Some("a.txt"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_filename() {
        let key = generate_storage_key(None);
        assert!(key.ends_with(&format!("_{}", UNNAMED_FILE)));
    }

    #[test]
    fn test_key_contains_only_safe_characters() {
        let key = generate_storage_key(Some("we/ird näme?.tar.gz"));
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')));
    }
}
