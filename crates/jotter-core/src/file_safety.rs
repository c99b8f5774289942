//! Filename sanitizing for object storage keys.

/// Replacement name for uploads without a usable filename.
pub const UNNAMED_FILE: &str = "unnamed_file";

/// Longest sanitized filename kept in a storage key.
pub const MAX_STORED_FILENAME_LEN: usize = 200;

/// Sanitize an uploaded filename for use inside a storage key.
///
/// Every character outside `[A-Za-z0-9.-]` becomes `_`, so path separators
/// and whitespace never reach the key. Missing or empty names become
/// [`UNNAMED_FILE`]. Long names are truncated, keeping the extension.
pub fn sanitize_storage_filename(filename: Option<&str>) -> String {
    let name = filename.unwrap_or("").trim();
    if name.is_empty() {
        return UNNAMED_FILE.to_string();
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
            _ => '_',
        })
        .collect();

    // Output is pure ASCII from here, so byte slicing is char-safe
    if sanitized.len() > MAX_STORED_FILENAME_LEN {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let ext = &sanitized[dot_pos..];
            if ext.len() < MAX_STORED_FILENAME_LEN {
                let stem = &sanitized[..MAX_STORED_FILENAME_LEN - ext.len()];
                return format!("{}{}", stem, ext);
            }
        }
        return sanitized[..MAX_STORED_FILENAME_LEN].to_string();
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_allowed_characters() {
        assert_eq!(
            sanitize_storage_filename(Some("Report-2024.v2.pdf")),
            "Report-2024.v2.pdf"
        );
    }

    #[test]
    fn test_replaces_disallowed_characters() {
        assert_eq!(
            sanitize_storage_filename(Some("my file (1).txt")),
            "my_file__1_.txt"
        );
        assert_eq!(
            sanitize_storage_filename(Some("under_score.md")),
            "under_score.md"
        );
    }

    #[test]
    fn test_path_separators_are_neutralized() {
        let out = sanitize_storage_filename(Some("../../etc/passwd"));
        assert!(!out.contains('/'));
        assert_eq!(out, ".._.._etc_passwd");

        let out = sanitize_storage_filename(Some(r"C:\Users\me\doc.txt"));
        assert!(!out.contains('\\'));
        assert_eq!(out, "C__Users_me_doc.txt");
    }

    #[test]
    fn test_non_ascii_replaced_per_character() {
        assert_eq!(sanitize_storage_filename(Some("zdjęcie.jpg")), "zdj_cie.jpg");
    }

    #[test]
    fn test_missing_or_empty_names() {
        assert_eq!(sanitize_storage_filename(None), UNNAMED_FILE);
        assert_eq!(sanitize_storage_filename(Some("")), UNNAMED_FILE);
        assert_eq!(sanitize_storage_filename(Some("   ")), UNNAMED_FILE);
    }

    #[test]
    fn test_long_names_truncated_keeping_extension() {
        let long = format!("{}.png", "a".repeat(500));
        let out = sanitize_storage_filename(Some(&long));
        assert_eq!(out.len(), MAX_STORED_FILENAME_LEN);
        assert!(out.ends_with(".png"));
    }

    #[test]
    fn test_long_names_without_extension() {
        let long = "b".repeat(500);
        let out = sanitize_storage_filename(Some(&long));
        assert_eq!(out.len(), MAX_STORED_FILENAME_LEN);
    }
}
