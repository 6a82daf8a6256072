//! Extension-based content type classification.

use crate::GENERIC_CONTENT_TYPE;

/// Classifies a file name by its extension (case-insensitive).
///
/// Only `pdf`, `jpg`/`jpeg`, `png` and `json` are recognised; everything else, including names
/// without an extension, is [`GENERIC_CONTENT_TYPE`].
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return GENERIC_CONTENT_TYPE,
    };

    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "json" => "application/json",
        _ => GENERIC_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_extensions() {
        assert_eq!(content_type_for("scan.pdf"), "application/pdf");
        assert_eq!(content_type_for("xray.JPG"), "image/jpeg");
        assert_eq!(content_type_for("xray.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("chart.png"), "image/png");
        assert_eq!(content_type_for("bundle.json"), "application/json");
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(content_type_for("notes.txt"), GENERIC_CONTENT_TYPE);
        assert_eq!(content_type_for("README"), GENERIC_CONTENT_TYPE);
        assert_eq!(content_type_for("archive.tar.gz"), GENERIC_CONTENT_TYPE);
        assert_eq!(content_type_for("trailing."), GENERIC_CONTENT_TYPE);
    }
}
