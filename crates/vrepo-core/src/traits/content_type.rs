//! Content-type resolution for archive import and resource creation.

/// Maps a resource name to a MIME type and decides whether content of
/// that type is stored as text or binary.
pub trait ContentTypeResolver: Send + Sync + std::fmt::Debug {
    /// MIME type for a file name, judged by its extension.
    fn content_type(&self, name: &str) -> String;

    /// Whether content of `content_type` is binary.
    fn is_binary(&self, content_type: &str) -> bool {
        !is_text_content_type(content_type)
    }
}

/// Whether a MIME type carries text.
pub fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if essence.starts_with("text/") {
        return true;
    }

    matches!(
        essence.as_str(),
        "application/json"
            | "application/javascript"
            | "application/ecmascript"
            | "application/typescript"
            | "application/xml"
            | "application/xhtml+xml"
            | "application/sql"
            | "application/x-sh"
            | "application/toml"
            | "application/yaml"
            | "application/x-yaml"
            | "image/svg+xml"
    ) || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_types() {
        assert!(is_text_content_type("text/plain"));
        assert!(is_text_content_type("text/html; charset=utf-8"));
        assert!(is_text_content_type("application/json"));
        assert!(is_text_content_type("application/vnd.api+json"));
        assert!(!is_text_content_type("image/png"));
        assert!(!is_text_content_type("application/octet-stream"));
    }
}
