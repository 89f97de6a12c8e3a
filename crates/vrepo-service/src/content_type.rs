//! Extension-based content-type resolution.

use std::collections::HashMap;

use vrepo_core::traits::ContentTypeResolver;

/// Resolves content types with the `mime_guess` extension database.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeGuessResolver;

impl ContentTypeResolver for MimeGuessResolver {
    fn content_type(&self, name: &str) -> String {
        mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// A caller-supplied extension map, falling back to [`MimeGuessResolver`]
/// for unknown extensions.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMapResolver {
    types: HashMap<String, String>,
    fallback: MimeGuessResolver,
}

impl ExtensionMapResolver {
    /// Build from `(extension, content type)` pairs. Extensions match
    /// case-insensitively, with or without a leading dot.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            types: entries
                .into_iter()
                .map(|(ext, ct)| (normalize(ext.as_ref()), ct.into()))
                .collect(),
            fallback: MimeGuessResolver,
        }
    }

    /// Add or replace one mapping.
    pub fn with(mut self, extension: &str, content_type: impl Into<String>) -> Self {
        self.types.insert(normalize(extension), content_type.into());
        self
    }
}

impl ContentTypeResolver for ExtensionMapResolver {
    fn content_type(&self, name: &str) -> String {
        let leaf = name.rsplit('/').next().unwrap_or(name);
        leaf.rsplit_once('.')
            .and_then(|(_, ext)| self.types.get(&ext.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.fallback.content_type(name))
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}
