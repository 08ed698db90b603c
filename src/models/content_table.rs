//! Static extension lookups used to describe local artifacts.

use std::{collections::HashMap, path::Path};

/// Files with this extension are published under an extensionless key.
pub const MARKUP_EXTENSION: &str = ".html";

const GZIP: &str = "gzip";

/// Immutable mapping from file extension to `Content-Type` and
/// `Content-Encoding`, built once at startup and handed to the descriptor
/// builder.
///
/// Extensions include the leading dot (`.css`), matching [`extension_of`].
#[derive(Debug, Clone, Default)]
pub struct ContentTable {
    content_types: HashMap<String, String>,
    encodings: HashMap<String, String>,
}

impl ContentTable {
    /// An empty table: every file gets no content type and no encoding.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table used for the site build output.
    ///
    /// Markup, style, script, data and vector files are stored gzipped by the
    /// build step, so they are served with `Content-Encoding: gzip`. Raster
    /// images are stored as-is.
    pub fn site_defaults() -> Self {
        Self::empty()
            .with_content_type(".html", "text/html; charset=UTF-8")
            .with_content_type(".css", "text/css; charset=UTF-8")
            .with_content_type(".js", "application/x-javascript; charset=UTF-8")
            .with_content_type(".jpg", "image/jpeg")
            .with_content_type(".png", "image/png")
            .with_content_type(".svg", "image/svg+xml")
            .with_content_type(".json", "application/json")
            .with_content_type(".go", "binary/octet-stream")
            .with_encoding(".html", GZIP)
            .with_encoding(".css", GZIP)
            .with_encoding(".js", GZIP)
            .with_encoding(".json", GZIP)
            .with_encoding(".svg", GZIP)
    }

    pub fn with_content_type(mut self, ext: impl Into<String>, value: impl Into<String>) -> Self {
        self.content_types.insert(ext.into(), value.into());
        self
    }

    pub fn with_encoding(mut self, ext: impl Into<String>, value: impl Into<String>) -> Self {
        self.encodings.insert(ext.into(), value.into());
        self
    }

    pub fn content_type(&self, ext: &str) -> Option<&str> {
        self.content_types
            .get(ext)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn content_encoding(&self, ext: &str) -> Option<&str> {
        self.encodings
            .get(ext)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Extension of a file name, including the dot.
///
/// Everything from the last `.` onwards, so `.DS_Store` has the extension
/// `.DS_Store` and `Makefile` has none.
pub fn extension_of(name: &str) -> &str {
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}

/// Remote key for a path relative to the build root.
///
/// Components are joined with `/` regardless of platform, and the markup
/// extension is stripped so `blog/post.html` is published as `blog/post`.
pub fn item_path(relative: &Path) -> String {
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let name = relative
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if extension_of(&name) == MARKUP_EXTENSION {
        joined[..joined.len() - MARKUP_EXTENSION.len()].to_string()
    } else {
        joined
    }
}
