//! Redirect configuration and static redirect-site generation
//!
//! Publishing a link means adding an entry to a TOML redirect table:
//!
//! ```toml
//! ["name"]
//! title="Shown on the redirect page"
//! url="https://example.com/unlock/?name=...&password_salt=..."
//! index=false
//! ```
//!
//! The site generator turns every entry into `<path>/index.html`, a page
//! that immediately refreshes to the entry's URL, and lists the entries with
//! `index = true` in `index/index.html`.

use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Directory (under the output root) that holds the listing page.
pub const INDEX_PATH: &str = "index";

/// File name written into every generated directory.
pub const INDEX_FILE: &str = "index.html";

/// Render the redirect-table entry for a freshly encrypted link.
///
/// `\`, `"` and control characters in the user-supplied values are
/// escaped so each value stays a valid TOML basic string.
pub fn emit_config(name: &str, title: &str, url: &str) -> String {
    format!(
        "[\"{}\"]\ntitle=\"{}\"\nurl=\"{}\"\nindex=false",
        quote(name),
        quote(title),
        quote(url)
    )
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0}'..='\u{1f}' | '\u{7f}' => out.push_str(&format!("\\u{:04X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// One entry of the redirect table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Redirect {
    pub title: String,
    pub url: String,
    /// Whether the entry is listed on the index page.
    #[serde(default)]
    pub index: bool,
}

impl Redirect {
    /// Page that refreshes straight to the target URL.
    pub fn document(&self) -> String {
        let title = escape_html(&self.title);
        document(&format!(
            "<head>\n<meta charset=\"utf-8\"/>\n\
             <meta http-equiv=\"Refresh\" content=\"0; url={}\"/>\n\
             <title>{}</title>\n</head>\n\
             <body>\n<pre>Redirecting to: {}...</pre>\n</body>\n",
            escape_html(&self.url),
            title,
            title
        ))
    }

    fn link(&self, path: &str) -> String {
        format!(
            "<span>{}: <a href=\"{}\" title=\"{}\">{}</a></span>",
            escape_html(path),
            escape_html(&self.url),
            escape_html(path),
            escape_html(&self.title)
        )
    }
}

/// Redirect entries keyed by their output path, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectTable {
    entries: BTreeMap<String, Redirect>,
}

impl RedirectTable {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let entries: BTreeMap<String, Redirect> = toml::from_str(text).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::RedirectTableInvalid,
                format!("invalid redirect table: {}", e),
                e,
            )
        })?;
        Ok(Self { entries })
    }

    /// Read and parse a redirect table file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| read_error(path, e))?;
        Self::from_toml_str(&text)
            .map_err(|e| e.with_context(format!("failed to load {}", path.display())))
    }

    pub fn get(&self, path: &str) -> Option<&Redirect> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Redirect)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), r))
    }

    /// Listing of every entry marked `index = true`.
    pub fn index_document(&self, site_title: &str) -> String {
        let items: String = self
            .iter()
            .filter(|(_, r)| r.index)
            .map(|(path, r)| format!("<li>{}</li>\n", r.link(path)))
            .collect();
        document(&format!(
            "<head>\n<meta charset=\"utf-8\"/>\n<title>{}</title>\n</head>\n\
             <body>\n<ul>\n{}</ul>\n</body>\n",
            escape_html(site_title),
            items
        ))
    }
}

/// Write one redirect page per entry plus the index page under `out_dir`.
///
/// Returns the files written. Each file is replaced atomically.
pub fn write_site(table: &RedirectTable, out_dir: &Path, site_title: &str) -> Result<Vec<PathBuf>> {
    for (path, _) in table.iter() {
        validate_entry_path(path)?;
    }

    let mut written = Vec::with_capacity(table.len() + 1);
    for (path, redirect) in table.iter() {
        let file = out_dir.join(path).join(INDEX_FILE);
        write_page(&file, &redirect.document())?;
        written.push(file);
    }

    let index_file = out_dir.join(INDEX_PATH).join(INDEX_FILE);
    write_page(&index_file, &table.index_document(site_title))?;
    written.push(index_file);

    tracing::debug!(
        pages = written.len(),
        out_dir = %out_dir.display(),
        "wrote redirect site"
    );
    Ok(written)
}

fn validate_entry_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| {
        LinkError::with_kind(
            ErrorCategory::User,
            ErrorKind::RedirectTableInvalid,
            format!("redirect path {:?} {}", path, reason),
        )
    };

    let p = Path::new(path);
    if path.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid("must be a relative path without '..'"));
    }
    if p == Path::new(INDEX_PATH) {
        return Err(invalid("is reserved for the index page"));
    }
    // A page directory may not share its name with a page file.
    if p.components().any(|c| c.as_os_str() == INDEX_FILE) {
        return Err(invalid(&format!("must not contain a {:?} component", INDEX_FILE)));
    }
    Ok(())
}

fn write_page(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        LinkError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(dir).map_err(|e| {
        io_error(format!("failed to create directory {}", dir.display()), e)
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error("failed to create tempfile", e))?;
    temp_file
        .write_all(contents.as_bytes())
        .map_err(|e| io_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a complete page.
    temp_file
        .flush()
        .map_err(|e| io_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error("failed to sync file prior to rename", e))?;

    // Pages are meant to be served; tempfiles start out owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| io_error("failed to set tempfile permissions", e))?;
    }

    temp_file.persist(path).map_err(|e| {
        io_error(format!("failed to rename to target file {}", path.display()), e)
    })?;
    Ok(())
}

fn document(inner: &str) -> String {
    format!("<!doctype html>\n\n<html>\n{}</html>\n", inner)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn io_error(msg: impl Into<String>, err: impl std::error::Error + Send + Sync + 'static) -> LinkError {
    LinkError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> LinkError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    LinkError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TABLE: &str = r#"
["blog"]
title = "My blog"
url = "https://blog.example.com/"
index = true

["secret"]
title = "Hidden"
url = "https://example.com/unlock/?name=Hidden&digest=a%2Bb"
"#;

    #[test]
    fn test_emit_config_layout() {
        let config = emit_config("Secret", "A secret", "https://example.com/?name=Secret");
        assert_eq!(
            config,
            "[\"Secret\"]\ntitle=\"A secret\"\nurl=\"https://example.com/?name=Secret\"\nindex=false"
        );
    }

    #[test]
    fn test_emit_config_escapes_quotes_and_backslashes() {
        let config = emit_config(r#"say "hi""#, r"C:\path", "u");
        assert_eq!(
            config,
            "[\"say \\\"hi\\\"\"]\ntitle=\"C:\\\\path\"\nurl=\"u\"\nindex=false"
        );
    }

    #[test]
    fn test_emitted_config_parses_back() {
        let config = emit_config(r#"we"ird\name"#, r#"ti"tle\"#, "https://example.com/?a=1&b=%2B");
        let table = RedirectTable::from_toml_str(&config).unwrap();
        let entry = table.get(r#"we"ird\name"#).expect("entry present");
        assert_eq!(entry.title, r#"ti"tle\"#);
        assert_eq!(entry.url, "https://example.com/?a=1&b=%2B");
        assert!(!entry.index);
    }

    #[test]
    fn test_emitted_config_with_control_characters_parses_back() {
        let name = "line1\nline2\u{7f}";
        let title = "tab\there\r\u{1}end";
        let config = emit_config(name, title, "https://example.com/");
        assert!(!config.contains('\u{7f}'));
        assert!(config.contains("\\u007F"));
        assert_eq!(config.lines().count(), 4);

        let table = RedirectTable::from_toml_str(&config).unwrap();
        let entry = table.get(name).expect("entry present");
        assert_eq!(entry.title, title);
        assert_eq!(entry.url, "https://example.com/");
    }

    #[test]
    fn test_parse_table() {
        let table = RedirectTable::from_toml_str(TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("blog").unwrap().index);
        // index defaults to false
        assert!(!table.get("secret").unwrap().index);
        let paths: Vec<&str> = table.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["blog", "secret"]);
    }

    #[test]
    fn test_parse_table_missing_url() {
        let err = RedirectTable::from_toml_str("[\"x\"]\ntitle=\"t\"\n")
            .expect_err("expected invalid table");
        assert_eq!(err.kind, Some(ErrorKind::RedirectTableInvalid));
    }

    #[test]
    fn test_redirect_document() {
        let table = RedirectTable::from_toml_str(TABLE).unwrap();
        let doc = table.get("secret").unwrap().document();
        assert!(doc.starts_with("<!doctype html>\n\n<html>"));
        assert!(doc.contains(
            "<meta http-equiv=\"Refresh\" content=\"0; url=https://example.com/unlock/?name=Hidden&amp;digest=a%2Bb\"/>"
        ));
        assert!(doc.contains("<title>Hidden</title>"));
        assert!(doc.contains("<pre>Redirecting to: Hidden...</pre>"));
    }

    #[test]
    fn test_document_escapes_title() {
        let r = Redirect {
            title: "<script>".into(),
            url: "https://example.com/".into(),
            index: false,
        };
        assert!(!r.document().contains("<script>"));
        assert!(r.document().contains("&lt;script&gt;"));
    }

    #[test]
    fn test_index_lists_only_indexed_entries() {
        let table = RedirectTable::from_toml_str(TABLE).unwrap();
        let doc = table.index_document("links");
        assert!(doc.contains("<title>links</title>"));
        assert!(doc.contains(
            "<li><span>blog: <a href=\"https://blog.example.com/\" title=\"blog\">My blog</a></span></li>"
        ));
        assert!(!doc.contains("secret"));
    }

    #[test]
    fn test_write_site() {
        let temp_dir = TempDir::new().unwrap();
        let table = RedirectTable::from_toml_str(TABLE).unwrap();

        let written = write_site(&table, temp_dir.path(), "links").unwrap();
        assert_eq!(written.len(), 3);

        let secret = fs::read_to_string(temp_dir.path().join("secret/index.html")).unwrap();
        assert_eq!(secret, table.get("secret").unwrap().document());
        let index = fs::read_to_string(temp_dir.path().join("index/index.html")).unwrap();
        assert!(index.contains("My blog"));

        // Regenerating replaces the pages in place
        write_site(&table, temp_dir.path(), "links").unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_site_pages_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let table = RedirectTable::from_toml_str(TABLE).unwrap();
        write_site(&table, temp_dir.path(), "links").unwrap();

        let mode = fs::metadata(temp_dir.path().join("blog/index.html"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_nested_paths_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let table =
            RedirectTable::from_toml_str("[\"a/b\"]\ntitle=\"t\"\nurl=\"https://e.com/\"\n")
                .unwrap();
        write_site(&table, temp_dir.path(), "links").unwrap();
        assert!(temp_dir.path().join("a/b/index.html").exists());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        for path in ["../evil", "/abs", "", "index"] {
            let toml = format!("[{:?}]\ntitle=\"t\"\nurl=\"https://e.com/\"\n", path);
            let table = RedirectTable::from_toml_str(&toml).unwrap();
            let err = write_site(&table, temp_dir.path(), "links")
                .expect_err("expected rejected path");
            assert_eq!(err.kind, Some(ErrorKind::RedirectTableInvalid), "path {:?}", path);
        }
        // Nothing is written when any path is rejected
        assert!(!temp_dir.path().join("index").exists());
    }

    #[test]
    fn test_rejects_page_file_as_directory() {
        let temp_dir = TempDir::new().unwrap();
        let table = RedirectTable::from_toml_str(
            "[\"a\"]\ntitle=\"t\"\nurl=\"https://e.com/\"\n\
             [\"a/index.html\"]\ntitle=\"t\"\nurl=\"https://e.com/\"\n",
        )
        .unwrap();
        let err = write_site(&table, temp_dir.path(), "links").expect_err("expected rejected path");
        assert_eq!(err.kind, Some(ErrorKind::RedirectTableInvalid));
        assert!(!temp_dir.path().join("a").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = RedirectTable::load(&temp_dir.path().join("redirect.toml"))
            .expect_err("expected read failure");
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.category, ErrorCategory::User);
    }
}
