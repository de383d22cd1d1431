//! Landing page for Java-archive bundles.
//!
//! These bundles cannot be played in the browser, so their content response
//! is a small self-contained page listing the downloadable files.

use crate::classify::{has_extension, AUXILIARY_EXTENSIONS, JAVA_ARCHIVE_EXTENSIONS};
use crate::safety::to_archive_path;
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

/// Archive-relative paths of the Java archives and manifest files under
/// `root`, sorted by path.
pub fn downloadable_files(root: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = to_archive_path(relative);
        if has_extension(&name, JAVA_ARCHIVE_EXTENSIONS) || has_extension(&name, AUXILIARY_EXTENSIONS)
        {
            files.push(name);
        }
    }

    Ok(files)
}

/// URL of the per-file download endpoint.
pub fn download_url(id: Uuid, file: &str) -> String {
    format!("/files/{}/download/{}", id, urlencoding::encode(file))
}

/// Render the landing page for a Java-archive bundle.
pub fn render_landing_page(id: Uuid, title: &str, files: &[String]) -> String {
    let items: String = files
        .iter()
        .map(|file| {
            let kind = if has_extension(file, JAVA_ARCHIVE_EXTENSIONS) {
                "Java archive"
            } else {
                "Configuration"
            };
            format!(
                "      <li><a href=\"{}\" download>{}</a> <span class=\"kind\">{}</span></li>\n",
                escape_html(&download_url(id, file)),
                escape_html(file),
                kind
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <style>
    body {{ font-family: sans-serif; background: #1e1e1e; color: #eee; padding: 2rem; }}
    a {{ color: #7fc8ff; }}
    .kind {{ color: #999; font-size: 0.85em; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <p>This bundle contains a Java client and cannot run in the browser.
     Download the files below and start it with a Java launcher.</p>
  <ul>
{items}  </ul>
</body>
</html>
"#,
        title = escape_html(title),
        items = items
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
