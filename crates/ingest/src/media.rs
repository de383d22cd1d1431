//! Mapping between accepted upload kinds and media types.

use std::path::Path;

/// Kinds of upload the launcher accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Html,
    Zip,
    JavaArchive,
    Json,
    Executable,
}

impl UploadKind {
    /// Resolve the kind from the declared filename, falling back to the
    /// declared media type when the extension is missing or unknown.
    pub fn detect(filename: &str, media_type: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let by_extension = match extension.as_str() {
            "html" | "htm" => Some(UploadKind::Html),
            "zip" => Some(UploadKind::Zip),
            "jar" => Some(UploadKind::JavaArchive),
            "json" => Some(UploadKind::Json),
            "exe" => Some(UploadKind::Executable),
            _ => None,
        };

        by_extension.or_else(|| {
            let essence = media_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            match essence.as_str() {
                "text/html" => Some(UploadKind::Html),
                "application/zip" | "application/x-zip-compressed" => Some(UploadKind::Zip),
                "application/java-archive" | "application/x-java-archive" => {
                    Some(UploadKind::JavaArchive)
                }
                "application/json" => Some(UploadKind::Json),
                "application/vnd.microsoft.portable-executable"
                | "application/x-msdownload"
                | "application/x-msdos-program" => Some(UploadKind::Executable),
                _ => None,
            }
        })
    }

    /// Media type a stored file of this kind is served with.
    pub fn media_type(self) -> &'static str {
        match self {
            UploadKind::Html => "text/html",
            UploadKind::Zip => "application/zip",
            UploadKind::JavaArchive => "application/java-archive",
            UploadKind::Json => "application/json",
            UploadKind::Executable => "application/vnd.microsoft.portable-executable",
        }
    }

    /// Extension used for the stored artifact.
    pub fn extension(self) -> &'static str {
        match self {
            UploadKind::Html => "html",
            UploadKind::Zip => "zip",
            UploadKind::JavaArchive => "jar",
            UploadKind::Json => "json",
            UploadKind::Executable => "exe",
        }
    }
}

/// Media type for a file inside a stored bundle, used by downloads.
///
/// Java archives always go out as `application/java-archive` so launchers
/// recognize them; everything else is guessed from the extension.
pub fn media_type_for_path(path: &str) -> String {
    if Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(UploadKind::JavaArchive.extension()))
    {
        return UploadKind::JavaArchive.media_type().to_string();
    }

    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
