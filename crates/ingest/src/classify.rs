//! Entry-point classification for extracted bundles.
//!
//! Works purely on the list of archive-relative file paths produced by the
//! extractor. Ties are always broken by archive order, so the same input list
//! yields the same result every time.

use crate::types::{BundleKind, Classification, DetectionMethod, UnsupportedReason};

/// Entry-point keywords, highest priority first.
///
/// Root-level exact matches are tried for every keyword before any substring
/// match, so a root `launcher.html` beats a nested `web/index.html`. Among
/// substring matches the keyword order decides, so a nested `index` beats a
/// nested `launcher`.
pub const ENTRY_KEYWORDS: &[&str] = &[
    "index",
    "main",
    "game",
    "client",
    "eaglercraft",
    "launcher",
    "start",
    "play",
];

pub const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

pub const JAVA_ARCHIVE_EXTENSIONS: &[&str] = &["jar"];

/// Configuration and manifest files that cannot be run on their own.
pub const AUXILIARY_EXTENSIONS: &[&str] = &[
    "json", "xml", "properties", "cfg", "conf", "ini", "yml", "yaml", "toml", "mf", "txt",
];

/// Extensions whose presence suggests the bundle ships its own assets.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp",
];

/// Filename fragments that identify a known client family.
pub const ENGINE_SIGNATURES: &[(&[&str], &str)] = &[(
    &["eagler", "classes.js", "assets.epk", ".epk"],
    "Eaglercraft client files detected",
)];

const MAX_HTML_CANDIDATES: usize = 5;
const MAX_NESTING_DEPTH: usize = 3;

/// Classify an extracted bundle and choose its entry point.
pub fn classify(paths: &[String]) -> Classification {
    let html_files: Vec<String> = paths
        .iter()
        .filter(|p| has_extension(p, HTML_EXTENSIONS))
        .cloned()
        .collect();
    let jar_files: Vec<String> = paths
        .iter()
        .filter(|p| has_extension(p, JAVA_ARCHIVE_EXTENSIONS))
        .cloned()
        .collect();

    let kind = if !html_files.is_empty() {
        let (main_entry, detection) = select_entry_point(&html_files);
        BundleKind::Html {
            main_entry: main_entry.to_string(),
            detection,
        }
    } else if !jar_files.is_empty() {
        BundleKind::JavaArchive {
            archive_files: jar_files.clone(),
        }
    } else {
        let auxiliary: Vec<String> = paths
            .iter()
            .filter(|p| has_extension(p, AUXILIARY_EXTENSIONS))
            .cloned()
            .collect();
        let reason = if !auxiliary.is_empty() && auxiliary.len() == paths.len() {
            UnsupportedReason::OnlyAuxiliaryFiles { files: auxiliary }
        } else {
            UnsupportedReason::NoRunnableEntry
        };
        BundleKind::Unsupported { reason }
    };

    let main_entry = match &kind {
        BundleKind::Html { main_entry, .. } => Some(main_entry.as_str()),
        _ => None,
    };
    let warnings = structure_warnings(paths, html_files.len(), main_entry);

    Classification {
        kind,
        html_files,
        jar_files,
        total_files: paths.len(),
        warnings,
    }
}

/// Pick the page to serve from a non-empty list of HTML paths.
///
/// 1. Root-level file named exactly after a keyword, keywords in order.
/// 2. Any file whose name contains a keyword, keywords in order.
/// 3. First root-level HTML file.
/// 4. First HTML file.
pub fn select_entry_point(html_files: &[String]) -> (&str, DetectionMethod) {
    for keyword in ENTRY_KEYWORDS {
        if let Some(path) = html_files
            .iter()
            .find(|p| is_root(p) && file_stem_lower(p) == *keyword)
        {
            return (path.as_str(), DetectionMethod::PatternMatch);
        }
    }

    for keyword in ENTRY_KEYWORDS {
        if let Some(path) = html_files
            .iter()
            .find(|p| file_name_lower(p).contains(keyword))
        {
            return (path.as_str(), DetectionMethod::PatternMatch);
        }
    }

    let fallback = html_files
        .iter()
        .find(|p| is_root(p))
        .or_else(|| html_files.first())
        .map(String::as_str)
        .unwrap_or_default();
    (fallback, DetectionMethod::Fallback)
}

fn structure_warnings(paths: &[String], html_count: usize, main_entry: Option<&str>) -> Vec<String> {
    let mut warnings = Vec::new();

    if html_count > MAX_HTML_CANDIDATES {
        warnings.push(format!(
            "Found {} HTML files - complex structure detected",
            html_count
        ));
    }

    if let Some(entry) = main_entry {
        if !is_root(entry) {
            warnings.push(
                "Main file is in a subdirectory - this may affect relative paths".to_string(),
            );
        }
    }

    if !paths.iter().any(|p| has_extension(p, ASSET_EXTENSIONS)) {
        warnings.push(
            "No common asset files (JS, CSS, images) found - the game may not function properly"
                .to_string(),
        );
    }

    let depth = paths
        .iter()
        .map(|p| p.split('/').filter(|s| !s.is_empty()).count().saturating_sub(1))
        .max()
        .unwrap_or(0);
    if depth > MAX_NESTING_DEPTH {
        warnings.push(format!(
            "Deep directory structure detected ({} levels)",
            depth
        ));
    }

    // Positive signals go first.
    for (fragments, message) in ENGINE_SIGNATURES.iter().rev() {
        let found = paths.iter().any(|p| {
            let name = p.to_lowercase();
            fragments.iter().any(|f| name.contains(f))
        });
        if found {
            warnings.insert(0, message.to_string());
        }
    }

    warnings
}

fn is_root(path: &str) -> bool {
    !path.contains('/')
}

fn file_name_lower(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_lowercase()
}

fn file_stem_lower(path: &str) -> String {
    let name = file_name_lower(path);
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// Case-insensitive check of a path's final extension.
pub fn has_extension(path: &str, extensions: &[&str]) -> bool {
    file_name_lower(path)
        .rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_root_index_wins_over_everything() {
        let result = classify(&paths(&[
            "game/main.html",
            "launcher.html",
            "index.html",
            "docs/index.html",
            "app.js",
        ]));
        assert_eq!(result.main_entry(), Some("index.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::PatternMatch));
    }

    #[test]
    fn test_root_exact_match_is_case_insensitive() {
        let result = classify(&paths(&["readme.html", "Game.HTM", "style.css"]));
        assert_eq!(result.main_entry(), Some("Game.HTM"));
        assert_eq!(result.detection(), Some(DetectionMethod::PatternMatch));
    }

    #[test]
    fn test_root_launcher_beats_nested_index() {
        let result = classify(&paths(&["web/index.html", "launcher.html", "a.js"]));
        assert_eq!(result.main_entry(), Some("launcher.html"));
    }

    #[test]
    fn test_nested_keyword_order_decides_substring_matches() {
        let result = classify(&paths(&[
            "web/mylauncher.html",
            "web/index_v2.html",
            "a.js",
        ]));
        assert_eq!(result.main_entry(), Some("web/index_v2.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::PatternMatch));
    }

    #[test]
    fn test_substring_match_at_root() {
        let result = classify(&paths(&["about.html", "mygame.html", "app.js"]));
        assert_eq!(result.main_entry(), Some("mygame.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::PatternMatch));
    }

    #[test]
    fn test_fallback_prefers_first_root_html() {
        let result = classify(&paths(&["docs/about.html", "readme.html", "credits.html", "a.css"]));
        assert_eq!(result.main_entry(), Some("readme.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::Fallback));
    }

    #[test]
    fn test_fallback_first_html_in_archive_order() {
        let result = classify(&paths(&["b/zeta.html", "a/alpha.html", "a/x.js"]));
        assert_eq!(result.main_entry(), Some("b/zeta.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::Fallback));
    }

    #[test]
    fn test_play_html_with_assets() {
        let result = classify(&paths(&["assets/logo.png", "play.html", "scripts/app.js"]));
        assert_eq!(result.main_entry(), Some("play.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::PatternMatch));
        assert!(!result.warnings.iter().any(|w| w.contains("No common asset")));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_nested_readme_without_assets() {
        let result = classify(&paths(&["a/b/c/readme.html"]));
        assert_eq!(result.main_entry(), Some("a/b/c/readme.html"));
        assert_eq!(result.detection(), Some(DetectionMethod::Fallback));
        assert!(result.warnings.iter().any(|w| w.contains("subdirectory")));
        assert!(result.warnings.iter().any(|w| w.contains("No common asset")));
    }

    #[test]
    fn test_java_archive_bundle() {
        let result = classify(&paths(&["client.jar", "launcher_profiles.json"]));
        match &result.kind {
            BundleKind::JavaArchive { archive_files } => {
                assert_eq!(archive_files, &paths(&["client.jar"]))
            }
            other => panic!("Expected java archive, got {:?}", other),
        }
        assert_eq!(result.main_entry(), None);
        assert_eq!(result.total_files, 2);
    }

    #[test]
    fn test_html_outranks_java_archive() {
        let result = classify(&paths(&["client.jar", "index.html"]));
        assert!(matches!(result.kind, BundleKind::Html { .. }));
        assert_eq!(result.jar_files, paths(&["client.jar"]));
    }

    #[test]
    fn test_only_auxiliary_files() {
        let result = classify(&paths(&["manifest.json", "config/settings.yml"]));
        assert_eq!(
            result.kind,
            BundleKind::Unsupported {
                reason: UnsupportedReason::OnlyAuxiliaryFiles {
                    files: paths(&["manifest.json", "config/settings.yml"]),
                },
            }
        );
    }

    #[test]
    fn test_nothing_usable() {
        let result = classify(&paths(&["manifest.json", "photo.png"]));
        assert_eq!(
            result.kind,
            BundleKind::Unsupported {
                reason: UnsupportedReason::NoRunnableEntry,
            }
        );
    }

    #[test]
    fn test_many_html_candidates_warn() {
        let result = classify(&paths(&[
            "index.html", "a.html", "b.html", "c.html", "d.html", "e.html", "x.js",
        ]));
        assert!(result.warnings[0].contains("6 HTML files"));
    }

    #[test]
    fn test_deep_structure_warns() {
        let result = classify(&paths(&["index.html", "a/b/c/d/e.js"]));
        assert!(result.warnings.iter().any(|w| w.contains("4 levels")));

        let shallow = classify(&paths(&["index.html", "a/b/c/e.js"]));
        assert!(!shallow.warnings.iter().any(|w| w.contains("Deep directory")));
    }

    #[test]
    fn test_engine_signature_is_prepended() {
        let result = classify(&paths(&["web/index.html", "web/assets.epk"]));
        assert_eq!(result.warnings[0], "Eaglercraft client files detected");
        assert!(result.warnings.len() > 1);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let input = paths(&["z/play.html", "y/start.html", "x/a.css"]);
        assert_eq!(classify(&input), classify(&input));
        assert_eq!(classify(&input).main_entry(), Some("y/start.html"));
    }
}
