//! Compatibility sniffing for HTML entry points.
//!
//! Version and family detection is table driven: each [`Signature`] maps a
//! pattern to one field, and the first matching signature for a field wins.
//! Warning rules are independent of one another and all of them are applied.

use crate::types::CompatibilityInfo;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

/// Metadata field a [`Signature`] fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ClientVersion,
    EngineVersion,
    ClientFamily,
}

/// One detection pattern; `template` is expanded against its captures.
pub struct Signature {
    pub field: Field,
    pub pattern: Regex,
    pub template: &'static str,
}

impl Signature {
    fn new(field: Field, pattern: &str, template: &'static str) -> Self {
        Self {
            field,
            pattern: Regex::new(pattern).unwrap(),
            template,
        }
    }
}

/// Brand keyword used when no family signature matches.
pub const BRAND: &str = "Eaglercraft";

/// Engine releases older than this are flagged as legacy.
const LEGACY_BEFORE: (u32, u32) = (1, 8);

const MAX_SCRIPT_TAGS: usize = 20;

/// Detection signatures, in priority order within each field.
pub static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    use Field::*;
    vec![
        // Client build
        Signature::new(
            ClientVersion,
            r#"(?i)client[_\s-]?version["']?\s*[:=]\s*["']([^"'\s]+)["']"#,
            "$1",
        ),
        Signature::new(
            ClientVersion,
            r"(?i)eaglercraft\s*x?\s+(?:\d+\.\d+(?:\.\d+)?\s+)?u(\d+)\b",
            "u$1",
        ),
        Signature::new(
            ClientVersion,
            r#"(?i)\bversion["']?\s*[:=]\s*["'](\d+(?:\.\d+)+[a-z0-9_-]*)["']"#,
            "$1",
        ),
        // Target game version
        Signature::new(
            EngineVersion,
            r"(?i)minecraft\s+(?:java\s+edition\s+)?(\d+\.\d+(?:\.\d+)?)",
            "$1",
        ),
        Signature::new(
            EngineVersion,
            r#"(?i)(?:mc|game)[_\s-]?version["']?\s*[:=]\s*["'](\d+\.\d+(?:\.\d+)?)["']"#,
            "$1",
        ),
        Signature::new(
            EngineVersion,
            r"(?i)eaglercraft\s*x?\s+(\d+\.\d+(?:\.\d+)?)",
            "$1",
        ),
        // Family
        Signature::new(
            ClientFamily,
            r"(?i)\beaglercraft\s*x\s+(\d+\.\d+(?:\.\d+)?)",
            "EaglercraftX $1",
        ),
        Signature::new(
            ClientFamily,
            r"(?i)\beaglercraft\s+(beta|alpha)\s*(\d+(?:\.\d+)*)",
            "Eaglercraft $1 $2",
        ),
        Signature::new(
            ClientFamily,
            r"(?i)\beaglercraft\s+(\d+\.\d+(?:\.\d+)?)",
            "Eaglercraft $1",
        ),
        Signature::new(ClientFamily, r"(?i)\beaglercraft\s*x\b", "EaglercraftX"),
    ]
});

/// Content rules: any match adds the warning.
static CONTENT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)webgl").unwrap(),
            "Requires WebGL support - make sure hardware acceleration is enabled",
        ),
        (
            Regex::new(r"(?i)\b(?:localStorage|indexedDB)\b").unwrap(),
            "Uses browser storage - saved progress is tied to this browser and is lost if site data is cleared",
        ),
        (
            Regex::new(r"(?i)\b(?:getUserMedia|mediaDevices)\b").unwrap(),
            "Requests camera or microphone access - the browser will ask for permission",
        ),
        (
            Regex::new(r"(?i)requestFullscreen").unwrap(),
            "Supports fullscreen mode - use the in-game option or F11",
        ),
    ]
});

/// Notes attached to specific families, matched case-insensitively.
const FAMILY_NOTES: &[(&str, &str)] = &[
    (
        "eaglercraftx",
        "EaglercraftX connects through WebSocket relays - some servers require a matching client build",
    ),
    (
        "eaglercraft 1.5",
        "Legacy 1.5-era client - most current servers will not accept it",
    ),
    (
        "unknown version",
        "Client version could not be determined - compatibility is unverified",
    ),
];

static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script\b").unwrap());

/// Sniff version, family and caveats out of an HTML document.
pub fn analyze_content(text: &str) -> CompatibilityInfo {
    let mut info = CompatibilityInfo {
        client_version: first_match(text, Field::ClientVersion),
        engine_version: first_match(text, Field::EngineVersion),
        client_family: first_match(text, Field::ClientFamily),
        warnings: Vec::new(),
    };

    if info.client_family.is_none() && text.to_lowercase().contains(&BRAND.to_lowercase()) {
        info.client_family = Some(format!("{} (Unknown Version)", BRAND));
    }

    info.warnings = compatibility_warnings(text, &info);
    info
}

/// Read and analyze a file. Never fails: an unreadable or non-UTF-8 file
/// yields empty metadata with a single warning.
pub async fn analyze_file(path: &Path) -> CompatibilityInfo {
    let result = match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8(bytes).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match result {
        Ok(text) => analyze_content(&text),
        Err(reason) => {
            warn!(path = %path.display(), %reason, "Compatibility analysis failed");
            CompatibilityInfo {
                warnings: vec![format!(
                    "Could not complete compatibility analysis: {}",
                    reason
                )],
                ..CompatibilityInfo::default()
            }
        }
    }
}

fn first_match(text: &str, field: Field) -> Option<String> {
    SIGNATURES
        .iter()
        .filter(|s| s.field == field)
        .find_map(|s| {
            s.pattern.captures(text).map(|caps| {
                let mut out = String::new();
                caps.expand(s.template, &mut out);
                out
            })
        })
}

fn compatibility_warnings(text: &str, info: &CompatibilityInfo) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(version) = &info.engine_version {
        if parse_major_minor(version).is_some_and(|v| v < LEGACY_BEFORE) {
            warnings.push(format!(
                "Targets legacy version {} - some features and servers may not work",
                version
            ));
        }
    }

    for (pattern, message) in CONTENT_RULES.iter() {
        if pattern.is_match(text) {
            warnings.push(message.to_string());
        }
    }

    if let Some(family) = &info.client_family {
        let lower = family.to_lowercase();
        if lower.contains("beta") || lower.contains("alpha") {
            warnings.push(format!(
                "{} is a pre-release client - expect bugs and instability",
                family
            ));
        }
        for (needle, note) in FAMILY_NOTES {
            if lower.contains(needle) {
                warnings.push(note.to_string());
            }
        }
    }

    let scripts = SCRIPT_TAG.find_iter(text).count();
    if scripts > MAX_SCRIPT_TAGS {
        warnings.push(format!(
            "Large client ({} script tags) - loading may be slower",
            scripts
        ));
    }

    warnings
}

fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
