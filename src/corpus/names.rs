//! Corpus name resolution and source path normalization.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::corpus::settings::CorpusSettings;
use crate::corpus::types::CorpusInfo;

fn resource_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^projects/[^/]+/locations/[^/]+/ragCorpora/[^/]+$").unwrap())
}

fn docs_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^https://docs\.google\.com/(?:document|spreadsheets|presentation)/d/([a-zA-Z0-9_-]+)(?:/|$)",
        )
        .unwrap()
    })
}

fn drive_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https://drive\.google\.com/(?:file/d/|open\?id=)([a-zA-Z0-9_-]+)(?:/|$)")
            .unwrap()
    })
}

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap())
}

/// Is this already a full `projects/*/locations/*/ragCorpora/*` name?
pub fn is_resource_name(name: &str) -> bool {
    resource_name_re().is_match(name)
}

/// Replace characters outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_display_name(name: &str) -> String {
    unsafe_chars_re().replace_all(name, "_").into_owned()
}

/// Resolve a user-supplied corpus name to a full resource name.
///
/// Full names pass through. A display name of a known corpus resolves to that
/// corpus. Anything else keeps its last path segment, sanitized, under the
/// configured project and location.
pub fn corpus_resource_name(name: &str, settings: &CorpusSettings, known: &[CorpusInfo]) -> String {
    if is_resource_name(name) {
        return name.to_string();
    }

    if let Some(corpus) = known.iter().find(|c| c.display_name == name) {
        return corpus.name.clone();
    }

    let corpus_id = name.rsplit('/').next().unwrap_or(name);
    format!(
        "{}/ragCorpora/{}",
        settings.parent(),
        sanitize_display_name(corpus_id)
    )
}

/// Outcome of normalizing one source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePath {
    /// Accepted as given.
    Valid(String),
    /// Rewritten to the canonical Drive form.
    Converted { from: String, to: String },
    Invalid(String),
}

/// Normalize a Drive, Docs or GCS path.
pub fn normalize_source_path(path: &str) -> SourcePath {
    let path = path.trim();
    if path.is_empty() {
        return SourcePath::Invalid(path.to_string());
    }

    if let Some(caps) = docs_url_re().captures(path) {
        return SourcePath::Converted {
            from: path.to_string(),
            to: drive_file_url(&caps[1]),
        };
    }

    if let Some(caps) = drive_url_re().captures(path) {
        let canonical = drive_file_url(&caps[1]);
        if canonical == path {
            return SourcePath::Valid(canonical);
        }
        return SourcePath::Converted {
            from: path.to_string(),
            to: canonical,
        };
    }

    if path.starts_with("gs://") {
        return SourcePath::Valid(path.to_string());
    }

    SourcePath::Invalid(path.to_string())
}

fn drive_file_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{file_id}/view")
}

/// A batch of source paths after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedPaths {
    pub valid: Vec<String>,
    /// `from -> to` descriptions.
    pub conversions: Vec<String>,
    /// Rejected paths with the reason.
    pub invalid: Vec<String>,
}

pub fn normalize_paths<'a, I>(paths: I) -> NormalizedPaths
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = NormalizedPaths::default();
    for path in paths {
        match normalize_source_path(path) {
            SourcePath::Valid(p) => out.valid.push(p),
            SourcePath::Converted { from, to } => {
                out.conversions.push(format!("{from} -> {to}"));
                out.valid.push(to);
            }
            SourcePath::Invalid(p) if p.is_empty() => {
                out.invalid.push("(empty path)".to_string());
            }
            SourcePath::Invalid(p) => out.invalid.push(format!("{p} (Invalid URL format)")),
        }
    }
    out
}

/// The id part of a canonical Drive file URL.
pub fn drive_file_id(url: &str) -> Option<&str> {
    drive_url_re()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
