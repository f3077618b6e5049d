//! License discovery for extracted libraries.
//!
//! Detection is deliberately shallow: find a canonically named file, read its
//! opening text, and match it against a small set of anchored patterns. A
//! user-asserted identifier in the manifest always wins over detection.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Canonical license file basenames, in priority order, case-insensitive.
const CANONICAL_NAMES: &[&str] = &[
    "LICENSE",
    "LICENSE.txt",
    "LICENSE.md",
    "COPYING",
    "NOTICE",
    "COPYRIGHT",
];

/// Subdirectories worth one level of recursion when the root has no match.
const WELL_KNOWN_SUBDIRS: &[&str] = &["licenses", "LICENSES"];

/// How much of the file participates in identifier detection.
const DETECTION_WINDOW: usize = 4096;

/// Identifier reported when a license file exists but matches no pattern.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("failed to scan `{}` for license files", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// A license file found in a scanned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedLicense {
    /// Path of the license file, relative to the scanned directory.
    pub file: PathBuf,
    /// Detected SPDX-style identifier, or [`UNKNOWN`].
    pub identifier: String,
}

/// Locate the canonical license file in `dir`.
///
/// Non-recursive, with a one-level fallback into well-known subdirectories
/// such as `licenses/`. When several canonical names are present the first by
/// priority wins.
pub fn scan_dir(dir: &Path) -> Result<Option<DetectedLicense>, LicenseError> {
    if let Some(found) = find_canonical(dir)? {
        return Ok(Some(detect(dir, found)?));
    }
    for subdir in WELL_KNOWN_SUBDIRS {
        let nested = dir.join(subdir);
        if !nested.is_dir() {
            continue;
        }
        if let Some(found) = find_canonical(&nested)? {
            return Ok(Some(detect(dir, Path::new(subdir).join(found))?));
        }
    }
    Ok(None)
}

/// Detect an identifier from the opening text of a license file.
pub fn detect_identifier(text: &str) -> Option<&'static str> {
    for (identifier, pattern) in patterns() {
        if pattern.is_match(text) {
            return Some(identifier);
        }
    }
    None
}

/// Check a user-asserted identifier against the SPDX expression grammar,
/// returning a warning message for unparseable values. The assertion is
/// honored either way; this only feeds the diagnostic field.
pub fn check_asserted(identifier: &str) -> Option<String> {
    match spdx::Expression::parse(identifier) {
        Ok(_) => None,
        Err(_) => Some(format!(
            "asserted license `{identifier}` is not a recognized SPDX expression"
        )),
    }
}

fn find_canonical(dir: &Path) -> Result<Option<PathBuf>, LicenseError> {
    let io_err = |err| LicenseError::Io {
        path: dir.to_path_buf(),
        err,
    };

    let mut names: Vec<String> = Vec::new();
    for entry in fs_err::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    for canonical in CANONICAL_NAMES {
        if let Some(name) = names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(canonical))
        {
            return Ok(Some(PathBuf::from(name)));
        }
    }
    Ok(None)
}

fn detect(root: &Path, relative: PathBuf) -> Result<DetectedLicense, LicenseError> {
    let path = root.join(&relative);
    let bytes = fs_err::read(&path).map_err(|err| LicenseError::Io { path, err })?;
    let window = &bytes[..bytes.len().min(DETECTION_WINDOW)];
    let text = String::from_utf8_lossy(window);

    let identifier = detect_identifier(&text).unwrap_or(UNKNOWN).to_owned();
    debug!("detected `{identifier}` in `{}`", relative.display());
    Ok(DetectedLicense {
        file: relative,
        identifier,
    })
}

fn patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // More specific texts first; BSD-3 must win over BSD-2.
            ("Apache-2.0", r"(?i)Apache License\s*,?\s*Version 2\.0"),
            (
                "MPL-2.0",
                r"(?i)Mozilla Public License(?:\s*,? (?:v\.|Version) 2\.0)",
            ),
            ("GPL-3.0", r"(?i)GNU GENERAL PUBLIC LICENSE\s+Version 3"),
            ("GPL-2.0", r"(?i)GNU GENERAL PUBLIC LICENSE\s+Version 2"),
            (
                "BSD-3-Clause",
                r"(?i)Redistribution and use in source and binary forms[\s\S]{0,600}?Neither the name",
            ),
            (
                "BSD-2-Clause",
                r"(?i)Redistribution and use in source and binary forms",
            ),
            (
                "MIT",
                r"(?i)(?:MIT License|Permission is hereby granted, free of charge)",
            ),
            (
                "Unlicense",
                r"(?i)This is free and unencumbered software released into the public domain",
            ),
            ("CC0-1.0", r"(?i)(?:CC0 1\.0 Universal|Creative Commons Zero)"),
        ]
        .into_iter()
        .map(|(identifier, pattern)| (identifier, Regex::new(pattern).unwrap()))
        .collect()
    })
}
