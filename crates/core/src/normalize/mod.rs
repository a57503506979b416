//! Name normalization for pull titles and archive filenames.
//!
//! Both sides of a match go through the same pipeline so that
//! `"The Walking Dead #012 (2014)"` and `"the_walking_dead_012.cbz"` land
//! close to each other before edit distance is measured.

mod rules;

pub use rules::{RewriteRule, RewriteTable};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

static SPACE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_+]").unwrap());
static ARCHIVE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.cb[rz]$").unwrap());
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static VOLUME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bv\d+\b").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NOW_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.\d]+)\.now$").unwrap());
static LEADING_ZEROES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0+(\d[.\d]*)$").unwrap());
static ISSUE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*$").unwrap());

/// Canonical form of a title plus the issue number it ends with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedName {
    pub canonical: String,
    /// Trailing issue number, empty when the name has none.
    pub issue_number: String,
}

/// Normalizes names with a configurable rewrite table.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    rewrites: RewriteTable,
}

impl NameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewrites(rewrites: RewriteTable) -> Self {
        Self { rewrites }
    }

    pub fn rewrites(&self) -> &RewriteTable {
        &self.rewrites
    }

    /// Normalize a raw title or filename. Never fails.
    pub fn normalize(&self, raw: &str) -> NormalizedName {
        let normal = raw.to_lowercase();
        let normal = SPACE_CHARS.replace_all(&normal, " ");
        let normal = ARCHIVE_EXTENSION.replace(&normal, "");
        // Publication years and scan-group tags
        let normal = PARENTHESIZED.replace_all(&normal, "");
        let normal = BRACKETED.replace_all(&normal, "");
        let normal = VOLUME_TOKEN.replace_all(&normal, "");

        let normal = self.rewrites.apply(&normal);

        let normal = SPACE_CHARS.replace_all(&normal, " ");
        let normal = WHITESPACE_RUN.replace_all(&normal, " ");
        let normal = normal.trim().replace('\u{bd}', "0.5");

        let normal = NOW_SUFFIX.replace(&normal, "${1}");
        let normal = LEADING_ZEROES.replace(&normal, "${1}").into_owned();

        let issue_number = ISSUE_NUMBER
            .find(&normal)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        NormalizedName {
            canonical: normal,
            issue_number,
        }
    }
}

/// Normalize with the default rewrite table.
pub fn normalize(raw: &str) -> NormalizedName {
    static DEFAULT: Lazy<NameNormalizer> = Lazy::new(NameNormalizer::default);
    DEFAULT.normalize(raw)
}
