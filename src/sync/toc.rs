// pgmigrate/src/sync/toc.rs
//! Filtering of `pg_restore --list` manifests.
//!
//! Entries a local PostgreSQL cannot replay (managed-service extensions and
//! ownership changes to provider roles) are commented out with a leading `;`,
//! the comment syntax `pg_restore --use-list` understands.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::errors::{AppError, Result};

/// Extensions and roles whose manifest entries get commented out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TocFilter {
    pub extensions: Vec<String>,
    pub privileged_roles: Vec<String>,
}

impl Default for TocFilter {
    fn default() -> Self {
        Self {
            extensions: vec!["azure".to_string(), "pgaadauth".to_string()],
            privileged_roles: vec!["azure_pg_admin".to_string(), "forceelevensa".to_string()],
        }
    }
}

impl TocFilter {
    fn excludes(&self, line: &[u8]) -> bool {
        // Names may be in any server encoding; the markers matched here are ASCII.
        let line = String::from_utf8_lossy(line);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return false;
        }
        let extension_entry = self.extensions.iter().any(|ext| {
            trimmed.contains(&format!(" EXTENSION - {}", ext))
                || trimmed.contains(&format!(" COMMENT - EXTENSION {}", ext))
        });
        let ownership_entry = trimmed.starts_with("ALTER ")
            && self
                .privileged_roles
                .iter()
                .any(|role| trimmed.contains(&format!(" OWNER TO {}", role)));
        extension_entry || ownership_entry
    }
}

/// Comments out excluded entries. Every other byte, line terminators included, is kept.
pub fn edit_toc(manifest: &[u8], filter: &TocFilter) -> Vec<u8> {
    filter_lines(manifest, filter).0
}

fn filter_lines(manifest: &[u8], filter: &TocFilter) -> (Vec<u8>, usize) {
    let mut edited = Vec::with_capacity(manifest.len() + 16);
    let mut commented = 0;
    for line in manifest.split_inclusive(|b| *b == b'\n') {
        if filter.excludes(line) {
            edited.push(b';');
            commented += 1;
        }
        edited.extend_from_slice(line);
    }
    (edited, commented)
}

/// Reads `input`, filters it and writes the result to `output`. Returns the number of commented entries.
pub fn edit_toc_file(input: &Path, output: &Path, filter: &TocFilter) -> Result<usize> {
    let manifest = std::fs::read(input).map_err(|e| AppError::io(input, e))?;
    let (edited, commented) = filter_lines(&manifest, filter);
    std::fs::write(output, &edited).map_err(|e| AppError::io(output, e))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        commented,
        "TOC file edited"
    );
    Ok(commented)
}
