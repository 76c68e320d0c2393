//! Problem archive inspection.
//!
//! A problem archive is a flat zip:
//!
//! ```text
//! statements/<locale>/problem-properties.json   // name, timeLimit, memoryLimit
//! tests/<name>                                  // per-test stdin
//! tests/<name>.a                                // per-test reference stdout
//! ```
//!
//! Inspection validates the layout at upload time and derives the test
//! manifest; archives with a missing properties file, unpaired tests, or
//! duplicate test names are rejected before anything is persisted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::model::Manifest;

const PROPERTIES_FILE: &str = "problem-properties.json";

/// Problem metadata extracted from `problem-properties.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemProperties {
    pub title: String,
    pub time_limit_ms: i64,
    pub memory_limit_mib: i64,
}

/// Result of inspecting an uploaded archive.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub properties: ProblemProperties,
    pub manifest: Manifest,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    name: String,
    time_limit: i64,
    /// Bytes in the archive; converted to MiB on ingestion.
    memory_limit: i64,
}

/// Validate an archive and derive its manifest and limits.
pub fn inspect_archive(path: &Path) -> Result<ArchiveInfo, Error> {
    let file = File::open(path).map_err(|e| Error::wrap("archive.inspect", "failed to open archive", e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::wrap("archive.inspect", "failed to read archive", e))?;

    let mut properties: Option<ProblemProperties> = None;
    // name -> (has input, has answer); BTreeMap keeps the manifest ordered.
    let mut tests: BTreeMap<String, (bool, bool)> = BTreeMap::new();

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| Error::wrap("archive.inspect", "failed to read archive entry", e))?;
        if entry.is_dir() {
            continue;
        }

        let Some(entry_path) = entry.enclosed_name() else {
            return Err(Error::bad_input(format!(
                "archive entry {:?} has an unsafe path",
                entry.name()
            )));
        };

        if is_properties_entry(&entry_path) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| Error::wrap("archive.inspect", "failed to read properties", e))?;
            let raw: RawProperties = serde_json::from_str(&content)
                .map_err(|e| Error::wrap("archive.inspect", "invalid problem-properties.json", e))?;
            properties = Some(ProblemProperties {
                title: raw.name,
                time_limit_ms: raw.time_limit,
                memory_limit_mib: raw.memory_limit / (1024 * 1024),
            });
            continue;
        }

        let Ok(rest) = entry_path.strip_prefix("tests") else {
            continue;
        };
        let Some(file_name) = rest.to_str() else {
            return Err(Error::bad_input(format!(
                "archive test entry {:?} is not valid UTF-8",
                entry.name()
            )));
        };
        if file_name.is_empty() {
            continue;
        }

        let (name, is_answer) = match file_name.strip_suffix(".a") {
            Some(stem) => (stem, true),
            None => (file_name, false),
        };
        if name.is_empty() {
            return Err(Error::bad_input(format!(
                "archive test entry {file_name:?} has an empty test name"
            )));
        }

        let slot = tests.entry(name.to_owned()).or_insert((false, false));
        let seen = if is_answer { &mut slot.1 } else { &mut slot.0 };
        if *seen {
            return Err(Error::bad_input(format!(
                "duplicate test entry for {name:?}"
            )));
        }
        *seen = true;
    }

    let properties = properties
        .ok_or_else(|| Error::bad_input("archive is missing problem-properties.json"))?;

    let mut names = Vec::with_capacity(tests.len());
    for (name, (has_input, has_answer)) in tests {
        match (has_input, has_answer) {
            (true, true) => names.push(name),
            (true, false) => {
                return Err(Error::bad_input(format!("test {name:?} has no answer file")));
            }
            (false, _) => {
                return Err(Error::bad_input(format!("answer {name:?} has no test file")));
            }
        }
    }

    Ok(ArchiveInfo {
        properties,
        manifest: Manifest::new(names),
    })
}

fn is_properties_entry(path: &Path) -> bool {
    path.starts_with("statements")
        && path
            .file_name()
            .is_some_and(|name| name == PROPERTIES_FILE)
}
