//! Content-addressed cache of unpacked problem tests.
//!
//! Unpacked trees live under `<cache_dir>/tests/<problemId>_<updatedAt>/`.
//! The key embeds the problem's update timestamp, so re-uploading a problem
//! abandons the old tree instead of mutating it. Publication is atomic:
//! archives are unpacked into a temp sibling and renamed into place, so a
//! concurrent reader can never observe a half-unpacked directory. Entries are
//! never evicted within a process run.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::Error;
use crate::model::Packet;

/// Shared cache of unpacked test archives.
#[derive(Debug)]
pub struct TestCache {
    root: PathBuf,
}

impl TestCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one subdirectory per cache key.
    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    /// Ensure the packet's tests are unpacked and return the tree's path.
    ///
    /// The returned directory contains the archive's `tests/` subtree, so the
    /// input for test `n` is at `<returned>/tests/<n>` and its reference
    /// output at `<returned>/tests/<n>.a`.
    #[instrument(skip(self, packet), fields(key = %packet.cache_key()))]
    pub async fn prepare(&self, packet: &Packet) -> Result<PathBuf, Error> {
        let target = self.tests_dir().join(packet.cache_key());

        if tokio::fs::metadata(&target).await.is_ok() {
            debug!("cache hit");
            return Ok(target);
        }

        tokio::fs::create_dir_all(self.tests_dir())
            .await
            .map_err(|e| Error::wrap("cache.prepare", "failed to create cache dir", e))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".tmp-{}-", packet.cache_key()))
            .tempdir_in(self.tests_dir())
            .map_err(|e| Error::wrap("cache.prepare", "failed to create staging dir", e))?;

        let archive_path = packet.archive_path.clone();
        let staging_dir = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tests(&archive_path, &staging_dir))
            .await
            .map_err(|e| Error::wrap("cache.prepare", "unpack task failed", e))??;

        // Publish atomically. Losing the rename race to a concurrent preparer
        // still counts as a hit: the winner's tree is complete.
        let staging_path = staging.into_path();
        match tokio::fs::rename(&staging_path, &target).await {
            Ok(()) => {
                debug!("unpacked and published");
                Ok(target)
            }
            Err(err) => {
                let _ = tokio::fs::remove_dir_all(&staging_path).await;
                if tokio::fs::metadata(&target).await.is_ok() {
                    debug!("lost publish race, reusing winner's tree");
                    Ok(target)
                } else {
                    Err(Error::wrap(
                        "cache.prepare",
                        "failed to publish unpacked tests",
                        err,
                    ))
                }
            }
        }
    }
}

/// Unpack the `tests/` subtree of a zip archive into `dest`, preserving the
/// entry paths.
fn unpack_tests(archive: &Path, dest: &Path) -> Result<(), Error> {
    let file = File::open(archive)
        .map_err(|e| Error::wrap("cache.unpack", "failed to open archive", e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::wrap("cache.unpack", "failed to read archive", e))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| Error::wrap("cache.unpack", "failed to read archive entry", e))?;

        let Some(entry_path) = entry.enclosed_name() else {
            return Err(Error::internal(
                "cache.unpack",
                format!("archive entry {:?} has an unsafe path", entry.name()),
            ));
        };
        if !entry_path.starts_with("tests") {
            continue;
        }
        if entry.is_dir() {
            continue;
        }

        let dest_path = dest.join(&entry_path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::wrap("cache.unpack", "failed to create test dir", e))?;
        }
        let mut out = File::create(&dest_path)
            .map_err(|e| Error::wrap("cache.unpack", "failed to create test file", e))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| Error::wrap("cache.unpack", "failed to write test file", e))?;
    }

    Ok(())
}
