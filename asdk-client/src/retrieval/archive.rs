//! Export archive extraction
//!
//! Export files are zip archives. Entries are keyed by base name; directory
//! prefixes inside the archive are discarded.

use crate::error::{AsdkError, AsdkResult};
use bytes::Bytes;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Unpacked archive: base name → contents
pub type ArchiveContents = HashMap<String, Bytes>;

fn open(data: Bytes) -> AsdkResult<ZipArchive<Cursor<Bytes>>> {
    ZipArchive::new(Cursor::new(data))
        .map_err(|e| AsdkError::Archive(format!("Failed to read zip: {}", e)))
}

/// Last path component of an entry name, `None` for directories
fn base_name(entry_name: &str) -> Option<&str> {
    if entry_name.ends_with('/') {
        return None;
    }
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
}

/// `(index, base name)` of every file entry
fn list_files(data: Bytes) -> AsdkResult<Vec<(usize, String)>> {
    let mut archive = open(data)?;
    let mut files = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| AsdkError::Archive(format!("Bad entry {}: {}", index, e)))?;

        if entry.is_dir() {
            continue;
        }
        if let Some(name) = base_name(entry.name()) {
            files.push((index, name.to_string()));
        }
    }

    Ok(files)
}

fn read_entry(data: Bytes, index: usize) -> AsdkResult<Bytes> {
    let mut archive = open(data)?;
    let mut entry = archive
        .by_index(index)
        .map_err(|e| AsdkError::Archive(format!("Bad entry {}: {}", index, e)))?;

    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut contents)
        .map_err(|e| AsdkError::Archive(format!("Failed to inflate {}: {}", entry.name(), e)))?;

    Ok(Bytes::from(contents))
}

/// Unpack every file entry of a zip archive
///
/// Entries are inflated concurrently on the blocking pool; the map is
/// returned only once all of them are done. When two entries share a base
/// name the later one wins.
pub async fn extract_archive(data: Bytes) -> AsdkResult<ArchiveContents> {
    let listing = data.clone();
    let files = tokio::task::spawn_blocking(move || list_files(listing))
        .await
        .map_err(|e| AsdkError::Archive(format!("Listing task failed: {}", e)))??;

    let reads = files.into_iter().map(|(index, name)| {
        let data = data.clone();
        async move {
            let contents = tokio::task::spawn_blocking(move || read_entry(data, index))
                .await
                .map_err(|e| AsdkError::Archive(format!("Extraction task failed: {}", e)))??;
            Ok::<_, AsdkError>((name, contents))
        }
    });

    let mut contents = ArchiveContents::new();
    for (name, bytes) in try_join_all(reads).await? {
        if contents.insert(name.clone(), bytes).is_some() {
            warn!(name = %name, "Duplicate file name in archive, keeping the last one");
        }
    }

    debug!(files = contents.len(), "Archive extracted");
    Ok(contents)
}
