use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use tracing::{info, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::blob::{BlobError, BlobStore};
use crate::store::{NewBuildFile, Store};
use crate::types::{BuildFile, BuildFileState};

pub const ARCHIVE_KIND: &str = "archive";
pub const DEFAULT_SUB_TYPE: &str = "default";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("store: {0}")]
    Store(#[from] crate::error::Error),
    #[error("blob store: {0}")]
    Blob(#[from] BlobError),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Final location of an assembled archive. Needs the row id, so it is only
/// known after the BuildFile exists.
#[must_use]
pub fn archive_path(build_id: i64, file_id: i64) -> String {
    format!("builds/{build_id}/files/{file_id}")
}

/// True for archives produced by [`assemble`] rather than uploaded by a client.
#[must_use]
pub fn is_assembled(file: &BuildFile) -> bool {
    file.kind == ARCHIVE_KIND
        && file
            .storage_path
            .starts_with(&format!("builds/{}/files/", file.build_id))
}

/// `<type>_<sub_type>`, with `.zip` appended for archive entries.
#[must_use]
pub fn entry_name(file: &BuildFile) -> String {
    format!("{}_{}{}", file.kind, file.sub_type, extension(&file.kind))
}

fn extension(kind: &str) -> &'static str {
    if kind == ARCHIVE_KIND { ".zip" } else { "" }
}

fn entry_options(kind: &str) -> SimpleFileOptions {
    // Archives are already compressed.
    let method = if kind == ARCHIVE_KIND {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };

    SimpleFileOptions::default()
        .compression_method(method)
        .large_file(true)
}

/// Packs every uploaded file of a build into one zip and registers it as a
/// new `archive`/`default` BuildFile on the same build.
///
/// Sources that cannot be read are skipped. A build with nothing readable
/// still gets an archive holding a README placeholder.
pub async fn assemble(
    store: &Arc<dyn Store>,
    blobs: &Arc<dyn BlobStore>,
    build_id: i64,
    blob_timeout: Duration,
) -> Result<BuildFile, ArchiveError> {
    let sources: Vec<BuildFile> = store
        .list_build_files(build_id)?
        .into_iter()
        .filter(|f| f.state == BuildFileState::Uploaded && !is_assembled(f))
        .collect();

    let handle = Handle::current();
    let reader_blobs = Arc::clone(blobs);
    let mut archive = tokio::task::spawn_blocking(move || {
        write_archive(&handle, &reader_blobs, build_id, &sources, blob_timeout)
    })
    .await??;

    let size = archive.seek(SeekFrom::End(0))?;
    archive.seek(SeekFrom::Start(0))?;

    let row = store.create_build_file(&NewBuildFile {
        build_id,
        kind: ARCHIVE_KIND.to_string(),
        sub_type: DEFAULT_SUB_TYPE.to_string(),
        storage_path: format!("builds/{build_id}/files/pending-{}", Uuid::new_v4()),
    })?;

    let path = archive_path(build_id, row.id);
    let body = Box::new(tokio::fs::File::from_std(archive));

    if let Err(e) = blobs.put(&path, body).await {
        if let Err(cleanup) = store.delete_build_file(row.id) {
            warn!("Failed to remove archive row {} after upload error: {cleanup}", row.id);
        }
        return Err(e.into());
    }

    store.complete_build_file(row.id, &path, size as i64)?;

    info!(build_id, file_id = row.id, size, "Assembled build archive");

    Ok(store.get_build_file(row.id)?.unwrap_or(row))
}

fn write_archive(
    handle: &Handle,
    blobs: &Arc<dyn BlobStore>,
    build_id: i64,
    sources: &[BuildFile],
    blob_timeout: Duration,
) -> Result<std::fs::File, ArchiveError> {
    let mut zip = ZipWriter::new(tempfile::tempfile()?);
    let mut names = HashSet::new();
    let mut written = 0usize;

    for file in sources {
        let reader = match handle.block_on(tokio::time::timeout(
            blob_timeout,
            blobs.get(&file.storage_path),
        )) {
            Ok(Ok(reader)) => reader,
            Ok(Err(e)) => {
                warn!(build_id, file_id = file.id, "Skipping unreadable archive source: {e}");
                continue;
            }
            Err(_) => {
                warn!(build_id, file_id = file.id, "Skipping archive source: blob store timed out");
                continue;
            }
        };

        let mut name = entry_name(file);
        if !names.insert(name.clone()) {
            name = format!(
                "{}_{}_{}{}",
                file.kind,
                file.sub_type,
                file.id,
                extension(&file.kind)
            );
            names.insert(name.clone());
        }

        zip.start_file(name.as_str(), entry_options(&file.kind))?;

        let mut reader = SyncIoBridge::new_with_handle(reader, handle.clone());
        match std::io::copy(&mut reader, &mut zip) {
            Ok(_) => written += 1,
            Err(e) => {
                warn!(build_id, file_id = file.id, "Dropping partially copied entry {name}: {e}");
                zip.abort_file()?;
            }
        }
    }

    if written == 0 {
        zip.start_file("README.txt", entry_options("text"))?;
        zip.write_all(
            format!(
                "Build {build_id}\nGenerated at: {}\nNo files uploaded yet.\n",
                Utc::now().to_rfc3339()
            )
            .as_bytes(),
        )?;
    }

    Ok(zip.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(id: i64, kind: &str, sub_type: &str, path: &str) -> BuildFile {
        BuildFile {
            id,
            build_id: 3,
            kind: kind.to_string(),
            sub_type: sub_type.to_string(),
            size: 0,
            state: BuildFileState::Uploaded,
            storage_path: path.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_names() {
        assert_eq!(
            entry_name(&file(1, "archive", "default", "builds/3/a")),
            "archive_default.zip"
        );
        assert_eq!(
            entry_name(&file(2, "signature", "default", "builds/3/b")),
            "signature_default"
        );
        assert_eq!(entry_name(&file(3, "patch", "optimized", "builds/3/c")), "patch_optimized");
    }

    #[test]
    fn test_is_assembled_checks_files_prefix() {
        assert!(is_assembled(&file(9, "archive", "default", "builds/3/files/9")));
        assert!(!is_assembled(&file(1, "archive", "default", "builds/3/archive_default_x")));
        assert!(!is_assembled(&file(2, "patch", "default", "builds/3/files/2")));
    }

    #[test]
    fn test_archive_path() {
        assert_eq!(archive_path(3, 9), "builds/3/files/9");
    }
}
