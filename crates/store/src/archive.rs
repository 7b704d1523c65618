//! Zip archive unpacking and packing for component payloads.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;

use crate::error::{ExchangeError, Result};
use crate::models::has_component_json;
use crate::organizer::{MIN_DIR, TYPES_DIR};

/// Extract `archive_path` into `target_dir`, creating it when needed
pub async fn unpack(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let target_dir = target_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_zip(&archive_path, &target_dir))
        .await
        .map_err(|e| ExchangeError::Archive(format!("unpack task failed: {}", e)))?
}

fn extract_zip(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| ExchangeError::io("open archive", archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    std::fs::create_dir_all(target_dir)
        .map_err(|e| ExchangeError::io("create install directory", target_dir, e))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = match file.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => continue,
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent()
                && !p.exists()
            {
                std::fs::create_dir_all(p)?;
            }
            let mut outfile = File::create(&outpath)
                .map_err(|e| ExchangeError::io("create unpacked file", &outpath, e))?;
            std::io::copy(&mut file, &mut outfile)?;
        }
    }

    debug!(
        "Unpacked {} entries into {}",
        archive.len(),
        target_dir.display()
    );
    Ok(())
}

/// Clear a pack directory ahead of an update.
///
/// Files and directories without a descriptor are removed. Member directories that
/// still carry a `component.json` stay, and so do their relocated `min/<member>`
/// and `types/<member>` folders.
pub async fn purge_pack_dir(pack_dir: &Path) -> Result<()> {
    if !fs::try_exists(pack_dir).await.unwrap_or(false) {
        return Ok(());
    }

    let mut entries = fs::read_dir(pack_dir)
        .await
        .map_err(|e| ExchangeError::io("read pack directory", pack_dir, e))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;

        if !file_type.is_dir() {
            fs::remove_file(&path)
                .await
                .map_err(|e| ExchangeError::io("purge pack file", &path, e))?;
            continue;
        }

        if has_component_json(&path).await {
            continue;
        }

        let name = entry.file_name();
        if matches!(name.to_str(), Some(MIN_DIR) | Some(TYPES_DIR)) {
            purge_shared_dir(pack_dir, &path).await?;
        } else {
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| ExchangeError::io("purge pack directory", &path, e))?;
        }
    }

    Ok(())
}

/// Keep the `<member>` entries of a shared folder whose member is still installed
async fn purge_shared_dir(pack_dir: &Path, shared: &Path) -> Result<()> {
    let mut entries = fs::read_dir(shared)
        .await
        .map_err(|e| ExchangeError::io("read shared pack folder", shared, e))?;
    let mut kept = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let member_dir = pack_dir.join(entry.file_name());
        if entry.file_type().await?.is_dir() && has_component_json(&member_dir).await {
            kept += 1;
            continue;
        }
        remove_path(&path).await?;
    }

    if kept == 0 {
        fs::remove_dir_all(shared)
            .await
            .map_err(|e| ExchangeError::io("purge shared pack folder", shared, e))?;
    }
    Ok(())
}

/// Drop the relocated `min/<member>` and `types/<member>` folders of one member
pub async fn clear_member_resources(pack_dir: &Path, member: &str) -> Result<()> {
    for shared in [MIN_DIR, TYPES_DIR] {
        let path = pack_dir.join(shared).join(member);
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Clearing {}", path.display());
            remove_path(&path).await?;
        }
    }
    Ok(())
}

async fn remove_path(path: &Path) -> Result<()> {
    let result = if fs::metadata(path).await?.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| ExchangeError::io("remove stale pack resource", path, e))
}

/// Zip the contents of `dir` (relative paths, files only) into memory
pub async fn pack_directory(dir: &Path) -> Result<Vec<u8>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || zip_dir(&dir))
        .await
        .map_err(|e| ExchangeError::Archive(format!("pack task failed: {}", e)))?
}

fn zip_dir(dir: &Path) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut buffer = Vec::new();
    for path in files {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| ExchangeError::Archive(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)?;
        buffer.clear();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut buffer))
            .map_err(|e| ExchangeError::io("read file for archive", &path, e))?;
        zip.write_all(&buffer)?;
    }

    Ok(zip.finish()?.into_inner())
}
