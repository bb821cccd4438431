//! Actions shipped with the engine.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Action, ActionContext};
use crate::fs::remove_path_if_exists;
use crate::status::Status;

/// Queues the unit's artifacts for the collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectAction;

impl Action for CollectAction {
    fn name(&self) -> &str {
        "collect"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let requests = ctx.unit.artifact_requests();
        tracing::debug!(unit = %ctx.unit, count = requests.len(), "Queued artifact requests");
        ctx.params.add_artifact_requests(requests);
        Ok(Status::ok())
    }

    fn undo(&self, _ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        Ok(Status::ok())
    }
}

/// `mkdir(path:...)`
#[derive(Debug, Default, Clone, Copy)]
pub struct MkdirAction;

impl Action for MkdirAction {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let path = ctx.install_path("path")?;
        create_dir(&path)?;
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let path = ctx.install_path("path")?;
        remove_empty_dir(&path)
    }
}

/// `rmdir(path:...)`, removes a directory only if it is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct RmdirAction;

impl Action for RmdirAction {
    fn name(&self) -> &str {
        "rmdir"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let path = ctx.install_path("path")?;
        remove_empty_dir(&path)
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let path = ctx.install_path("path")?;
        create_dir(&path)?;
        Ok(Status::ok())
    }
}

/// `copy(source:...,target:...[,overwrite:true])`
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyAction;

impl Action for CopyAction {
    fn name(&self) -> &str {
        "copy"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let source = ctx.source_path("source")?;
        let target = ctx.install_path("target")?;
        let overwrite = ctx.argument("overwrite") == Some("true");

        if target.exists() && !overwrite {
            anyhow::bail!("Copy target already exists: {}", target.display());
        }
        if let Some(parent) = target.parent() {
            create_dir(parent)?;
        }
        fs::copy(&source, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                source.display(),
                target.display()
            )
        })?;
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let target = ctx.install_path("target")?;
        remove_path_if_exists(&target)?;
        Ok(Status::ok())
    }
}

/// `unzip(source:...,target:...)`, extracts an archive into the install tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnzipAction;

impl Action for UnzipAction {
    fn name(&self) -> &str {
        "unzip"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let source = ctx.source_path("source")?;
        let target = ctx.install_path("target")?;
        let count = extract_archive(&source, &target)?;
        tracing::debug!(unit = %ctx.unit, target = %target.display(), count, "Extracted archive");
        Ok(Status::ok())
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        let source = ctx.source_path("source")?;
        let target = ctx.install_path("target")?;
        remove_archive_entries(&source, &target)?;
        Ok(Status::ok())
    }
}

/// `cleanupzip(source:...,target:...)`, removes what `unzip` extracted.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupZipAction;

impl Action for CleanupZipAction {
    fn name(&self) -> &str {
        "cleanupzip"
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        UnzipAction.undo(ctx)
    }

    fn undo(&self, ctx: &mut ActionContext<'_>) -> anyhow::Result<Status> {
        UnzipAction.execute(ctx)
    }
}

fn create_dir(path: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

fn remove_empty_dir(path: &Path) -> anyhow::Result<Status> {
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Status::ok()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read directory: {}", path.display()));
        }
    };
    if entries.next().is_some() {
        return Ok(Status::warning(format!(
            "Directory not empty, left in place: {}",
            path.display()
        )));
    }
    fs::remove_dir(path)
        .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    Ok(Status::ok())
}

fn open_archive(source: &Path) -> anyhow::Result<zip::ZipArchive<File>> {
    let file = File::open(source)
        .with_context(|| format!("Failed to open archive: {}", source.display()))?;
    zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive: {}", source.display()))
}

/// Extract into a staging directory inside `target`, then move the
/// top-level entries into place. Returns the number of archive entries.
fn extract_archive(source: &Path, target: &Path) -> anyhow::Result<usize> {
    let mut archive = open_archive(source)?;
    create_dir(target)?;
    let staging = tempfile::Builder::new()
        .prefix(".unzip-")
        .tempdir_in(target)
        .with_context(|| format!("Failed to create staging directory in {}", target.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        // Entries with unsafe paths are skipped
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = staging.path().join(relative);

        if entry.is_dir() {
            create_dir(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            create_dir(parent)?;
        }
        let mut outfile = File::create(&outpath)
            .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
        io::copy(&mut entry, &mut outfile)
            .with_context(|| format!("Failed to extract zip entry: {}", entry.name()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                // Permission bits are best-effort
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    for item in fs::read_dir(staging.path())
        .with_context(|| format!("Failed to read staging directory: {}", staging.path().display()))?
    {
        let item = item?;
        move_merged(&item.path(), &target.join(item.file_name()))?;
    }
    Ok(archive.len())
}

/// Move `from` to `to`, merging into existing directories and replacing files.
fn move_merged(from: &Path, to: &Path) -> anyhow::Result<()> {
    if from.is_dir() && to.is_dir() {
        for item in fs::read_dir(from)
            .with_context(|| format!("Failed to read directory: {}", from.display()))?
        {
            let item = item?;
            move_merged(&item.path(), &to.join(item.file_name()))?;
        }
        return Ok(());
    }
    remove_path_if_exists(to)?;
    fs::rename(from, to)
        .with_context(|| format!("Failed to move extracted entry to {}", to.display()))
}

/// Remove every file listed in the archive from `target`, then any directories
/// the archive created that are now empty.
fn remove_archive_entries(source: &Path, target: &Path) -> anyhow::Result<usize> {
    let mut archive = open_archive(source)?;
    let mut files = Vec::new();
    let mut dirs = BTreeSet::new();

    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        for ancestor in relative.ancestors().skip(1) {
            if !ancestor.as_os_str().is_empty() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        if entry.is_dir() {
            dirs.insert(relative);
        } else {
            files.push(relative);
        }
    }

    let mut removed = 0;
    for relative in &files {
        if remove_path_if_exists(&target.join(relative))? {
            removed += 1;
        }
    }

    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for relative in dirs {
        remove_empty_dir(&target.join(relative))?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extract_then_remove_restores_target() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.zip");
        write_zip(
            &archive,
            &[("bin/tool", b"#!/bin/sh\n"), ("README", b"docs")],
        );
        let target = temp.path().join("install");
        fs::create_dir_all(target.join("bin")).unwrap();
        fs::write(target.join("keep.txt"), b"user data").unwrap();
        fs::write(target.join("bin/other"), b"installed earlier").unwrap();

        assert_eq!(extract_archive(&archive, &target).unwrap(), 2);
        assert_eq!(fs::read(target.join("bin/tool")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(fs::read(target.join("README")).unwrap(), b"docs");

        let leftovers: Vec<_> = fs::read_dir(&target)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".unzip-"))
            .collect();
        assert!(leftovers.is_empty());

        assert_eq!(remove_archive_entries(&archive, &target).unwrap(), 2);
        assert!(!target.join("bin/tool").exists());
        assert!(target.join("bin/other").exists());
        assert!(!target.join("README").exists());
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn extract_rejects_non_archives() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("bogus.zip");
        fs::write(&bogus, b"not a zip").unwrap();
        let target = temp.path().join("out");

        let err = extract_archive(&bogus, &target).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read zip archive"));
    }

    #[test]
    fn remove_empty_dir_leaves_populated_directories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("plugins");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.jar"), b"jar").unwrap();

        let status = remove_empty_dir(&dir).unwrap();
        assert_eq!(status.severity(), crate::status::Severity::Warning);
        assert!(dir.exists());

        fs::remove_file(dir.join("a.jar")).unwrap();
        assert!(remove_empty_dir(&dir).unwrap().is_ok());
        assert!(!dir.exists());
        assert!(remove_empty_dir(&dir).unwrap().is_ok());
    }
}
