//! Packages the workspace into the downloadable deflate archive.
//!
//! Every regular file is included except the protocol files, matched by exact
//! name at any depth. Symlinks are not followed. The archive is written to a
//! hidden temp file and renamed into place so pollers never see a partial zip.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::layout::{JobLayout, ProtocolFiles};
use crate::error::{JobError, JobResult};

/// Result of packaging a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Archive entry names (`/`-separated, relative to the workspace), sorted.
    pub entries: Vec<String>,
    pub bytes: u64,
}

#[instrument(skip_all, fields(root = %layout.root.display()))]
pub fn create_archive(layout: &JobLayout, protocol: &ProtocolFiles) -> JobResult<ArchiveSummary> {
    let (file, tmp_path) = NamedTempFile::new_in(&layout.root)
        .map_err(|err| JobError::io(format!("create temp archive in {}", layout.root.display()), err))?
        .into_parts();
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::new();
    let walker = WalkDir::new(&layout.root)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|err| {
            let context = format!("walk workspace {}", layout.root.display());
            JobError::io(context, io::Error::other(err))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if protocol.is_protocol_file(&name) || entry.path() == &*tmp_path {
            continue;
        }

        let entry_name = entry_name(&layout.root, entry.path())?;
        zip.start_file(entry_name.as_str(), options)
            .map_err(|err| zip_error(&tmp_path, err))?;
        let mut source = File::open(entry.path())
            .map_err(|err| JobError::io(format!("open {}", entry.path().display()), err))?;
        io::copy(&mut source, &mut zip)
            .map_err(|err| JobError::io(format!("compress {}", entry.path().display()), err))?;
        debug!(entry = %entry_name, "added archive entry");
        entries.push(entry_name);
    }

    let writer = zip.finish().map_err(|err| zip_error(&tmp_path, err))?;
    writer
        .into_inner()
        .map_err(|err| JobError::io(format!("flush {}", tmp_path.display()), err.into_error()))?;
    tmp_path.persist(&layout.artifact_path).map_err(|err| {
        JobError::io(
            format!("replace archive {}", layout.artifact_path.display()),
            err.error,
        )
    })?;

    let bytes = fs::metadata(&layout.artifact_path)
        .map(|meta| meta.len())
        .map_err(|err| JobError::io(format!("stat {}", layout.artifact_path.display()), err))?;
    info!(
        files = entries.len(),
        bytes,
        "created output archive {} ({} files, {} bytes)",
        layout.artifact_path.display(),
        entries.len(),
        bytes
    );

    Ok(ArchiveSummary {
        path: layout.artifact_path.clone(),
        entries,
        bytes,
    })
}

fn entry_name(root: &Path, path: &Path) -> JobResult<String> {
    let relative = path.strip_prefix(root).map_err(|err| {
        JobError::io(
            format!("relativize {}", path.display()),
            io::Error::other(err),
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn zip_error(path: &Path, err: zip::result::ZipError) -> JobError {
    JobError::io(format!("write archive {}", path.display()), io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use zip::ZipArchive;

    use super::*;

    fn read_entries(path: &Path) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(File::open(path).expect("open")).expect("zip");
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).expect("entry");
            let mut body = String::new();
            file.read_to_string(&mut body).expect("read entry");
            out.push((file.name().to_string(), body));
        }
        out
    }

    #[test]
    fn excludes_protocol_files_at_any_depth() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let layout = JobLayout::with_defaults(root);
        for (name, body) in [
            ("task.txt", "task"),
            ("status.txt", "running"),
            ("log.txt", "log"),
            ("hello.txt", "HELLO"),
            ("src/main.rs", "fn main() {}"),
            ("docs/log.txt", "shadowed"),
        ] {
            let path = root.join(name);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(path, body).expect("write");
        }

        let summary = create_archive(&layout, &ProtocolFiles::default()).expect("archive");

        assert_eq!(summary.entries, vec!["hello.txt", "src/main.rs"]);
        assert_eq!(
            read_entries(&layout.artifact_path),
            vec![
                ("hello.txt".to_string(), "HELLO".to_string()),
                ("src/main.rs".to_string(), "fn main() {}".to_string()),
            ]
        );
        let mut leftovers: Vec<String> = fs::read_dir(root)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        leftovers.sort();
        assert_eq!(
            leftovers,
            vec!["docs", "hello.txt", "log.txt", "output.zip", "src", "status.txt", "task.txt"]
        );
    }

    #[test]
    fn generated_file_named_like_a_temp_archive_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        fs::write(temp.path().join(".output.zip.tmp"), "mine").expect("write");

        let summary = create_archive(&layout, &ProtocolFiles::default()).expect("archive");

        assert_eq!(summary.entries, vec![".output.zip.tmp"]);
        assert_eq!(
            fs::read_to_string(temp.path().join(".output.zip.tmp")).expect("read"),
            "mine"
        );
    }

    #[test]
    fn empty_workspace_yields_empty_archive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        fs::write(&layout.task_path, "task").expect("task");

        let summary = create_archive(&layout, &ProtocolFiles::default()).expect("archive");
        assert!(summary.entries.is_empty());
        assert!(read_entries(&layout.artifact_path).is_empty());
    }

    #[test]
    fn repackaging_produces_the_same_file_set() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        fs::write(temp.path().join("a.txt"), "a").expect("write");
        fs::create_dir_all(temp.path().join("b")).expect("mkdir");
        fs::write(temp.path().join("b/c.txt"), "c").expect("write");

        create_archive(&layout, &ProtocolFiles::default()).expect("first");
        let first = read_entries(&layout.artifact_path);
        create_archive(&layout, &ProtocolFiles::default()).expect("second");
        let second = read_entries(&layout.artifact_path);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
