//! Applies the generated file mapping to the workspace.
//!
//! Every filename is validated before anything is written, so a rejected name
//! leaves the workspace untouched. Any single failure aborts the job: the model
//! produced one coherent plan and partial application counts as failure.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::core::layout::{JobLayout, ProtocolFiles};
use crate::core::security::{CheckedPath, SecurityPolicy, SecurityRejection};
use crate::error::JobResult;
use crate::io::job_dir::write_atomic;

/// One file written into the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub relative: PathBuf,
    pub bytes: usize,
}

pub struct FileWriter<'a> {
    layout: &'a JobLayout,
    protocol: &'a ProtocolFiles,
    policy: &'a SecurityPolicy,
}

impl<'a> FileWriter<'a> {
    pub fn new(
        layout: &'a JobLayout,
        protocol: &'a ProtocolFiles,
        policy: &'a SecurityPolicy,
    ) -> Self {
        Self {
            layout,
            protocol,
            policy,
        }
    }

    #[instrument(skip_all, fields(count = files.len()))]
    pub fn write_all(&self, files: &BTreeMap<String, String>) -> JobResult<Vec<WrittenFile>> {
        info!("writing {} files", files.len());

        let mut checked = Vec::with_capacity(files.len());
        for (name, content) in files {
            checked.push((self.check(name)?, content));
        }

        let mut written = Vec::with_capacity(checked.len());
        for (path, content) in checked {
            if path.executable {
                warn!(path = %path.relative.display(), "executable file detected");
            }
            let target = self.layout.root.join(&path.relative);
            write_atomic(&target, content)?;
            info!(
                path = %path.relative.display(),
                bytes = content.len(),
                "wrote file {} ({} bytes)",
                path.relative.display(),
                content.len()
            );
            written.push(WrittenFile {
                relative: path.relative,
                bytes: content.len(),
            });
        }
        Ok(written)
    }

    fn check(&self, name: &str) -> Result<CheckedPath, SecurityRejection> {
        let checked = self.policy.check_filename(name)?;
        let top_level_name = checked.relative.components().count() == 1;
        if top_level_name && self.protocol.is_protocol_file(&checked.relative.to_string_lossy()) {
            return Err(SecurityRejection::ProtocolFile(name.to_string()));
        }
        Ok(checked)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::JobError;

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn writes_nested_files_and_overwrites_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        let protocol = ProtocolFiles::default();
        let policy = SecurityPolicy::standard(true);
        fs::write(temp.path().join("README.md"), "old").expect("seed");

        let writer = FileWriter::new(&layout, &protocol, &policy);
        let written = writer
            .write_all(&files(&[
                ("README.md", "new"),
                ("src/app/main.py", "print('hi')\n"),
            ]))
            .expect("write");

        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("README.md")).expect("read"),
            "new"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("src/app/main.py")).expect("read"),
            "print('hi')\n"
        );
        assert!(written.contains(&WrittenFile {
            relative: PathBuf::from("src/app/main.py"),
            bytes: 12,
        }));
    }

    #[test]
    fn traversal_rejects_whole_batch_before_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        let protocol = ProtocolFiles::default();
        let policy = SecurityPolicy::standard(true);

        let err = FileWriter::new(&layout, &protocol, &policy)
            .write_all(&files(&[("a.txt", "a"), ("../escape.txt", "x")]))
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::SecurityRejection(SecurityRejection::ParentTraversal(_))
        ));
        assert!(!temp.path().join("a.txt").exists());
    }

    #[test]
    fn protocol_files_cannot_be_generated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = JobLayout::with_defaults(temp.path());
        let protocol = ProtocolFiles::default();
        let policy = SecurityPolicy::standard(true);

        let err = FileWriter::new(&layout, &protocol, &policy)
            .write_all(&files(&[("./status.txt", "complete")]))
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::SecurityRejection(SecurityRejection::ProtocolFile(_))
        ));

        FileWriter::new(&layout, &protocol, &policy)
            .write_all(&files(&[("docs/log.txt", "nested is fine")]))
            .expect("nested protocol name is an ordinary file");
    }
}
