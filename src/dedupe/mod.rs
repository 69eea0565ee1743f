//! Content fingerprints and duplicate folder removal.
use crate::config::KeepPolicy;
use crate::errors::{AppError, AppResult};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 8 * 1024;

/// Hex SHA-256 over the concatenated bytes of a folder's files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint the immediate files of `dir`, in filename order.
///
/// Only contents are hashed, so neither filenames nor file boundaries affect
/// the result. Files that cannot be read are skipped.
pub fn fingerprint_folder(dir: &Path) -> AppResult<Fingerprint> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| AppError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    for path in &files {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        loop {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Read failed mid-file");
                    break;
                }
            }
        }
    }

    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Folders sharing one fingerprint. The first member is the one kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    pub members: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn kept(&self) -> &Path {
        &self.members[0]
    }

    pub fn redundant(&self) -> &[PathBuf] {
        &self.members[1..]
    }
}

/// Result of fingerprinting every folder under a root.
#[derive(Debug, Default, Clone)]
pub struct DuplicateScan {
    pub scanned: usize,
    pub groups: Vec<DuplicateGroup>,
    pub hash_failures: Vec<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct DedupeReport {
    pub scanned: usize,
    pub groups: Vec<DuplicateGroup>,
    pub removed: Vec<PathBuf>,
    pub hash_failures: Vec<PathBuf>,
    pub delete_failures: Vec<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    keep: KeepPolicy,
    dry_run: bool,
}

impl Deduplicator {
    pub fn new(keep: KeepPolicy) -> Self {
        Self {
            keep,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Groups of two or more folders under `root` with equal fingerprints.
    pub fn find_duplicates(&self, root: &Path) -> AppResult<DuplicateScan> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(root)
            .map_err(|e| AppError::io(root, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        if self.keep == KeepPolicy::FirstByName {
            dirs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        }

        let hashed: Vec<(PathBuf, AppResult<Fingerprint>)> = dirs
            .into_par_iter()
            .map(|dir| {
                let fp = fingerprint_folder(&dir);
                (dir, fp)
            })
            .collect();

        Ok(group_by_fingerprint(hashed))
    }

    /// Delete every redundant member of every duplicate group under `root`.
    pub fn run(&self, root: &Path) -> AppResult<DedupeReport> {
        let scan = self.find_duplicates(root)?;
        Ok(self.remove_duplicates(scan, |dir| fs::remove_dir_all(dir)))
    }

    /// Remove the redundant members of `scan` with `remove`.
    ///
    /// A failed removal is logged and recorded; the remaining folders are
    /// still processed.
    pub fn remove_duplicates<F>(&self, scan: DuplicateScan, mut remove: F) -> DedupeReport
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let DuplicateScan {
            scanned,
            groups,
            hash_failures,
        } = scan;
        let mut report = DedupeReport {
            scanned,
            hash_failures,
            dry_run: self.dry_run,
            ..Default::default()
        };

        for group in &groups {
            for dir in group.redundant() {
                if self.dry_run {
                    info!(folder = %dir.display(), kept = %group.kept().display(), "Would delete duplicate mail folder");
                    report.removed.push(dir.clone());
                    continue;
                }
                match remove(dir) {
                    Ok(()) => {
                        info!(folder = %dir.display(), kept = %group.kept().display(), "Deleted duplicate mail folder");
                        report.removed.push(dir.clone());
                    }
                    Err(e) => {
                        warn!(folder = %dir.display(), error = %e, "Deleting duplicate folder failed");
                        report.delete_failures.push(dir.clone());
                    }
                }
            }
        }
        report.groups = groups;

        report
    }
}

/// Group hashed folders by fingerprint, in input order.
///
/// Folders whose hash failed join no group, so they are never deleted. Only
/// groups with two or more members are returned.
pub fn group_by_fingerprint(hashed: Vec<(PathBuf, AppResult<Fingerprint>)>) -> DuplicateScan {
    let scanned = hashed.len();
    let mut failures = Vec::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut index: HashMap<Fingerprint, usize> = HashMap::new();
    for (dir, fp) in hashed {
        let fp = match fp {
            Ok(fp) => fp,
            Err(e) => {
                warn!(folder = %dir.display(), error = %e, "Hashing folder failed; keeping it");
                failures.push(dir);
                continue;
            }
        };
        match index.get(&fp) {
            Some(&i) => groups[i].members.push(dir),
            None => {
                index.insert(fp.clone(), groups.len());
                groups.push(DuplicateGroup {
                    fingerprint: fp,
                    members: vec![dir],
                });
            }
        }
    }
    groups.retain(|g| g.members.len() > 1);

    DuplicateScan {
        scanned,
        groups,
        hash_failures: failures,
    }
}
