use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::fact_plugin;
use crate::data::{FactData, Format};
use crate::error::Error;
use crate::fact::{Fact, FactBase};
use crate::plugin::Plugin;

/// Reads a single file as raw bytes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileRead {
    #[serde(flatten)]
    base: FactBase,
    pub path: PathBuf,
}

impl FileRead {
    pub const NAME: &'static str = "file:read";

    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::with_format(id, Format::Raw),
            ..Default::default()
        }
    }
}

fact_plugin!(FileRead, Some(Format::Raw));

impl Fact for FileRead {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn collect(&mut self) {
        tracing::debug!(fact = %self.id(), path = %self.path.display(), "reading file");
        match std::fs::read(&self.path) {
            Ok(bytes) => self.base.set_data(FactData::Raw(bytes)),
            Err(e) => {
                let e = Error::plugin(self.id(), format!("{}: {}", self.path.display(), e));
                self.add_errors(vec![e]);
            }
        }
    }
}

/// Finds files whose name matches `pattern` under `path`.
///
/// Produces a `list` of paths, a `map-bytes` of path to contents, or a
/// `map-string` of path to SHA-256 digest, depending on `format`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileLookup {
    #[serde(flatten)]
    base: FactBase,
    pub path: PathBuf,
    pub pattern: String,
    #[serde(rename = "exclude-pattern")]
    pub exclude_pattern: String,
    #[serde(rename = "skip-dirs")]
    pub skip_dirs: Vec<String>,
}

impl FileLookup {
    pub const NAME: &'static str = "file:lookup";

    pub fn new(id: &str) -> Self {
        Self {
            base: FactBase::with_format(id, Format::List),
            ..Default::default()
        }
    }

    fn find_files(&self) -> Result<Vec<PathBuf>, String> {
        if self.path.as_os_str().is_empty() {
            return Err("directory not provided".into());
        }
        if self.pattern.is_empty() {
            return Err("pattern not provided".into());
        }
        let pattern = Regex::new(&self.pattern).map_err(|e| e.to_string())?;
        let exclude = if self.exclude_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(&self.exclude_pattern).map_err(|e| e.to_string())?)
        };

        let root = self.path.as_path();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(root, entry.path(), &self.skip_dirs));

        let mut matches = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| e.to_string())?;
            if entry.file_type().is_dir() {
                continue;
            }
            let full = entry.path().to_string_lossy();
            if exclude.as_ref().is_some_and(|re| re.is_match(&full)) {
                continue;
            }
            if pattern.is_match(&entry.file_name().to_string_lossy()) {
                matches.push(entry.into_path());
            }
        }
        Ok(matches)
    }
}

fn is_skipped_dir(root: &Path, path: &Path, skip_dirs: &[String]) -> bool {
    if skip_dirs.is_empty() || !path.is_dir() {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    skip_dirs.iter().any(|dir| relative == Path::new(dir))
}

fact_plugin!(FileLookup, Some(Format::List));

impl Fact for FileLookup {
    fn base(&self) -> &FactBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FactBase {
        &mut self.base
    }

    fn collect(&mut self) {
        let files = match self.find_files() {
            Ok(files) => files,
            Err(message) => {
                let e = Error::plugin(self.id(), message);
                self.add_errors(vec![e]);
                return;
            }
        };
        tracing::debug!(fact = %self.id(), count = files.len(), "files found");

        let key = |f: &PathBuf| f.to_string_lossy().into_owned();
        let mut errors = Vec::new();
        let data = match self.format() {
            Some(Format::List) => FactData::List(files.iter().map(key).collect()),
            Some(Format::MapBytes) => {
                let mut contents = BTreeMap::new();
                for f in &files {
                    match std::fs::read(f) {
                        Ok(bytes) => {
                            contents.insert(key(f), bytes);
                        }
                        Err(e) => errors.push(Error::plugin(self.id(), format!("{}: {}", f.display(), e))),
                    }
                }
                FactData::MapBytes(contents)
            }
            Some(Format::MapString) => {
                let mut digests = BTreeMap::new();
                for f in &files {
                    match std::fs::read(f) {
                        Ok(bytes) => {
                            digests.insert(key(f), hex::encode(Sha256::digest(&bytes)));
                        }
                        Err(e) => errors.push(Error::plugin(self.id(), format!("{}: {}", f.display(), e))),
                    }
                }
                FactData::MapString(digests)
            }
            other => {
                let format = other.map(|f| f.to_string()).unwrap_or_default();
                let e = Error::plugin(self.id(), format!("unsupported format '{format}'"));
                self.add_errors(vec![e]);
                return;
            }
        };
        self.add_errors(errors);
        self.base.set_data(data);
    }
}
