//! Storage backend over a local directory tree.
//!
//! A top-level id maps to a path directly under the root. Regular files are
//! leaves; directories are subtrees whose children are listed in
//! lexicographic order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use wacli_types::{
    copy_resource, CopyProgress, FileHandle, Metadata, OpenMode, Payload, ProgressCallback, ResourceEntry,
    ResourceError, ResourceHandle, ResourceResult, ResourceStream,
};

use crate::traits::{require_selector, validate_path, validate_segment, StorageBackend, StoreSummary};

/// Directory-tree storage backend.
#[derive(Clone, Debug)]
pub struct DirectoryStorage {
    root: PathBuf,
    progress: Option<ProgressCallback>,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            progress: None,
        }
    }

    /// Call `callback` for every chunk written by this backend, in addition
    /// to any callback carried by the source metadata.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_leaf(
        &self,
        path: &Path,
        name: &str,
        source: &dyn ResourceHandle,
        metadata: &Metadata,
    ) -> ResourceResult<u64> {
        let kind = source.kind();
        let target = FileHandle::new(name, path).with_kind(kind);
        let progress = CopyProgress::from_metadata(name, metadata).with_callback(self.progress.clone());
        let written = copy_resource(
            source,
            OpenMode::read(kind),
            &target,
            OpenMode::write(kind),
            &progress,
        )?;
        debug!(path = %path.display(), bytes = written, "stored file");
        Ok(written)
    }
}

impl StorageBackend for DirectoryStorage {
    fn name(&self) -> &str {
        "DirectoryStorage"
    }

    fn store(&self, id: &str, source: &dyn ResourceHandle, metadata: &Metadata) -> ResourceResult<u64> {
        validate_segment(id)?;
        self.write_leaf(&self.root.join(id), id, source, metadata)
    }

    fn store_stream(&self, stream: ResourceStream) -> ResourceResult<StoreSummary> {
        let mut summary = StoreSummary::default();
        self.store_level(stream, &self.root, "", &mut summary)?;
        info!(
            root = %self.root.display(),
            leaves = summary.leaves,
            bytes = summary.bytes,
            "stored stream"
        );
        Ok(summary)
    }

    /// `id` may be a `/`-joined path below the root, as returned by
    /// `list_files`.
    fn retrieve(&self, id: &str, mode: OpenMode) -> ResourceResult<(Box<dyn ResourceHandle>, Metadata)> {
        let path = validate_path(id)?
            .into_iter()
            .fold(self.root.clone(), |path, segment| path.join(segment));
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Err(ResourceError::NotALeaf(id.to_string())),
            Ok(meta) => Ok((
                Box::new(FileHandle::new(id, path).with_kind(mode.kind())),
                Metadata::new().with_size(meta.len()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound && mode.is_write() => Ok((
                Box::new(FileHandle::new(id, path).with_kind(mode.kind())),
                Metadata::new(),
            )),
            Err(e) => Err(ResourceError::from_io(id, e)),
        }
    }

    fn retrieve_stream(&self, selector: &[String], mode: OpenMode) -> ResourceResult<ResourceStream> {
        require_selector(self.name(), selector)?;
        Ok(level_stream(self.root.clone(), String::new(), selector.to_vec(), mode))
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn list_files(&self, filter: Option<&dyn Fn(&str) -> bool>) -> ResourceResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| ResourceError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if let Some(keep) = filter {
                if !keep(&file_name) {
                    continue;
                }
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let joined = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(joined);
        }
        files.sort();
        Ok(files)
    }
}

impl DirectoryStorage {
    fn store_level(
        &self,
        stream: ResourceStream,
        dir: &Path,
        prefix: &str,
        summary: &mut StoreSummary,
    ) -> ResourceResult<()> {
        for entry in stream {
            let entry = entry?;
            validate_segment(&entry.id)?;
            let path = dir.join(&entry.id);
            let name = join_name(prefix, &entry.id);
            match entry.payload {
                Payload::Leaf(handle) => {
                    summary.bytes += self.write_leaf(&path, &name, handle.as_ref(), &entry.metadata)?;
                    summary.leaves += 1;
                }
                Payload::Subtree(children) => {
                    fs::create_dir_all(&path).map_err(|e| ResourceError::from_io(&name, e))?;
                    summary.subtrees += 1;
                    self.store_level(children, &path, &name, summary)?;
                }
            }
        }
        Ok(())
    }
}

fn join_name(prefix: &str, id: &str) -> String {
    if prefix.is_empty() {
        id.to_string()
    } else {
        format!("{prefix}/{id}")
    }
}

/// Stream over `ids` located in `dir`. Each element is resolved when pulled.
fn level_stream(dir: PathBuf, prefix: String, ids: Vec<String>, mode: OpenMode) -> ResourceStream {
    ResourceStream::new(ids.into_iter().map(move |id| resolve_entry(&dir, &prefix, id, mode)))
}

fn resolve_entry(dir: &Path, prefix: &str, id: String, mode: OpenMode) -> ResourceResult<ResourceEntry> {
    validate_segment(&id)?;
    let path = dir.join(&id);
    let name = join_name(prefix, &id);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => {
            let children = lazy_children(path, name, mode);
            Ok(ResourceEntry::subtree(id, children, Metadata::new()))
        }
        Ok(meta) => Ok(ResourceEntry::leaf(
            id,
            FileHandle::new(name, path).with_kind(mode.kind()),
            Metadata::new().with_size(meta.len()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound && mode.is_write() => Ok(ResourceEntry::leaf(
            id,
            FileHandle::new(name, path).with_kind(mode.kind()),
            Metadata::new(),
        )),
        Err(e) => Err(ResourceError::from_io(&name, e)),
    }
}

fn lazy_children(dir: PathBuf, name: String, mode: OpenMode) -> ResourceStream {
    ResourceStream::lazy(move || {
        let mut children = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| ResourceError::from_io(&name, e))? {
            children.push(entry?.file_name().to_string_lossy().into_owned());
        }
        children.sort();
        Ok(level_stream(dir, name, children, mode))
    })
}
