//! Storage backend over a single file: a degenerate one-id view.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use wacli_types::{
    copy_resource, CopyProgress, FileHandle, Metadata, OpenMode, Payload, ResourceEntry, ResourceError,
    ResourceHandle, ResourceResult, ResourceStream,
};

use crate::traits::{require_selector, StorageBackend, StoreSummary};

/// Backend holding exactly one resource, stored at `path`.
///
/// Ids passed to `store` and `retrieve` are ignored: every id addresses the
/// file. Streams hold a single leaf named after the file.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
    id: String,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, id }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self, mode: OpenMode) -> FileHandle {
        FileHandle::new(self.id.clone(), self.path.clone()).with_kind(mode.kind())
    }
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "FileStorage"
    }

    fn store(&self, _id: &str, source: &dyn ResourceHandle, metadata: &Metadata) -> ResourceResult<u64> {
        let kind = source.kind();
        let target = FileHandle::new(self.id.clone(), self.path.clone()).with_kind(kind);
        copy_resource(
            source,
            OpenMode::read(kind),
            &target,
            OpenMode::write(kind),
            &CopyProgress::from_metadata(self.id.clone(), metadata),
        )
    }

    fn store_stream(&self, stream: ResourceStream) -> ResourceResult<StoreSummary> {
        let mut summary = StoreSummary::default();
        for entry in stream {
            let entry = entry?;
            if summary.leaves > 0 {
                return Err(ResourceError::unsupported(self.name(), "storing more than one resource"));
            }
            match entry.payload {
                Payload::Leaf(handle) => {
                    summary.bytes += self.store(&entry.id, handle.as_ref(), &entry.metadata)?;
                    summary.leaves += 1;
                }
                Payload::Subtree(_) => {
                    return Err(ResourceError::unsupported(self.name(), "storing a subtree"));
                }
            }
        }
        Ok(summary)
    }

    fn retrieve(&self, _id: &str, mode: OpenMode) -> ResourceResult<(Box<dyn ResourceHandle>, Metadata)> {
        let metadata = match fs::metadata(&self.path) {
            Ok(meta) => Metadata::new().with_size(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && mode.is_write() => Metadata::new(),
            Err(e) => return Err(ResourceError::from_io(&self.id, e)),
        };
        Ok((Box::new(self.handle(mode)), metadata))
    }

    fn retrieve_stream(&self, selector: &[String], mode: OpenMode) -> ResourceResult<ResourceStream> {
        require_selector(self.name(), selector)?;
        let storage = self.clone();
        Ok(ResourceStream::new(std::iter::once_with(move || {
            let (_, metadata) = storage.retrieve(&storage.id, mode)?;
            Ok(ResourceEntry::leaf(storage.id.clone(), storage.handle(mode), metadata))
        })))
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        Ok(if self.path.is_file() {
            vec![self.id.clone()]
        } else {
            Vec::new()
        })
    }

    fn list_files(&self, filter: Option<&dyn Fn(&str) -> bool>) -> ResourceResult<Vec<String>> {
        let mut files = self.list()?;
        if let Some(keep) = filter {
            files.retain(|f| keep(f));
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacli_types::{read_to_string, MemoryHandle};

    #[test]
    fn store_ignores_id_and_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("ids.txt"));
        storage
            .store("whatever", &MemoryHandle::text("src", "a\nb\n"), &Metadata::new())
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("ids.txt")).unwrap(), "a\nb\n");
        assert_eq!(storage.list().unwrap(), vec!["ids.txt".to_string()]);
    }

    #[test]
    fn stream_is_a_single_leaf_named_after_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ids.txt"), "x").unwrap();
        let storage = FileStorage::new(dir.path().join("ids.txt"));
        let mut stream = storage
            .retrieve_stream(&["anything".to_string()], OpenMode::ReadText)
            .unwrap();
        let entry = stream.next().unwrap().unwrap();
        assert_eq!(entry.id, "ids.txt");
        assert_eq!(entry.metadata.size, Some(1));
        let Payload::Leaf(handle) = entry.payload else {
            panic!("expected a leaf");
        };
        assert_eq!(read_to_string(handle.as_ref()).unwrap(), "x");
        assert!(stream.next().is_none());
    }

    #[test]
    fn second_leaf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("one"));
        let stream = ResourceStream::from_entries(vec![
            ResourceEntry::leaf("a", MemoryHandle::empty("a"), Metadata::new()),
            ResourceEntry::leaf("b", MemoryHandle::empty("b"), Metadata::new()),
        ]);
        let err = storage.store_stream(stream).unwrap_err();
        assert!(matches!(err, ResourceError::Unsupported { .. }));
    }

    #[test]
    fn missing_file_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent"));
        assert!(storage.list().unwrap().is_empty());
        let err = storage.retrieve("absent", OpenMode::ReadBinary).err().unwrap();
        assert!(matches!(err, ResourceError::NotFound(_)));
    }
}
