//! Read-only backend over a remote archive's REST API.
//!
//! Every top-level id names an archived object. Its members are listed by a
//! METS manifest and become the leaves of a one-level subtree. The manifest
//! is fetched when the subtree is first pulled; member content is fetched
//! when a leaf is opened.

mod manifest;
mod transport;

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use wacli_types::{
    Metadata, OpenMode, ResourceEntry, ResourceError, ResourceHandle, ResourceResult, ResourceStream,
    ScopedReader, ScopedStream,
};

use crate::traits::{require_selector, StorageBackend, StoreSummary};

pub use manifest::{parse_manifest, ManifestEntry};
pub use transport::{ArchiveTransport, HttpTransport};

/// Connection settings for [`ArchiveStorage::connect`].
#[derive(Clone, Debug, Deserialize)]
pub struct ArchiveSettings {
    pub rest_base: String,
    pub repo: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Read-only archive backend.
#[derive(Clone)]
pub struct ArchiveStorage {
    transport: Arc<dyn ArchiveTransport>,
    repository: String,
}

impl ArchiveStorage {
    pub fn new(transport: Arc<dyn ArchiveTransport>, repository: impl Into<String>) -> Self {
        Self {
            transport,
            repository: repository.into(),
        }
    }

    /// Backend over HTTP.
    pub fn connect(settings: &ArchiveSettings) -> ResourceResult<Self> {
        let transport = HttpTransport::new(&settings.rest_base, settings.timeout_secs.map(Duration::from_secs))?;
        Ok(Self::new(Arc::new(transport), settings.repo.clone()))
    }

    fn objects_path(&self, id: &str) -> String {
        format!("access/repositories/{}/artifacts/{}/objects", self.repository, id)
    }

    /// Fetch and parse the manifest of `id`.
    pub fn manifest(&self, id: &str) -> ResourceResult<Vec<ManifestEntry>> {
        let body = self.transport.fetch(&self.objects_path(id))?;
        let entries = parse_manifest(id, BufReader::new(body))?;
        debug!(id, members = entries.len(), "fetched manifest");
        Ok(entries)
    }

    fn member_handle(&self, id: &str, member: &str) -> ArchiveHandle {
        ArchiveHandle {
            transport: self.transport.clone(),
            name: format!("{id}/{member}"),
            path: format!("{}/{}", self.objects_path(id), member),
        }
    }

    fn members(&self, id: String) -> ResourceStream {
        let storage = self.clone();
        ResourceStream::lazy(move || {
            let entries = storage.manifest(&id)?;
            let leaves = entries
                .into_iter()
                .map(|entry| {
                    let handle = storage.member_handle(&id, &entry.id);
                    let metadata = member_metadata(&entry);
                    ResourceEntry::leaf(entry.id, handle, metadata)
                })
                .collect();
            Ok(ResourceStream::from_entries(leaves))
        })
    }
}

fn member_metadata(entry: &ManifestEntry) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.size = entry.size;
    metadata.content_type = entry.media_type.clone();
    if let Some(created) = &entry.created {
        metadata = metadata.with_extension("created", created.clone());
    }
    if let Some(href) = &entry.href {
        metadata = metadata.with_extension("href", href.clone());
    }
    metadata
}

fn require_read_binary(backend: &str, mode: OpenMode) -> ResourceResult<()> {
    if mode != OpenMode::ReadBinary {
        return Err(ResourceError::ModeNotAllowed {
            backend: backend.to_string(),
            mode: mode.to_string(),
        });
    }
    Ok(())
}

impl StorageBackend for ArchiveStorage {
    fn name(&self) -> &str {
        "ArchiveStorage"
    }

    fn store(&self, _id: &str, _source: &dyn ResourceHandle, _metadata: &Metadata) -> ResourceResult<u64> {
        Err(ResourceError::ReadOnly(self.name().to_string()))
    }

    fn store_stream(&self, _stream: ResourceStream) -> ResourceResult<StoreSummary> {
        Err(ResourceError::ReadOnly(self.name().to_string()))
    }

    fn retrieve(&self, id: &str, mode: OpenMode) -> ResourceResult<(Box<dyn ResourceHandle>, Metadata)> {
        require_read_binary(self.name(), mode)?;
        match id.split_once('/') {
            Some((object, member)) if !object.is_empty() && !member.is_empty() => {
                Ok((Box::new(self.member_handle(object, member)), Metadata::new()))
            }
            _ => Err(ResourceError::NotALeaf(id.to_string())),
        }
    }

    fn retrieve_stream(&self, selector: &[String], mode: OpenMode) -> ResourceResult<ResourceStream> {
        require_read_binary(self.name(), mode)?;
        require_selector(self.name(), selector)?;
        let storage = self.clone();
        let ids = selector.to_vec();
        Ok(ResourceStream::new(ids.into_iter().map(move |id| {
            let members = storage.members(id.clone());
            Ok(ResourceEntry::subtree(id, members, Metadata::new()))
        })))
    }

    fn list(&self) -> ResourceResult<Vec<String>> {
        Err(ResourceError::unsupported(self.name(), "list"))
    }

    fn list_files(&self, _filter: Option<&dyn Fn(&str) -> bool>) -> ResourceResult<Vec<String>> {
        Err(ResourceError::unsupported(self.name(), "list_files"))
    }
}

/// Handle on one archive member; opening it starts the download.
pub struct ArchiveHandle {
    transport: Arc<dyn ArchiveTransport>,
    name: String,
    path: String,
}

impl ResourceHandle for ArchiveHandle {
    fn open(&self, mode: OpenMode) -> ResourceResult<ScopedStream> {
        if mode.is_write() {
            return Err(ResourceError::ReadOnly(self.name.clone()));
        }
        let body = self.transport.fetch(&self.path)?;
        Ok(ScopedStream::Reader(ScopedReader::new(self.name.clone(), mode.kind(), body)))
    }
}

#[cfg(test)]
mod tests {
    use super::manifest::tests::mets;
    use super::*;
    use crate::directory::DirectoryStorage;
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use std::sync::Mutex;
    use wacli_types::{read_all, MemoryHandle, Payload, TreeShape};

    const IDN: &str = "1234567890";
    const CONTENT_0: &str = "One example WARC content";
    const CONTENT_1: &str = "Another example WARC content";

    /// Serves canned documents and records every fetched path.
    #[derive(Default)]
    struct FakeTransport {
        documents: HashMap<String, Vec<u8>>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn with(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
            self.documents.insert(path.to_string(), body.into());
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    impl ArchiveTransport for FakeTransport {
        fn fetch(&self, path: &str) -> ResourceResult<Box<dyn Read + Send>> {
            self.fetched.lock().unwrap().push(path.to_string());
            let body = self
                .documents
                .get(path)
                .cloned()
                .ok_or_else(|| ResourceError::NotFound(path.to_string()))?;
            Ok(Box::new(Cursor::new(body)))
        }
    }

    fn archive() -> (Arc<FakeTransport>, ArchiveStorage) {
        let base = format!("access/repositories/example_warc/artifacts/{IDN}/objects");
        let transport = Arc::new(
            FakeTransport::default()
                .with(
                    &base,
                    mets(&[("0", CONTENT_0, "example_0.txt"), ("1", CONTENT_1, "example_1.txt")]),
                )
                .with(&format!("{base}/0"), CONTENT_0)
                .with(&format!("{base}/1"), CONTENT_1),
        );
        (transport.clone(), ArchiveStorage::new(transport, "example_warc"))
    }

    fn selector() -> Vec<String> {
        vec![IDN.to_string()]
    }

    fn open_leaf(entry: ResourceEntry) -> Vec<u8> {
        let Payload::Leaf(handle) = entry.payload else {
            panic!("expected a leaf");
        };
        read_all(handle.as_ref(), OpenMode::ReadBinary).unwrap()
    }

    #[test]
    fn members_stream_in_manifest_order() {
        let (_, storage) = archive();
        let mut stream = storage.retrieve_stream(&selector(), OpenMode::ReadBinary).unwrap();
        let object = stream.next().unwrap().unwrap();
        assert_eq!(object.id, IDN);
        let Payload::Subtree(mut members) = object.payload else {
            panic!("expected a subtree");
        };

        let first = members.next().unwrap().unwrap();
        assert_eq!(first.id, "0");
        assert_eq!(first.metadata.size, Some(CONTENT_0.len() as u64));
        assert_eq!(first.metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(open_leaf(first), CONTENT_0.as_bytes());

        let second = members.next().unwrap().unwrap();
        assert_eq!(second.id, "1");
        assert_eq!(open_leaf(second), CONTENT_1.as_bytes());

        assert!(members.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn nothing_is_fetched_before_pull() {
        let (transport, storage) = archive();
        let mut stream = storage.retrieve_stream(&selector(), OpenMode::ReadBinary).unwrap();
        assert!(transport.fetched().is_empty());

        let Payload::Subtree(mut members) = stream.next().unwrap().unwrap().payload else {
            panic!("expected a subtree");
        };
        assert!(transport.fetched().is_empty());

        let _first = members.next().unwrap().unwrap();
        assert_eq!(transport.fetched().len(), 1, "only the manifest");
    }

    #[test]
    fn archive_into_directory_round_trip() {
        let (_, archive) = archive();
        let dir = tempfile::tempdir().unwrap();
        let local = DirectoryStorage::new(dir.path());

        local
            .store_stream(archive.retrieve_stream(&selector(), OpenMode::ReadBinary).unwrap())
            .unwrap();

        let shape = local
            .retrieve_stream(&selector(), OpenMode::ReadBinary)
            .unwrap()
            .shape()
            .unwrap();
        assert_eq!(
            shape,
            vec![TreeShape::Subtree(
                IDN.into(),
                vec![TreeShape::Leaf("0".into()), TreeShape::Leaf("1".into())]
            )]
        );

        let Payload::Subtree(mut members) = local
            .retrieve_stream(&selector(), OpenMode::ReadBinary)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .payload
        else {
            panic!("expected a subtree");
        };
        assert_eq!(open_leaf(members.next().unwrap().unwrap()), CONTENT_0.as_bytes());
        assert_eq!(open_leaf(members.next().unwrap().unwrap()), CONTENT_1.as_bytes());
    }

    #[test]
    fn only_read_binary_is_allowed() {
        let (_, storage) = archive();
        for mode in [OpenMode::ReadText, OpenMode::WriteBinary, OpenMode::WriteText] {
            assert!(matches!(
                storage.retrieve_stream(&selector(), mode),
                Err(ResourceError::ModeNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn empty_selector_is_rejected() {
        let (_, storage) = archive();
        assert!(matches!(
            storage.retrieve_stream(&[], OpenMode::ReadBinary),
            Err(ResourceError::MissingSelector { .. })
        ));
    }

    #[test]
    fn writes_are_read_only_errors() {
        let (transport, storage) = archive();
        assert!(matches!(
            storage.store("x", &MemoryHandle::empty("x"), &Metadata::new()),
            Err(ResourceError::ReadOnly(_))
        ));
        let stream = ResourceStream::from_entries(vec![ResourceEntry::leaf(
            "x",
            MemoryHandle::empty("x"),
            Metadata::new(),
        )]);
        assert!(matches!(storage.store_stream(stream), Err(ResourceError::ReadOnly(_))));
        assert!(transport.fetched().is_empty());
    }

    #[test]
    fn retrieve_addresses_members() {
        let (transport, storage) = archive();
        let (handle, _) = storage
            .retrieve(&format!("{IDN}/1"), OpenMode::ReadBinary)
            .unwrap();
        assert_eq!(read_all(handle.as_ref(), OpenMode::ReadBinary).unwrap(), CONTENT_1.as_bytes());
        assert_eq!(transport.fetched().len(), 1);
        assert!(matches!(
            storage.retrieve(IDN, OpenMode::ReadBinary).err().unwrap(),
            ResourceError::NotALeaf(_)
        ));
    }

    #[test]
    fn missing_object_surfaces_on_pull() {
        let (_, storage) = archive();
        let mut stream = storage
            .retrieve_stream(&["0000".to_string()], OpenMode::ReadBinary)
            .unwrap();
        let Payload::Subtree(mut members) = stream.next().unwrap().unwrap().payload else {
            panic!("expected a subtree");
        };
        assert!(matches!(members.next(), Some(Err(ResourceError::NotFound(_)))));
    }

    #[test]
    fn listing_is_unsupported() {
        let (_, storage) = archive();
        assert!(storage.list().is_err());
        assert!(storage.list_files(None).is_err());
    }
}
