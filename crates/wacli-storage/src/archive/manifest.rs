//! METS manifests describing the members of an archived object.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use wacli_types::{ResourceError, ResourceResult};

/// One member file of an archived object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub media_type: Option<String>,
    pub size: Option<u64>,
    pub created: Option<String>,
    /// Retrieval href relative to the object.
    pub href: Option<String>,
}

fn manifest_error(id: &str, reason: impl ToString) -> ResourceError {
    ResourceError::Manifest {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse the manifest of object `id`. Members are returned in document order.
pub fn parse_manifest<R: BufRead>(id: &str, source: R) -> ResourceResult<Vec<ManifestEntry>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ManifestEntry> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| manifest_error(id, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"file" => current = Some(file_entry(id, &e)?),
                b"FLocat" => set_href(id, &e, current.as_mut())?,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"file" => entries.push(file_entry(id, &e)?),
                b"FLocat" => set_href(id, &e, current.as_mut())?,
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"file" => {
                entries.extend(current.take());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

fn file_entry(id: &str, element: &BytesStart<'_>) -> ResourceResult<ManifestEntry> {
    let mut entry = ManifestEntry::default();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| manifest_error(id, e))?;
        let value = attr.unescape_value().map_err(|e| manifest_error(id, e))?.into_owned();
        match attr.key.local_name().as_ref() {
            b"ID" => entry.id = value,
            b"MIMETYPE" => entry.media_type = Some(value),
            b"CREATED" => entry.created = Some(value),
            b"SIZE" => {
                let size = value
                    .parse()
                    .map_err(|_| manifest_error(id, format!("invalid SIZE {value:?}")))?;
                entry.size = Some(size);
            }
            _ => {}
        }
    }
    if entry.id.is_empty() {
        return Err(manifest_error(id, "file element without ID"));
    }
    Ok(entry)
}

fn set_href(id: &str, element: &BytesStart<'_>, entry: Option<&mut ManifestEntry>) -> ResourceResult<()> {
    let Some(entry) = entry else {
        return Ok(());
    };
    for attr in element.attributes() {
        let attr = attr.map_err(|e| manifest_error(id, e))?;
        if attr.key.local_name().as_ref() == b"href" {
            entry.href = Some(attr.unescape_value().map_err(|e| manifest_error(id, e))?.into_owned());
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A METS document with one `<file>` per `(id, content, href)`.
    pub(crate) fn mets(files: &[(&str, &str, &str)]) -> String {
        let body: String = files
            .iter()
            .map(|(id, content, href)| {
                format!(
                    r#"<file ID="{id}" MIMETYPE="text/plain" CREATED="2018-10-01T07:15:08" SIZE="{}">
                        <FLocat LOCTYPE="URL" xlink:href="{href}"/>
                    </file>"#,
                    content.len()
                )
            })
            .collect();
        format!(
            r#"<?xml version='1.0' encoding='UTF-8'?>
<mets xmlns="http://www.loc.gov/METS/"
    xmlns:xlink="http://www.w3.org/1999/xlink">
    <metsHdr CREATEDATE="2024-07-29T12:32:44" RECORDSTATUS="draft">
        <agent ROLE="CREATOR" TYPE="ORGANIZATION"><name>Archive</name></agent>
    </metsHdr>
    <fileSec><fileGrp>{body}</fileGrp></fileSec>
    <structMap><div/></structMap>
</mets>"#
        )
    }

    #[test]
    fn members_in_document_order() {
        let xml = mets(&[("0", "abc", "example_0.txt"), ("1", "de", "example_1.txt")]);
        let entries = parse_manifest("1234567890", xml.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                ManifestEntry {
                    id: "0".into(),
                    media_type: Some("text/plain".into()),
                    size: Some(3),
                    created: Some("2018-10-01T07:15:08".into()),
                    href: Some("example_0.txt".into()),
                },
                ManifestEntry {
                    id: "1".into(),
                    media_type: Some("text/plain".into()),
                    size: Some(2),
                    created: Some("2018-10-01T07:15:08".into()),
                    href: Some("example_1.txt".into()),
                },
            ]
        );
    }

    #[test]
    fn file_without_id_is_rejected() {
        let xml = r#"<mets><fileSec><fileGrp><file SIZE="1"/></fileGrp></fileSec></mets>"#;
        let err = parse_manifest("x", xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ResourceError::Manifest { ref id, .. } if id == "x"));
    }

    #[test]
    fn empty_manifest_has_no_members() {
        let xml = r#"<mets><fileSec/></mets>"#;
        assert!(parse_manifest("x", xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_a_manifest_error() {
        let err = parse_manifest("x", "<mets><file ID=\"0\"></mets>".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "Manifest");
    }
}
