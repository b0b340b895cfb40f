//! Open Packaging Convention (OPC) ZIP handling.
//!
//! An [`XlsxPackage`] inflates the whole workbook ZIP into a part-name ->
//! bytes map. Writing re-packs the container but preserves every part payload
//! byte-for-byte unless a caller explicitly replaced it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
}

/// A workbook sheet entry from `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
}

/// A relationship entry from a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    /// Attributes beyond Id/Type/Target (e.g. `TargetMode`), in source
    /// order, so rewriting a rels part keeps them.
    pub extra: Vec<(String, String)>,
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        type_uri: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_uri: type_uri.into(),
            target: target.into(),
            extra: Vec::new(),
        }
    }
}

pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let mut buf = Vec::with_capacity(file.size() as usize);
            std::io::copy(&mut file, &mut buf)?;
            parts.insert(name, buf);
        }
        if parts.is_empty() {
            return Err(XlsxError::Invalid("empty package".to_string()));
        }
        Ok(Self { parts })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        if let Some(bytes) = self.parts.get(name) {
            return Some(bytes.as_slice());
        }
        // Tolerate non-canonical producers that store leading slashes.
        let stripped = name.strip_prefix('/').unwrap_or(name);
        self.parts.get(stripped).map(Vec::as_slice)
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options =
                FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
            for (name, bytes) in &self.parts {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(bytes)?;
            }
            zip.finish()?;
        }
        Ok(buffer.into_inner())
    }

    /// Save the package to `dest` atomically: write to a temp file in the
    /// destination directory, then rename into place with replace semantics.
    ///
    /// A failed write leaves the destination untouched.
    pub fn save_atomic(&self, dest: impl AsRef<Path>) -> Result<(), XlsxError> {
        let dest = dest.as_ref();
        let bytes = self.write_to_bytes()?;
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.as_file_mut().write_all(&bytes)?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|err| err.error)?;
        Ok(())
    }

    /// Parse the ordered sheet list from `xl/workbook.xml`.
    pub fn workbook_sheets(&self) -> Result<Vec<SheetInfo>, XlsxError> {
        let xml = self
            .part("xl/workbook.xml")
            .ok_or_else(|| XlsxError::MissingPart("xl/workbook.xml".to_string()))?;
        let xml = std::str::from_utf8(xml)
            .map_err(|_| XlsxError::Invalid("workbook.xml is not utf-8".to_string()))?;
        let doc = roxmltree::Document::parse(xml)?;
        let mut out = Vec::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("sheet")) {
            let name = node
                .attribute("name")
                .ok_or(XlsxError::Invalid("sheet without name".to_string()))?;
            let sheet_id = node
                .attribute("sheetId")
                .and_then(|v| v.parse().ok())
                .ok_or(XlsxError::Invalid("sheet without sheetId".to_string()))?;
            let rel_id = node
                .attributes()
                .find(|a| a.name() == "id")
                .map(|a| a.value())
                .ok_or(XlsxError::Invalid("sheet without r:id".to_string()))?;
            out.push(SheetInfo {
                name: name.to_string(),
                sheet_id,
                rel_id: rel_id.to_string(),
            });
        }
        Ok(out)
    }

    /// Resolve the worksheet part of the first sheet (the sheet the original
    /// tool reads and annotates, mirroring `workbook.active`).
    pub fn first_worksheet_part(&self) -> Result<String, XlsxError> {
        let sheets = self.workbook_sheets()?;
        let first = sheets
            .first()
            .ok_or_else(|| XlsxError::Invalid("workbook has no sheets".to_string()))?;
        self.worksheet_part_for(&first.rel_id)
    }

    /// Resolve a worksheet part name from a workbook relationship id.
    pub fn worksheet_part_for(&self, rel_id: &str) -> Result<String, XlsxError> {
        let rels = self.relationships("xl/workbook.xml")?;
        let rel = rels
            .iter()
            .find(|r| r.id == rel_id)
            .ok_or_else(|| XlsxError::Invalid(format!("missing relationship {rel_id}")))?;
        Ok(resolve_target("xl/workbook.xml", &rel.target))
    }

    /// Parse the relationships part that belongs to `part_name`.
    pub fn relationships(&self, part_name: &str) -> Result<Vec<Relationship>, XlsxError> {
        let rels_name = rels_part_name(part_name);
        let bytes = self
            .part(&rels_name)
            .ok_or(XlsxError::MissingPart(rels_name))?;
        parse_relationships(bytes)
    }
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
pub(crate) fn rels_part_name(part_name: &str) -> String {
    let (dir, file) = part_name.rsplit_once('/').unwrap_or(("", part_name));
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Resolve a relationship target relative to its source part.
///
/// Targets are either relative to the source part's folder
/// (`worksheets/sheet1.xml`) or package-absolute (`/xl/worksheets/sheet1.xml`).
pub(crate) fn resolve_target(base_part: &str, target: &str) -> String {
    let (target, is_absolute) = match target.strip_prefix('/') {
        Some(target) => (target, true),
        None => (target, false),
    };
    let base_dir = if is_absolute {
        ""
    } else {
        base_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    };

    let mut components: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start) => {
                if local_name(start.name().as_ref()) == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    let mut type_uri = None;
                    let mut extra = Vec::new();
                    for attr in start.attributes() {
                        let attr = attr?;
                        let key = local_name(attr.key.as_ref());
                        let value = attr.unescape_value()?.into_owned();
                        match key {
                            b"Id" => id = Some(value),
                            b"Target" => target = Some(value),
                            b"Type" => type_uri = Some(value),
                            _ => {
                                let key = String::from_utf8(attr.key.as_ref().to_vec())?;
                                extra.push((key, value));
                            }
                        }
                    }
                    if let (Some(id), Some(target), Some(type_uri)) = (id, target, type_uri) {
                        relationships.push(Relationship {
                            id,
                            target,
                            type_uri,
                            extra,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::write_fixture_xlsx;

    #[test]
    fn round_trip_preserves_parts() {
        let bytes = write_fixture_xlsx(&["id", "ФИО"], &[&["1", "Иванов"]]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        let repacked = pkg.write_to_bytes().expect("repack");
        let reread = XlsxPackage::from_bytes(&repacked).expect("reread");
        let a: Vec<_> = pkg.parts().collect();
        let b: Vec<_> = reread.parts().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn part_lookup_tolerates_leading_slash() {
        let bytes = write_fixture_xlsx(&["id"], &[]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        assert!(pkg.part("/xl/workbook.xml").is_some());
        assert!(pkg.part("xl/workbook.xml").is_some());
    }

    #[test]
    fn first_worksheet_part_resolves_through_rels() {
        let bytes = write_fixture_xlsx(&["id"], &[]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        assert_eq!(
            pkg.first_worksheet_part().expect("first sheet"),
            "xl/worksheets/sheet1.xml"
        );
        let sheets = pkg.workbook_sheets().expect("sheets");
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].sheet_id, 1);
    }

    #[test]
    fn resolve_target_handles_relative_and_absolute() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "../docProps/app.xml"),
            "docProps/app.xml"
        );
    }

    #[test]
    fn save_atomic_replaces_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("wb.xlsx");
        std::fs::write(&dest, b"sentinel").expect("seed dest");

        let bytes = write_fixture_xlsx(&["id"], &[]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        pkg.save_atomic(&dest).expect("save");

        let written = std::fs::read(&dest).expect("read back");
        assert!(XlsxPackage::from_bytes(&written).is_ok());
    }
}
