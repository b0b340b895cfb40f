//! Worksheet grid reading.
//!
//! Every cell is read as the literal text it is stored as: shared strings and
//! inline strings verbatim, numeric/boolean/error payloads as their raw `<v>`
//! text. Nothing is coerced (a stored text `"08"` stays `"08"`), and absent
//! cells read back as empty strings, which keeps downstream string
//! comparisons total.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::cell_ref::parse_cell_name;
use crate::package::{local_name, XlsxError, XlsxPackage};

/// A sparse cell grid with 1-based coordinates.
///
/// `max_row`/`max_col` describe the extent of non-empty content; blank-but-
/// styled cells do not extend the grid, mirroring how dataframe readers trim
/// trailing emptiness.
#[derive(Debug, Default, Clone)]
pub struct SheetGrid {
    cells: BTreeMap<(u32, u32), String>,
    max_row: u32,
    max_col: u32,
}

impl SheetGrid {
    /// The text of a cell, `""` when absent or blank.
    pub fn cell(&self, row: u32, col: u32) -> &str {
        self.cells
            .get(&(row, col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn max_row(&self) -> u32 {
        self.max_row
    }

    pub fn max_col(&self) -> u32 {
        self.max_col
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Read the first worksheet of the package into a [`SheetGrid`].
pub fn read_first_sheet_grid(pkg: &XlsxPackage) -> Result<SheetGrid, XlsxError> {
    let part = pkg.first_worksheet_part()?;
    let sheet_xml = pkg
        .part(&part)
        .ok_or(XlsxError::MissingPart(part.clone()))?;
    let shared = read_shared_strings(pkg)?;
    read_sheet_grid(sheet_xml, &shared)
}

fn read_shared_strings(pkg: &XlsxPackage) -> Result<Vec<String>, XlsxError> {
    let Some(bytes) = pkg.part("xl/sharedStrings.xml") else {
        return Ok(Vec::new());
    };
    let xml = std::str::from_utf8(bytes)
        .map_err(|_| XlsxError::Invalid("sharedStrings.xml is not utf-8".to_string()))?;
    let doc = roxmltree::Document::parse(xml)?;
    let mut items = Vec::new();
    for si in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("si"))
    {
        // Concatenate every `<t>` run; this flattens rich text to plain text.
        let mut text = String::new();
        for t in si.descendants().filter(|n| n.has_tag_name("t")) {
            if let Some(chunk) = t.text() {
                text.push_str(chunk);
            }
        }
        items.push(text);
    }
    Ok(items)
}

fn read_sheet_grid(sheet_xml: &[u8], shared: &[String]) -> Result<SheetGrid, XlsxError> {
    let mut reader = Reader::from_reader(sheet_xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut grid = SheetGrid::default();
    let mut cur_row: u32 = 0;
    let mut next_col: u32 = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                cur_row = parse_row_number(&e)?.unwrap_or(cur_row + 1);
                next_col = 1;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let (addr, ty) = parse_cell_start(&e, cur_row, next_col)?;
                next_col = addr.1 + 1;
                let value = read_cell_value(&mut reader, shared, ty.as_deref())?;
                record_cell(&mut grid, addr, value);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let (addr, _) = parse_cell_start(&e, cur_row, next_col)?;
                next_col = addr.1 + 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(grid)
}

fn record_cell(grid: &mut SheetGrid, addr: (u32, u32), value: String) {
    if value.is_empty() {
        return;
    }
    grid.max_row = grid.max_row.max(addr.0);
    grid.max_col = grid.max_col.max(addr.1);
    grid.cells.insert(addr, value);
}

fn parse_row_number(row: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    for attr in row.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"r" {
            let value = attr.unescape_value()?;
            return Ok(value.parse::<u32>().ok());
        }
    }
    Ok(None)
}

fn parse_cell_start(
    cell: &BytesStart<'_>,
    cur_row: u32,
    next_col: u32,
) -> Result<((u32, u32), Option<String>), XlsxError> {
    let mut addr = None;
    let mut ty = None;
    for attr in cell.attributes() {
        let attr = attr?;
        let key = local_name(attr.key.as_ref());
        match key {
            b"r" => addr = parse_cell_name(&attr.unescape_value()?),
            b"t" => ty = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    // Cells without an `r` attribute take the next implicit position.
    Ok((addr.unwrap_or((cur_row.max(1), next_col)), ty))
}

/// Consume events up to the closing `</c>` and resolve the stored text.
fn read_cell_value(
    reader: &mut Reader<&[u8]>,
    shared: &[String],
    ty: Option<&str>,
) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut v_text = String::new();
    let mut is_text = String::new();
    let mut in_v = false;
    let mut in_t = false;
    let mut depth = 1usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                match local_name(e.name().as_ref()) {
                    b"v" if depth == 1 => in_v = true,
                    b"t" => in_t = true,
                    _ => {}
                }
                depth += 1;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match local_name(e.name().as_ref()) {
                    b"c" if depth == 0 => break,
                    b"v" => in_v = false,
                    b"t" => in_t = false,
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if in_v {
                    v_text.push_str(&text);
                } else if in_t {
                    is_text.push_str(&text);
                }
            }
            Event::Empty(_) => {}
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF inside cell element".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    let value = match ty {
        Some("s") => v_text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared.get(idx))
            .cloned()
            .unwrap_or_default(),
        Some("inlineStr") => is_text,
        // "n" (default), "str", "b", "e": the raw stored payload is the text.
        _ => v_text,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::write_fixture_xlsx;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_cells_as_literal_text() {
        let bytes = write_fixture_xlsx(
            &["id", "ФИО", "1", "2"],
            &[&["1", "Иванов И.И.", "08", "8"], &["2", "Петров", "", "ВВ"]],
        );
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        let grid = read_first_sheet_grid(&pkg).expect("grid");

        assert_eq!(grid.cell(1, 1), "id");
        assert_eq!(grid.cell(1, 3), "1");
        // Leading zeros survive: the cell stores text, we keep text.
        assert_eq!(grid.cell(2, 3), "08");
        assert_eq!(grid.cell(2, 4), "8");
        assert_eq!(grid.cell(3, 3), "");
        assert_eq!(grid.cell(3, 4), "ВВ");
        assert_eq!(grid.max_row(), 3);
        assert_eq!(grid.max_col(), 4);
    }

    #[test]
    fn loading_twice_is_deterministic() {
        let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        let a = read_first_sheet_grid(&pkg).expect("grid a");
        let b = read_first_sheet_grid(&pkg).expect("grid b");
        assert_eq!(a.cells, b.cells);
        assert_eq!((a.max_row, a.max_col), (b.max_row, b.max_col));
    }

    #[test]
    fn blank_sheet_reads_as_an_empty_grid() {
        let sheet = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData><row r="1"><c r="A1" s="3"/></row></sheetData>
</worksheet>"#;
        let grid = read_sheet_grid(sheet, &[]).expect("grid");
        assert!(grid.is_empty());
        assert_eq!((grid.max_row(), grid.max_col()), (0, 0));

        let bytes = write_fixture_xlsx(&["id"], &[]);
        let pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
        assert!(!read_first_sheet_grid(&pkg).expect("grid").is_empty());
    }

    #[test]
    fn inline_strings_and_missing_refs_are_supported() {
        let sheet = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" t="inlineStr"><is><t>id</t></is></c><c t="inlineStr"><is><t>1</t></is></c></row>
    <row><c r="A2"><v>5</v></c></row>
  </sheetData>
</worksheet>"#;
        let grid = read_sheet_grid(sheet, &[]).expect("grid");
        assert_eq!(grid.cell(1, 1), "id");
        assert_eq!(grid.cell(1, 2), "1");
        assert_eq!(grid.cell(2, 1), "5");
    }
}
