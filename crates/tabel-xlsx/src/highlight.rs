//! In-place cell highlighting.
//!
//! Applies a solid fill to a set of cells on the first worksheet while
//! preserving everything else: only `xl/styles.xml` and the one worksheet
//! part are rewritten, and within the worksheet only the targeted `<c>`
//! elements change (their `s` attribute). Cell values, formulas, and every
//! unrelated part survive byte-for-byte.
//!
//! Each targeted cell keeps its own formatting: its current cell XF is
//! mapped to a derived XF that differs only in the fill, so a bordered or
//! bold cell stays bordered or bold, just recolored.

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};
use roxmltree::Document;

use crate::cell_ref::{cell_name, parse_cell_name};
use crate::package::{local_name, XlsxError, XlsxPackage};
use crate::styles::StylesEditor;

/// Solid yellow, the marker color for differing day cells.
pub const HIGHLIGHT_ARGB: &str = "FFFFFF00";

/// Apply the highlight fill to `cells` (1-based (row, col)) on the first
/// worksheet. An empty set leaves the package untouched.
pub fn highlight_cells(
    pkg: &mut XlsxPackage,
    cells: &BTreeSet<(u32, u32)>,
) -> Result<(), XlsxError> {
    if cells.is_empty() {
        return Ok(());
    }

    let part = pkg.first_worksheet_part()?;
    let sheet_xml = pkg
        .part(&part)
        .ok_or_else(|| XlsxError::MissingPart(part.clone()))?
        .to_vec();

    let existing = existing_cell_styles(&sheet_xml, cells)?;

    let had_styles_part = pkg.part("xl/styles.xml").is_some();
    let mut styles = StylesEditor::from_part(pkg.part("xl/styles.xml"))?;
    let fill = styles.ensure_solid_fill(HIGHLIGHT_ARGB)?;

    let mut derived: BTreeMap<u32, u32> = BTreeMap::new();
    let mut styled: BTreeMap<(u32, u32), u32> = BTreeMap::new();
    for &cell in cells {
        let base = existing.get(&cell).copied().unwrap_or(0);
        let xf = match derived.get(&base) {
            Some(xf) => *xf,
            None => {
                let xf = styles.xf_with_fill(base, fill)?;
                derived.insert(base, xf);
                xf
            }
        };
        styled.insert(cell, xf);
    }

    let rewritten = restyle_sheet_xml(&sheet_xml, &styled)?;
    pkg.set_part(part, rewritten);
    pkg.set_part("xl/styles.xml", styles.into_bytes());
    if !had_styles_part {
        crate::report::register_styles_part(pkg)?;
    }
    Ok(())
}

/// All cells of the first worksheet whose style resolves to a solid fill of
/// the given color. Used to verify highlight output.
pub fn solid_fill_cells(
    pkg: &XlsxPackage,
    argb: &str,
) -> Result<BTreeSet<(u32, u32)>, XlsxError> {
    let Some(styles) = pkg.part("xl/styles.xml") else {
        return Ok(BTreeSet::new());
    };
    let styles = StylesEditor::from_part(Some(styles))?;
    let fill_ids: BTreeSet<u32> = styles.solid_fill_ids(argb)?.into_iter().collect();

    let part = pkg.first_worksheet_part()?;
    let sheet_xml = pkg
        .part(&part)
        .ok_or(XlsxError::MissingPart(part.clone()))?;
    let xml = std::str::from_utf8(sheet_xml)
        .map_err(|_| XlsxError::Invalid("worksheet is not utf-8".to_string()))?;
    let doc = Document::parse(xml)?;

    let mut out = BTreeSet::new();
    for cell in doc.descendants().filter(|n| n.has_tag_name("c")) {
        let Some(addr) = cell.attribute("r").and_then(parse_cell_name) else {
            continue;
        };
        let Some(s) = cell.attribute("s").and_then(|v| v.parse::<u32>().ok()) else {
            continue;
        };
        if styles.xf_fill_id(s)?.is_some_and(|id| fill_ids.contains(&id)) {
            out.insert(addr);
        }
    }
    Ok(out)
}

/// Current `s` attribute of each targeted cell that exists in the XML.
fn existing_cell_styles(
    sheet_xml: &[u8],
    cells: &BTreeSet<(u32, u32)>,
) -> Result<BTreeMap<(u32, u32), u32>, XlsxError> {
    let xml = std::str::from_utf8(sheet_xml)
        .map_err(|_| XlsxError::Invalid("worksheet is not utf-8".to_string()))?;
    let doc = Document::parse(xml)?;
    let mut out = BTreeMap::new();
    for cell in doc.descendants().filter(|n| n.has_tag_name("c")) {
        let Some(addr) = cell.attribute("r").and_then(parse_cell_name) else {
            continue;
        };
        if !cells.contains(&addr) {
            continue;
        }
        let s = cell
            .attribute("s")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        out.insert(addr, s);
    }
    Ok(out)
}

/// Rewrite the worksheet, setting the `s` attribute of each targeted cell and
/// inserting `<c>` elements (and rows) for targets the sheet does not store.
fn restyle_sheet_xml(
    sheet_xml: &[u8],
    styled: &BTreeMap<(u32, u32), u32>,
) -> Result<Vec<u8>, XlsxError> {
    let mut by_row: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
    for (&(row, col), &style) in styled {
        by_row.entry(row).or_default().push((col, style));
    }
    let pending_rows: Vec<u32> = by_row.keys().copied().collect();
    let mut row_idx = 0usize;

    let mut reader = Reader::from_reader(sheet_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(sheet_xml.len() + styled.len() * 32));
    let mut buf = Vec::new();
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                restyle_sheet_data(&mut reader, &mut writer, &by_row, &pending_rows, &mut row_idx)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if by_row.is_empty() {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                } else {
                    // Convert `<sheetData/>` into `<sheetData>...</sheetData>`.
                    writer.write_event(Event::Start(e.into_owned()))?;
                    write_remaining_rows(&mut writer, &by_row, &pending_rows, &mut row_idx)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data && !by_row.is_empty() {
                    writer
                        .get_mut()
                        .extend_from_slice(b"<sheetData>");
                    write_remaining_rows(&mut writer, &by_row, &pending_rows, &mut row_idx)?;
                    writer.get_mut().extend_from_slice(b"</sheetData>");
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn restyle_sheet_data(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    by_row: &BTreeMap<u32, Vec<(u32, u32)>>,
    pending_rows: &[u32],
    row_idx: &mut usize,
) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = parse_attr_u32(&row_start, b"r")? else {
                    writer.write_event(Event::Start(row_start))?;
                    continue;
                };

                // Insert whole rows that sort before this one.
                while *row_idx < pending_rows.len() && pending_rows[*row_idx] < row_num {
                    write_new_row(writer, pending_rows[*row_idx], &by_row[&pending_rows[*row_idx]])?;
                    *row_idx += 1;
                }

                if let Some(cells) = by_row.get(&row_num) {
                    if *row_idx < pending_rows.len() && pending_rows[*row_idx] == row_num {
                        *row_idx += 1;
                    }
                    writer.write_event(Event::Start(row_start))?;
                    restyle_row(reader, writer, row_num, cells)?;
                } else {
                    writer.write_event(Event::Start(row_start))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = parse_attr_u32(&row_empty, b"r")? else {
                    writer.write_event(Event::Empty(row_empty))?;
                    continue;
                };

                while *row_idx < pending_rows.len() && pending_rows[*row_idx] < row_num {
                    write_new_row(writer, pending_rows[*row_idx], &by_row[&pending_rows[*row_idx]])?;
                    *row_idx += 1;
                }

                if let Some(cells) = by_row.get(&row_num) {
                    if *row_idx < pending_rows.len() && pending_rows[*row_idx] == row_num {
                        *row_idx += 1;
                    }
                    // Convert `<row/>` into `<row>...</row>`.
                    writer.write_event(Event::Start(row_empty))?;
                    for &(col, style) in cells {
                        write_new_cell(writer, row_num, col, style);
                    }
                    writer.write_event(Event::End(BytesEnd::new("row")))?;
                } else {
                    writer.write_event(Event::Empty(row_empty))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_remaining_rows(writer, by_row, pending_rows, row_idx)?;
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF while rewriting sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn restyle_row(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, u32)],
) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    let mut cell_idx = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_start = e.into_owned();
                let addr = parse_attr_a1(&cell_start)?;
                let Some((_, col)) = addr.filter(|(r, _)| *r == row_num) else {
                    // Missing or mismatched refs are preserved unchanged.
                    writer.write_event(Event::Start(cell_start))?;
                    continue;
                };

                while cell_idx < cells.len() && cells[cell_idx].0 < col {
                    write_new_cell(writer, row_num, cells[cell_idx].0, cells[cell_idx].1);
                    cell_idx += 1;
                }

                if cell_idx < cells.len() && cells[cell_idx].0 == col {
                    let style = cells[cell_idx].1;
                    cell_idx += 1;
                    writer
                        .get_mut()
                        .extend_from_slice(&render_cell_start(&cell_start, style, false)?);
                    copy_until_cell_end(reader, writer)?;
                    writer.get_mut().extend_from_slice(b"</c>");
                } else {
                    writer.write_event(Event::Start(cell_start))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_empty = e.into_owned();
                let addr = parse_attr_a1(&cell_empty)?;
                let Some((_, col)) = addr.filter(|(r, _)| *r == row_num) else {
                    writer.write_event(Event::Empty(cell_empty))?;
                    continue;
                };

                while cell_idx < cells.len() && cells[cell_idx].0 < col {
                    write_new_cell(writer, row_num, cells[cell_idx].0, cells[cell_idx].1);
                    cell_idx += 1;
                }

                if cell_idx < cells.len() && cells[cell_idx].0 == col {
                    let style = cells[cell_idx].1;
                    cell_idx += 1;
                    writer
                        .get_mut()
                        .extend_from_slice(&render_cell_start(&cell_empty, style, true)?);
                } else {
                    writer.write_event(Event::Empty(cell_empty))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                while cell_idx < cells.len() {
                    write_new_cell(writer, row_num, cells[cell_idx].0, cells[cell_idx].1);
                    cell_idx += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF while rewriting row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn copy_until_cell_end(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && local_name(e.name().as_ref()) == b"c" {
                    return Ok(());
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected EOF inside cell element".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn write_remaining_rows(
    writer: &mut Writer<Vec<u8>>,
    by_row: &BTreeMap<u32, Vec<(u32, u32)>>,
    pending_rows: &[u32],
    row_idx: &mut usize,
) -> Result<(), XlsxError> {
    while *row_idx < pending_rows.len() {
        let row = pending_rows[*row_idx];
        write_new_row(writer, row, &by_row[&row])?;
        *row_idx += 1;
    }
    Ok(())
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, u32)],
) -> Result<(), XlsxError> {
    writer
        .get_mut()
        .extend_from_slice(format!(r#"<row r="{row_num}">"#).as_bytes());
    for &(col, style) in cells {
        write_new_cell(writer, row_num, col, style);
    }
    writer.get_mut().extend_from_slice(b"</row>");
    Ok(())
}

fn write_new_cell(writer: &mut Writer<Vec<u8>>, row_num: u32, col: u32, style: u32) {
    let a1 = cell_name(row_num, col);
    writer
        .get_mut()
        .extend_from_slice(format!(r#"<c r="{a1}" s="{style}"/>"#).as_bytes());
}

/// Re-render a `<c>` start tag with the `s` attribute set, keeping all other
/// attributes in their source order.
fn render_cell_start(
    start: &quick_xml::events::BytesStart<'_>,
    style: u32,
    self_closing: bool,
) -> Result<Vec<u8>, XlsxError> {
    let mut out = String::from("<c");
    let mut wrote_style = false;
    for attr in start.attributes() {
        let attr = attr?;
        let key_bytes = attr.key.as_ref();
        let key = std::str::from_utf8(key_bytes).unwrap_or("attr");
        if local_name(key_bytes) == b"s" {
            out.push_str(&format!(r#" s="{style}""#));
            wrote_style = true;
            continue;
        }
        let value = attr.unescape_value()?;
        out.push_str(&format!(r#" {key}="{}""#, escape_attr(&value)));
    }
    if !wrote_style {
        out.push_str(&format!(r#" s="{style}""#));
    }
    out.push_str(if self_closing { "/>" } else { ">" });
    Ok(out.into_bytes())
}

fn parse_attr_u32(
    start: &quick_xml::events::BytesStart<'_>,
    name: &[u8],
) -> Result<Option<u32>, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == name {
            let value = attr.unescape_value()?;
            return Ok(value.parse::<u32>().ok());
        }
    }
    Ok(None)
}

fn parse_attr_a1(
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Option<(u32, u32)>, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"r" {
            let value = attr.unescape_value()?;
            return Ok(parse_cell_name(&value));
        }
    }
    Ok(None)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
