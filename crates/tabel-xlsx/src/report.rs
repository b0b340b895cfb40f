//! Report sheet injection.
//!
//! Takes an existing workbook package and replaces-or-creates a set of
//! report sheets: styled header row, data rows as inline strings, and
//! auto-sized columns. Replacing removes the stale worksheet part together
//! with its workbook entry, relationship, and content-type override, so a
//! report can be regenerated into the same workbook any number of times.

use std::collections::BTreeSet;

use quick_xml::events::{BytesEnd, Event};
use quick_xml::{Reader, Writer};

use crate::cell_ref::cell_name;
use crate::package::{local_name, rels_part_name, Relationship, XlsxError, XlsxPackage};
use crate::styles::StylesEditor;

const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";

/// One report sheet: name, header font color, fixed column header set, and
/// pre-rendered data rows.
#[derive(Debug, Clone)]
pub struct SheetSpec {
    pub name: String,
    pub header_color_argb: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Replace (or create) the given report sheets in the package.
pub fn replace_report_sheets(
    pkg: &mut XlsxPackage,
    sheets: &[SheetSpec],
) -> Result<(), XlsxError> {
    let existing = pkg.workbook_sheets()?;
    let spec_names: BTreeSet<&str> = sheets.iter().map(|s| s.name.as_str()).collect();

    // Stale report sheets from a previous run: drop part, rels entry,
    // workbook entry, and content-type override.
    let mut removed_names: BTreeSet<String> = BTreeSet::new();
    let mut removed_rel_ids: BTreeSet<String> = BTreeSet::new();
    let mut removed_parts: Vec<String> = Vec::new();
    for sheet in &existing {
        if !spec_names.contains(sheet.name.as_str()) {
            continue;
        }
        let part = pkg.worksheet_part_for(&sheet.rel_id)?;
        removed_names.insert(sheet.name.clone());
        removed_rel_ids.insert(sheet.rel_id.clone());
        removed_parts.push(part.clone());
        pkg.remove_part(&part);
        pkg.remove_part(&rels_part_name(&part));
    }

    let mut rels: Vec<Relationship> = pkg
        .relationships("xl/workbook.xml")?
        .into_iter()
        .filter(|r| !removed_rel_ids.contains(&r.id))
        .collect();

    let had_styles = pkg.part("xl/styles.xml").is_some();
    let mut styles = StylesEditor::from_part(pkg.part("xl/styles.xml"))?;

    let mut next_sheet_id = existing
        .iter()
        .filter(|s| !removed_names.contains(&s.name))
        .map(|s| s.sheet_id)
        .max()
        .unwrap_or(0)
        + 1;
    let mut next_rel = next_rel_number(&rels);

    let mut additions: Vec<(String, u32, String)> = Vec::new();
    let mut new_parts: Vec<(String, String)> = Vec::new();
    for spec in sheets {
        let font = styles.ensure_bold_font(&spec.header_color_argb)?;
        let header_xf = styles.xf_with_font(font)?;

        let part = allocate_sheet_part(pkg, &new_parts);
        let rel_id = format!("rId{next_rel}");
        next_rel += 1;

        rels.push(Relationship::new(
            rel_id.clone(),
            WORKSHEET_REL_TYPE,
            part.strip_prefix("xl/").unwrap_or(part.as_str()),
        ));
        additions.push((spec.name.clone(), next_sheet_id, rel_id));
        next_sheet_id += 1;
        new_parts.push((part, render_sheet_xml(spec, header_xf)));
    }

    for (part, xml) in &new_parts {
        pkg.set_part(part.clone(), xml.clone().into_bytes());
    }
    pkg.set_part("xl/styles.xml", styles.into_bytes());
    pkg.set_part(
        rels_part_name("xl/workbook.xml"),
        serialize_relationships(&rels).into_bytes(),
    );
    if !had_styles {
        register_styles_part(pkg)?;
    }

    let workbook = pkg
        .part("xl/workbook.xml")
        .ok_or_else(|| XlsxError::MissingPart("xl/workbook.xml".to_string()))?
        .to_vec();
    let workbook = rewrite_workbook_sheets(&workbook, &removed_names, &additions)?;
    pkg.set_part("xl/workbook.xml", workbook);

    let ct = pkg
        .part("[Content_Types].xml")
        .ok_or_else(|| XlsxError::MissingPart("[Content_Types].xml".to_string()))?
        .to_vec();
    let new_overrides: Vec<(String, String)> = new_parts
        .iter()
        .map(|(part, _)| (format!("/{part}"), WORKSHEET_CONTENT_TYPE.to_string()))
        .collect();
    let removed_overrides: BTreeSet<String> =
        removed_parts.iter().map(|p| format!("/{p}")).collect();
    let ct = rewrite_content_types(&ct, &removed_overrides, &new_overrides)?;
    pkg.set_part("[Content_Types].xml", ct);

    Ok(())
}

/// Register a freshly created `xl/styles.xml` in the workbook rels and
/// content types. No-op when already registered.
pub(crate) fn register_styles_part(pkg: &mut XlsxPackage) -> Result<(), XlsxError> {
    let mut rels = pkg.relationships("xl/workbook.xml")?;
    if !rels.iter().any(|r| r.type_uri == STYLES_REL_TYPE) {
        let id = format!("rId{}", next_rel_number(&rels));
        rels.push(Relationship::new(id, STYLES_REL_TYPE, "styles.xml"));
        pkg.set_part(
            rels_part_name("xl/workbook.xml"),
            serialize_relationships(&rels).into_bytes(),
        );
    }

    let ct = pkg
        .part("[Content_Types].xml")
        .ok_or_else(|| XlsxError::MissingPart("[Content_Types].xml".to_string()))?;
    let has_override = std::str::from_utf8(ct)
        .map(|xml| xml.contains("/xl/styles.xml"))
        .unwrap_or(false);
    if !has_override {
        let ct = ct.to_vec();
        let ct = rewrite_content_types(
            &ct,
            &BTreeSet::new(),
            &[("/xl/styles.xml".to_string(), STYLES_CONTENT_TYPE.to_string())],
        )?;
        pkg.set_part("[Content_Types].xml", ct);
    }
    Ok(())
}

fn next_rel_number(rels: &[Relationship]) -> u32 {
    rels.iter()
        .filter_map(|r| r.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

fn allocate_sheet_part(pkg: &XlsxPackage, pending: &[(String, String)]) -> String {
    let used: BTreeSet<&str> = pkg
        .part_names()
        .chain(pending.iter().map(|(name, _)| name.as_str()))
        .collect();
    let mut n = 1u32;
    loop {
        let candidate = format!("xl/worksheets/sheet{n}.xml");
        if !used.contains(candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

fn render_sheet_xml(spec: &SheetSpec, header_xf: u32) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);

    // Auto-size columns to the longest rendered value (plus padding), the
    // report's expected cosmetic property.
    out.push_str("<cols>");
    for (idx, column) in spec.columns.iter().enumerate() {
        let mut max_len = column.chars().count();
        for row in &spec.rows {
            if let Some(value) = row.get(idx) {
                max_len = max_len.max(value.chars().count());
            }
        }
        let width = (max_len as f64 + 2.0) * 1.2;
        out.push_str(&format!(
            r#"<col min="{0}" max="{0}" width="{1:.2}" customWidth="1"/>"#,
            idx + 1,
            width
        ));
    }
    out.push_str("</cols>");

    out.push_str("<sheetData>");
    out.push_str(r#"<row r="1">"#);
    for (idx, column) in spec.columns.iter().enumerate() {
        out.push_str(&render_inline_cell(1, idx as u32 + 1, column, Some(header_xf)));
    }
    out.push_str("</row>");
    for (row_idx, row) in spec.rows.iter().enumerate() {
        let row_num = row_idx as u32 + 2;
        out.push_str(&format!(r#"<row r="{row_num}">"#));
        for (col_idx, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            out.push_str(&render_inline_cell(row_num, col_idx as u32 + 1, value, None));
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn render_inline_cell(row: u32, col: u32, value: &str, style: Option<u32>) -> String {
    let a1 = cell_name(row, col);
    let mut out = format!(r#"<c r="{a1}""#);
    if let Some(style) = style {
        out.push_str(&format!(r#" s="{style}""#));
    }
    out.push_str(r#" t="inlineStr"><is><t"#);
    if needs_space_preserve(value) {
        out.push_str(r#" xml:space="preserve""#);
    }
    out.push('>');
    out.push_str(&escape_text(value));
    out.push_str("</t></is></c>");
    out
}

fn rewrite_workbook_sheets(
    workbook_xml: &[u8],
    removed_names: &BTreeSet<String>,
    additions: &[(String, u32, String)],
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + additions.len() * 64));
    let mut buf = Vec::new();
    let mut skipping_sheet = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheet" => {
                if sheet_name_in(&e, removed_names)? {
                    skipping_sheet = true;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheet" => {
                if !sheet_name_in(&e, removed_names)? {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheet" => {
                if skipping_sheet {
                    skipping_sheet = false;
                } else {
                    writer.write_event(Event::End(e.into_owned()))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheets" => {
                // Convert `<sheets/>` into `<sheets>...</sheets>`.
                writer.write_event(Event::Start(e.into_owned()))?;
                write_sheet_entries(&mut writer, additions);
                writer.write_event(Event::End(BytesEnd::new("sheets")))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheets" => {
                write_sheet_entries(&mut writer, additions);
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev if skipping_sheet => drop(ev),
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn write_sheet_entries(writer: &mut Writer<Vec<u8>>, additions: &[(String, u32, String)]) {
    for (name, sheet_id, rel_id) in additions {
        writer.get_mut().extend_from_slice(
            format!(
                r#"<sheet name="{}" sheetId="{sheet_id}" r:id="{rel_id}"/>"#,
                escape_attr(name)
            )
            .as_bytes(),
        );
    }
}

fn sheet_name_in(
    start: &quick_xml::events::BytesStart<'_>,
    names: &BTreeSet<String>,
) -> Result<bool, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"name" {
            let value = attr.unescape_value()?;
            return Ok(names.contains(value.as_ref()));
        }
    }
    Ok(false)
}

fn rewrite_content_types(
    ct_xml: &[u8],
    removed_part_names: &BTreeSet<String>,
    additions: &[(String, String)],
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(ct_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(ct_xml.len() + additions.len() * 96));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if local_name(e.name().as_ref()) == b"Override" => {
                if !override_part_in(&e, removed_part_names)? {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"Types" => {
                for (part_name, content_type) in additions {
                    writer.get_mut().extend_from_slice(
                        format!(
                            r#"<Override PartName="{}" ContentType="{}"/>"#,
                            escape_attr(part_name),
                            escape_attr(content_type)
                        )
                        .as_bytes(),
                    );
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

fn override_part_in(
    start: &quick_xml::events::BytesStart<'_>,
    names: &BTreeSet<String>,
) -> Result<bool, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"PartName" {
            let value = attr.unescape_value()?;
            return Ok(names.contains(value.as_ref()));
        }
    }
    Ok(false)
}

fn serialize_relationships(rels: &[Relationship]) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for rel in rels {
        out.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}""#,
            escape_attr(&rel.id),
            escape_attr(&rel.type_uri),
            escape_attr(&rel.target)
        ));
        for (key, value) in &rel.extra {
            out.push_str(&format!(r#" {key}="{}""#, escape_attr(value)));
        }
        out.push_str("/>");
    }
    out.push_str("</Relationships>");
    out
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::write_fixture_xlsx;
    use crate::package::parse_relationships;

    #[test]
    fn rels_rewrite_keeps_unknown_attributes() {
        let bytes = write_fixture_xlsx(&["id"], &[]);
        let mut pkg = XlsxPackage::from_bytes(&bytes).expect("fixture");
        let rels_name = rels_part_name("xl/workbook.xml");
        let rels_xml = String::from_utf8(pkg.part(&rels_name).expect("rels").to_vec())
            .expect("utf-8")
            .replace(
                "</Relationships>",
                concat!(
                    r#"<Relationship Id="rId9" "#,
                    r#"Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" "#,
                    r#"Target="https://example.com/" TargetMode="External"/></Relationships>"#,
                ),
            );
        pkg.set_part(rels_name.clone(), rels_xml.into_bytes());

        let sheets = [SheetSpec {
            name: "ВВ".to_string(),
            header_color_argb: "FFFF0000".to_string(),
            columns: vec!["ID".to_string()],
            rows: vec![],
        }];
        replace_report_sheets(&mut pkg, &sheets).expect("report");

        let rewritten =
            parse_relationships(pkg.part(&rels_name).expect("rels")).expect("parse rels");
        let hyperlink = rewritten.iter().find(|r| r.id == "rId9").expect("kept");
        assert_eq!(
            hyperlink.extra,
            vec![("TargetMode".to_string(), "External".to_string())]
        );
        let raw = String::from_utf8(pkg.part(&rels_name).expect("rels").to_vec()).expect("utf-8");
        assert!(raw.contains(r#"TargetMode="External""#));
    }
}
