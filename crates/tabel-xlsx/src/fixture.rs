//! Minimal workbook writer for tests.
//!
//! This is a targeted serializer used to build single-sheet fixtures with a
//! header row and data rows. Text cells go through `xl/sharedStrings.xml`
//! (so fixtures exercise the shared-strings read path) and canonical integer
//! values are stored as numbers, the way common producers store them.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cell_ref::cell_name;

/// Write a single-sheet workbook with `columns` as row 1 and `rows` below it.
///
/// Empty cell values are skipped entirely (no `<c>` element), matching how
/// producers store blank cells.
pub fn write_fixture_xlsx(columns: &[&str], rows: &[&[&str]]) -> Vec<u8> {
    let mut shared = SharedStrings::default();
    let mut sheet = String::new();
    sheet.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    sheet.push('\n');
    sheet.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    sheet.push_str("<sheetData>");

    let header: Vec<&str> = columns.to_vec();
    let mut all_rows: Vec<&[&str]> = vec![&header];
    all_rows.extend(rows.iter().copied());

    for (row_idx, row) in all_rows.iter().enumerate() {
        let row_num = row_idx as u32 + 1;
        sheet.push_str(&format!(r#"<row r="{row_num}">"#));
        for (col_idx, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let a1 = cell_name(row_num, col_idx as u32 + 1);
            if is_canonical_number(value) {
                sheet.push_str(&format!(r#"<c r="{a1}"><v>{value}</v></c>"#));
            } else {
                let idx = shared.intern(value);
                sheet.push_str(&format!(r#"<c r="{a1}" t="s"><v>{idx}</v></c>"#));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>\n");

    let shared_xml = shared.to_xml();

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        let options =
            FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        let entries: [(&str, &str); 7] = [
            ("[Content_Types].xml", CONTENT_TYPES_XML),
            ("_rels/.rels", ROOT_RELS_XML),
            ("xl/workbook.xml", WORKBOOK_XML),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
            ("xl/styles.xml", STYLES_XML),
            ("xl/sharedStrings.xml", &shared_xml),
            ("xl/worksheets/sheet1.xml", &sheet),
        ];
        for (name, body) in entries {
            zip.start_file(name, options).expect("zip start");
            zip.write_all(body.as_bytes()).expect("zip write");
        }
        zip.finish().expect("zip finish");
    }
    buffer.into_inner()
}

fn is_canonical_number(value: &str) -> bool {
    value
        .parse::<i64>()
        .map(|n| n.to_string() == value)
        .unwrap_or(false)
}

#[derive(Default)]
struct SharedStrings {
    items: Vec<String>,
    index: HashMap<String, u32>,
}

impl SharedStrings {
    fn intern(&mut self, text: &str) -> u32 {
        if let Some(idx) = self.index.get(text) {
            return *idx;
        }
        let idx = self.items.len() as u32;
        self.items.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx
    }

    fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(&format!(
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            self.items.len()
        ));
        for item in &self.items {
            out.push_str("<si><t>");
            out.push_str(&escape_text(item));
            out.push_str("</t></si>");
        }
        out.push_str("</sst>\n");
        out
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
  <Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
</Types>
"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>
"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Лист1" sheetId="1" r:id="rId1"/>
  </sheets>
</workbook>
"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>
"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>
"#;
