use pretty_assertions::assert_eq;
use tabel_xlsx::fixture::write_fixture_xlsx;
use tabel_xlsx::{replace_report_sheets, SheetSpec, StylesEditor, XlsxPackage};

fn spec(name: &str, color: &str, rows: Vec<Vec<String>>) -> SheetSpec {
    SheetSpec {
        name: name.to_string(),
        header_color_argb: color.to_string(),
        columns: vec!["ID".to_string(), "ФИО".to_string(), "Дата".to_string()],
        rows,
    }
}

fn sheet_xml(pkg: &XlsxPackage, name: &str) -> String {
    let sheets = pkg.workbook_sheets().expect("sheets");
    let info = sheets
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("sheet {name} not found"));
    let part = pkg.worksheet_part_for(&info.rel_id).expect("part");
    String::from_utf8(pkg.part(&part).expect("sheet part").to_vec()).expect("utf-8")
}

fn row_count(xml: &str) -> usize {
    let doc = roxmltree::Document::parse(xml).expect("parse sheet");
    doc.descendants().filter(|n| n.has_tag_name("row")).count()
}

#[test]
fn adds_report_sheets_after_the_data_sheet() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");

    let sheets = [
        spec(
            "ВВ",
            "FFFF0000",
            vec![vec![
                "1".to_string(),
                "Иванов И.И.".to_string(),
                "02.01.2025".to_string(),
            ]],
        ),
        spec("ДП", "FF0000FF", vec![]),
    ];
    replace_report_sheets(&mut pkg, &sheets).expect("report");

    let names: Vec<String> = pkg
        .workbook_sheets()
        .expect("sheets")
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Лист1", "ВВ", "ДП"]);

    // Header row plus one data row; an empty category still gets its header.
    assert_eq!(row_count(&sheet_xml(&pkg, "ВВ")), 2);
    assert_eq!(row_count(&sheet_xml(&pkg, "ДП")), 1);

    let vv = sheet_xml(&pkg, "ВВ");
    assert!(vv.contains("Иванов И.И."));
    assert!(vv.contains("02.01.2025"));
}

#[test]
fn rerun_replaces_previous_report_sheets() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");

    let first = [spec(
        "ВВ",
        "FFFF0000",
        vec![
            vec!["1".to_string(), "Иванов".to_string(), "01.01.2025".to_string()],
            vec!["2".to_string(), "Петров".to_string(), "02.01.2025".to_string()],
        ],
    )];
    replace_report_sheets(&mut pkg, &first).expect("first report");

    let second = [spec(
        "ВВ",
        "FFFF0000",
        vec![vec![
            "3".to_string(),
            "Сидоров".to_string(),
            "03.01.2025".to_string(),
        ]],
    )];
    replace_report_sheets(&mut pkg, &second).expect("second report");

    let sheets = pkg.workbook_sheets().expect("sheets");
    assert_eq!(sheets.iter().filter(|s| s.name == "ВВ").count(), 1);
    assert_eq!(sheets.len(), 2);

    let vv = sheet_xml(&pkg, "ВВ");
    assert_eq!(row_count(&vv), 2);
    assert!(vv.contains("Сидоров"));
    assert!(!vv.contains("Иванов"));

    // Exactly one worksheet part per surviving sheet.
    let worksheet_parts = pkg
        .part_names()
        .filter(|n| n.starts_with("xl/worksheets/"))
        .count();
    assert_eq!(worksheet_parts, 2);
}

#[test]
fn header_row_is_styled_with_the_sheet_color() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    replace_report_sheets(&mut pkg, &[spec("Остальные", "FF008000", vec![])])
        .expect("report");

    let xml = sheet_xml(&pkg, "Остальные");
    let doc = roxmltree::Document::parse(&xml).expect("parse sheet");
    let header_cells: Vec<_> = doc
        .descendants()
        .filter(|n| n.has_tag_name("c"))
        .collect();
    assert_eq!(header_cells.len(), 3);

    let styles = StylesEditor::from_part(pkg.part("xl/styles.xml")).expect("styles");
    for cell in header_cells {
        let s: u32 = cell
            .attribute("s")
            .and_then(|v| v.parse().ok())
            .expect("styled header cell");
        let font = styles.xf_font_id(s).expect("xf").expect("font id");
        assert!(font > 0, "header must not use the default font");
    }
}

#[test]
fn columns_are_sized_to_content() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let rows = vec![vec![
        "1".to_string(),
        "Константинопольский К.К.".to_string(),
        "31.12.2025".to_string(),
    ]];
    replace_report_sheets(&mut pkg, &[spec("ВВ", "FFFF0000", rows)]).expect("report");

    let xml = sheet_xml(&pkg, "ВВ");
    let doc = roxmltree::Document::parse(&xml).expect("parse sheet");
    let widths: Vec<f64> = doc
        .descendants()
        .filter(|n| n.has_tag_name("col"))
        .map(|n| {
            n.attribute("width")
                .and_then(|v| v.parse().ok())
                .expect("width")
        })
        .collect();
    assert_eq!(widths.len(), 3);
    // "Константинопольский К.К." is 24 chars: (24 + 2) * 1.2.
    assert!((widths[1] - 31.2).abs() < 0.01);
    // "Дата" (4) is shorter than "31.12.2025" (10): (10 + 2) * 1.2.
    assert!((widths[2] - 14.4).abs() < 0.01);
}

#[test]
fn registers_content_types_for_new_sheets() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    replace_report_sheets(
        &mut pkg,
        &[spec("ВВ", "FFFF0000", vec![]), spec("ДП", "FF0000FF", vec![])],
    )
    .expect("report");

    let ct = String::from_utf8(pkg.part("[Content_Types].xml").expect("ct").to_vec())
        .expect("utf-8");
    for info in pkg.workbook_sheets().expect("sheets") {
        let part = pkg.worksheet_part_for(&info.rel_id).expect("part");
        assert!(
            ct.contains(&format!("/{part}")),
            "missing content-type override for {part}"
        );
    }

    // The repacked workbook still opens.
    let repacked = pkg.write_to_bytes().expect("repack");
    assert!(XlsxPackage::from_bytes(&repacked).is_ok());
}
