use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use tabel_xlsx::fixture::write_fixture_xlsx;
use tabel_xlsx::{
    highlight_cells, read_first_sheet_grid, solid_fill_cells, XlsxPackage, HIGHLIGHT_ARGB,
};

fn cells(list: &[(u32, u32)]) -> BTreeSet<(u32, u32)> {
    list.iter().copied().collect()
}

#[test]
fn highlights_cells_and_preserves_values() {
    let bytes = write_fixture_xlsx(
        &["id", "ФИО", "1", "2"],
        &[
            &["1", "Иванов И.И.", "8", "ВВ"],
            &["2", "Петров П.П.", "ДП", "8"],
        ],
    );
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let targets = cells(&[(2, 3), (3, 4)]);
    highlight_cells(&mut pkg, &targets).expect("highlight");

    assert_eq!(
        solid_fill_cells(&pkg, HIGHLIGHT_ARGB).expect("scan fills"),
        targets
    );

    let grid = read_first_sheet_grid(&pkg).expect("grid");
    assert_eq!(grid.cell(2, 3), "8");
    assert_eq!(grid.cell(2, 4), "ВВ");
    assert_eq!(grid.cell(3, 3), "ДП");
    assert_eq!(grid.cell(3, 4), "8");
    assert_eq!(grid.cell(2, 2), "Иванов И.И.");
}

#[test]
fn highlighting_twice_is_a_fixpoint() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"], &["2", "ВВ"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let targets = cells(&[(2, 2), (3, 2)]);

    highlight_cells(&mut pkg, &targets).expect("first pass");
    let styles_once = pkg.part("xl/styles.xml").expect("styles").to_vec();
    let sheet_once = pkg.part("xl/worksheets/sheet1.xml").expect("sheet").to_vec();

    highlight_cells(&mut pkg, &targets).expect("second pass");
    assert_eq!(pkg.part("xl/styles.xml").expect("styles"), &styles_once[..]);
    assert_eq!(
        pkg.part("xl/worksheets/sheet1.xml").expect("sheet"),
        &sheet_once[..]
    );
}

#[test]
fn empty_target_set_leaves_package_untouched() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let before: Vec<(String, Vec<u8>)> = pkg
        .parts()
        .map(|(name, body)| (name.to_string(), body.to_vec()))
        .collect();

    highlight_cells(&mut pkg, &BTreeSet::new()).expect("noop highlight");

    let after: Vec<(String, Vec<u8>)> = pkg
        .parts()
        .map(|(name, body)| (name.to_string(), body.to_vec()))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn highlights_cells_the_sheet_does_not_store() {
    // Blank cells have no <c> element; a highlight there must synthesize one
    // (and the row, when the row itself is absent).
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "8"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let targets = cells(&[(2, 5), (7, 2)]);
    highlight_cells(&mut pkg, &targets).expect("highlight");

    assert_eq!(
        solid_fill_cells(&pkg, HIGHLIGHT_ARGB).expect("scan fills"),
        targets
    );

    // The synthesized cells stay blank.
    let grid = read_first_sheet_grid(&pkg).expect("grid");
    assert_eq!(grid.cell(2, 5), "");
    assert_eq!(grid.cell(7, 2), "");
    assert_eq!(grid.cell(2, 2), "8");
}

#[test]
fn survives_a_repack_round_trip() {
    let bytes = write_fixture_xlsx(&["id", "1"], &[&["1", "ВВ"]]);
    let mut pkg = XlsxPackage::from_bytes(&bytes).expect("read fixture");
    let targets = cells(&[(2, 2)]);
    highlight_cells(&mut pkg, &targets).expect("highlight");

    let repacked = pkg.write_to_bytes().expect("repack");
    let reread = XlsxPackage::from_bytes(&repacked).expect("reread");
    assert_eq!(
        solid_fill_cells(&reread, HIGHLIGHT_ARGB).expect("scan fills"),
        targets
    );
}
