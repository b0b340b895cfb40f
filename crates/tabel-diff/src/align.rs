//! Record alignment: a full outer join of the two tables on `id`.

use std::collections::HashMap;

use crate::error::{CompareError, Side};
use crate::table::{Table, COL_ID, COL_NAME};

/// An id present in both tables, with each row's original position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRecord {
    pub id: String,
    /// Display name, taken from the base row.
    pub name: String,
    pub base_pos: usize,
    pub compare_pos: usize,
}

/// An id present in exactly one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRecord {
    pub id: String,
    /// Display name, taken from the side the row exists on.
    pub name: String,
    pub missing_from: Side,
}

#[derive(Debug, Default)]
pub struct Alignment {
    /// Base-first join order.
    pub aligned: Vec<AlignedRecord>,
    /// Ids present only in the comparison table.
    pub missing_from_base: Vec<MissingRecord>,
    /// Ids present only in the base table.
    pub missing_from_compare: Vec<MissingRecord>,
}

/// Join the tables on `id`. Rows with a blank id are skipped. A duplicated
/// id within either table fails with [`CompareError::AlignmentAmbiguity`]
/// rather than multiplying rows.
pub fn align(base: &Table, compare: &Table) -> Result<Alignment, CompareError> {
    let base_rows = index_rows(base, Side::Base)?;
    let compare_rows = index_rows(compare, Side::Compare)?;
    let compare_by_id: HashMap<&str, usize> = compare_rows
        .iter()
        .map(|(id, pos)| (id.as_str(), *pos))
        .collect();
    let base_by_id: HashMap<&str, usize> = base_rows
        .iter()
        .map(|(id, pos)| (id.as_str(), *pos))
        .collect();

    let mut out = Alignment::default();
    for (id, base_pos) in &base_rows {
        match compare_by_id.get(id.as_str()) {
            Some(&compare_pos) => out.aligned.push(AlignedRecord {
                id: id.clone(),
                name: base.value(*base_pos, COL_NAME).trim().to_string(),
                base_pos: *base_pos,
                compare_pos,
            }),
            None => out.missing_from_compare.push(MissingRecord {
                id: id.clone(),
                name: base.value(*base_pos, COL_NAME).trim().to_string(),
                missing_from: Side::Compare,
            }),
        }
    }
    for (id, compare_pos) in &compare_rows {
        if !base_by_id.contains_key(id.as_str()) {
            out.missing_from_base.push(MissingRecord {
                id: id.clone(),
                name: compare.value(*compare_pos, COL_NAME).trim().to_string(),
                missing_from: Side::Base,
            });
        }
    }
    Ok(out)
}

/// Ids in row order with their positions; fails on a duplicate.
fn index_rows(table: &Table, side: Side) -> Result<Vec<(String, usize)>, CompareError> {
    let mut rows = Vec::with_capacity(table.row_count());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for pos in 0..table.row_count() {
        let id = table.value(pos, COL_ID).trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string(), pos).is_some() {
            return Err(CompareError::AlignmentAmbiguity {
                side,
                id: id.to_string(),
            });
        }
        rows.push((id.to_string(), pos));
    }
    Ok(rows)
}
