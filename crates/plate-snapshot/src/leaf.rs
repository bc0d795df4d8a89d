//! Leaf detection over the tile history.

use plate_file::{PlateFile, PlateResult};
use plate_types::{TileCell, TileHeader, TransactionId};

/// Headers of `cell` in `[start, end]`, optionally with the one entry just
/// before `start`. A cell that was never written yields an empty list.
pub fn history(
    plate: &PlateFile,
    cell: TileCell,
    start: TransactionId,
    end: TransactionId,
    include_one_prior: bool,
) -> PlateResult<Vec<TileHeader>> {
    match plate.search_by_location(cell, start, end, include_one_prior) {
        Ok(headers) => Ok(headers),
        Err(e) if e.is_tile_not_found() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// `true` when none of the four children of `cell` has ever been written,
/// so no finer data exists below it.
pub fn is_leaf(plate: &PlateFile, cell: TileCell) -> PlateResult<bool> {
    children_quiet(plate, cell, TransactionId::ZERO, TransactionId::MAX)
}

/// `true` when no child of the header's cell was written by the header's
/// own transaction.
///
/// A coarse tile written alongside finer children is superseded by them
/// and should not be supersampled into the snapshot.
pub fn is_leaf_at(plate: &PlateFile, header: &TileHeader) -> PlateResult<bool> {
    children_quiet(plate, header.cell, header.transaction_id, header.transaction_id)
}

fn children_quiet(plate: &PlateFile, cell: TileCell, start: TransactionId, end: TransactionId) -> PlateResult<bool> {
    if cell.level + 1 >= plate.num_levels() {
        return Ok(true);
    }
    for child in cell.children() {
        if !history(plate, child, start, end, false)?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_index::IndexHeader;
    use proptest::prelude::*;

    fn plate() -> PlateFile {
        PlateFile::in_memory(IndexHeader::new("leaf", 2, "raw", "graya8", 4)).unwrap()
    }

    fn write_in_new_txn(plate: &PlateFile, cells: &[TileCell]) -> TransactionId {
        let tid = plate.transaction_request("fixture", &[]).unwrap();
        for cell in cells {
            plate.write(*cell, tid, b"x").unwrap();
        }
        plate.transaction_complete(tid).unwrap();
        tid
    }

    #[test]
    fn unwritten_cell_has_empty_history() {
        let plate = plate();
        let found = history(&plate, TileCell::ROOT, TransactionId::ZERO, TransactionId::MAX, true).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn cell_with_written_child_is_not_leaf() {
        let plate = plate();
        write_in_new_txn(&plate, &[TileCell::ROOT]);
        assert!(is_leaf(&plate, TileCell::ROOT).unwrap());

        write_in_new_txn(&plate, &[TileCell::new(1, 1, 1)]);
        assert!(!is_leaf(&plate, TileCell::ROOT).unwrap());
        // A write to a sibling does not count.
        assert!(is_leaf(&plate, TileCell::new(0, 0, 1)).unwrap());
    }

    #[test]
    fn deepest_level_is_always_leaf() {
        let plate = plate();
        assert!(is_leaf(&plate, TileCell::new(7, 7, 3)).unwrap());
    }

    #[test]
    fn leaf_at_only_looks_at_own_transaction() {
        let plate = plate();
        let first = write_in_new_txn(&plate, &[TileCell::ROOT]);
        let second = write_in_new_txn(&plate, &[TileCell::ROOT, TileCell::new(0, 1, 1)]);

        let root_first = &history(&plate, TileCell::ROOT, first, first, false).unwrap()[0];
        let root_second = &history(&plate, TileCell::ROOT, second, second, false).unwrap()[0];
        assert!(is_leaf_at(&plate, root_first).unwrap());
        assert!(!is_leaf_at(&plate, root_second).unwrap());
        assert!(!is_leaf(&plate, TileCell::ROOT).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn leaf_iff_no_child_written(mask in 0u8..16, extra in proptest::collection::vec((0u32..4, 0u32..4), 0..4)) {
            let plate = plate();
            let parent = TileCell::new(0, 1, 1);
            let children = parent.children();
            let mut cells: Vec<TileCell> = (0..4)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| children[i])
                .collect();
            // Unrelated writes at level 2 outside the parent.
            cells.extend(
                extra
                    .into_iter()
                    .map(|(c, r)| TileCell::new(c, r, 2))
                    .filter(|c| !parent.is_ancestor_of(c)),
            );
            cells.sort();
            cells.dedup();
            if !cells.is_empty() {
                write_in_new_txn(&plate, &cells);
            }
            prop_assert_eq!(is_leaf(&plate, parent).unwrap(), mask == 0);
        }
    }
}
