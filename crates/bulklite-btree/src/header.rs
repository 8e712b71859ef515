//! Database header page builder.
//!
//! Page 1 is special: its first 100 bytes are the database file header and
//! the rest of the page is the root of the `sqlite_schema` B-tree. The
//! schema root is a leaf when every schema row fits here, or an interior
//! node (after [`promote`](HeaderPage::promote)) pointing at spilled schema
//! pages when it does not.

use bulklite_types::{PageNumber, DB_HEADER_SIZE, INTERIOR_HEADER_SIZE, LEAF_HEADER_SIZE};

use crate::page::PageArea;

pub use crate::page::Checkpoint;

const MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Builder for the database header page.
#[derive(Debug)]
pub struct HeaderPage {
    area: PageArea,
    interior: bool,
}

impl HeaderPage {
    /// Create a header page builder whose schema root is a leaf node.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            area: PageArea::new(page_size, DB_HEADER_SIZE + LEAF_HEADER_SIZE),
            interior: false,
        }
    }

    /// Try to add a schema cell, returning whether it fit.
    ///
    /// In leaf mode cells are complete schema rows; in interior mode they
    /// are `child || rowid` references to spilled schema pages.
    pub fn add(&mut self, cell: &[u8]) -> bool {
        self.area.add(cell)
    }

    /// Discard any added cells and reconfigure the schema root as an
    /// interior node.
    pub fn promote(&mut self) {
        self.area.header_size = DB_HEADER_SIZE + INTERIOR_HEADER_SIZE;
        self.area.reset();
        self.interior = true;
    }

    /// Save the builder position so adds after this point can be undone.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.area.checkpoint()
    }

    /// Roll back to a previously saved position.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.area.restore(checkpoint);
    }

    /// Stamp the database header and the schema root page header, returning
    /// the finished page.
    ///
    /// `right_most` is the rightmost child of the schema root and is
    /// required exactly when the root was promoted to an interior node.
    ///
    /// The returned slice aliases the builder's internal buffer and is
    /// valid until the next mutating call.
    ///
    /// # Panics
    ///
    /// Panics when `right_most` disagrees with the root's node type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(&mut self, right_most: Option<PageNumber>) -> &[u8] {
        assert_eq!(
            self.interior,
            right_most.is_some(),
            "rightmost child pointer must be given for an interior schema root and only then"
        );

        let num_cells = self.area.num_cells as u16;
        let content_start = self.area.content_start as u16;
        let page_size = self.area.page.len();

        let page = &mut self.area.page;
        page[..16].copy_from_slice(MAGIC);
        // Page size field; 65536 is stored as the sentinel 0x0001. The two
        // bytes after it are the legacy write/read format versions.
        if page_size == 65536 {
            page[16..20].copy_from_slice(&0x0001_0101u32.to_be_bytes());
        } else {
            page[16..20].copy_from_slice(&(((page_size as u32) << 16) | 0x0101).to_be_bytes());
        }
        // Reserved bytes per page, then max/min/leaf embedded payload
        // fractions at their required values 64/32/32.
        page[20..24].copy_from_slice(&0x0040_2020u32.to_be_bytes());
        // Schema format 4.
        page[44..48].copy_from_slice(&4u32.to_be_bytes());
        // Suggested default page cache size.
        page[48..52].copy_from_slice(&(2_048_000 / page_size as u32).to_be_bytes());
        // Text encoding 1: UTF-8.
        page[56..60].copy_from_slice(&1u32.to_be_bytes());
        // Minimum SQLite version able to read this file.
        page[96..100].copy_from_slice(&3_003_000u32.to_be_bytes());

        let h = DB_HEADER_SIZE;
        page[h] = if self.interior { 0x05 } else { 0x0D };
        page[h + 1] = 0;
        page[h + 2] = 0;
        page[h + 3..h + 5].copy_from_slice(&num_cells.to_be_bytes());
        page[h + 5..h + 7].copy_from_slice(&content_start.to_be_bytes());
        page[h + 7] = 0;
        if let Some(child) = right_most {
            page[h + 8..h + 12].copy_from_slice(&child.get().to_be_bytes());
        }

        self.area.reset();
        &self.area.page
    }
}
