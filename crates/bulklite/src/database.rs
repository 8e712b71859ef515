//! Database assembly: page allocation, overflow spill, schema, header.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use bulklite_btree::{cell, overflow, HeaderPage, TableInterior, TableLeaf};
use bulklite_error::{BulkliteError, Result};
use bulklite_types::{varint, PageNumber, Record, PAGE_SIZE};

use crate::sink::PageSink;
use crate::table::Table;

/// One pending `sqlite_schema` row. Only `table` rows are produced, and a
/// table's `tbl_name` always equals its `name`.
#[derive(Debug)]
pub(crate) struct SchemaRow {
    name: String,
    root: PageNumber,
    sql: String,
}

/// A database file being created.
///
/// The database owns the page allocator and the schema; tables borrow it
/// and streams borrow their table, so the compiler enforces the required
/// close order (streams, then tables, then the database).
///
/// Dropping a database without [`close`](Self::close) leaves the output
/// without a file header; nothing will be able to open it.
pub struct Database<S> {
    sink: S,
    /// Next page number to hand out. Page 1 is reserved for the header.
    next_page: AtomicU32,
    schema: Mutex<Vec<SchemaRow>>,
}

impl<S: PageSink> Database<S> {
    /// Prepare to write a database to `sink`.
    ///
    /// Pass a reference (`Database::new(&file)`) to keep ownership of the
    /// sink; closing the database never closes it.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_page: AtomicU32::new(2),
            schema: Mutex::new(Vec::new()),
        }
    }

    /// Open a table in this database.
    #[must_use]
    pub fn open_table(&self) -> Table<'_, S> {
        Table::new(self)
    }

    /// Write the `sqlite_schema` table and the file header.
    ///
    /// Every table must have been closed first; the borrow checker enforces
    /// this because `close` consumes the database.
    pub fn close(self) -> Result<()> {
        let rows = std::mem::take(&mut *self.schema.lock());
        debug!(tables = rows.len(), "closing database");

        // Encode every schema row up front; any overflow chains they need
        // are written as a side effect.
        let mut cells = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            cells.push(self.encode_schema_row(i as i64 + 1, row)?);
        }

        // Simple case: everything fits in a single root leaf on page 1.
        let mut hdr = HeaderPage::new(PAGE_SIZE);
        if cells.iter().all(|c| hdr.add(c)) {
            return self.write_page(PageNumber::ONE, hdr.finish(None));
        }

        // The schema outgrew page 1: spill the rows into ordinary leaf
        // pages and make page 1 an interior node over them.
        debug!(tables = rows.len(), "schema overflows page 1, spilling");
        hdr.promote();
        self.write_spilled_schema(&mut hdr, &cells)
    }

    /// Write schema cells into leaf pages and drain the resulting child
    /// entries, bottom-up, until the top level fits into the promoted
    /// header page.
    fn write_spilled_schema(&self, hdr: &mut HeaderPage, cells: &[Vec<u8>]) -> Result<()> {
        let mut scratch = vec![0u8; PAGE_SIZE];
        let mut levels = vec![TableInterior::new(PAGE_SIZE)];
        let mut leaf = TableLeaf::new(PAGE_SIZE);
        let mut last_rowid = 0i64;

        for (i, cell) in cells.iter().enumerate() {
            if !leaf.add(cell) {
                let page = self.alloc_page();
                self.write_page(page, leaf.finish())?;
                self.push_child(&mut levels, &mut scratch, page, last_rowid)?;
                assert!(leaf.add(cell), "schema cell exceeds a whole leaf page");
            }
            last_rowid = i as i64 + 1;
        }
        if !leaf.is_empty() {
            let page = self.alloc_page();
            self.write_page(page, leaf.finish())?;
            self.push_child(&mut levels, &mut scratch, page, last_rowid)?;
        }

        let mut i = 0;
        loop {
            // When the whole top level fits on page 1, emit it there: all
            // cells but the last, whose child becomes the rightmost pointer.
            if i + 1 == levels.len() {
                let checkpoint = hdr.checkpoint();
                let count = levels[i].len();
                let mut entry = Vec::new();
                let mut fits = true;
                let mut rightmost = None;
                for (k, (child, rowid)) in levels[i].entries().enumerate() {
                    if k + 1 == count {
                        rightmost = Some(child);
                        break;
                    }
                    entry.clear();
                    entry.extend_from_slice(&child.get().to_be_bytes());
                    #[allow(clippy::cast_sign_loss)]
                    varint::append(&mut entry, rowid as u64);
                    if !hdr.add(&entry) {
                        fits = false;
                        break;
                    }
                }
                if fits {
                    return self.write_page(PageNumber::ONE, hdr.finish(rightmost));
                }
                hdr.restore(checkpoint);
            }

            // Otherwise drain this level into interior pages one below the
            // header, feeding their child entries to the level above.
            loop {
                let page = self.alloc_page();
                let (rightmost_rowid, empty) = levels[i].put(&mut scratch);
                self.write_page(page, &scratch)?;
                if i + 1 == levels.len() {
                    levels.push(TableInterior::new(PAGE_SIZE));
                }
                levels[i + 1].add(page, rightmost_rowid);
                if empty {
                    break;
                }
            }
            i += 1;
        }
    }

    /// Add a `(child, max rowid)` entry at the bottom level, cascading a
    /// drained page upward whenever a level refuses the entry.
    fn push_child(
        &self,
        levels: &mut Vec<TableInterior>,
        scratch: &mut [u8],
        child: PageNumber,
        rowid: i64,
    ) -> Result<()> {
        let mut child = child;
        let mut rowid = rowid;
        for i in 0..levels.len() {
            if levels[i].add(child, rowid) {
                return Ok(());
            }
            child = self.alloc_page();
            let (rightmost_rowid, _) = levels[i].put(scratch);
            rowid = rightmost_rowid;
            self.write_page(child, scratch)?;
        }

        let mut top = TableInterior::new(PAGE_SIZE);
        top.add(child, rowid);
        levels.push(top);
        Ok(())
    }

    /// Record a table's schema row; called by [`Table::close`].
    pub(crate) fn add_table_schema_row(&self, name: &str, sql: &str, root: PageNumber) {
        self.schema.lock().push(SchemaRow {
            name: name.to_owned(),
            root,
            sql: sql.to_owned(),
        });
    }

    /// Encode one schema row as a leaf cell, spilling its payload into an
    /// overflow chain when needed.
    fn encode_schema_row(&self, rowid: i64, row: &SchemaRow) -> Result<Vec<u8>> {
        let mut rec = Record::new();
        rec.append_text("table");
        rec.append_text(&row.name);
        rec.append_text(&row.name);
        rec.append_uint(u64::from(row.root.get()));
        rec.append_text(&row.sql);

        let payload = rec.to_vec();
        let payload_len = payload.len() as u64;
        let (head, local) = self.write_overflow_pages(&payload)?;

        let mut out = Vec::with_capacity(local.len() + 24);
        cell::append_leaf_cell(&mut out, payload_len, rowid, local, head);
        Ok(out)
    }

    /// Allocate a fresh page number.
    ///
    /// Skips the lock-byte page, the one whose first byte sits at offset
    /// 2^30; SQLite never stores data there. At this page size that is
    /// page 16385 exactly.
    ///
    /// # Panics
    ///
    /// Panics when the 32-bit page counter is exhausted.
    pub(crate) fn alloc_page(&self) -> PageNumber {
        loop {
            let p = self.next_page.fetch_add(1, Ordering::Relaxed);
            assert!(p != 0, "database too large: page numbers exhausted");
            if !is_lock_byte_page(p) {
                return PageNumber::new(p).expect("nonzero page number");
            }
        }
    }

    /// Write a finished page at its derived byte offset.
    pub(crate) fn write_page(&self, page: PageNumber, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        self.sink
            .write_at(buf, page.byte_offset())
            .map_err(|err| match err {
                BulkliteError::Io(source) => BulkliteError::IoWrite {
                    page: page.get(),
                    source,
                },
                other => other,
            })
    }

    /// Split `payload` into its on-page portion and, when it does not all
    /// fit in the cell, an overflow chain written on the spot.
    ///
    /// Returns the chain head (if any) and the local slice of `payload`.
    pub(crate) fn write_overflow_pages<'a>(
        &self,
        payload: &'a [u8],
    ) -> Result<(Option<PageNumber>, &'a [u8])> {
        let local = overflow::leaf_local_size(PAGE_SIZE, payload.len());
        if payload.len() <= local {
            return Ok((None, payload));
        }

        let head = overflow::write_chain(
            &payload[local..],
            PAGE_SIZE,
            &mut || self.alloc_page(),
            &mut |page, buf| self.write_page(page, buf),
        )?;
        Ok((Some(head), &payload[..local]))
    }
}

/// Whether byte offset zero of `page` is the start of the lock-byte range.
fn is_lock_byte_page(page: u32) -> bool {
    u64::from(page - 1) * PAGE_SIZE as u64 == 1 << 30
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn lock_byte_page_is_16385() {
        assert!(!is_lock_byte_page(1));
        assert!(!is_lock_byte_page(16384));
        assert!(is_lock_byte_page(16385));
        assert!(!is_lock_byte_page(16386));
    }

    #[test]
    fn allocation_skips_exactly_the_lock_byte_page() {
        let sink = MemorySink::new();
        let db = Database::new(&sink);

        let mut allocated = Vec::new();
        for _ in 0..20_000 {
            allocated.push(db.alloc_page().get());
        }

        assert_eq!(allocated[0], 2);
        assert!(allocated.windows(2).all(|w| w[0] < w[1]));
        assert!(!allocated.contains(&16385));
        assert!(allocated.contains(&16384));
        assert!(allocated.contains(&16386));
        // Exactly one number was skipped.
        assert_eq!(*allocated.last().unwrap(), 2 + 20_000);
    }

    #[test]
    fn overflow_split_returns_borrowed_local_slice() {
        let sink = MemorySink::new();
        let db = Database::new(&sink);

        let payload = vec![0x5A; 100];
        let (head, local) = db.write_overflow_pages(&payload).unwrap();
        assert!(head.is_none());
        assert_eq!(local.len(), 100);
        assert!(sink.is_empty());

        let payload = vec![0x5A; PAGE_SIZE * 2];
        let (head, local) = db.write_overflow_pages(&payload).unwrap();
        let head = head.expect("payload must spill");
        assert_eq!(head.get(), 2);
        assert_eq!(
            local.len(),
            overflow::leaf_local_size(PAGE_SIZE, payload.len())
        );
        assert!(sink.len() > 0);
    }
}
