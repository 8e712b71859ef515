//! Table assembly: rowid blocks, leaf placement, interior drain.

use parking_lot::Mutex;
use tracing::{debug, trace};

use bulklite_btree::{cell, TableInterior, TableLeaf};
use bulklite_error::Result;
use bulklite_types::{PageNumber, PAGE_SIZE, ROWS_PER_LEAF};

use crate::database::Database;
use crate::sink::PageSink;

/// Interior-builder state shared by every stream of one table.
struct Levels {
    /// One builder per B-tree level, bottom-up; `nodes[0]` parents leaves.
    nodes: Vec<TableInterior>,
    /// Reusable buffer for interior pages built inside the lock.
    scratch: Vec<u8>,
}

/// A table being created.
///
/// A table hands out rowid blocks to its streams and assembles the interior
/// nodes above their leaves. Open one [`TableStream`] per producer thread;
/// the table itself only serializes the brief block-allocation bookkeeping.
pub struct Table<'db, S: PageSink> {
    db: &'db Database<S>,
    levels: Mutex<Levels>,
}

impl<'db, S: PageSink> Table<'db, S> {
    pub(crate) fn new(db: &'db Database<S>) -> Self {
        Self {
            db,
            levels: Mutex::new(Levels {
                nodes: Vec::new(),
                scratch: vec![0; PAGE_SIZE],
            }),
        }
    }

    /// Open an independent ingest stream for this table.
    #[must_use]
    pub fn open_stream(&self) -> TableStream<'_, 'db, S> {
        TableStream {
            table: self,
            leaf: TableLeaf::new(PAGE_SIZE),
            cell: Vec::with_capacity(PAGE_SIZE),
            next_rowid: 0,
        }
    }

    /// Finish the B-tree and register it under `name` with `sql` as its
    /// `CREATE TABLE` statement.
    ///
    /// Drains the buffered interior levels bottom-up: a level holding a
    /// single child promotes that child (toward the root) instead of
    /// emitting a one-cell interior page. Every stream must already be
    /// closed; the borrow checker enforces this because `close` consumes
    /// the table.
    pub fn close(self, name: &str, sql: &str) -> Result<()> {
        let Levels {
            mut nodes,
            mut scratch,
        } = self.levels.into_inner();
        let db = self.db;
        debug!(table = name, levels = nodes.len(), "closing table");

        let mut i = 0;
        while i < nodes.len() {
            if nodes[i].len() == 1 {
                let (root, _) = nodes[i].remove();
                debug!(table = name, root = root.get(), "promoted single child to root");
                db.add_table_schema_row(name, sql, root);
                return Ok(());
            }

            loop {
                let page = db.alloc_page();
                let (rightmost_rowid, empty) = nodes[i].put(&mut scratch);
                db.write_page(page, &scratch)?;

                if i + 1 == nodes.len() {
                    if empty {
                        // That was the root page.
                        debug!(table = name, root = page.get(), "wrote root page");
                        db.add_table_schema_row(name, sql, page);
                        return Ok(());
                    }
                    nodes.push(TableInterior::new(PAGE_SIZE));
                }
                nodes[i + 1].add(page, rightmost_rowid);

                if empty {
                    break;
                }
            }
            i += 1;
        }

        // No stream ever allocated a leaf: the table is empty, but it still
        // needs a root.
        let root = db.alloc_page();
        debug!(table = name, root = root.get(), "empty table root");
        db.add_table_schema_row(name, sql, root);
        db.write_page(root, TableLeaf::new(PAGE_SIZE).finish())
    }

    /// Reserve the next leaf page and its rowid block.
    ///
    /// The new leaf's page number `P` fixes its rowids to
    /// `[P * R, P * R + R - 1]` with `R = ROWS_PER_LEAF`, so B-tree order
    /// is decided here, by allocation order, no matter which stream fills
    /// which leaf or when it flushes. The block's bounds are recorded in
    /// the bottom interior level, draining full levels upward as needed.
    ///
    /// Returns the first rowid of the block.
    fn alloc_rowid_block(&self) -> Result<i64> {
        let mut levels = self.levels.lock();
        let Levels { nodes, scratch } = &mut *levels;

        if nodes.is_empty() {
            nodes.push(TableInterior::new(PAGE_SIZE));
        }

        let mut page = self.db.alloc_page();
        let first_rowid = i64::from(page.get()) * ROWS_PER_LEAF;
        let mut rightmost_rowid = first_rowid + ROWS_PER_LEAF - 1;

        for i in 0..nodes.len() {
            if nodes[i].add(page, rightmost_rowid) {
                return Ok(first_rowid);
            }

            // Level full: emit one page of it and index that page in the
            // next level up.
            page = self.db.alloc_page();
            let (rowid, _) = nodes[i].put(scratch);
            rightmost_rowid = rowid;
            self.db.write_page(page, scratch)?;
        }

        let mut top = TableInterior::new(PAGE_SIZE);
        top.add(page, rightmost_rowid);
        nodes.push(top);
        Ok(first_rowid)
    }

    /// Write a finished leaf to the page its rowid block was reserved at.
    ///
    /// No lock: the destination page is a pure function of `last_rowid`,
    /// and no other stream shares this leaf's range.
    fn write_leaf(&self, last_rowid: i64, page: &[u8]) -> Result<()> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let number = PageNumber::new((last_rowid / ROWS_PER_LEAF) as u32)
            .expect("leaf rowids derive from page numbers >= 2");
        trace!(page = number.get(), last_rowid, "flushing leaf");
        self.db.write_page(number, page)
    }
}

/// One stream of rows being written to a [`Table`].
///
/// Streams are intentionally not `Sync`: each belongs to exactly one
/// producer, which lets rows be formatted and leaves filled without any
/// locking. Open one stream per worker thread.
pub struct TableStream<'tbl, 'db, S: PageSink> {
    table: &'tbl Table<'db, S>,
    /// Leaf currently being filled.
    leaf: TableLeaf,
    /// Reusable cell formatting buffer.
    cell: Vec<u8>,
    /// Rowid for the next row; 0 means no block is held.
    next_rowid: i64,
}

impl<S: PageSink> TableStream<'_, '_, S> {
    /// Write one row whose record payload is `row`, returning its rowid.
    ///
    /// The payload is not retained; oversized payloads have their overflow
    /// chains written immediately.
    pub fn write_row(&mut self, row: &[u8]) -> Result<i64> {
        if self.next_rowid == 0 {
            self.next_rowid = self.table.alloc_rowid_block()?;
        }

        let payload_len = row.len() as u64;
        let (head, local) = self.table.db.write_overflow_pages(row)?;

        loop {
            let rowid = self.next_rowid;
            self.cell.clear();
            cell::append_leaf_cell(&mut self.cell, payload_len, rowid, local, head);
            if self.leaf.add(&self.cell) {
                self.next_rowid += 1;
                return Ok(rowid);
            }

            // Leaf full: send it to its reserved page and start the next
            // block. The cell is re-formatted because its rowid changes.
            self.flush()?;
            self.next_rowid = self.table.alloc_rowid_block()?;
        }
    }

    /// Flush the partially filled leaf, if any.
    ///
    /// The next [`write_row`](Self::write_row) starts a fresh rowid block,
    /// leaving the remainder of this block unused; gaps in rowid space are
    /// fine, only ordering matters.
    pub fn flush(&mut self) -> Result<()> {
        if self.leaf.is_empty() {
            return Ok(());
        }

        let last_rowid = self.next_rowid - 1;
        let result = self.table.write_leaf(last_rowid, self.leaf.finish());
        self.next_rowid = 0;
        result
    }

    /// Flush and release the stream.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}
