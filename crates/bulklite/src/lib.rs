//! Streaming, parallel writer for SQLite database files.
//!
//! bulklite produces a valid SQLite database from a stream of rows at bulk
//! ingest rates. It never reads or queries; in terms of SQLite's own
//! architecture it replaces the OS interface, the pager, and the writing
//! half of the B-tree layer. Many threads generate table B-tree leaf pages
//! independently and only a single-threaded fixup phase at close builds the
//! interior nodes, the `sqlite_schema` table, and the file header.
//!
//! The trick that makes the parallelism safe: a leaf's page number fixes
//! its rowid range. Each leaf allocated at page `P` owns rowids
//! `[P * R, P * R + R - 1]` (with `R = 16384` at the fixed 64 KiB page
//! size), so rowid order equals page allocation order no matter which
//! stream fills which leaf, and independently produced leaves always merge
//! into a valid B-tree. A stream that flushes a partial leaf simply leaves
//! a gap in rowid space, which table B-trees permit.
//!
//! # Usage
//!
//! Open a [`Database`] over a [`PageSink`], open a [`Table`], and give each
//! producer thread its own [`TableStream`]. Close streams, then tables,
//! then the database; the borrow checker enforces that order.
//!
//! ```no_run
//! use bulklite::{Database, Record};
//! use std::fs::File;
//!
//! # fn main() -> bulklite::Result<()> {
//! let file = File::create("out.db")?;
//! let db = Database::new(&file);
//!
//! let table = db.open_table();
//! let mut stream = table.open_stream();
//!
//! let mut record = Record::new();
//! let mut row = Vec::new();
//! for i in 0..1_000_000i64 {
//!     record.reset();
//!     record.append_int(i);
//!     record.append_text("payload");
//!     row.clear();
//!     record.encode_to(&mut row);
//!     stream.write_row(&row)?;
//! }
//!
//! stream.close()?;
//! table.close("t", "CREATE TABLE t(n, payload)")?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Errors surfaced from the sink leave the database in an indeterminate
//! state; discard it. The sink itself is caller-owned and is never closed
//! by this library.

mod database;
mod sink;
mod table;

pub use bulklite_error::{BulkliteError, Result};
pub use bulklite_types::{PageNumber, Record, PAGE_SIZE, ROWS_PER_LEAF};
pub use database::Database;
pub use sink::{MemorySink, PageSink};
pub use table::{Table, TableStream};
