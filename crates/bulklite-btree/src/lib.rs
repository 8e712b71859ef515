//! Table B-tree page construction for the bulklite database assembler.
//!
//! All builders here target the standard B-tree page layout: a small header
//! at the front of the page, a cell pointer array growing forward from the
//! header, and cell content growing backward from the end of the page:
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Page header (8 or 12 B)  │  (12 for interior, 8 for leaf)
//! ├──────────────────────────┤
//! │ Cell pointer array       │  (2 bytes per cell, insertion order)
//! ├──────────────────────────┤
//! │ Unallocated space        │
//! ├──────────────────────────┤
//! │ Cell content area        │  (grows backward from end of page)
//! └──────────────────────────┘
//! ```
//!
//! [`TableLeaf`] and [`HeaderPage`] format one page at a time and reset
//! after emitting it. [`TableInterior`] buffers child references across page
//! boundaries, because the cells of one logical interior node arrive while
//! earlier pages of the same node are still being emitted. The
//! [`overflow`] module splits oversized payloads and writes their chains.

pub mod cell;
pub mod header;
pub mod interior;
pub mod leaf;
pub mod overflow;
mod page;

pub use header::HeaderPage;
pub use interior::TableInterior;
pub use leaf::TableLeaf;
