//! Overflow page chains for oversized payloads.
//!
//! A table-leaf cell stores at most a bounded local portion of its payload;
//! the rest is pushed into a linked list of overflow pages. Each overflow
//! page begins with the 4-byte big-endian page number of the next page in
//! the chain (0 on the last page) followed by payload bytes; unused bytes
//! after the final payload byte are zero.
//!
//! ```text
//! ┌───────────────────────────────────┐
//! │ Next overflow page (4 bytes, BE)  │
//! ├───────────────────────────────────┤
//! │ Overflow data (page_size - 4)     │
//! └───────────────────────────────────┘
//! ```

use bulklite_error::{BulkliteError, Result};
use bulklite_types::PageNumber;
use tracing::debug;

/// Number of payload bytes stored directly in a table-leaf cell.
///
/// This is the file format's "alternative description" of the payload
/// spill calculation, specialized to table leaves: with
/// `X = page_size - 35` and `M = ((page_size - 12) * 32 / 255) - 23`,
/// a payload of `len` bytes keeps `len` bytes locally when it fits,
/// otherwise `K = M + ((len - M) % (page_size - 4))` when that fits,
/// otherwise `M`.
#[must_use]
pub fn leaf_local_size(page_size: usize, len: usize) -> usize {
    let x = page_size - 35;
    if len <= x {
        return len;
    }
    let m = (page_size - 12) * 32 / 255 - 23;
    let k = m + (len - m) % (page_size - 4);
    if k <= x {
        k
    } else {
        m
    }
}

/// Write `overflow` (the non-local payload tail) as a chain of overflow
/// pages, returning the head page number.
///
/// `alloc` hands out fresh page numbers and `write` stores a finished page;
/// both come from the database so the chain interleaves with whatever else
/// is being written.
pub fn write_chain<A, W>(
    overflow: &[u8],
    page_size: usize,
    alloc: &mut A,
    write: &mut W,
) -> Result<PageNumber>
where
    A: FnMut() -> PageNumber,
    W: FnMut(PageNumber, &[u8]) -> Result<()>,
{
    if overflow.is_empty() {
        return Err(BulkliteError::internal(
            "overflow chain requested for an empty payload tail",
        ));
    }

    let bytes_per_page = page_size - 4;
    let num_pages = overflow.len().div_ceil(bytes_per_page);

    // Allocate the whole chain up front so each page knows its successor.
    let mut pages = Vec::with_capacity(num_pages);
    for _ in 0..num_pages {
        pages.push(alloc());
    }

    let mut page_buf = vec![0u8; page_size];
    for (i, &pgno) in pages.iter().enumerate() {
        let chunk_start = i * bytes_per_page;
        let chunk_end = ((i + 1) * bytes_per_page).min(overflow.len());
        let chunk = &overflow[chunk_start..chunk_end];

        let next: u32 = if i + 1 < pages.len() {
            pages[i + 1].get()
        } else {
            0
        };

        page_buf[..4].copy_from_slice(&next.to_be_bytes());
        page_buf[4..4 + chunk.len()].copy_from_slice(chunk);
        if chunk.len() < bytes_per_page {
            // The terminal page zero-fills past the last payload byte.
            page_buf[4 + chunk.len()..].fill(0);
        }

        write(pgno, &page_buf)?;
    }

    debug!(
        overflow_len = overflow.len(),
        pages = num_pages,
        head = pages[0].get(),
        "wrote overflow chain"
    );

    Ok(pages[0])
}
