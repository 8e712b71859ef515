//! Table-leaf cell formatting.

use bulklite_types::{varint, PageNumber};

/// Append one table-leaf cell to `buf`.
///
/// Layout: varint total payload length, varint rowid, the local portion of
/// the payload, then a 4-byte big-endian overflow head page number when the
/// payload spills past the local portion.
///
/// `payload_len` is the length of the complete payload, not of `local`.
#[allow(clippy::cast_sign_loss)]
pub fn append_leaf_cell(
    buf: &mut Vec<u8>,
    payload_len: u64,
    rowid: i64,
    local: &[u8],
    overflow: Option<PageNumber>,
) {
    varint::append(buf, payload_len);
    varint::append(buf, rowid as u64);
    buf.extend_from_slice(local);
    if let Some(head) = overflow {
        buf.extend_from_slice(&head.get().to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_without_overflow() {
        let mut buf = Vec::new();
        append_leaf_cell(&mut buf, 3, 5, &[0xAA, 0xBB, 0xCC], None);
        assert_eq!(buf, vec![0x03, 0x05, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn cell_with_overflow_head() {
        let mut buf = Vec::new();
        let head = PageNumber::new(0x0102_0304).unwrap();
        append_leaf_cell(&mut buf, 100_000, 32768, &[0xEE], Some(head));

        let mut expected = Vec::new();
        varint::append(&mut expected, 100_000);
        varint::append(&mut expected, 32768);
        expected.push(0xEE);
        expected.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn cell_reuses_buffer() {
        let mut buf = vec![0xFF];
        buf.clear();
        append_leaf_cell(&mut buf, 0, 1, &[], None);
        assert_eq!(buf, vec![0x00, 0x01]);
    }
}
