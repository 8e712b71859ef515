//! SQLite record encoding.
//!
//! A record is a serial-type header followed by a value body. The header is
//! a varint giving the header's own total length, then one serial-type
//! varint per column; the body is the concatenated value encodings:
//!
//! | Serial type  | Content size | Meaning                   |
//! |--------------|--------------|---------------------------|
//! | 0            | 0            | NULL                      |
//! | 1            | 1            | 8-bit signed integer      |
//! | 2            | 2            | 16-bit big-endian integer |
//! | 3            | 3            | 24-bit big-endian integer |
//! | 4            | 4            | 32-bit big-endian integer |
//! | 5            | 6            | 48-bit big-endian integer |
//! | 6            | 8            | 64-bit big-endian integer |
//! | 7            | 8            | IEEE 754 double           |
//! | 8            | 0            | Integer constant 0        |
//! | 9            | 0            | Integer constant 1        |
//! | N >= 12 even | (N-12)/2     | BLOB                      |
//! | N >= 13 odd  | (N-13)/2     | TEXT                      |
//!
//! Integers always take the narrowest code that holds them losslessly, and
//! floats whose value is exactly an integer are stored as that integer.
//!
//! A [`Record`] is a scratch builder: append values column by column, encode
//! into an output buffer, then [`reset`](Record::reset) and reuse it for the
//! next row without releasing capacity.

use crate::varint;

/// Append-style builder for one SQLite record.
#[derive(Debug, Default)]
pub struct Record {
    /// Serial-type varints, one entry per appended column.
    header: Vec<u8>,
    /// Concatenated value encodings.
    body: Vec<u8>,
}

impl Record {
    /// Create an empty record builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an SQL NULL.
    pub fn append_null(&mut self) {
        self.header.push(0);
    }

    /// Append a boolean as the integer constant 1 or 0.
    pub fn append_bool(&mut self, b: bool) {
        self.header.push(if b { 9 } else { 8 });
    }

    /// Append a signed integer using the narrowest serial type.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append_int(&mut self, i: i64) {
        let be = i.to_be_bytes();
        match i {
            0 => self.header.push(8),
            1 => self.header.push(9),
            -0x80..=0x7F => {
                self.header.push(1);
                self.body.push(be[7]);
            }
            -0x8000..=0x7FFF => {
                self.header.push(2);
                self.body.extend_from_slice(&be[6..]);
            }
            -0x0080_0000..=0x007F_FFFF => {
                self.header.push(3);
                self.body.extend_from_slice(&be[5..]);
            }
            -0x8000_0000..=0x7FFF_FFFF => {
                self.header.push(4);
                self.body.extend_from_slice(&be[4..]);
            }
            -0x8000_0000_0000..=0x7FFF_FFFF_FFFF => {
                self.header.push(5);
                self.body.extend_from_slice(&be[2..]);
            }
            _ => {
                self.header.push(6);
                self.body.extend_from_slice(&be);
            }
        }
    }

    /// Append an unsigned integer using the narrowest serial type.
    ///
    /// Values with the high bit set use the full 8-byte code 6; a reader
    /// sees them as the corresponding negative two's-complement value.
    pub fn append_uint(&mut self, u: u64) {
        if u <= i64::MAX as u64 {
            #[allow(clippy::cast_possible_wrap)]
            self.append_int(u as i64);
        } else {
            self.header.push(6);
            self.body.extend_from_slice(&u.to_be_bytes());
        }
    }

    /// Append a float, reduced to the integer encoding when the value is
    /// exactly an integer, otherwise stored as a big-endian IEEE 754 double.
    pub fn append_float(&mut self, f: f64) {
        // Integral values in [-2^63, 2^63) survive the i64 round trip;
        // i64::MIN as f64 is exactly -2^63 so both bounds are exact.
        let in_range = f >= i64::MIN as f64 && f < -(i64::MIN as f64);
        #[allow(clippy::cast_possible_truncation)]
        let i = f as i64;
        #[allow(clippy::cast_precision_loss)]
        if in_range && i as f64 == f {
            self.append_int(i);
        } else {
            self.header.push(7);
            self.body.extend_from_slice(&f.to_bits().to_be_bytes());
        }
    }

    /// Append a UTF-8 string as TEXT.
    pub fn append_text(&mut self, s: &str) {
        self.append_text_bytes(s.as_bytes());
    }

    /// Append raw bytes as TEXT without UTF-8 validation.
    ///
    /// The bytes are stored as supplied and interpreted per the database's
    /// declared encoding by whoever reads the file.
    pub fn append_text_bytes(&mut self, s: &[u8]) {
        varint::append(&mut self.header, 2 * s.len() as u64 + 13);
        self.body.extend_from_slice(s);
    }

    /// Append a BLOB.
    pub fn append_blob(&mut self, b: &[u8]) {
        varint::append(&mut self.header, 2 * b.len() as u64 + 12);
        self.body.extend_from_slice(b);
    }

    /// Append any serializable value as its JSON rendering, stored as TEXT.
    pub fn append_json<T>(&mut self, v: &T) -> serde_json::Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        let rendered = serde_json::to_vec(v)?;
        self.append_text_bytes(&rendered);
        Ok(())
    }

    /// Append the serialized record to `out`.
    ///
    /// The builder keeps its contents; call [`reset`](Record::reset) before
    /// starting the next row.
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        varint::append(out, header_len(self.header.len()) as u64);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.body);
    }

    /// The serialized record as a fresh buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }

    /// Length in bytes of the serialized record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        header_len(self.header.len()) + self.body.len()
    }

    /// Clear both buffers, keeping their capacity.
    pub fn reset(&mut self) {
        self.header.clear();
        self.body.clear();
    }
}

/// Total header length for `l` bytes of serial types, including the length
/// prefix varint itself.
fn header_len(l: usize) -> usize {
    l + header_len_len(l)
}

/// Width of the header-length prefix varint.
///
/// The prefix length depends on the total length, which includes the prefix.
/// Adding the width of `l`'s own varint before measuring handles the case
/// where including the prefix pushes the total over a varint width boundary.
fn header_len_len(l: usize) -> usize {
    varint::len((l + varint::len(l as u64)) as u64)
}
