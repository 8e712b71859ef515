//! Output sink abstraction.
//!
//! The database writes every page at a byte offset derived from its page
//! number, and different page numbers never overlap, so the only capability
//! it needs from the output is positional writes that may run concurrently
//! over disjoint ranges. [`PageSink`] is the open trait encoding exactly
//! that; implement it to target object stores, custom buffers, and so on.

use bulklite_error::Result;
use parking_lot::Mutex;

/// A positional byte writer.
///
/// `write_at` takes `&self` so independent producer threads can write their
/// pages without serializing on the sink; implementations must support
/// concurrent calls over non-overlapping ranges. Writes may land in any
/// order and may leave holes, which the caller later fills or leaves as
/// zero pages.
pub trait PageSink: Send + Sync {
    /// Write all of `buf` at absolute byte `offset`, extending the
    /// destination as needed.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()>;
}

impl<S: PageSink + ?Sized> PageSink for &S {
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        (**self).write_at(buf, offset)
    }
}

#[cfg(unix)]
impl PageSink for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        std::os::unix::fs::FileExt::write_all_at(self, buf, offset)?;
        Ok(())
    }
}

#[cfg(windows)]
impl PageSink for std::fs::File {
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = std::os::windows::fs::FileExt::seek_write(
                self,
                &buf[written..],
                offset + written as u64,
            )?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
            written += n;
        }
        Ok(())
    }
}

/// An in-memory sink, mainly for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    data: Mutex<Vec<u8>>,
}

impl MemorySink {
    /// Create an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the written image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Consume the sink and return the file image.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_inner()
    }
}

impl PageSink for MemorySink {
    #[allow(clippy::cast_possible_truncation)]
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        let offset = offset as usize;
        let mut data = self.data.lock();
        let end = offset + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(())
    }
}
