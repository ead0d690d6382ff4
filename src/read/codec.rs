use crate::error::{Result, SnapshotError};

// ---------------------------------------------------------------------------
// Fixed-width character blocks
// ---------------------------------------------------------------------------

/// Width of one column label in the engine's label block.
pub const LABEL_WIDTH: usize = 80;

/// Width of one header tag in the engine's tag block.
pub const TAG_WIDTH: usize = 16;

/// Row-major block of `count` strings, each exactly `width` bytes, padded
/// with blanks (Fortran) or NULs (C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidth {
    width: usize,
}

impl FixedWidth {
    pub const LABELS: FixedWidth = FixedWidth { width: LABEL_WIDTH };
    pub const TAGS: FixedWidth = FixedWidth { width: TAG_WIDTH };

    /// # Panics
    /// If `width` is zero.
    pub const fn new(width: usize) -> Self {
        assert!(width > 0, "fixed-width entries need a non-zero width");
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// A blank block with room for `count` entries.
    pub fn blank(&self, count: usize) -> Vec<u8> {
        vec![b' '; self.width * count]
    }

    /// Decode every entry of `block`, trimming trailing padding.
    pub fn decode(&self, block: &[u8]) -> Result<Vec<String>> {
        if block.len() % self.width != 0 {
            return Err(SnapshotError::Encoding(format!(
                "block of {} bytes is not a whole number of {}-byte entries",
                block.len(),
                self.width
            )));
        }
        Ok(block
            .chunks_exact(self.width)
            .map(|entry| self.decode_entry(entry))
            .collect())
    }

    /// Decode a single entry: stop at the first NUL, drop trailing blanks.
    pub fn decode_entry(&self, entry: &[u8]) -> String {
        let end = entry.iter().position(|&b| b == 0).unwrap_or(entry.len());
        String::from_utf8_lossy(&entry[..end]).trim_end().to_string()
    }

    /// Encode `entries` into a fresh blank-padded block. Entries longer
    /// than the width are cut at the last character boundary that fits.
    pub fn encode<S: AsRef<str>>(&self, entries: &[S]) -> Vec<u8> {
        let mut block = self.blank(entries.len());
        for (slot, entry) in block.chunks_exact_mut(self.width).zip(entries) {
            self.write_entry(slot, entry.as_ref());
        }
        block
    }

    /// Encode `entries` into a caller-supplied block, which must hold
    /// exactly `entries.len()` slots.
    pub fn encode_into<S: AsRef<str>>(&self, entries: &[S], block: &mut [u8]) -> Result<()> {
        if block.len() != self.width * entries.len() {
            return Err(SnapshotError::Encoding(format!(
                "block of {} bytes cannot hold {} entries of width {}",
                block.len(),
                entries.len(),
                self.width
            )));
        }
        for (slot, entry) in block.chunks_exact_mut(self.width).zip(entries) {
            slot.fill(b' ');
            self.write_entry(slot, entry.as_ref());
        }
        Ok(())
    }

    fn write_entry(&self, slot: &mut [u8], entry: &str) {
        let mut len = entry.len().min(self.width);
        while !entry.is_char_boundary(len) {
            len -= 1;
        }
        if len < entry.len() {
            log::debug!("truncating `{entry}` to {} bytes", self.width);
        }
        slot[..len].copy_from_slice(&entry.as_bytes()[..len]);
    }
}
