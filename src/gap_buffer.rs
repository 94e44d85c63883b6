//! Gap buffer: the document's backing byte store
//!
//! A byte sequence supporting amortized O(1) insert/delete at a single movable
//! point ("the gap"), O(1) length, and an O(1) newline count maintained
//! incrementally on every mutation (never rescanned).
//!
//! Layout invariant: at any moment the logical content `[0 .. len())` is the
//! concatenation of `buf[..gap_start]` and `buf[gap_end..]`; bytes in
//! `buf[gap_start..gap_end]` are unspecified "gap" bytes that carry no content.

use crate::error::{EditError, EditResult};

/// Gap buffer holding a document's raw bytes plus an incrementally maintained
/// newline counter.
#[derive(Debug, Clone)]
pub struct GapBuffer {
    buf: Vec<u8>,
    gap_start: usize,
    gap_end: usize,
    newlines: usize,
}

impl GapBuffer {
    /// Create an empty buffer with the given initial gap capacity.
    pub fn new(initial_capacity: usize) -> EditResult<Self> {
        if initial_capacity == 0 {
            return Err(EditError::argument(
                "INVALID_CAPACITY",
                "initial capacity must be > 0",
            ));
        }
        Ok(GapBuffer {
            buf: vec![0u8; initial_capacity],
            gap_start: 0,
            gap_end: initial_capacity,
            newlines: 0,
        })
    }

    /// Number of live content bytes (excludes the gap).
    pub fn len(&self) -> usize {
        self.gap_start + (self.buf.len() - self.gap_end)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of `\n` bytes in the live content. O(1): maintained incrementally.
    pub fn lines(&self) -> usize {
        self.newlines
    }

    /// Current point (where insert/delete act), expressed as a logical offset.
    pub fn point(&self) -> usize {
        self.gap_start
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn gap_len(&self) -> usize {
        self.gap_end - self.gap_start
    }

    /// Read the byte at logical offset `i`, or `None` if out of bounds.
    pub fn get(&self, i: usize) -> Option<u8> {
        if i < self.gap_start {
            Some(self.buf[i])
        } else if i < self.len() {
            Some(self.buf[i + self.gap_len()])
        } else {
            None
        }
    }

    /// Copy up to `out.len()` live bytes starting at logical offset `i` into
    /// `out`, returning the number of bytes actually copied (bounded by
    /// `len() - i`).
    pub fn get_range(&self, i: usize, out: &mut [u8]) -> usize {
        let len = self.len();
        if i >= len {
            return 0;
        }
        let want = out.len().min(len - i);
        for (k, slot) in out.iter_mut().take(want).enumerate() {
            *slot = self
                .get(i + k)
                .expect("index within bounds computed above");
        }
        want
    }

    /// Move the gap so the point is at logical offset `i`.
    ///
    /// # Panics
    /// Panics if `i > len()` — callers are expected to validate offsets
    /// against `len()` before calling (an internal invariant, not a
    /// caller-facing error per the component contract).
    pub fn set_point(&mut self, i: usize) {
        let len = self.len();
        assert!(i <= len, "set_point offset {i} out of bounds (len {len})");

        if i < self.gap_start {
            let shift = self.gap_start - i;
            self.buf.copy_within(i..self.gap_start, self.gap_end - shift);
            self.gap_start -= shift;
            self.gap_end -= shift;
        } else if i > self.gap_start {
            let shift = i - self.gap_start;
            self.buf
                .copy_within(self.gap_end..self.gap_end + shift, self.gap_start);
            self.gap_start += shift;
            self.gap_end += shift;
        }
    }

    /// Ensure the gap can hold at least `additional` more bytes without a
    /// reallocation, preserving the logical content and point.
    fn ensure_gap(&mut self, additional: usize) -> EditResult<()> {
        if self.gap_len() >= additional {
            return Ok(());
        }
        let want_len = self.len() + additional;
        self.preallocate(want_len)
    }

    /// Grow (never shrink) total capacity so that `len() + slack` bytes fit,
    /// where slack guarantees the gap covers `target_length` worth of future
    /// inserts without reallocating again immediately. Fails without partial
    /// mutation on allocation failure.
    pub fn preallocate(&mut self, target_length: usize) -> EditResult<()> {
        let needed_capacity = target_length.max(self.len());
        if self.capacity() >= needed_capacity + 1 {
            return Ok(());
        }
        let new_capacity = (self.capacity().max(1) * 2).max(needed_capacity + 1);

        let after_len = self.capacity() - self.gap_end;
        let mut new_buf = Vec::new();
        new_buf
            .try_reserve_exact(new_capacity)
            .map_err(|e| EditError::resource(format!("gap buffer allocation failed: {e}")))?;
        new_buf.resize(new_capacity, 0u8);

        new_buf[..self.gap_start].copy_from_slice(&self.buf[..self.gap_start]);
        let new_gap_end = new_capacity - after_len;
        new_buf[new_gap_end..].copy_from_slice(&self.buf[self.gap_end..]);

        self.buf = new_buf;
        self.gap_end = new_gap_end;
        Ok(())
    }

    /// Insert `bytes` at the current point; the point advances past the
    /// inserted bytes. Fails (without partial mutation) only on allocation
    /// failure.
    pub fn insert(&mut self, bytes: &[u8]) -> EditResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.ensure_gap(bytes.len())?;
        let dst_start = self.gap_start;
        self.buf[dst_start..dst_start + bytes.len()].copy_from_slice(bytes);
        self.gap_start += bytes.len();
        self.newlines += bytes.iter().filter(|&&b| b == b'\n').count();
        Ok(())
    }

    /// Delete `n` bytes starting at the current point (forward delete),
    /// returning the deleted bytes. The point does not move. Returns fewer
    /// than `n` bytes (possibly zero) if fewer are available.
    pub fn delete(&mut self, n: usize) -> Vec<u8> {
        let available = self.buf.len() - self.gap_end;
        let n = n.min(available);
        if n == 0 {
            return Vec::new();
        }
        let removed: Vec<u8> = self.buf[self.gap_end..self.gap_end + n].to_vec();
        self.newlines -= removed.iter().filter(|&&b| b == b'\n').count();
        self.gap_end += n;
        removed
    }

    /// Render the entire live content as a lossy UTF-8 string (debugging/tests/save).
    pub fn to_string(&self) -> String {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.buf[..self.gap_start]);
        out.extend_from_slice(&self.buf[self.gap_end..]);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Live content before the gap (i.e. before the current point).
    pub fn before_point(&self) -> &[u8] {
        &self.buf[..self.gap_start]
    }

    /// Live content after the gap (i.e. from the current point to the end).
    pub fn after_point(&self) -> &[u8] {
        &self.buf[self.gap_end..]
    }
}

impl std::fmt::Display for GapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_capacity() {
        assert!(GapBuffer::new(0).is_err());
    }

    #[test]
    fn insert_and_len() {
        let mut buf = GapBuffer::new(8).unwrap();
        buf.insert(b"hello").unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.point(), 5);
        assert_eq!(buf.to_string(), "hello");
    }

    #[test]
    fn set_point_moves_gap_both_directions() {
        let mut buf = GapBuffer::new(8).unwrap();
        buf.insert(b"hello").unwrap();
        buf.set_point(0);
        buf.insert(b"X").unwrap();
        assert_eq!(buf.to_string(), "Xhello");
        buf.set_point(6);
        buf.insert(b"!").unwrap();
        assert_eq!(buf.to_string(), "Xhello!");
    }

    #[test]
    fn delete_forward_from_point() {
        let mut buf = GapBuffer::new(8).unwrap();
        buf.insert(b"hello").unwrap();
        buf.set_point(0);
        let removed = buf.delete(2);
        assert_eq!(removed, b"he");
        assert_eq!(buf.to_string(), "llo");
    }

    #[test]
    fn newline_counter_tracks_inserts_and_deletes() {
        let mut buf = GapBuffer::new(16).unwrap();
        buf.insert(b"a\nb\nc").unwrap();
        assert_eq!(buf.lines(), 2);
        buf.set_point(0);
        buf.delete(2); // removes "a\n"
        assert_eq!(buf.lines(), 1);
        assert_eq!(buf.to_string(), "b\nc");
    }

    #[test]
    fn get_and_get_range() {
        let mut buf = GapBuffer::new(8).unwrap();
        buf.insert(b"hello").unwrap();
        buf.set_point(2);
        assert_eq!(buf.get(0), Some(b'h'));
        assert_eq!(buf.get(4), Some(b'o'));
        assert_eq!(buf.get(5), None);

        let mut out = [0u8; 10];
        let n = buf.get_range(1, &mut out);
        assert_eq!(n, 4);
        assert_eq!(&out[..n], b"ello");
    }

    #[test]
    fn grows_beyond_initial_capacity_without_losing_content() {
        let mut buf = GapBuffer::new(2).unwrap();
        let text = "a".repeat(50);
        buf.insert(text.as_bytes()).unwrap();
        assert_eq!(buf.len(), 50);
        assert_eq!(buf.to_string(), text);
    }

    #[test]
    fn preallocate_does_not_change_content_or_point() {
        let mut buf = GapBuffer::new(4).unwrap();
        buf.insert(b"ab").unwrap();
        buf.set_point(1);
        buf.preallocate(1000).unwrap();
        assert_eq!(buf.to_string(), "ab");
        assert_eq!(buf.point(), 1);
    }

    #[test]
    fn delete_clamps_to_available_bytes() {
        let mut buf = GapBuffer::new(8).unwrap();
        buf.insert(b"hi").unwrap();
        buf.set_point(0);
        let removed = buf.delete(100);
        assert_eq!(removed, b"hi");
        assert_eq!(buf.len(), 0);
    }
}
