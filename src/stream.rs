//! Stream adapters over a live document: `BufferInputStream`/
//! `BufferOutputStream` track a moving read/write window via an
//! `adjust_offset_only` mark so external jobs can read or append to the
//! buffer while concurrent edits happen elsewhere, and a `Clipboard` seam
//! for pasting external content in.
//!
//! Grounded on the teacher's `job_manager/jobs/terminal_job.rs`, which pipes
//! a child process's stdout into the buffer and the buffer's selection out to
//! stdin; adapted here to the synchronous, single-threaded model this
//! component requires (no channels, no background thread — a caller drives
//! `read`/`write` directly, e.g. from its own job-polling loop).

use crate::document::Document;
use crate::error::EditResult;
use crate::marks::{MarkFlags, MarkHandle};
use crate::position::Position;

/// Reads bytes forward from a window `[start, end)` that was fixed at open
/// time. The read cursor is an `adjust_offset_only` mark: edits before it
/// shift it, edits at or after the read point don't retroactively change
/// what's already been read.
pub struct BufferInputStream {
    handle: MarkHandle,
    end: usize,
}

impl BufferInputStream {
    /// Open a stream over `[start, end)` of `doc`'s current content.
    pub fn open(doc: &mut Document, start: usize, end: usize) -> Self {
        let pos = doc.position_at_offset(start);
        let handle = doc.register_mark(
            pos,
            MarkFlags {
                adjust_offset_only: true,
                ..Default::default()
            },
        );
        BufferInputStream { handle, end }
    }

    /// Read up to `out.len()` bytes starting at the stream's current
    /// position, without advancing it. Callers that consume the bytes call
    /// `advance` afterward.
    pub fn read(&self, doc: &Document, out: &mut [u8]) -> EditResult<usize> {
        let pos = doc.mark_position(self.handle)?;
        let mut n = 0;
        let mut offset = pos.offset;
        while n < out.len() && offset < self.end {
            match doc.byte_at(offset) {
                Some(b) => {
                    out[n] = b;
                    n += 1;
                    offset += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    /// Advance the stream's position by `by` bytes (typically however many
    /// `read` just returned).
    pub fn advance(&mut self, doc: &mut Document, by: usize) -> EditResult<()> {
        let pos = doc.mark_position(self.handle)?;
        doc.set_mark_position(self.handle, Position::new(pos.offset + by, pos.line_no, pos.col_no))
    }

    pub fn at_end(&self, doc: &Document) -> bool {
        doc.mark_position(self.handle)
            .map(|p| p.offset >= self.end)
            .unwrap_or(true)
    }

    pub fn close(self, doc: &mut Document) -> EditResult<()> {
        doc.release_mark(self.handle)
    }
}

/// Appends bytes at a fixed insertion point that tracks edits before it, same
/// as `BufferInputStream`. Used to stream a child job's stdout into the
/// document as it arrives.
pub struct BufferOutputStream {
    handle: MarkHandle,
}

impl BufferOutputStream {
    pub fn open(doc: &mut Document, at: usize) -> Self {
        let pos = doc.position_at_offset(at);
        let handle = doc.register_mark(
            pos,
            MarkFlags {
                adjust_offset_only: true,
                ..Default::default()
            },
        );
        BufferOutputStream { handle }
    }

    /// Insert `bytes` at the stream's current position; the mark advances
    /// past them automatically via the normal insert edit-adjustment.
    pub fn write(&mut self, doc: &mut Document, bytes: &[u8]) -> EditResult<()> {
        let pos = doc.mark_position(self.handle)?;
        doc.insert_at(pos.offset, bytes)
    }

    pub fn position(&self, doc: &Document) -> EditResult<usize> {
        Ok(doc.mark_position(self.handle)?.offset)
    }

    pub fn close(self, doc: &mut Document) -> EditResult<()> {
        doc.release_mark(self.handle)
    }
}

/// External clipboard seam (spec 6.1): the core never implements clipboard
/// IPC itself, only this trait boundary a host environment fills in.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> EditResult<()>;
    fn get_text(&mut self) -> EditResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;

    fn doc_with(text: &str) -> Document {
        let mut d = Document::new(1, DocumentConfig::default()).unwrap();
        d.set_text(text.as_bytes()).unwrap();
        d
    }

    #[test]
    fn input_stream_reads_window_and_tracks_prior_edits() {
        let mut d = doc_with("0123456789");
        let mut stream = BufferInputStream::open(&mut d, 3, 7);
        let mut buf = [0u8; 10];
        let n = stream.read(&d, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"3456");

        // Insert before the stream's window; its start offset shifts with it.
        d.insert_at(0, b"XX").unwrap();
        let n2 = stream.read(&d, &mut buf).unwrap();
        assert_eq!(&buf[..n2], b"3456");
        stream.close(&mut d).unwrap();
    }

    #[test]
    fn input_stream_advance_moves_past_consumed_bytes() {
        let mut d = doc_with("abcdef");
        let mut stream = BufferInputStream::open(&mut d, 0, 6);
        let mut buf = [0u8; 3];
        let n = stream.read(&d, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
        stream.advance(&mut d, n).unwrap();
        let n2 = stream.read(&d, &mut buf).unwrap();
        assert_eq!(&buf[..n2], b"def");
        assert!(!stream.at_end(&d));
        stream.advance(&mut d, n2).unwrap();
        assert!(stream.at_end(&d));
    }

    #[test]
    fn output_stream_appends_and_advances() {
        let mut d = doc_with("ab");
        let mut stream = BufferOutputStream::open(&mut d, 2);
        stream.write(&mut d, b"cd").unwrap();
        assert_eq!(d.as_string(), "abcd");
        assert_eq!(stream.position(&d).unwrap(), 4);
        stream.close(&mut d).unwrap();
    }
}
