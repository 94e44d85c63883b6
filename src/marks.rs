//! MarkRegistry: generational handle arena for positions that must track
//! live edits to the document.
//!
//! The C original keys marks by the address of an externally owned
//! `Position` and holds a raw pointer back to it. Here the registry itself
//! owns every tracked position; external holders keep a `MarkHandle` and
//! read/write through the registry. This removes the aliasing hazard and the
//! hash-by-address trick entirely — see the design notes on pointer-graph
//! marks.

use crate::error::{EditError, EditResult};
use crate::gap_buffer::GapBuffer;
use crate::position::Position;

/// Behavioral flags for a tracked mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkFlags {
    /// Don't recompute line/col after edits — used by stream endpoints that
    /// only care about the raw offset.
    pub adjust_offset_only: bool,
    /// A position exactly equal to the edit point should not move — used by
    /// the screen-start mark so inserts before the cursor don't push the
    /// viewport.
    pub no_adjust_on_buffer_pos: bool,
}

/// Stable handle to a tracked position. Carries a generation so a handle
/// from a removed slot can never alias a later, unrelated registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkHandle {
    index: u32,
    generation: u32,
}

struct Slot {
    position: Position,
    flags: MarkFlags,
    generation: u32,
    live: bool,
}

/// Kind of edit being reported to `apply_edit`, mirroring the GapBuffer's
/// two mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
}

/// Owns every position the document must keep consistent across edits:
/// cursor, selection anchor, the view's screen-start, and any open stream
/// endpoints.
#[derive(Debug, Default)]
pub struct MarkRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl MarkRegistry {
    pub fn new() -> Self {
        MarkRegistry::default()
    }

    /// Register a new mark at `position` with the given flags.
    pub fn register(&mut self, position: Position, flags: MarkFlags) -> MarkHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.position = position;
            slot.flags = flags;
            slot.live = true;
            slot.generation += 1;
            MarkHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                position,
                flags,
                generation: 0,
                live: true,
            });
            MarkHandle {
                index,
                generation: 0,
            }
        }
    }

    fn slot(&self, handle: MarkHandle) -> EditResult<&Slot> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .filter(|s| s.live && s.generation == handle.generation)
            .ok_or_else(|| EditError::state("STALE_MARK", "mark handle no longer tracked"))?;
        Ok(slot)
    }

    fn slot_mut(&mut self, handle: MarkHandle) -> EditResult<&mut Slot> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.live && s.generation == handle.generation)
            .ok_or_else(|| EditError::state("STALE_MARK", "mark handle no longer tracked"))?;
        Ok(slot)
    }

    pub fn get(&self, handle: MarkHandle) -> EditResult<Position> {
        Ok(self.slot(handle)?.position)
    }

    pub fn set(&mut self, handle: MarkHandle, position: Position) -> EditResult<()> {
        self.slot_mut(handle)?.position = position;
        Ok(())
    }

    /// Release a mark. The handle becomes permanently invalid; a later
    /// registration may reuse the slot but will mint a new generation.
    pub fn release(&mut self, handle: MarkHandle) -> EditResult<()> {
        let slot = self.slot_mut(handle)?;
        slot.live = false;
        self.free.push(handle.index);
        Ok(())
    }

    /// Walk every live mark and adjust it for an edit at `origin` of `length`
    /// bytes, per the component's edit-adjustment table. `newline_delta` is
    /// the net change in newline count the edit produced (positive for
    /// insert, negated by the caller for delete as appropriate).
    pub fn apply_edit(
        &mut self,
        buf: &GapBuffer,
        tabwidth: u8,
        kind: EditKind,
        origin: usize,
        length: usize,
        newline_delta: i64,
    ) {
        if length == 0 {
            return;
        }
        for slot in self.slots.iter_mut() {
            if !slot.live || slot.position.is_sentinel() {
                continue;
            }
            let pos = &mut slot.position;
            if pos.offset < origin {
                continue;
            }
            if pos.offset == origin && slot.flags.no_adjust_on_buffer_pos {
                continue;
            }
            match kind {
                EditKind::Insert => {
                    pos.offset += length;
                    if !slot.flags.adjust_offset_only {
                        pos.recalc_col(buf, tabwidth);
                    }
                    pos.line_no = (pos.line_no as i64 + newline_delta).max(1) as usize;
                }
                EditKind::Delete => {
                    if pos.offset < origin + length {
                        pos.offset = origin;
                        if !slot.flags.adjust_offset_only {
                            pos.recalc_col(buf, tabwidth);
                        }
                    } else {
                        pos.offset -= length;
                        if !slot.flags.adjust_offset_only {
                            pos.recalc_col(buf, tabwidth);
                        }
                        pos.line_no = (pos.line_no as i64 - newline_delta).max(1) as usize;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn buf_of(s: &str) -> GapBuffer {
        let mut b = GapBuffer::new(16).unwrap();
        b.insert(s.as_bytes()).unwrap();
        b
    }

    #[test]
    fn register_and_get() {
        let mut reg = MarkRegistry::new();
        let h = reg.register(Position::new(3, 1, 4), MarkFlags::default());
        assert_eq!(reg.get(h).unwrap().offset, 3);
    }

    #[test]
    fn released_handle_errors_on_access() {
        let mut reg = MarkRegistry::new();
        let h = reg.register(Position::new(0, 1, 1), MarkFlags::default());
        reg.release(h).unwrap();
        assert!(reg.get(h).is_err());
    }

    #[test]
    fn reused_slot_mints_new_generation() {
        let mut reg = MarkRegistry::new();
        let h1 = reg.register(Position::new(0, 1, 1), MarkFlags::default());
        reg.release(h1).unwrap();
        let h2 = reg.register(Position::new(5, 1, 6), MarkFlags::default());
        assert!(reg.get(h1).is_err());
        assert_eq!(reg.get(h2).unwrap().offset, 5);
    }

    #[test]
    fn insert_shifts_marks_at_or_after_origin() {
        let buf = buf_of("0123456789");
        let mut reg = MarkRegistry::new();
        let before = reg.register(Position::new(0, 1, 1), MarkFlags::default());
        let at = reg.register(Position::new(3, 1, 4), MarkFlags::default());
        let after = reg.register(Position::new(7, 1, 8), MarkFlags::default());
        reg.apply_edit(&buf, 8, EditKind::Insert, 3, 2, 0);
        assert_eq!(reg.get(before).unwrap().offset, 0);
        assert_eq!(reg.get(at).unwrap().offset, 5);
        assert_eq!(reg.get(after).unwrap().offset, 9);
    }

    #[test]
    fn no_adjust_on_buffer_pos_skips_mark_at_origin() {
        let buf = buf_of("0123456789");
        let mut reg = MarkRegistry::new();
        let flags = MarkFlags {
            no_adjust_on_buffer_pos: true,
            ..Default::default()
        };
        let screen_start = reg.register(Position::new(3, 1, 4), flags);
        reg.apply_edit(&buf, 8, EditKind::Insert, 3, 2, 0);
        assert_eq!(reg.get(screen_start).unwrap().offset, 3);
    }

    #[test]
    fn delete_collapses_marks_inside_removed_region() {
        let buf = buf_of("0123456789");
        let mut reg = MarkRegistry::new();
        let inside = reg.register(Position::new(4, 1, 5), MarkFlags::default());
        let after = reg.register(Position::new(8, 1, 9), MarkFlags::default());
        reg.apply_edit(&buf, 8, EditKind::Delete, 3, 4, 0); // delete [3,7)
        assert_eq!(reg.get(inside).unwrap().offset, 3);
        assert_eq!(reg.get(after).unwrap().offset, 4);
    }

    #[test]
    fn stream_mark_survives_edit_elsewhere() {
        // mirrors the "mark survives edits" end-to-end scenario: a stream
        // over [3,7) of "0123456789", insert "XY" at offset 1
        let buf = buf_of("0123456789");
        let mut reg = MarkRegistry::new();
        let flags = MarkFlags {
            adjust_offset_only: true,
            ..Default::default()
        };
        let start = reg.register(Position::new(3, 1, 4), flags);
        let end = reg.register(Position::new(7, 1, 8), flags);
        reg.apply_edit(&buf, 8, EditKind::Insert, 1, 2, 0);
        assert_eq!(reg.get(start).unwrap().offset, 5);
        assert_eq!(reg.get(end).unwrap().offset, 9);
    }

    #[test]
    fn insert_recalcs_col_for_mark_past_a_mid_buffer_gap() {
        // Leave the buffer's point mid-content (not at the end) after the
        // edit, so recalc_col's forward scan from line start must read
        // bytes that sit after the gap rather than at the buffer's tail.
        let mut buf = buf_of("ab\ncdef");
        buf.set_point(4); // gap after "ab\nc", before "def"
        buf.insert(b"X").unwrap(); // buffer is now "ab\ncXdef", gap after the X

        let mut reg = MarkRegistry::new();
        // "f" was at offset 6, column 4 on line 2 ("cdef"), before the insert.
        let tail = reg.register(Position::new(6, 2, 4), MarkFlags::default());
        reg.apply_edit(&buf, 8, EditKind::Insert, 4, 1, 0);
        let pos = reg.get(tail).unwrap();
        assert_eq!(pos.offset, 7);
        assert_eq!(pos.col_no, 5);
    }
}
