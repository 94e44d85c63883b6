//! Document: the editing core's top-level container.
//!
//! Owns the gap buffer, configuration, cursor/selection (as marks), undo
//! log, and view. Every public editing operation follows the component's
//! uniform skeleton: resolve selection, mutate, record undo, walk marks
//! (which carries the cursor along for free when it sits at the edit
//! origin), set draw-dirty. Grounded on the teacher's `document/manager.rs`
//! for the container lifecycle (atomic save, dirty tracking) and on
//! `buffer/api.rs`'s insert/delete operations for the editing operations
//! themselves.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{DocumentConfig, FileFormat};
use crate::error::{EditError, EditResult, Notification};
use crate::gap_buffer::GapBuffer;
use crate::marks::{EditKind, MarkFlags, MarkHandle, MarkRegistry};
use crate::position::{Position, Range};
use crate::search::{PromptResponder, RegexEngine, ReplaceStep, SearchMatch, SearchState};
use crate::undo::{Application, ChangeState, UndoLog};
use crate::view::{Cell, TokenProvider, ViewProjector};

const INITIAL_GAP_CAPACITY: usize = 64;

pub struct Document {
    id: u64,
    buf: GapBuffer,
    config: DocumentConfig,
    marks: MarkRegistry,
    cursor: MarkHandle,
    anchor: MarkHandle,
    undo: UndoLog,
    saved_state: Option<ChangeState>,
    revision: u64,
    file_path: Option<PathBuf>,
    file_format: FileFormat,
    read_only: bool,
    pub search: SearchState,
    pub view: ViewProjector,
    regex_engine: Option<Box<dyn RegexEngine>>,
    input_mask: Option<(String, Box<dyn RegexEngine>)>,
}

impl Document {
    pub fn new(id: u64, config: DocumentConfig) -> EditResult<Self> {
        let buf = GapBuffer::new(INITIAL_GAP_CAPACITY)?;
        let mut marks = MarkRegistry::new();
        let cursor = marks.register(Position::buffer_start(), MarkFlags::default());
        let anchor = marks.register(Position::sentinel(), MarkFlags::default());
        Ok(Document {
            id,
            buf,
            config,
            marks,
            cursor,
            anchor,
            undo: UndoLog::new(),
            saved_state: None,
            revision: 0,
            file_path: None,
            file_format: FileFormat::Unix,
            read_only: false,
            search: SearchState::default(),
            view: ViewProjector::new(24, 80, true),
            regex_engine: None,
            input_mask: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DocumentConfig) {
        self.config = config;
    }

    pub fn set_regex_engine(&mut self, engine: Box<dyn RegexEngine>) {
        self.regex_engine = Some(engine);
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn has_path(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn set_path(&mut self, path: PathBuf) {
        self.file_path = Some(path);
    }

    pub fn display_name(&self) -> String {
        self.file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "[No Name]".to_string())
    }

    pub fn file_format(&self) -> FileFormat {
        self.file_format
    }

    pub fn set_file_format(&mut self, format: FileFormat) {
        self.file_format = format;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn line_count(&self) -> usize {
        self.buf.lines() + 1
    }

    pub fn cursor(&self) -> Position {
        self.marks.get(self.cursor).expect("cursor mark always live")
    }

    fn set_cursor_position(&mut self, pos: Position) {
        let _ = self.marks.set(self.cursor, pos);
    }

    pub fn anchor(&self) -> Position {
        self.marks.get(self.anchor).expect("anchor mark always live")
    }

    /// The active selection, if any (anchor not sentinel and distinct from
    /// the cursor).
    pub fn selection(&self) -> Option<Range> {
        let anchor = self.anchor();
        if anchor.is_sentinel() {
            return None;
        }
        Range::new(anchor, self.cursor())
    }

    pub fn start_selection(&mut self) {
        let _ = self.marks.set(self.anchor, self.cursor());
    }

    pub fn clear_selection(&mut self) {
        let _ = self.marks.set(self.anchor, Position::sentinel());
    }

    pub fn select_all(&mut self) {
        let _ = self.marks.set(self.anchor, Position::buffer_start());
        let end = Position::buffer_end(&self.buf);
        self.set_cursor_position(end);
    }

    /// Register an external mark (e.g. a stream adapter endpoint). Exposed
    /// so consumers outside this module can track positions the same way
    /// cursor/anchor/screen-start do.
    pub fn register_mark(&mut self, position: Position, flags: MarkFlags) -> MarkHandle {
        self.marks.register(position, flags)
    }

    pub fn release_mark(&mut self, handle: MarkHandle) -> EditResult<()> {
        self.marks.release(handle)
    }

    pub fn mark_position(&self, handle: MarkHandle) -> EditResult<Position> {
        self.marks.get(handle)
    }

    pub fn set_mark_position(&mut self, handle: MarkHandle, pos: Position) -> EditResult<()> {
        self.marks.set(handle, pos)
    }

    /// Resolve a raw byte offset to a full `Position` against this
    /// document's live content. Used by stream adapters, which only know
    /// plain offsets.
    pub fn position_at_offset(&self, offset: usize) -> Position {
        Position::buffer_start().advance_to_offset(&self.buf, self.config.tabwidth(), offset)
    }

    /// Insert `bytes` at an arbitrary offset, outside of the cursor-relative
    /// operations above. Used by stream adapters appending job output.
    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        self.perform_insert(offset, bytes)
    }

    /// Scroll the view to keep the cursor visible and project the current
    /// content through it. Ties together the buffer, config, cursor,
    /// selection and undo-derived version into the single call a renderer
    /// needs each frame.
    pub fn render(&mut self, provider: &mut dyn TokenProvider) -> Vec<Vec<Cell>> {
        let tabwidth = self.config.tabwidth();
        let cursor = self.cursor();
        self.view.update_scroll(&self.buf, tabwidth, &cursor);
        let selection = self.selection();
        self.view.project(
            &self.buf,
            &self.config,
            self.revision,
            &cursor,
            selection.as_ref(),
            self.config.color_column(),
            provider,
        )
    }

    pub fn current_state(&self) -> ChangeState {
        self.undo.current_state()
    }

    pub fn is_dirty(&self) -> bool {
        self.saved_state != Some(self.undo.current_state())
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset)
    }

    /// Materialize the whole live content. Used by search and save; not
    /// meant for hot per-keystroke paths.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.buf.len()];
        self.buf.get_range(0, &mut out);
        out
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.as_bytes()).into_owned()
    }

    fn newline_delta(bytes: &[u8]) -> i64 {
        bytes.iter().filter(|&&b| b == b'\n').count() as i64
    }

    /// Core mutation primitive for inserts. Implements steps 3-6 of the
    /// editing-operation skeleton (point, mutate, record, mark-walk,
    /// dirty). The cursor mark, like any other mark positioned at or after
    /// `origin`, is carried forward by `MarkRegistry::apply_edit` itself —
    /// callers that point the cursor at `origin` before inserting get "cursor
    /// advances past the insert" for free, with no separate step.
    fn perform_insert(&mut self, origin: usize, bytes: &[u8]) -> EditResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.buf.set_point(origin);
        self.buf.insert(bytes)?;
        self.undo.record_insert(origin, bytes);
        let delta = Self::newline_delta(bytes);
        self.marks
            .apply_edit(&self.buf, self.config.tabwidth(), EditKind::Insert, origin, bytes.len(), delta);
        self.view.mark_dirty();
        self.revision += 1;
        Ok(())
    }

    /// Core mutation primitive for deletes. `forward` distinguishes
    /// Delete-key style (coalesce policy: bytes appended) from Backspace
    /// style (bytes prepended) for the undo log's same-origin coalescing.
    fn perform_delete(&mut self, origin: usize, length: usize, forward: bool) -> EditResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        self.buf.set_point(origin);
        let removed = self.buf.delete(length);
        if removed.is_empty() {
            return Ok(removed);
        }
        let delta = Self::newline_delta(&removed);
        self.undo.record_delete(origin, removed.clone(), forward);
        self.marks.apply_edit(
            &self.buf,
            self.config.tabwidth(),
            EditKind::Delete,
            origin,
            removed.len(),
            delta,
        );
        self.view.mark_dirty();
        self.revision += 1;
        Ok(removed)
    }

    /// Delete the active selection, if any, per step 1 of the editing
    /// skeleton. Returns whether a selection was deleted (callers use this
    /// to decide whether to bracket the following mutation in a group).
    fn delete_selection_if_any(&mut self) -> EditResult<bool> {
        match self.selection() {
            None => Ok(false),
            Some(range) => {
                self.perform_delete(range.start.offset, range.len(), true)?;
                self.set_cursor_position(range.start);
                self.clear_selection();
                Ok(true)
            }
        }
    }

    fn validate_mask(&self, bytes: &[u8]) -> EditResult<()> {
        let Some((_, engine_holder)) = self.input_mask.as_ref() else {
            return Ok(());
        };
        let text = std::str::from_utf8(bytes)
            .map_err(|_| EditError::argument("INVALID_UTF8", "insert must be valid UTF-8 to match the input mask"))?;
        let pattern = &self.input_mask.as_ref().unwrap().0;
        let compiled = engine_holder.compile(pattern, crate::search::RegexFlags::empty())?;
        match compiled.exec(text, 0) {
            Some(m) if m.range == (0..text.len()) => Ok(()),
            _ => Err(EditError::argument("MASK_REJECTED", "insert does not match the configured input mask")),
        }
    }

    pub fn set_input_mask(&mut self, pattern: String, engine: Box<dyn RegexEngine>) {
        self.input_mask = Some((pattern, engine));
    }

    pub fn clear_input_mask(&mut self) {
        self.input_mask = None;
    }

    /// Insert a single character at the cursor, honoring `expand_tab`,
    /// `auto_indent`, and the document's line-ending format for `\n`.
    pub fn insert_character(&mut self, ch: char) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let had_selection = self.delete_selection_if_any()?;
        if had_selection {
            self.undo.start_group();
        }

        let origin = self.cursor().offset;
        let mut bytes: Vec<u8> = Vec::new();

        if ch == '\n' {
            bytes.extend_from_slice(self.file_format.line_ending().as_bytes());
            if self.config.auto_indent {
                let leading = self.leading_whitespace_of_line(origin);
                bytes.extend_from_slice(&leading);
            }
        } else if ch == '\t' && self.config.expand_tab {
            let col = self.cursor().col_no;
            let width = self.config.tabwidth() as usize - ((col - 1) % self.config.tabwidth() as usize);
            bytes.extend(std::iter::repeat(b' ').take(width));
        } else {
            let mut buf4 = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf4).as_bytes());
        }

        self.validate_mask(&bytes)?;
        self.perform_insert(origin, &bytes)?;

        if had_selection {
            self.undo.end_group();
        }
        Ok(())
    }

    fn leading_whitespace_of_line(&self, offset: usize) -> Vec<u8> {
        let tabwidth = self.config.tabwidth();
        let line_start = Position::new(offset, 1, 1).to_line_start(&self.buf, tabwidth).offset;
        let mut out = Vec::new();
        let mut i = line_start;
        while let Some(b) = self.buf.get(i) {
            if b == b' ' || b == b'\t' {
                out.push(b);
                i += 1;
            } else {
                break;
            }
        }
        out
    }

    /// Delete one character or, if active, the selection.
    pub fn delete(&mut self, forward: bool) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        if self.delete_selection_if_any()? {
            return Ok(());
        }
        let cursor = self.cursor();
        if forward {
            if cursor.offset >= self.buf.len() {
                return Ok(());
            }
            let next = cursor.next_char(&self.buf, self.config.tabwidth());
            let len = next.offset - cursor.offset;
            self.perform_delete(cursor.offset, len, true)?;
        } else {
            if cursor.offset == 0 {
                return Ok(());
            }
            let prev = cursor.prev_char(&self.buf, self.config.tabwidth());
            let len = cursor.offset - prev.offset;
            self.perform_delete(prev.offset, len, false)?;
            self.set_cursor_position(prev);
        }
        Ok(())
    }

    /// Delete a whole word, forward or backward, respecting an active
    /// selection (deletes just the selection instead, per the skeleton).
    pub fn delete_word(&mut self, forward: bool) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        if self.delete_selection_if_any()? {
            return Ok(());
        }
        let tabwidth = self.config.tabwidth();
        let cursor = self.cursor();
        if forward {
            let target = cursor.next_word(&self.buf, tabwidth, false);
            if target.offset > cursor.offset {
                self.perform_delete(cursor.offset, target.offset - cursor.offset, true)?;
            }
        } else {
            let target = cursor.prev_word(&self.buf, tabwidth);
            if target.offset < cursor.offset {
                self.perform_delete(target.offset, cursor.offset - target.offset, false)?;
                self.set_cursor_position(target);
            }
        }
        Ok(())
    }

    fn lines_in_range(&self, range: Range) -> Vec<(usize, usize)> {
        let tabwidth = self.config.tabwidth();
        let mut out = Vec::new();
        let mut pos = range.start.to_line_start(&self.buf, tabwidth);
        loop {
            let end = pos.to_line_end(&self.buf, tabwidth);
            out.push((pos.offset, end.offset));
            if end.offset >= range.end.offset || end.offset >= self.buf.len() {
                break;
            }
            pos = end.next_char(&self.buf, tabwidth);
        }
        out
    }

    /// Indent every line touched by the selection (or the cursor's line, if
    /// no selection) by inserting a tab. Grouped into one undo step.
    pub fn indent_selection(&mut self) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let range = self.selection().unwrap_or(Range {
            start: self.cursor(),
            end: self.cursor(),
        });
        let lines = self.lines_in_range(range);
        self.undo.start_group();
        for (line_start, _) in lines.into_iter().rev() {
            self.perform_insert(line_start, b"\t")?;
        }
        self.undo.end_group();
        Ok(())
    }

    /// Remove up to `tabwidth` screen columns of leading whitespace from
    /// every selected line. Grouped into one undo step.
    pub fn unindent_selection(&mut self) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let range = self.selection().unwrap_or(Range {
            start: self.cursor(),
            end: self.cursor(),
        });
        let lines = self.lines_in_range(range);
        self.undo.start_group();
        for (line_start, line_end) in lines.into_iter().rev() {
            let mut removed_cols = 0usize;
            let mut i = line_start;
            while i < line_end && removed_cols < self.config.tabwidth() as usize {
                match self.buf.get(i) {
                    Some(b' ') => {
                        removed_cols += 1;
                        i += 1;
                    }
                    Some(b'\t') => {
                        removed_cols += self.config.tabwidth() as usize;
                        i += 1;
                    }
                    _ => break,
                }
            }
            if i > line_start {
                self.perform_delete(line_start, i - line_start, true)?;
            }
        }
        self.undo.end_group();
        Ok(())
    }

    /// Duplicate the selected lines (or the cursor's line) directly below.
    pub fn duplicate_line_or_selection(&mut self) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let tabwidth = self.config.tabwidth();
        let range = self.selection().unwrap_or(Range {
            start: self.cursor().to_line_start(&self.buf, tabwidth),
            end: self.cursor().to_line_end(&self.buf, tabwidth),
        });
        let start = range.start.to_line_start(&self.buf, tabwidth).offset;
        let end = range.end.to_line_end(&self.buf, tabwidth).offset;
        let mut content = vec![0u8; end - start];
        self.buf.get_range(start, &mut content);
        let mut to_insert = content;
        to_insert.extend_from_slice(self.file_format.line_ending().as_bytes());

        self.undo.start_group();
        self.perform_insert(start, &to_insert)?;
        self.undo.end_group();
        Ok(())
    }

    /// Join the current line (or every selected line) with the next,
    /// replacing the newline and the following leading whitespace with a
    /// single separator.
    pub fn join_lines(&mut self) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let tabwidth = self.config.tabwidth();
        let times = self
            .selection()
            .map(|r| self.lines_in_range(r).len().max(1))
            .unwrap_or(1);

        self.undo.start_group();
        for _ in 0..times {
            let line_end = self.cursor().to_line_end(&self.buf, tabwidth);
            if line_end.offset >= self.buf.len() {
                break;
            }
            let mut scan = line_end.offset + 1;
            while let Some(b) = self.buf.get(scan) {
                if b == b' ' || b == b'\t' {
                    scan += 1;
                } else {
                    break;
                }
            }
            self.perform_delete(line_end.offset, scan - line_end.offset, true)?;
            self.perform_insert(line_end.offset, b" ")?;
        }
        self.undo.end_group();
        Ok(())
    }

    /// Swap the selected lines (or the cursor's line) with the adjacent line
    /// above (`up = true`) or below. Implemented as delete-the-pair,
    /// reinsert-swapped so a single undo step reverts the whole move.
    pub fn move_lines(&mut self, up: bool) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let tabwidth = self.config.tabwidth();
        let range = self.selection().unwrap_or(Range {
            start: self.cursor().to_line_start(&self.buf, tabwidth),
            end: self.cursor().to_line_end(&self.buf, tabwidth),
        });
        let this_start = range.start.to_line_start(&self.buf, tabwidth).offset;
        let this_end = range.end.to_line_end(&self.buf, tabwidth).offset;

        let ending = self.file_format.line_ending().as_bytes().to_vec();
        self.undo.start_group();

        if up {
            if this_start == 0 {
                self.undo.end_group();
                return Ok(());
            }
            let prev_start = Position::new(this_start, 1, 1)
                .prev_char(&self.buf, tabwidth)
                .to_line_start(&self.buf, tabwidth)
                .offset;
            let mut this_block = vec![0u8; this_end - this_start];
            self.buf.get_range(this_start, &mut this_block);
            let mut prev_block = vec![0u8; this_start - ending.len() - prev_start];
            self.buf.get_range(prev_start, &mut prev_block);

            self.perform_delete(prev_start, this_end - prev_start, true)?;
            let mut swapped = this_block;
            swapped.extend_from_slice(&ending);
            swapped.extend_from_slice(&prev_block);
            self.perform_insert(prev_start, &swapped)?;
        } else {
            if this_end >= self.buf.len() {
                self.undo.end_group();
                return Ok(());
            }
            let next_start = Position::new(this_end, 1, 1).next_char(&self.buf, tabwidth).offset;
            let next_end = Position::new(next_start, 1, 1).to_line_end(&self.buf, tabwidth).offset;
            let mut this_block = vec![0u8; this_end - this_start];
            self.buf.get_range(this_start, &mut this_block);
            let mut next_block = vec![0u8; next_end - next_start];
            self.buf.get_range(next_start, &mut next_block);

            self.perform_delete(this_start, next_end - this_start, true)?;
            let mut swapped = next_block;
            swapped.extend_from_slice(&ending);
            swapped.extend_from_slice(&this_block);
            self.perform_insert(this_start, &swapped)?;
        }

        self.undo.end_group();
        Ok(())
    }

    /// Scan for the bracket matching the one under the cursor, in the
    /// direction implied by which bracket character it is. Returns `None`
    /// if the cursor isn't on a bracket or no match is found.
    pub fn jump_to_matching_bracket(&self) -> Option<Position> {
        let tabwidth = self.config.tabwidth();
        let cursor = self.cursor();
        let b = self.buf.get(cursor.offset)?;
        let (open, close, forward) = match b {
            b'(' => (b'(', b')', true),
            b'[' => (b'[', b']', true),
            b'{' => (b'{', b'}', true),
            b')' => (b'(', b')', false),
            b']' => (b'[', b']', false),
            b'}' => (b'{', b'}', false),
            _ => return None,
        };
        let mut depth = 0i32;
        if forward {
            let mut i = cursor.offset;
            while let Some(c) = self.buf.get(i) {
                if c == open {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(cursor.advance_to_offset(&self.buf, tabwidth, i));
                    }
                }
                i += 1;
            }
        } else {
            let mut i = cursor.offset as i64;
            while i >= 0 {
                let c = self.buf.get(i as usize)?;
                if c == close {
                    depth += 1;
                } else if c == open {
                    depth -= 1;
                    if depth == 0 {
                        return Some(cursor.advance_to_offset(&self.buf, tabwidth, i as usize));
                    }
                }
                i -= 1;
            }
        }
        None
    }

    pub fn goto_line(&mut self, line_no: usize) {
        let tabwidth = self.config.tabwidth();
        let target_line = line_no.max(1).min(self.line_count());
        let mut pos = Position::buffer_start();
        for _ in 1..target_line {
            pos = pos.next_line(&self.buf, tabwidth, 1);
        }
        self.set_cursor_position(pos);
    }

    /// Grouped delete-then-insert so a single undo reverts both sides. All
    /// forms of replace-range (paste, selection-overwrite, search replace)
    /// are expressed through this.
    pub fn replace_range(&mut self, range: Range, text: &[u8]) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        self.validate_mask(text)?;
        self.undo.start_group();
        self.perform_delete(range.start.offset, range.len(), true)?;
        self.perform_insert(range.start.offset, text)?;
        self.undo.end_group();
        Ok(())
    }

    /// Replace the whole document's content.
    pub fn set_text(&mut self, text: &[u8]) -> EditResult<()> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        self.undo.start_group();
        let len = self.buf.len();
        if len > 0 {
            self.perform_delete(0, len, true)?;
        }
        self.perform_insert(0, text)?;
        self.undo.end_group();
        self.set_cursor_position(Position::buffer_start());
        self.clear_selection();
        Ok(())
    }

    fn apply_application(&mut self, application: &Application) -> EditResult<()> {
        match application {
            Application::DeleteRange { origin, length } => {
                self.buf.set_point(*origin);
                let removed = self.buf.delete(*length);
                let delta = Self::newline_delta(&removed);
                self.marks
                    .apply_edit(&self.buf, self.config.tabwidth(), EditKind::Delete, *origin, removed.len(), delta);
            }
            Application::InsertBytes { origin, bytes } => {
                self.buf.set_point(*origin);
                self.buf.insert(bytes)?;
                let delta = Self::newline_delta(bytes);
                self.marks
                    .apply_edit(&self.buf, self.config.tabwidth(), EditKind::Insert, *origin, bytes.len(), delta);
            }
            Application::Sequence(children) => {
                for child in children {
                    self.apply_application(child)?;
                }
            }
        }
        self.view.mark_dirty();
        self.revision += 1;
        Ok(())
    }

    pub fn undo(&mut self) -> EditResult<()> {
        let (change, application) = self.undo.begin_undo()?;
        self.apply_application(&application)?;
        self.undo.finish_undo(change);
        Ok(())
    }

    pub fn redo(&mut self) -> EditResult<()> {
        let (change, application) = self.undo.begin_redo()?;
        self.apply_application(&application)?;
        self.undo.finish_redo(change);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Find the next match from the cursor, wrapping once. Advances the
    /// cursor to the match start on success.
    pub fn find_next(&mut self, notification_id: u64) -> EditResult<(Option<SearchMatch>, Option<Notification>)> {
        let text = self.as_string();
        let cursor_offset = self.cursor().offset;
        let engine = self.regex_engine.as_deref();
        let (found, notice) =
            crate::search::find_next(&text, &mut self.search, engine, cursor_offset, notification_id)?;
        if let Some(m) = &found {
            let tabwidth = self.config.tabwidth();
            let pos = self.cursor().advance_to_offset(&self.buf, tabwidth, m.range.start);
            self.set_cursor_position(pos);
        }
        Ok((found, notice))
    }

    /// Every occurrence of the current pattern, cached until invalidated.
    pub fn find_all(&mut self) -> EditResult<Vec<SearchMatch>> {
        let text = self.as_string();
        let engine = self.regex_engine.as_deref();
        crate::search::find_all(&text, &mut self.search, engine)
    }

    /// Drive one interactive find-and-replace pass. `self.search`/
    /// `self.regex_engine` are moved out for the duration of the call so the
    /// `apply` closure can mutate the document directly, then restored.
    pub fn replace_interactive(
        &mut self,
        replacement_template: &str,
        responder: &mut dyn PromptResponder,
    ) -> EditResult<ReplaceStep> {
        if self.read_only {
            return Err(EditError::state("READ_ONLY", "document is read-only"));
        }
        let text = self.as_string();
        let mut state = self.search.clone();
        let engine = self.regex_engine.take();
        let tabwidth = self.config.tabwidth();

        let result = {
            let engine_ref = engine.as_deref();
            crate::search::replace(
                &text,
                &mut state,
                engine_ref,
                replacement_template,
                responder,
                |range, template| {
                    let start = Position::buffer_start().advance_to_offset(&self.buf, tabwidth, range.start);
                    let end = Position::buffer_start().advance_to_offset(&self.buf, tabwidth, range.end);
                    if start.offset == end.offset {
                        self.perform_insert(start.offset, template.as_bytes())
                    } else {
                        self.replace_range(Range { start, end }, template.as_bytes())
                    }
                },
            )
        };

        self.regex_engine = engine;
        self.search = state;
        result
    }

    // --- Container lifecycle (spec 4.9) ---

    /// Detect `Unix` vs `Windows` line endings by inspecting the first five
    /// newlines: `CRLF` if more are preceded by `\r` than not.
    fn detect_file_format(bytes: &[u8]) -> FileFormat {
        let mut seen = 0;
        let mut crlf = 0;
        for (i, &b) in bytes.iter().enumerate() {
            if b == b'\n' {
                seen += 1;
                if i > 0 && bytes[i - 1] == b'\r' {
                    crlf += 1;
                }
                if seen >= 5 {
                    break;
                }
            }
        }
        if crlf * 2 > seen {
            FileFormat::Windows
        } else {
            FileFormat::Unix
        }
    }

    /// Load a file's contents, replacing any existing buffer content. Undo
    /// is reset (the initial load is not an undoable edit).
    pub fn load_file(&mut self, path: &Path) -> EditResult<()> {
        let raw = fs::read(path)?;
        self.file_format = Self::detect_file_format(&raw);
        self.buf = GapBuffer::new((raw.len() + INITIAL_GAP_CAPACITY).max(1))?;
        self.buf.preallocate(raw.len())?;
        self.buf.set_point(0);
        self.buf.insert(&raw)?;
        self.undo.clear();
        self.saved_state = Some(self.undo.current_state());
        self.file_path = Some(path.to_path_buf());
        self.set_cursor_position(Position::buffer_start());
        self.clear_selection();
        self.view.mark_dirty();
        self.revision += 1;
        Ok(())
    }

    /// Write the document to `path`: append a trailing newline if missing,
    /// write to a sibling temp file, copy permissions from the existing
    /// file when present, and atomically rename into place. On any failure
    /// the temp file is removed and the saved state is unchanged.
    pub fn write_file(&mut self, path: &Path) -> EditResult<()> {
        let result = self.write_file_inner(path);
        if result.is_ok() {
            self.saved_state = Some(self.undo.current_state());
            self.file_path = Some(path.to_path_buf());
        }
        result
    }

    fn write_file_inner(&self, path: &Path) -> EditResult<()> {
        let mut content = self.as_bytes();
        let ending = self.file_format.line_ending().as_bytes();
        if !content.ends_with(b"\n") {
            content.extend_from_slice(ending);
        }
        if self.file_format == FileFormat::Windows {
            content = Self::to_crlf(&content);
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| EditError::argument("INVALID_PATH", "path has no file name"))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let write_result = (|| -> EditResult<()> {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&content)?;
            f.sync_all()?;
            if let Ok(existing) = fs::metadata(path) {
                let _ = fs::set_permissions(&tmp_path, existing.permissions());
            }
            fs::rename(&tmp_path, path)?;
            Ok(())
        })();

        if write_result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        write_result
    }

    fn to_crlf(content: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(content.len());
        for (i, &b) in content.iter().enumerate() {
            if b == b'\n' && (i == 0 || content[i - 1] != b'\r') {
                out.push(b'\r');
            }
            out.push(b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(1, DocumentConfig::default()).unwrap()
    }

    #[test]
    fn typing_coalesces_one_word_per_undo_step() {
        let mut d = doc();
        for ch in "hello world".chars() {
            d.insert_character(ch).unwrap();
        }
        assert_eq!(d.as_string(), "hello world");
        d.undo().unwrap();
        assert_eq!(d.as_string(), "hello ");
        d.undo().unwrap();
        assert_eq!(d.as_string(), "");
    }

    #[test]
    fn selection_overwrite_undo_redo() {
        let mut d = doc();
        d.set_text(b"abcdef").unwrap();
        let start = Position::buffer_start().advance_to_offset(&d.buf, 8, 1);
        let end = Position::buffer_start().advance_to_offset(&d.buf, 8, 4);
        d.replace_range(Range::new(start, end).unwrap(), b"X").unwrap();
        assert_eq!(d.as_string(), "aXef");
        d.undo().unwrap();
        assert_eq!(d.as_string(), "abcdef");
        d.redo().unwrap();
        assert_eq!(d.as_string(), "aXef");
    }

    #[test]
    fn save_then_dirty_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let mut d = doc();
        d.set_text(b"a\nb\nc").unwrap();
        d.write_file(&path).unwrap();
        assert!(!d.is_dirty());
        d.insert_character('!').unwrap();
        assert!(d.is_dirty());
    }

    #[test]
    fn crlf_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let mut d = doc();
        d.set_file_format(FileFormat::Windows);
        d.set_text(b"a\nb\nc").unwrap();
        d.write_file(&path).unwrap();
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, b"a\r\nb\r\nc\r\n");

        let mut reloaded = doc();
        reloaded.load_file(&path).unwrap();
        assert_eq!(reloaded.len(), on_disk.len());
    }

    #[test]
    fn delete_word_forward_and_backward() {
        let mut d = doc();
        d.set_text(b"hello world").unwrap();
        d.set_cursor_position(Position::buffer_start());
        d.delete_word(true).unwrap();
        assert_eq!(d.as_string(), "world");
    }

    #[test]
    fn jump_to_matching_bracket_forward() {
        let mut d = doc();
        d.set_text(b"(a(b)c)").unwrap();
        d.set_cursor_position(Position::buffer_start());
        let m = d.jump_to_matching_bracket().unwrap();
        assert_eq!(m.offset, 6);
    }

    #[test]
    fn indent_selection_inserts_tab_per_line() {
        let mut d = doc();
        d.set_text(b"a\nb\nc").unwrap();
        let start = Position::buffer_start();
        let end = Position::buffer_end(&d.buf);
        let _ = d.marks.set(d.anchor, start);
        d.set_cursor_position(end);
        d.indent_selection().unwrap();
        assert_eq!(d.as_string(), "\ta\n\tb\n\tc");
    }
}
