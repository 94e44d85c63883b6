//! ViewProjector: projects a Document onto a rectangular grid of `Cell`s.
//!
//! Grounded on the teacher's `render/mod.rs` (column/tab-stop arithmetic in
//! `calculate_visual_column`/`calculate_cursor_column`) and `viewport.rs`
//! (the no-wrap vertical scrolling algorithm). Diverges from the teacher in
//! responsibility: the teacher renders straight to the terminal via
//! crossterm, where this component only ever produces a `Cell` grid — actual
//! terminal rendering is a consumer's job, out of scope here.

use crate::config::DocumentConfig;
use crate::gap_buffer::GapBuffer;
use crate::position::Position;

/// Bitset of attributes a cell may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellAttrs {
    pub cursor: bool,
    pub selection: bool,
    pub buffer_end: bool,
    pub wrap: bool,
    pub color_column: bool,
    pub new_line: bool,
    pub line_end: bool,
    pub search_match: bool,
    pub error: bool,
}

/// Sentinel offset for synthesized cells (padding, ellipsis, buffer-end)
/// that don't correspond to a real buffer byte.
pub const NO_OFFSET: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub width: u16,
    pub offset: usize,
    pub col_no: usize,
    pub attrs: CellAttrs,
    pub syntax_token: Option<String>,
}

impl Cell {
    fn blank() -> Self {
        Cell {
            text: String::new(),
            width: 1,
            offset: NO_OFFSET,
            col_no: 0,
            attrs: CellAttrs::default(),
            syntax_token: None,
        }
    }

    fn synthesized(text: &str, attrs: CellAttrs) -> Self {
        Cell {
            text: text.to_string(),
            width: 1,
            offset: NO_OFFSET,
            col_no: 0,
            attrs,
            syntax_token: None,
        }
    }
}

/// A single `(byte_offset, byte_length, token)` syntax match, ordered and
/// produced by an external `TokenProvider`.
#[derive(Debug, Clone)]
pub struct SyntaxMatch {
    pub offset: usize,
    pub length: usize,
    pub token: String,
}

/// Ordered list of matches over a contiguous byte interval, with a
/// monotonically-advanced cursor so the projector can walk matches in
/// parallel with cells instead of searching per cell.
#[derive(Debug, Clone, Default)]
pub struct SyntaxMatches {
    pub interval_start: usize,
    pub matches: Vec<SyntaxMatch>,
    cursor: usize,
}

impl SyntaxMatches {
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Token of the innermost match containing `offset`, advancing the
    /// internal cursor monotonically (callers must query in increasing
    /// offset order within one pass).
    fn token_at(&mut self, offset: usize) -> Option<&str> {
        while self.cursor < self.matches.len()
            && offset >= self.matches[self.cursor].offset + self.matches[self.cursor].length
        {
            self.cursor += 1;
        }
        self.matches.get(self.cursor).and_then(|m| {
            if offset >= m.offset && offset < m.offset + m.length {
                Some(m.token.as_str())
            } else {
                None
            }
        })
    }
}

/// External token provider: loading lexers/grammars is out of scope here,
/// only the seam is defined.
pub trait TokenProvider {
    fn generate(&mut self, bytes: &[u8], offset: usize) -> SyntaxMatches;
}

/// Always-empty provider, used in tests and when syntax highlighting is
/// disabled.
pub struct NullTokenProvider;
impl TokenProvider for NullTokenProvider {
    fn generate(&mut self, _bytes: &[u8], _offset: usize) -> SyntaxMatches {
        SyntaxMatches::default()
    }
}

const MAX_SYNTAX_MATCHES: usize = 500;
const SYNTAX_BLOCK_STABILIZE_LINES: usize = 20;

/// Produces a `rows x cols` grid of cells from a document's live content.
pub struct ViewProjector {
    pub rows: u16,
    pub cols: u16,
    pub line_wrap: bool,
    screen_start: Position,
    horizontal_scroll: usize,
    cached_matches: Option<SyntaxMatches>,
    cached_state_version: Option<u64>,
    cached_screen_start_line: Option<usize>,
    dirty: bool,
}

impl ViewProjector {
    pub fn new(rows: u16, cols: u16, line_wrap: bool) -> Self {
        ViewProjector {
            rows,
            cols,
            line_wrap,
            screen_start: Position::buffer_start(),
            horizontal_scroll: 1,
            cached_matches: None,
            cached_state_version: None,
            cached_screen_start_line: None,
            dirty: true,
        }
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn screen_start(&self) -> Position {
        self.screen_start
    }

    /// No-wrap vertical scroll: bring the cursor's line within the visible
    /// window, smooth-scrolling by the exact delta unless the cursor moved
    /// far beyond the bottom.
    fn scroll_no_wrap_vertical(&mut self, cursor: &Position) {
        let rows = self.rows as usize;
        if cursor.line_no < self.screen_start.line_no {
            self.screen_start = Position::new(self.screen_start.offset, cursor.line_no, 1);
            self.screen_start.offset = cursor.offset.min(self.screen_start.offset);
            self.screen_start.line_no = cursor.line_no;
        } else {
            let bottom = self.screen_start.line_no + rows.saturating_sub(1);
            if cursor.line_no > bottom {
                let overflow = cursor.line_no - bottom;
                if overflow > rows {
                    self.screen_start.line_no = cursor.line_no;
                } else {
                    self.screen_start.line_no += overflow;
                }
            }
        }
    }

    fn scroll_no_wrap_horizontal(&mut self, cursor_col: usize) {
        let cols = self.cols as usize;
        if cursor_col < self.horizontal_scroll {
            self.horizontal_scroll = cursor_col;
        } else if cursor_col >= self.horizontal_scroll + cols {
            self.horizontal_scroll = cursor_col - cols + 1;
        }
    }

    /// Update scroll position for the given cursor; call before `project`.
    pub fn update_scroll(&mut self, buf: &GapBuffer, tabwidth: u8, cursor: &Position) {
        if !self.line_wrap {
            self.scroll_no_wrap_vertical(cursor);
            self.scroll_no_wrap_horizontal(cursor.col_no);
        } else {
            self.scroll_wrap_vertical(buf, tabwidth, cursor);
        }
    }

    /// Wrap-mode vertical scroll per the component's fast-path/fallback
    /// algorithm: try to find the cursor's screen-line start by scanning
    /// forward a bounded number of screen-lines from the current
    /// `screen_start`; if that fails, scan backward from the cursor.
    fn scroll_wrap_vertical(&mut self, buf: &GapBuffer, tabwidth: u8, cursor: &Position) {
        let rows = self.rows as usize;
        if cursor.offset < self.screen_start.offset {
            let mut start = cursor.to_line_start(buf, tabwidth);
            start = self.snap_to_screen_line_start(buf, tabwidth, &start, cursor.offset);
            self.screen_start = start;
            return;
        }

        let screen_lines = self.enumerate_screen_lines(buf, tabwidth, self.screen_start, 2 * rows + 1);
        if let Some(idx) = screen_lines
            .iter()
            .position(|p| p.offset <= cursor.offset && cursor.offset < self.line_span_end(buf, tabwidth, p))
        {
            if idx < rows {
                return; // already on screen
            }
            if idx < screen_lines.len() {
                self.screen_start = screen_lines[idx - rows + 1];
                return;
            }
        }

        // Fallback: reverse up to `rows` screen-lines from the cursor.
        let reversed = self.enumerate_screen_lines_backward(buf, tabwidth, *cursor, rows);
        self.screen_start = reversed.last().cloned().unwrap_or(*cursor);
    }

    fn snap_to_screen_line_start(
        &self,
        buf: &GapBuffer,
        tabwidth: u8,
        line_start: &Position,
        target_offset: usize,
    ) -> Position {
        let cols = self.cols.max(1) as usize;
        let mut pos = *line_start;
        loop {
            let end = self.line_span_end(buf, tabwidth, &pos);
            if target_offset < end || end >= buf.len() {
                return pos;
            }
            pos = pos.advance_to_offset(buf, tabwidth, end);
            let _ = cols;
        }
    }

    /// Byte offset one past the end of the screen-line starting at `start`
    /// (bounded by `cols` display columns or the next logical newline).
    fn line_span_end(&self, buf: &GapBuffer, tabwidth: u8, start: &Position) -> usize {
        let cols = self.cols.max(1) as usize;
        let mut col = 1usize;
        let mut offset = start.offset;
        let len = buf.len();
        while offset < len {
            match buf.get(offset) {
                Some(b'\n') => return offset + 1,
                Some(b) => {
                    let w = if b < 0x80 { 1 } else { 1 }; // display width approximated at 1 here; full UTF-8 width handled in project()
                    if col + w > cols {
                        return offset;
                    }
                    col += w;
                    offset += 1;
                }
                None => break,
            }
        }
        offset
    }

    fn enumerate_screen_lines(
        &self,
        buf: &GapBuffer,
        tabwidth: u8,
        from: Position,
        count: usize,
    ) -> Vec<Position> {
        let mut out = Vec::with_capacity(count);
        let mut pos = from;
        for _ in 0..count {
            out.push(pos);
            let end = self.line_span_end(buf, tabwidth, &pos);
            if end >= buf.len() {
                break;
            }
            pos = pos.advance_to_offset(buf, tabwidth, end);
        }
        out
    }

    fn enumerate_screen_lines_backward(
        &self,
        buf: &GapBuffer,
        tabwidth: u8,
        from: Position,
        count: usize,
    ) -> Vec<Position> {
        // Walk logical-line starts backward; an approximation of screen-line
        // reversal adequate for the fallback path (exact wrap-aware reverse
        // walk would require a second forward pass per candidate line).
        let mut out = Vec::with_capacity(count);
        let mut pos = from.to_line_start(buf, tabwidth);
        for _ in 0..count {
            out.push(pos);
            if pos.offset == 0 {
                break;
            }
            pos = pos.prev_char(buf, tabwidth).to_line_start(buf, tabwidth);
        }
        out
    }

    /// Ensure the syntax match cache is fresh per the cache-key contract
    /// `(doc_version, screen_start, rows, syntax_horizon)`.
    fn refresh_syntax_cache(
        &mut self,
        buf: &GapBuffer,
        tabwidth: u8,
        doc_version: u64,
        provider: &mut dyn TokenProvider,
        syntax_horizon: u32,
    ) {
        let horizon = syntax_horizon as usize;
        let reusable = self.cached_state_version == Some(doc_version)
            && self
                .cached_screen_start_line
                .map(|cached_line| {
                    (cached_line as i64 - self.screen_start.line_no as i64).unsigned_abs() as usize
                        <= horizon
                })
                .unwrap_or(false);

        if reusable {
            if let Some(m) = self.cached_matches.as_mut() {
                m.reset_cursor();
            }
            return;
        }

        let above_lines = horizon + SYNTAX_BLOCK_STABILIZE_LINES;
        let below_lines = self.rows as usize + horizon;

        let mut window_start = self.screen_start;
        for _ in 0..above_lines {
            let prev = window_start.prev_line(buf, tabwidth, 1);
            if prev.offset == window_start.offset {
                break;
            }
            window_start = prev;
        }
        let mut window_end = self.screen_start;
        for _ in 0..below_lines {
            let next = window_end.next_line(buf, tabwidth, 1);
            if next.offset == window_end.offset {
                break;
            }
            window_end = next;
        }

        let mut scratch = vec![0u8; window_end.offset.saturating_sub(window_start.offset)];
        buf.get_range(window_start.offset, &mut scratch);
        let mut matches = provider.generate(&scratch, window_start.offset);
        if matches.matches.len() > MAX_SYNTAX_MATCHES {
            matches.matches.truncate(MAX_SYNTAX_MATCHES);
        }
        self.cached_matches = Some(matches);
        self.cached_state_version = Some(doc_version);
        self.cached_screen_start_line = Some(self.screen_start.line_no);
    }

    /// Produce the `rows x cols` cell grid. `cursor` and `selection` are
    /// read-only inputs used only for overlay passes.
    #[allow(clippy::too_many_arguments)]
    pub fn project(
        &mut self,
        buf: &GapBuffer,
        config: &DocumentConfig,
        doc_version: u64,
        cursor: &Position,
        selection: Option<&crate::position::Range>,
        color_column: Option<u32>,
        provider: &mut dyn TokenProvider,
    ) -> Vec<Vec<Cell>> {
        self.refresh_syntax_cache(buf, config.tabwidth(), doc_version, provider, config.syntax_horizon());

        let rows = self.rows as usize;
        let cols = self.cols as usize;
        let mut grid: Vec<Vec<Cell>> = Vec::with_capacity(rows);

        let mut offset = self.screen_start.offset;
        let len = buf.len();

        for _row in 0..rows {
            let mut row_cells: Vec<Cell> = Vec::with_capacity(cols);
            if offset >= len {
                let mut cell = Cell::blank();
                cell.attrs.buffer_end = true;
                cell.text = "~".to_string();
                row_cells.push(cell);
            } else {
                let mut col = 1usize;
                'row: while col <= cols {
                    if offset >= len {
                        let mut cell = Cell::synthesized("", CellAttrs::default());
                        cell.attrs.line_end = true;
                        row_cells.push(cell);
                        col += 1;
                        continue;
                    }
                    let b = buf.get(offset).unwrap();
                    if b == b'\n' {
                        let mut cell = Cell::synthesized("", CellAttrs::default());
                        cell.attrs.new_line = true;
                        cell.offset = offset;
                        row_cells.push(cell);
                        offset += 1;
                        // fill remainder of row with LINE_END cells
                        col += 1;
                        while col <= cols {
                            let mut pad = Cell::synthesized("", CellAttrs::default());
                            pad.attrs.line_end = true;
                            row_cells.push(pad);
                            col += 1;
                        }
                        break 'row;
                    } else if b == b'\t' {
                        let width = (config.tabwidth() as usize) - ((col - 1) % config.tabwidth() as usize);
                        for _ in 0..width {
                            if col > cols {
                                break;
                            }
                            let mut cell = Cell::synthesized(" ", CellAttrs::default());
                            cell.offset = offset;
                            cell.col_no = col;
                            row_cells.push(cell);
                            col += 1;
                        }
                        offset += 1;
                    } else if b < 0x20 || b == 0x7f {
                        let rep = if b == 0x7f { b'?' } else { b + 64 };
                        if col + 1 > cols {
                            if self.line_wrap {
                                break 'row;
                            } else {
                                offset += 1;
                                break 'row;
                            }
                        }
                        let mut c1 = Cell::synthesized("^", CellAttrs::default());
                        c1.offset = offset;
                        c1.col_no = col;
                        row_cells.push(c1);
                        col += 1;
                        let mut c2 = Cell::synthesized(&(rep as char).to_string(), CellAttrs::default());
                        c2.offset = offset;
                        c2.col_no = col;
                        row_cells.push(c2);
                        col += 1;
                        offset += 1;
                    } else if b >= 0x80 {
                        // Decode a UTF-8 multi-byte char; treat malformed sequences as U+FFFD.
                        let seq_len = crate::position::utf8_seq_len(b);
                        let mut bytes = vec![b];
                        for k in 1..seq_len {
                            if let Some(bn) = buf.get(offset + k) {
                                bytes.push(bn);
                            }
                        }
                        let ch = std::str::from_utf8(&bytes)
                            .ok()
                            .and_then(|s| s.chars().next())
                            .unwrap_or('\u{FFFD}');
                        let width = unicode_display_width(ch);
                        if col + width > cols {
                            let mut ell = Cell::synthesized("\u{2026}", CellAttrs::default());
                            ell.offset = offset;
                            row_cells.push(ell);
                            if self.line_wrap {
                                break 'row;
                            } else {
                                offset += seq_len.max(1);
                                break 'row;
                            }
                        }
                        let mut cell = Cell::synthesized(&ch.to_string(), CellAttrs::default());
                        cell.width = width as u16;
                        cell.offset = offset;
                        cell.col_no = col;
                        row_cells.push(cell);
                        col += width;
                        offset += seq_len.max(1);
                    } else {
                        let ch = b as char;
                        if col + 1 > cols {
                            let mut ell = Cell::synthesized("\u{2026}", CellAttrs::default());
                            ell.offset = offset;
                            row_cells.push(ell);
                            if self.line_wrap {
                                break 'row;
                            } else {
                                offset += 1;
                                break 'row;
                            }
                        }
                        let mut cell = Cell::synthesized(&ch.to_string(), CellAttrs::default());
                        cell.offset = offset;
                        cell.col_no = col;
                        row_cells.push(cell);
                        col += 1;
                        offset += 1;
                    }
                }
            }
            grid.push(row_cells);
        }

        self.apply_overlays(&mut grid, buf, config, cursor, selection, color_column);
        self.dirty = false;
        grid
    }

    fn apply_overlays(
        &mut self,
        grid: &mut [Vec<Cell>],
        _buf: &GapBuffer,
        _config: &DocumentConfig,
        cursor: &Position,
        selection: Option<&crate::position::Range>,
        color_column: Option<u32>,
    ) {
        let mut matches = self.cached_matches.as_mut();
        for row in grid.iter_mut() {
            for cell in row.iter_mut() {
                if cell.offset == NO_OFFSET {
                    continue;
                }
                if let Some(sel) = selection {
                    if sel.contains_offset(cell.offset) {
                        cell.attrs.selection = true;
                    }
                }
                if let Some(col) = color_column {
                    if cell.col_no == col as usize {
                        cell.attrs.color_column = true;
                    }
                }
                if cell.offset == cursor.offset {
                    cell.attrs.cursor = true;
                }
                if let Some(m) = matches.as_mut() {
                    if let Some(token) = m.token_at(cell.offset) {
                        cell.syntax_token = Some(token.to_string());
                    }
                }
            }
        }
    }
}

fn unicode_display_width(c: char) -> usize {
    unicode_width::UnicodeWidthChar::width(c).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentConfig;

    fn buf_of(s: &str) -> GapBuffer {
        let mut b = GapBuffer::new(64).unwrap();
        b.insert(s.as_bytes()).unwrap();
        b.set_point(0);
        b
    }

    #[test]
    fn project_pads_short_lines_with_line_end_cells() {
        let buf = buf_of("hi");
        let mut projector = ViewProjector::new(2, 5, false);
        let cfg = DocumentConfig::default();
        let cursor = Position::buffer_start();
        let mut provider = NullTokenProvider;
        let grid = projector.project(&buf, &cfg, 0, &cursor, None, None, &mut provider);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].len(), 5);
        assert!(grid[1][0].attrs.buffer_end);
    }

    #[test]
    fn cursor_cell_is_marked() {
        let buf = buf_of("abc");
        let mut projector = ViewProjector::new(1, 10, false);
        let cfg = DocumentConfig::default();
        let cursor = Position::buffer_start().next_char(&buf, 8);
        let mut provider = NullTokenProvider;
        let grid = projector.project(&buf, &cfg, 0, &cursor, None, None, &mut provider);
        let marked: Vec<_> = grid[0].iter().filter(|c| c.attrs.cursor).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].offset, 1);
    }

    #[test]
    fn tab_expands_to_next_stop() {
        let buf = buf_of("\tx");
        let mut projector = ViewProjector::new(1, 12, false);
        let mut cfg = DocumentConfig::default();
        cfg.set_tabwidth(4).unwrap();
        let cursor = Position::buffer_start();
        let mut provider = NullTokenProvider;
        let grid = projector.project(&buf, &cfg, 0, &cursor, None, None, &mut provider);
        // 4 space cells then 'x'
        assert_eq!(grid[0][0].text, " ");
        assert_eq!(grid[0][3].text, " ");
        assert_eq!(grid[0][4].text, "x");
    }
}
