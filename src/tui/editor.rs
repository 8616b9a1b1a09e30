//! Minimal editable script buffer for the TUI.
//!
//! Lines of text plus a cursor, with just enough editing to be useful:
//! insertion, soft tabs, line splitting/joining, and cursor movement.
//! Columns are counted in characters, not bytes.

use crossterm::event::{KeyCode, KeyModifiers};

pub(crate) struct EditorBuffer {
    lines: Vec<String>,
    cursor_line: usize,
    cursor_col: usize,
    scroll_top: usize,
    viewport_rows: usize,
}

const SOFT_TAB: &str = "    ";

impl EditorBuffer {
    pub(crate) fn from_text(text: &str) -> Self {
        let mut lines: Vec<String> = text.split('\n').map(|l| l.to_string()).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self {
            lines,
            cursor_line: 0,
            cursor_col: 0,
            scroll_top: 0,
            viewport_rows: 0,
        }
    }

    pub(crate) fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub(crate) fn set_text(&mut self, text: &str) {
        *self = Self::from_text(text);
    }

    pub(crate) fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Zero-based (line, column) of the cursor.
    pub(crate) fn cursor(&self) -> (usize, usize) {
        (self.cursor_line, self.cursor_col)
    }

    pub(crate) fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Record the viewport height and keep the cursor on screen.
    pub(crate) fn set_viewport_rows(&mut self, rows: usize) {
        self.viewport_rows = rows.max(1);
        if self.cursor_line < self.scroll_top {
            self.scroll_top = self.cursor_line;
        } else if self.cursor_line >= self.scroll_top + self.viewport_rows {
            self.scroll_top = self.cursor_line + 1 - self.viewport_rows;
        }
    }

    /// Apply one key press. Returns true when the text changed.
    pub(crate) fn handle_key(&mut self, mods: KeyModifiers, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) if mods.difference(KeyModifiers::SHIFT).is_empty() => {
                self.insert_char(c);
                true
            }
            KeyCode::Tab => {
                for c in SOFT_TAB.chars() {
                    self.insert_char(c);
                }
                true
            }
            KeyCode::Enter => {
                self.split_line();
                true
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => {
                if self.cursor_col > 0 {
                    self.cursor_col -= 1;
                } else if self.cursor_line > 0 {
                    self.cursor_line -= 1;
                    self.cursor_col = self.line_len(self.cursor_line);
                }
                false
            }
            KeyCode::Right => {
                if self.cursor_col < self.line_len(self.cursor_line) {
                    self.cursor_col += 1;
                } else if self.cursor_line + 1 < self.lines.len() {
                    self.cursor_line += 1;
                    self.cursor_col = 0;
                }
                false
            }
            KeyCode::Up => {
                self.move_vertical(-1);
                false
            }
            KeyCode::Down => {
                self.move_vertical(1);
                false
            }
            KeyCode::PageUp => {
                self.move_vertical(-(self.viewport_rows.max(1) as isize));
                false
            }
            KeyCode::PageDown => {
                self.move_vertical(self.viewport_rows.max(1) as isize);
                false
            }
            KeyCode::Home => {
                self.cursor_col = 0;
                false
            }
            KeyCode::End => {
                self.cursor_col = self.line_len(self.cursor_line);
                false
            }
            _ => false,
        }
    }

    fn line_len(&self, idx: usize) -> usize {
        self.lines.get(idx).map_or(0, |l| l.chars().count())
    }

    fn byte_index(line: &str, col: usize) -> usize {
        line.char_indices()
            .nth(col)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    }

    fn insert_char(&mut self, c: char) {
        let line = &mut self.lines[self.cursor_line];
        let at = Self::byte_index(line, self.cursor_col);
        line.insert(at, c);
        self.cursor_col += 1;
    }

    fn split_line(&mut self) {
        let line = &mut self.lines[self.cursor_line];
        let at = Self::byte_index(line, self.cursor_col);
        let rest = line.split_off(at);
        self.lines.insert(self.cursor_line + 1, rest);
        self.cursor_line += 1;
        self.cursor_col = 0;
    }

    fn backspace(&mut self) -> bool {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
            let line = &mut self.lines[self.cursor_line];
            let at = Self::byte_index(line, self.cursor_col);
            line.remove(at);
            true
        } else if self.cursor_line > 0 {
            let removed = self.lines.remove(self.cursor_line);
            self.cursor_line -= 1;
            self.cursor_col = self.line_len(self.cursor_line);
            self.lines[self.cursor_line].push_str(&removed);
            true
        } else {
            false
        }
    }

    fn delete_forward(&mut self) -> bool {
        if self.cursor_col < self.line_len(self.cursor_line) {
            let line = &mut self.lines[self.cursor_line];
            let at = Self::byte_index(line, self.cursor_col);
            line.remove(at);
            true
        } else if self.cursor_line + 1 < self.lines.len() {
            let next = self.lines.remove(self.cursor_line + 1);
            self.lines[self.cursor_line].push_str(&next);
            true
        } else {
            false
        }
    }

    fn move_vertical(&mut self, delta: isize) {
        let target = self.cursor_line as isize + delta;
        self.cursor_line = target.clamp(0, self.lines.len() as isize - 1) as usize;
        self.cursor_col = self.cursor_col.min(self.line_len(self.cursor_line));
    }
}
