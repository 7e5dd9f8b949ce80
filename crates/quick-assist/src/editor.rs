//! Editor surface seam. The visual widget is a black box; the subsystem
//! only needs whole-buffer get/set, the cursor, and ranged edits. The
//! in-memory implementation backs tests and headless demos.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// 1-based line/column position, the convention of the embedded widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

pub trait EditorSurface: Send + Sync {
    fn value(&self) -> String;
    fn set_value(&self, text: &str);
    fn cursor(&self) -> CursorPosition;
    fn set_cursor(&self, position: CursorPosition);
    fn apply_edit(&self, range: EditRange, text: &str);
}

struct EditorState {
    buffer: String,
    cursor: CursorPosition,
}

pub struct MemoryEditor {
    state: RwLock<EditorState>,
}

impl MemoryEditor {
    pub fn new(initial: &str) -> Self {
        Self {
            state: RwLock::new(EditorState {
                buffer: initial.to_string(),
                cursor: CursorPosition::new(1, 1),
            }),
        }
    }
}

impl Default for MemoryEditor {
    fn default() -> Self {
        Self::new("")
    }
}

/// Byte offset of a 1-based position, clamping past-end lines and columns.
fn byte_offset(text: &str, pos: CursorPosition) -> usize {
    let target_line = pos.line.max(1) as usize - 1;
    let line_start = if target_line == 0 {
        0
    } else {
        let mut newlines = 0;
        let mut start = text.len();
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                newlines += 1;
                if newlines == target_line {
                    start = i + 1;
                    break;
                }
            }
        }
        start
    };

    let line = &text[line_start..];
    let line_end = line.find('\n').unwrap_or(line.len());
    let target_column = pos.column.max(1) as usize - 1;
    let mut taken = 0;
    for (i, _) in line[..line_end].char_indices() {
        if taken == target_column {
            return line_start + i;
        }
        taken += 1;
    }
    line_start + line_end
}

impl EditorSurface for MemoryEditor {
    fn value(&self) -> String {
        self.state.read().buffer.clone()
    }

    fn set_value(&self, text: &str) {
        self.state.write().buffer = text.to_string();
    }

    fn cursor(&self) -> CursorPosition {
        self.state.read().cursor
    }

    fn set_cursor(&self, position: CursorPosition) {
        self.state.write().cursor = position;
    }

    fn apply_edit(&self, range: EditRange, text: &str) {
        let mut state = self.state.write();
        let start = byte_offset(&state.buffer, range.start);
        let end = byte_offset(&state.buffer, range.end).max(start);
        state.buffer.replace_range(start..end, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranged_edit_replaces_within_a_line() {
        let editor = MemoryEditor::new("let x = 1;\nlet y = 2;");
        editor.apply_edit(
            EditRange {
                start: CursorPosition::new(2, 5),
                end: CursorPosition::new(2, 6),
            },
            "z",
        );
        assert_eq!(editor.value(), "let x = 1;\nlet z = 2;");
    }

    #[test]
    fn out_of_range_positions_clamp() {
        let editor = MemoryEditor::new("abc");
        editor.apply_edit(
            EditRange {
                start: CursorPosition::new(1, 99),
                end: CursorPosition::new(9, 1),
            },
            "!",
        );
        assert_eq!(editor.value(), "abc!");
    }

    #[test]
    fn insertion_at_a_collapsed_range() {
        let editor = MemoryEditor::new("fn main() {}");
        editor.apply_edit(
            EditRange {
                start: CursorPosition::new(1, 12),
                end: CursorPosition::new(1, 12),
            },
            "println!();",
        );
        assert_eq!(editor.value(), "fn main() {println!();}");
    }
}
