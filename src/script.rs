// src/script.rs

//! Transcript ("script file") output with word-wrap layout.
//!
//! The engine hands over buffered text in whole chunks; the writer lays it
//! out against the configured wrap column before it reaches the file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use unicode_segmentation::UnicodeSegmentation;

/// Lays out one chunk of buffered text against `width` columns.
///
/// Width 0 (or text already narrower than the column) passes through
/// verbatim. Otherwise each line longer than the column is word-wrapped;
/// shorter lines are trailing-trimmed. No break is appended past the end of
/// the buffer.
pub fn wrap_text(text: &str, width: usize) -> String {
    if width == 0 || text.graphemes(true).count() < width {
        return text.to_string();
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let last_line = i + 1 == lines.len();
        if line.graphemes(true).count() > width {
            let wrapped = word_wrap_line(line, width);
            for (j, visual) in wrapped.iter().enumerate() {
                out.push_str(visual);
                if !(last_line && j + 1 == wrapped.len()) {
                    out.push('\n');
                }
            }
        } else {
            out.push_str(line.trim_end());
            if !last_line {
                out.push('\n');
            }
        }
    }
    out
}

/// Greedy word-wrap of a single overlong line. Words longer than the column
/// are hard-broken at the column boundary.
fn word_wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in line.split_whitespace() {
        let mut word_len = word.graphemes(true).count();
        let mut word = word;
        // Hard-break words that cannot fit on any line.
        while word_len > width {
            if current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let split = word
                .grapheme_indices(true)
                .nth(width)
                .map(|(idx, _)| idx)
                .unwrap_or(word.len());
            out.push(word[..split].to_string());
            word = &word[split..];
            word_len = word.graphemes(true).count();
        }
        let needed = if current_len == 0 { word_len } else { word_len + 1 };
        if current_len + needed > width && current_len > 0 {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

/// Writes transcript chunks through the wrap layout to a sink.
pub struct ScriptWriter {
    sink: Box<dyn Write + Send>,
    wrap_width: usize,
}

impl ScriptWriter {
    pub fn new(sink: Box<dyn Write + Send>, wrap_width: usize) -> Self {
        ScriptWriter { sink, wrap_width }
    }

    pub fn create(path: &Path, wrap_width: usize) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating script file {}", path.display()))?;
        Ok(ScriptWriter::new(Box::new(file), wrap_width))
    }

    pub fn write_buffered(&mut self, text: &str) -> Result<()> {
        let laid_out = wrap_text(text, self.wrap_width);
        self.sink
            .write_all(laid_out.as_bytes())
            .context("writing script file")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush().context("flushing script file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_passes_through_verbatim() {
        let text = "an unbroken    stretch of text   ";
        assert_eq!(wrap_text(text, 0), text);
    }

    #[test]
    fn short_text_passes_through_verbatim() {
        assert_eq!(wrap_text("short", 40), "short");
    }

    #[test]
    fn long_lines_wrap_at_word_boundaries() {
        let text = "the quick brown fox jumps over the lazy dog";
        let wrapped = wrap_text(text, 15);
        for line in wrapped.split('\n') {
            assert!(line.chars().count() <= 15, "line too long: {:?}", line);
        }
        // Content is preserved apart from the break positions.
        assert_eq!(wrapped.replace('\n', " "), text);
    }

    #[test]
    fn no_trailing_break_past_end_of_buffer() {
        let text = "the quick brown fox jumps over the lazy dog";
        let wrapped = wrap_text(text, 15);
        assert!(!wrapped.ends_with('\n'));
    }

    #[test]
    fn short_lines_are_trimmed_and_kept() {
        let text = "first line   \na much much much longer second line here\nlast";
        let wrapped = wrap_text(text, 20);
        let lines: Vec<&str> = wrapped.split('\n').collect();
        assert_eq!(lines[0], "first line");
        assert_eq!(*lines.last().unwrap(), "last");
    }

    #[test]
    fn overlong_word_is_hard_broken() {
        let wrapped = wrap_text("abcdefghijklmnopqrstuvwxyz tail", 10);
        let lines: Vec<&str> = wrapped.split('\n').collect();
        assert_eq!(lines[0], "abcdefghij");
        assert_eq!(lines[1], "klmnopqrst");
        assert_eq!(lines[2], "uvwxyz");
        assert_eq!(lines[3], "tail");
    }

    #[test]
    fn writer_applies_wrap_before_the_sink() {
        let mut writer = ScriptWriter::new(Box::new(Vec::new()), 0);
        writer.write_buffered("plain text").unwrap();
        writer.flush().unwrap();
    }
}
