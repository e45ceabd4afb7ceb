//! Greedy line wrapping with a cache keyed by text, font size, and
//! wrap width.
//!
//! Wrapping runs on an estimated per-character advance so the pipeline
//! stays font-backend-free; a backend with real shaping can re-measure,
//! but the cache keeps the per-frame cost of unchanged text at zero.

use std::collections::HashMap;
use std::sync::Arc;

/// Estimated advance per character as a fraction of the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.55;
/// Line height as a fraction of the font size.
pub const LINE_HEIGHT_FACTOR: f64 = 1.3;
/// Entry ceiling; the cache is dropped wholesale when it fills.
const CACHE_CAPACITY: usize = 4096;

/// Estimated width of `text` on one line.
pub fn estimated_text_width(text: &str, font_size: f64) -> f64 {
    text.chars().count() as f64 * font_size * CHAR_WIDTH_FACTOR
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    text: String,
    /// Quantized to tenths so the float dimensions stay hashable.
    font_size_deci: u32,
    max_width_deci: u32,
}

impl LayoutKey {
    fn new(text: &str, font_size: f64, max_width: f64) -> Self {
        Self {
            text: text.to_string(),
            font_size_deci: (font_size * 10.0).round() as u32,
            max_width_deci: (max_width * 10.0).round() as u32,
        }
    }
}

/// A wrapped block of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    pub line_height: f64,
    /// Estimated width of the widest line.
    pub width: f64,
}

impl TextLayout {
    pub fn height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }
}

/// Line-wrap cache. Misses are counted so a frame can report how much
/// layout work it actually did.
#[derive(Debug, Default)]
pub struct TextLayoutCache {
    entries: HashMap<LayoutKey, Arc<TextLayout>>,
    frame_layouts: usize,
}

impl TextLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrapped lines for `text` at `font_size`, fitting `max_width`.
    pub fn layout(&mut self, text: &str, font_size: f64, max_width: f64) -> Arc<TextLayout> {
        let key = LayoutKey::new(text, font_size, max_width);
        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }
        self.frame_layouts += 1;
        let layout = Arc::new(wrap(text, font_size, max_width));
        if self.entries.len() >= CACHE_CAPACITY {
            self.entries.clear();
        }
        self.entries.insert(key, layout.clone());
        layout
    }

    /// Fresh layouts computed since the last call.
    pub fn take_frame_layouts(&mut self) -> usize {
        std::mem::take(&mut self.frame_layouts)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn wrap(text: &str, font_size: f64, max_width: f64) -> TextLayout {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph, font_size, max_width, &mut lines);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    let width = lines
        .iter()
        .map(|line| estimated_text_width(line, font_size))
        .fold(0.0, f64::max);
    TextLayout {
        lines,
        line_height: font_size * LINE_HEIGHT_FACTOR,
        width,
    }
}

fn wrap_paragraph(paragraph: &str, font_size: f64, max_width: f64, out: &mut Vec<String>) {
    if paragraph.trim().is_empty() {
        out.push(String::new());
        return;
    }
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        for piece in break_word(word, font_size, max_width) {
            if current.is_empty() {
                current = piece;
                continue;
            }
            let candidate = format!("{current} {piece}");
            if estimated_text_width(&candidate, font_size) <= max_width {
                current = candidate;
            } else {
                out.push(std::mem::replace(&mut current, piece));
            }
        }
    }
    out.push(current);
}

/// Split a word that cannot fit on a line by itself into chunks that do.
fn break_word(word: &str, font_size: f64, max_width: f64) -> Vec<String> {
    if estimated_text_width(word, font_size) <= max_width {
        return vec![word.to_string()];
    }
    let per_char = font_size * CHAR_WIDTH_FACTOR;
    let chars_per_line = ((max_width / per_char).floor() as usize).max(1);
    word.chars()
        .collect::<Vec<_>>()
        .chunks(chars_per_line)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
