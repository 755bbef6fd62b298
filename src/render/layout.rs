//! Positioned layout tree in CSS pixels, plus a flow builder.
//!
//! The builder stacks blocks top to bottom inside the padding box. Text is
//! wrapped with the bitmap font metrics so the rasterizer paints exactly
//! what was measured here.

use std::path::PathBuf;
use std::sync::Arc;

use super::font;

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];
pub const DARK: Rgb = [0x1a, 0x1a, 0x1a];
pub const GREY: Rgb = [0x88, 0x88, 0x88];
pub const LIGHT_GREY: Rgb = [0xf5, 0xf5, 0xf5];
pub const DARK_RED: Rgb = [0xb3, 0x00, 0x00];

/// CSS line-height multiplier used for every text block.
pub const LINE_HEIGHT: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size_pt: f32,
    pub bold: bool,
    pub color: Rgb,
}

impl TextStyle {
    pub fn new(size_pt: f32) -> Self {
        Self { size_pt, bold: false, color: BLACK }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn size_px(&self) -> f32 {
        self.size_pt * 4.0 / 3.0
    }

    pub fn line_height(&self) -> f32 {
        self.size_px() * LINE_HEIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// A span of text with uniform weight. `\n` forces a line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: true }
    }
}

/// Where an overlay graphic comes from.
#[derive(Debug, Clone)]
pub enum OverlaySource {
    Bytes(Arc<[u8]>),
    File(PathBuf),
    /// `http(s)://` URL on another origin.
    Remote(String),
}

impl OverlaySource {
    pub fn is_remote(&self) -> bool {
        matches!(self, OverlaySource::Remote(_))
    }

    pub fn describe(&self) -> String {
        match self {
            OverlaySource::Bytes(b) => format!("<{} bytes>", b.len()),
            OverlaySource::File(p) => p.display().to_string(),
            OverlaySource::Remote(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    /// One line of text; `y` is the top of its line box.
    Text { x: f32, y: f32, text: String, style: TextStyle },
    Rule { x: f32, y: f32, width: f32, thickness: f32, color: Rgb },
    /// Unfilled rectangle outline.
    Frame { x: f32, y: f32, width: f32, height: f32, thickness: f32, color: Rgb },
    Fill { x: f32, y: f32, width: f32, height: f32, color: Rgb },
    /// Image scaled to `width`, bottom edge at `bottom`. Height follows the
    /// decoded aspect ratio.
    Image { x: f32, bottom: f32, width: f32, source: OverlaySource },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn all(v: f32) -> Self {
        Self { top: v, right: v, bottom: v, left: v }
    }

    pub fn vertical(top: f32, bottom: f32) -> Self {
        Self { top, right: 0.0, bottom, left: 0.0 }
    }
}

/// A finished layout. Anything painted below `height` is clipped.
#[derive(Debug, Clone)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    /// Height the content wanted before any cap was applied.
    pub natural_height: f32,
    pub nodes: Vec<Node>,
}

impl Layout {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_clipped(&self) -> bool {
        self.natural_height > self.height
    }

    pub fn overlays(&self) -> impl Iterator<Item = (usize, &OverlaySource)> {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Image { source, .. } => Some((i, source)),
            _ => None,
        })
    }

    /// Concatenated text of every text node, in paint order.
    pub fn text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Top-to-bottom flow builder.
pub struct LayoutBuilder {
    width: f32,
    padding: Edges,
    cursor: f32,
    nodes: Vec<Node>,
}

impl LayoutBuilder {
    pub fn new(width: f32, padding: Edges) -> Self {
        Self { width, padding, cursor: padding.top, nodes: Vec::new() }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn content_left(&self) -> f32 {
        self.padding.left
    }

    pub fn content_width(&self) -> f32 {
        self.width - self.padding.left - self.padding.right
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn advance(&mut self, dy: f32) {
        self.cursor += dy;
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Wrapped paragraph across the content width.
    pub fn paragraph(&mut self, runs: &[Run], style: TextStyle, align: Align) {
        let x = self.content_left();
        let width = self.content_width();
        let y = self.cursor;
        let height = self.paragraph_at(runs, style, align, x, y, width);
        self.cursor += height;
    }

    /// Wrapped paragraph in an arbitrary box. Returns the height used.
    pub fn paragraph_at(
        &mut self,
        runs: &[Run],
        style: TextStyle,
        align: Align,
        x: f32,
        y: f32,
        width: f32,
    ) -> f32 {
        let lines = wrap(runs, style.size_pt, width);
        let line_height = style.line_height();
        for (i, line) in lines.iter().enumerate() {
            let line_width = line_width(line, style.size_pt);
            let offset = match align {
                Align::Left => 0.0,
                Align::Center => ((width - line_width) / 2.0).max(0.0),
                Align::Right => (width - line_width).max(0.0),
            };
            let mut pen = x + offset;
            let top = y + i as f32 * line_height;
            for seg in line {
                let seg_style = TextStyle { bold: style.bold || seg.bold, ..style };
                self.nodes.push(Node::Text { x: pen, y: top, text: seg.text.clone(), style: seg_style });
                pen += font::text_width(&seg.text, style.size_pt, seg_style.bold) + space_width(style.size_pt);
            }
        }
        lines.len() as f32 * line_height
    }

    pub fn rule(&mut self, thickness: f32, color: Rgb, margin: f32) {
        self.cursor += margin;
        self.nodes.push(Node::Rule {
            x: self.content_left(),
            y: self.cursor,
            width: self.content_width(),
            thickness,
            color,
        });
        self.cursor += thickness + margin;
    }

    /// Equal-width columns filled row-major. Each row is as tall as its
    /// tallest cell.
    pub fn grid(&mut self, cells: &[Vec<Run>], columns: usize, gap: f32, style: TextStyle) {
        let columns = columns.max(1);
        let col_width = (self.content_width() - gap * (columns as f32 - 1.0)) / columns as f32;
        for row in cells.chunks(columns) {
            let top = self.cursor;
            let mut tallest: f32 = 0.0;
            for (c, cell) in row.iter().enumerate() {
                let x = self.content_left() + c as f32 * (col_width + gap);
                let h = self.paragraph_at(cell, style, Align::Left, x, top, col_width);
                tallest = tallest.max(h);
            }
            self.cursor = top + tallest + gap;
        }
    }

    /// Bordered table. `widths` are fractions of the content width.
    pub fn table(&mut self, rows: &[Vec<String>], widths: &[f32], header: bool, style: TextStyle, pad: f32) {
        let total = self.content_width();
        for (r, row) in rows.iter().enumerate() {
            let is_header = header && r == 0;
            let cell_style = if is_header { style.bold() } else { style };
            let top = self.cursor;
            let mut x = self.content_left();

            let mut heights = Vec::with_capacity(row.len());
            let mut text_nodes = Vec::new();
            std::mem::swap(&mut self.nodes, &mut text_nodes);
            for (c, cell) in row.iter().enumerate() {
                let w = total * widths.get(c).copied().unwrap_or(1.0 / row.len() as f32);
                let h = self.paragraph_at(&[Run::plain(cell.as_str())], cell_style, Align::Left, x + pad, top + pad, w - 2.0 * pad);
                heights.push((x, w, h));
                x += w;
            }
            std::mem::swap(&mut self.nodes, &mut text_nodes);

            let row_height = heights.iter().map(|(_, _, h)| *h).fold(0.0, f32::max) + 2.0 * pad;
            if is_header {
                self.nodes.push(Node::Fill {
                    x: self.content_left(),
                    y: top,
                    width: total,
                    height: row_height,
                    color: LIGHT_GREY,
                });
            }
            self.nodes.extend(text_nodes);
            for (x, w, _) in heights {
                self.nodes.push(Node::Frame { x, y: top, width: w, height: row_height, thickness: 1.0, color: BLACK });
            }
            self.cursor = top + row_height;
        }
    }

    /// Close the flow. Height is content plus bottom padding, optionally capped.
    pub fn finish(self, max_height: Option<f32>) -> Layout {
        let natural_height = self.cursor + self.padding.bottom;
        let height = match max_height {
            Some(cap) => natural_height.min(cap),
            None => natural_height,
        };
        Layout { width: self.width, height, natural_height, nodes: self.nodes }
    }

    /// Close the flow at a fixed height regardless of content.
    pub fn finish_fixed(self, height: f32) -> Layout {
        let natural_height = self.cursor + self.padding.bottom;
        Layout { width: self.width, height, natural_height, nodes: self.nodes }
    }
}

fn space_width(size_pt: f32) -> f32 {
    font::space_width(size_pt)
}

fn line_width(line: &[Run], size_pt: f32) -> f32 {
    if line.is_empty() {
        return 0.0;
    }
    let words: f32 = line.iter().map(|s| font::text_width(&s.text, size_pt, s.bold)).sum();
    words + space_width(size_pt) * (line.len() as f32 - 1.0)
}

/// Greedy word wrap. Each returned line is a list of same-weight segments;
/// words too long for a line get a line of their own.
fn wrap(runs: &[Run], size_pt: f32, width: f32) -> Vec<Vec<Run>> {
    let mut lines: Vec<Vec<Run>> = Vec::new();
    let mut line: Vec<Run> = Vec::new();
    let mut used = 0.0;
    let space = space_width(size_pt);

    for run in runs {
        for (i, hard_line) in run.text.split('\n').enumerate() {
            if i > 0 {
                lines.push(std::mem::take(&mut line));
                used = 0.0;
            }
            for word in hard_line.split_whitespace() {
                let w = font::text_width(word, size_pt, run.bold);
                if !line.is_empty() && used + space + w > width {
                    lines.push(std::mem::take(&mut line));
                    used = 0.0;
                }
                if !line.is_empty() {
                    used += space;
                }
                used += w;
                match line.last_mut() {
                    Some(last) if last.bold == run.bold => {
                        last.text.push(' ');
                        last.text.push_str(word);
                    }
                    _ => line.push(Run { text: word.to_string(), bold: run.bold }),
                }
            }
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_line() {
        let lines = wrap(&[Run::plain("Hello world")], 10.0, 500.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], vec![Run::plain("Hello world")]);
    }

    #[test]
    fn wraps_at_width() {
        let word_w = font::text_width("word", 10.0, false);
        // room for two words and a space, not three
        let width = word_w * 2.0 + space_width(10.0) + 1.0;
        let lines = wrap(&[Run::plain("word word word word word")], 10.0, width);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn mixed_weight_segments_merge_per_weight() {
        let lines = wrap(&[Run::bold("MRN:"), Run::plain("M123 extra")], 8.0, 1000.0);
        assert_eq!(lines[0], vec![Run::bold("MRN:"), Run::plain("M123 extra")]);
    }

    #[test]
    fn hard_breaks_split_lines() {
        let lines = wrap(&[Run::plain("one\ntwo")], 10.0, 1000.0);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_paragraph_still_takes_a_line() {
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.paragraph(&[], TextStyle::new(10.0), Align::Left);
        assert!((b.cursor() - TextStyle::new(10.0).line_height()).abs() < 1e-4);
    }

    #[test]
    fn right_alignment_pushes_text_to_edge() {
        let mut b = LayoutBuilder::new(400.0, Edges::all(0.0));
        b.paragraph(&[Run::plain("Hi")], TextStyle::new(10.0), Align::Right);
        let layout = b.finish(None);
        match &layout.nodes[0] {
            Node::Text { x, .. } => {
                let expected = 400.0 - font::text_width("Hi", 10.0, false);
                assert!((x - expected).abs() < 1e-3);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn cap_clips_height_but_keeps_natural() {
        let mut b = LayoutBuilder::new(100.0, Edges::vertical(80.0, 120.0));
        b.advance(2000.0);
        let layout = b.finish(Some(1000.0));
        assert_eq!(layout.height, 1000.0);
        assert_eq!(layout.natural_height, 2200.0);
        assert!(layout.is_clipped());
    }

    #[test]
    fn grid_rows_stack() {
        let mut b = LayoutBuilder::new(500.0, Edges::all(0.0));
        let cells: Vec<Vec<Run>> = (0..7).map(|i| vec![Run::plain(format!("c{i}"))]).collect();
        b.grid(&cells, 5, 6.0, TextStyle::new(8.0));
        let expected = 2.0 * (TextStyle::new(8.0).line_height() + 6.0);
        assert!((b.cursor() - expected).abs() < 1e-3);
        assert_eq!(b.finish(None).node_count(), 7);
    }

    #[test]
    fn table_draws_frames_per_cell() {
        let mut b = LayoutBuilder::new(400.0, Edges::all(0.0));
        let rows = vec![
            vec!["Test".to_string(), "Result".to_string()],
            vec!["HB".to_string(), "12".to_string()],
        ];
        b.table(&rows, &[0.5, 0.5], true, TextStyle::new(9.0), 4.0);
        let layout = b.finish(None);
        let frames = layout.nodes.iter().filter(|n| matches!(n, Node::Frame { .. })).count();
        let fills = layout.nodes.iter().filter(|n| matches!(n, Node::Fill { .. })).count();
        assert_eq!(frames, 4);
        assert_eq!(fills, 1);
        assert!(layout.text().contains("Result"));
    }
}
