//! Embedded DejaVu Sans faces and the text metrics shared by layout and
//! raster. Characters the faces lack render as the `.notdef` box.

use std::sync::LazyLock;

use ab_glyph::{Font, FontRef, GlyphId, PxScale, ScaleFont};

static REGULAR_TTF: &[u8] = include_bytes!("../../resources/fonts/DejaVuSans.ttf");
static BOLD_TTF: &[u8] = include_bytes!("../../resources/fonts/DejaVuSans-Bold.ttf");

static REGULAR: LazyLock<FontRef<'static>> =
    LazyLock::new(|| FontRef::try_from_slice(REGULAR_TTF).expect("embedded regular face parses"));
static BOLD: LazyLock<FontRef<'static>> =
    LazyLock::new(|| FontRef::try_from_slice(BOLD_TTF).expect("embedded bold face parses"));

pub fn face(bold: bool) -> &'static FontRef<'static> {
    if bold {
        &BOLD
    } else {
        &REGULAR
    }
}

/// Em height in CSS pixels. 1pt = 4/3 px.
pub fn px_size(size_pt: f32) -> f32 {
    size_pt * 4.0 / 3.0
}

/// True if the face has a real glyph for `c`.
pub fn has_glyph(c: char, bold: bool) -> bool {
    face(bold).glyph_id(c) != GlyphId(0)
}

/// Kerned advance of `text` at `px`, calling `place` with each glyph id and
/// its pen position. Returns the total advance.
pub fn walk(text: &str, px: f32, bold: bool, mut place: impl FnMut(GlyphId, f32)) -> f32 {
    let font = face(bold).as_scaled(PxScale::from(px));
    let mut pen = 0.0;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = font.glyph_id(c);
        if let Some(p) = prev {
            pen += font.kern(p, id);
        }
        place(id, pen);
        pen += font.h_advance(id);
        prev = Some(id);
    }
    pen
}

/// Width of `text` in CSS pixels.
pub fn text_width(text: &str, size_pt: f32, bold: bool) -> f32 {
    walk(text, px_size(size_pt), bold, |_, _| {})
}

/// Inter-word gap in CSS pixels.
pub fn space_width(size_pt: f32) -> f32 {
    text_width(" ", size_pt, false)
}

/// Distance from the top of the em box to the baseline, in pixels at `px`.
pub fn ascent(px: f32, bold: bool) -> f32 {
    face(bold).as_scaled(PxScale::from(px)).ascent()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typographic_punctuation_has_glyphs() {
        for c in ['’', '‘', '“', '”', '–', '—', '•', '…', 'é', 'µ'] {
            assert!(has_glyph(c, false), "no glyph for {c:?}");
            assert!(has_glyph(c, true), "no bold glyph for {c:?}");
        }
    }

    #[test]
    fn dashes_are_not_question_marks() {
        assert_ne!(face(false).glyph_id('–'), face(false).glyph_id('?'));
        assert_ne!(face(false).glyph_id('’'), face(false).glyph_id('?'));
    }

    #[test]
    fn width_scales_with_size_and_length() {
        let one = text_width("A", 12.0, false);
        assert!(one > 0.0);
        assert!((text_width("A", 24.0, false) - 2.0 * one).abs() < 1e-3);
        assert!(text_width("AAAA", 12.0, false) > 3.9 * one);
        assert!(text_width("A", 12.0, true) > one);
        assert_eq!(text_width("", 12.0, false), 0.0);
    }

    #[test]
    fn space_is_narrower_than_a_letter() {
        let space = space_width(10.0);
        assert!(space > 0.0);
        assert!(space < text_width("M", 10.0, false));
    }

    #[test]
    fn walk_reports_increasing_pen_positions() {
        let mut pens = Vec::new();
        let total = walk("abc", 20.0, false, |_, pen| pens.push(pen));
        assert_eq!(pens.len(), 3);
        assert_eq!(pens[0], 0.0);
        assert!(pens.windows(2).all(|w| w[1] > w[0]));
        assert!(total > pens[2]);
    }
}
