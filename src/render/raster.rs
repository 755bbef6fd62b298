use std::collections::HashMap;

use ab_glyph::{point, Font, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, Rgb, RgbImage, RgbaImage};
use thiserror::Error;

use super::font;
use super::layout::{Layout, Node, OverlaySource, TextStyle};
use super::surface::MountGuard;

/// Largest canvas edge we agree to allocate, in device pixels.
pub const MAX_CANVAS_EDGE: u32 = 16_384;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Layout has no paintable area ({width}x{height})")]
    EmptyLayout { width: f32, height: f32 },

    #[error("Canvas too large: {width}x{height} px")]
    TooLarge { width: u32, height: u32 },

    #[error("Overlay {origin} could not be loaded: {reason}")]
    Overlay { origin: String, reason: String },

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Device pixels per CSS pixel.
    pub scale: f32,
    pub jpeg_quality: u8,
    /// Fetch overlays from other origins. Off means they are left out.
    pub allow_cross_origin: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { scale: 2.0, jpeg_quality: 92, allow_cross_origin: false }
    }
}

/// Overlay bitmaps decoded ahead of capture, keyed by node index.
#[derive(Debug, Default)]
pub struct LoadedOverlays {
    images: HashMap<usize, RgbaImage>,
}

impl LoadedOverlays {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// A captured layout as a JPEG.
#[derive(Debug, Clone)]
pub struct Capture {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

pub struct Rasterizer {
    options: RasterOptions,
    http: reqwest::Client,
}

impl Rasterizer {
    pub fn new(options: RasterOptions) -> Self {
        Self { options, http: reqwest::Client::new() }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Fetch and decode every overlay before capture starts, so capture
    /// never races an image that is still loading.
    pub async fn load_overlays(&self, layout: &Layout) -> Result<LoadedOverlays, RasterError> {
        let mut loaded = LoadedOverlays::default();

        for (index, source) in layout.overlays() {
            if source.is_remote() && !self.options.allow_cross_origin {
                tracing::warn!(
                    overlay = %source.describe(),
                    "Cross-origin overlay skipped; enable allow_cross_origin to include it"
                );
                continue;
            }

            let bytes = self.read_source(source).await?;
            let decoded = image::load_from_memory(&bytes).map_err(|e| RasterError::Overlay {
                origin: source.describe(),
                reason: e.to_string(),
            })?;
            loaded.images.insert(index, decoded.to_rgba8());
        }

        tracing::debug!(count = loaded.len(), "Overlays decoded");
        Ok(loaded)
    }

    async fn read_source(&self, source: &OverlaySource) -> Result<Vec<u8>, RasterError> {
        let fail = |reason: String| RasterError::Overlay { origin: source.describe(), reason };
        match source {
            OverlaySource::Bytes(bytes) => Ok(bytes.to_vec()),
            OverlaySource::File(path) => tokio::fs::read(path).await.map_err(|e| fail(e.to_string())),
            OverlaySource::Remote(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(fail(format!("HTTP {}", response.status())));
                }
                let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Paint a mounted layout and encode it as JPEG.
    pub fn capture(&self, mounted: &MountGuard<'_>, overlays: &LoadedOverlays) -> Result<Capture, RasterError> {
        let canvas = self.paint(mounted.layout(), overlays)?;
        let (width, height) = canvas.dimensions();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.options.jpeg_quality)
            .encode(canvas.as_raw(), width, height, ColorType::Rgb8)?;

        tracing::debug!(width, height, bytes = jpeg.len(), "Layout captured");
        Ok(Capture { width, height, jpeg })
    }

    /// Paint into an RGB canvas of `layout` size times the scale factor.
    /// Anything outside the canvas is clipped.
    pub fn paint(&self, layout: &Layout, overlays: &LoadedOverlays) -> Result<RgbImage, RasterError> {
        if layout.width <= 0.0 || layout.height <= 0.0 {
            return Err(RasterError::EmptyLayout { width: layout.width, height: layout.height });
        }
        let scale = self.options.scale;
        let width = (layout.width * scale).ceil() as u32;
        let height = (layout.height * scale).ceil() as u32;
        if width > MAX_CANVAS_EDGE || height > MAX_CANVAS_EDGE {
            return Err(RasterError::TooLarge { width, height });
        }

        let mut canvas = Canvas { image: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])), scale };

        for (index, node) in layout.nodes.iter().enumerate() {
            match node {
                Node::Fill { x, y, width, height, color } => canvas.fill(*x, *y, *width, *height, *color),
                Node::Rule { x, y, width, thickness, color } => canvas.fill(*x, *y, *width, *thickness, *color),
                Node::Frame { x, y, width, height, thickness, color } => {
                    let t = *thickness;
                    canvas.fill(*x, *y, *width, t, *color);
                    canvas.fill(*x, y + height - t, *width, t, *color);
                    canvas.fill(*x, *y, t, *height, *color);
                    canvas.fill(x + width - t, *y, t, *height, *color);
                }
                Node::Text { x, y, text, style } => canvas.text(*x, *y, text, style),
                Node::Image { x, bottom, width, .. } => {
                    if let Some(img) = overlays.images.get(&index) {
                        canvas.overlay(*x, *bottom, *width, img);
                    }
                }
            }
        }

        Ok(canvas.image)
    }
}

struct Canvas {
    image: RgbImage,
    scale: f32,
}

impl Canvas {
    /// Fill a CSS-pixel rectangle. Non-empty rectangles cover at least one
    /// device pixel.
    fn fill(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 3]) {
        let (cw, ch) = self.image.dimensions();
        let x0 = (x * self.scale).round();
        let y0 = (y * self.scale).round();
        let x1 = ((x + w) * self.scale).round().max(x0 + 1.0);
        let y1 = ((y + h) * self.scale).round().max(y0 + 1.0);

        let x0 = x0.max(0.0) as u32;
        let y0 = y0.max(0.0) as u32;
        let x1 = (x1.max(0.0) as u32).min(cw);
        let y1 = (y1.max(0.0) as u32).min(ch);

        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px, py, Rgb(color));
            }
        }
    }

    fn text(&mut self, x: f32, y: f32, text: &str, style: &TextStyle) {
        let px = font::px_size(style.size_pt) * self.scale;
        let top = (y + (style.line_height() - font::px_size(style.size_pt)) / 2.0) * self.scale;
        let baseline = top + font::ascent(px, style.bold);
        let left = x * self.scale;

        let mut placed = Vec::new();
        font::walk(text, px, style.bold, |id, pen| placed.push((id, pen)));

        let face = font::face(style.bold);
        let (cw, ch) = self.image.dimensions();
        for (id, pen) in placed {
            let glyph = id.with_scale_and_position(PxScale::from(px), point(left + pen, baseline));
            let Some(outlined) = face.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            let image = &mut self.image;
            outlined.draw(|gx, gy, coverage| {
                let dx = bounds.min.x as i64 + gx as i64;
                let dy = bounds.min.y as i64 + gy as i64;
                if dx < 0 || dy < 0 || dx >= cw as i64 || dy >= ch as i64 {
                    return;
                }
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u32;
                if alpha == 0 {
                    return;
                }
                let dst = image.get_pixel_mut(dx as u32, dy as u32);
                for c in 0..3 {
                    dst[c] = ((style.color[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
                }
            });
        }
    }

    fn overlay(&mut self, x: f32, bottom: f32, width: f32, img: &RgbaImage) {
        let (iw, ih) = img.dimensions();
        if iw == 0 || ih == 0 {
            return;
        }
        let target_w = (width * self.scale).round().max(1.0) as u32;
        let target_h = ((ih as f32 * target_w as f32) / iw as f32).round().max(1.0) as u32;
        let scaled = image::imageops::resize(img, target_w, target_h, FilterType::Triangle);

        let left = (x * self.scale).round() as i64;
        let top = (bottom * self.scale).round() as i64 - target_h as i64;
        let (cw, ch) = self.image.dimensions();

        for (sx, sy, px) in scaled.enumerate_pixels() {
            let dx = left + sx as i64;
            let dy = top + sy as i64;
            if dx < 0 || dy < 0 || dx >= cw as i64 || dy >= ch as i64 {
                continue;
            }
            let alpha = px[3] as u32;
            if alpha == 0 {
                continue;
            }
            let dst = self.image.get_pixel_mut(dx as u32, dy as u32);
            for c in 0..3 {
                let blended = (px[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255;
                dst[c] = blended as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use super::*;
    use crate::render::layout::{Align, Edges, LayoutBuilder, Run, BLACK};
    use crate::render::surface::RenderSurface;

    fn png_bytes(w: u32, h: u32, color: [u8; 4]) -> Arc<[u8]> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba(color));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf.into()
    }

    fn text_layout() -> Layout {
        let mut b = LayoutBuilder::new(200.0, Edges::all(10.0));
        b.paragraph(&[Run::bold("Hello")], TextStyle::new(10.0), Align::Left);
        b.finish(None)
    }

    #[test]
    fn canvas_is_scaled_layout_box() {
        let raster = Rasterizer::new(RasterOptions::default());
        let layout = text_layout();
        let canvas = raster.paint(&layout, &LoadedOverlays::default()).unwrap();
        assert_eq!(canvas.width(), 400);
        assert_eq!(canvas.height(), (layout.height * 2.0).ceil() as u32);
    }

    #[test]
    fn text_leaves_ink() {
        let raster = Rasterizer::new(RasterOptions::default());
        let canvas = raster.paint(&text_layout(), &LoadedOverlays::default()).unwrap();
        assert!(canvas.pixels().any(|p| p.0 == BLACK));
    }

    fn paint_line(text: &str) -> RgbImage {
        let mut b = LayoutBuilder::new(60.0, Edges::all(4.0));
        b.paragraph(&[Run::plain(text)], TextStyle::new(12.0), Align::Left);
        Rasterizer::new(RasterOptions::default()).paint(&b.finish(None), &LoadedOverlays::default()).unwrap()
    }

    #[test]
    fn typographic_characters_get_their_own_shapes() {
        let question = paint_line("?");
        for text in ["–", "’", "•", "é"] {
            let canvas = paint_line(text);
            assert!(canvas.pixels().any(|p| p.0 != [255, 255, 255]), "{text} left no ink");
            assert_ne!(canvas, question, "{text} painted as a question mark");
        }
    }

    #[test]
    fn empty_layout_rejected() {
        let raster = Rasterizer::new(RasterOptions::default());
        let layout = LayoutBuilder::new(0.0, Edges::all(0.0)).finish(None);
        assert!(matches!(
            raster.paint(&layout, &LoadedOverlays::default()),
            Err(RasterError::EmptyLayout { .. })
        ));
    }

    #[test]
    fn oversized_layout_rejected() {
        let raster = Rasterizer::new(RasterOptions::default());
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.advance(10_000.0);
        assert!(matches!(
            raster.paint(&b.finish(None), &LoadedOverlays::default()),
            Err(RasterError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn overlay_is_decoded_and_painted_bottom_anchored() {
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.advance(100.0);
        b.push(Node::Image {
            x: 50.0,
            bottom: 80.0,
            width: 20.0,
            source: OverlaySource::Bytes(png_bytes(10, 10, [255, 0, 0, 255])),
        });
        let layout = b.finish(None);

        let raster = Rasterizer::new(RasterOptions::default());
        let overlays = raster.load_overlays(&layout).await.unwrap();
        assert_eq!(overlays.len(), 1);

        let canvas = raster.paint(&layout, &overlays).unwrap();
        // 20 css px wide at 2x, bottom edge at y=160
        assert_eq!(canvas.get_pixel(110, 150).0, [255, 0, 0]);
        assert_eq!(canvas.get_pixel(110, 165).0, [255, 255, 255]);
        assert_eq!(canvas.get_pixel(110, 115).0, [255, 255, 255]);
    }

    #[tokio::test]
    async fn remote_overlay_skipped_without_cross_origin() {
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.advance(50.0);
        b.push(Node::Image {
            x: 0.0,
            bottom: 50.0,
            width: 20.0,
            source: OverlaySource::Remote("http://127.0.0.1:9/stamp.png".into()),
        });
        let raster = Rasterizer::new(RasterOptions::default());
        let overlays = raster.load_overlays(&b.finish(None)).await.unwrap();
        assert!(overlays.is_empty());
    }

    #[tokio::test]
    async fn unreachable_remote_overlay_fails_when_allowed() {
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.advance(50.0);
        b.push(Node::Image {
            x: 0.0,
            bottom: 50.0,
            width: 20.0,
            source: OverlaySource::Remote("http://127.0.0.1:9/stamp.png".into()),
        });
        let raster = Rasterizer::new(RasterOptions { allow_cross_origin: true, ..Default::default() });
        assert!(matches!(
            raster.load_overlays(&b.finish(None)).await,
            Err(RasterError::Overlay { .. })
        ));
    }

    #[tokio::test]
    async fn undecodable_overlay_fails() {
        let mut b = LayoutBuilder::new(100.0, Edges::all(0.0));
        b.push(Node::Image {
            x: 0.0,
            bottom: 10.0,
            width: 20.0,
            source: OverlaySource::Bytes(Arc::from(&b"not an image"[..])),
        });
        let raster = Rasterizer::new(RasterOptions::default());
        assert!(raster.load_overlays(&b.finish(None)).await.is_err());
    }

    #[test]
    fn capture_produces_jpeg() {
        let surface = RenderSurface::new();
        let raster = Rasterizer::new(RasterOptions::default());
        let mounted = surface.mount(text_layout());
        let capture = raster.capture(&mounted, &LoadedOverlays::default()).unwrap();
        assert_eq!(&capture.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(capture.width, 400);
    }
}
