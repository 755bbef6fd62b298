//! A4 PDF assembly from captured rasters.
//!
//! Two placements are supported. `plan_shifted` redraws one tall image on
//! every page at a rising offset so each page shows the next band. `assemble_pages`
//! puts one capture per page at the top-left corner at full page width.

use std::io::BufWriter;

use printpdf::image_crate::{self, ImageFormat};
use printpdf::{Image, ImageTransform, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use thiserror::Error;

use super::raster::Capture;

/// Slack when comparing millimetre heights, so an image exactly N pages
/// tall does not spill onto page N+1 through float rounding.
const EPSILON_MM: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum PaginateError {
    #[error("Nothing to paginate")]
    Empty,

    #[error("Capture has zero width or height")]
    ZeroSizedImage,

    #[error("Margins leave no printable area")]
    NoPrintableArea,

    #[error("Capture could not be decoded: {0}")]
    Decode(#[from] image_crate::ImageError),

    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Output page geometry in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f64,
    pub page_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
}

impl PageGeometry {
    /// A4 portrait with 10 mm on every side.
    pub const A4: PageGeometry = PageGeometry {
        page_width: 210.0,
        page_height: 297.0,
        margin_top: 10.0,
        margin_bottom: 10.0,
        margin_left: 10.0,
        margin_right: 10.0,
    };

    pub fn printable_width(&self) -> f64 {
        self.page_width - self.margin_left - self.margin_right
    }

    pub fn printable_height(&self) -> f64 {
        self.page_height - self.margin_top - self.margin_bottom
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::A4
    }
}

/// Where the image lands on one page. `y` is the image top measured down
/// from the page top and goes negative on later pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub image_width: f64,
    pub image_height: f64,
    pub placements: Vec<Placement>,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.placements.len()
    }
}

/// Plan the shift-redraw layout for a `width_px` x `height_px` image.
///
/// The image is scaled to the printable width. Page k draws it at
/// `margin_top - k * printable_height`; pages are added while unrendered
/// height remains, giving ceil(height / printable_height) pages, minimum one.
pub fn plan_shifted(width_px: u32, height_px: u32, geometry: &PageGeometry) -> Result<PagePlan, PaginateError> {
    if width_px == 0 || height_px == 0 {
        return Err(PaginateError::ZeroSizedImage);
    }
    let printable = geometry.printable_height();
    let image_width = geometry.printable_width();
    if printable <= 0.0 || image_width <= 0.0 {
        return Err(PaginateError::NoPrintableArea);
    }

    // Multiply before dividing so whole-page heights stay exact
    let image_height = height_px as f64 * image_width / width_px as f64;

    let mut placements = vec![Placement { page: 0, x: geometry.margin_left, y: geometry.margin_top }];
    let mut remaining = image_height - printable;
    while remaining > EPSILON_MM {
        let page = placements.len();
        placements.push(Placement {
            page,
            x: geometry.margin_left,
            y: geometry.margin_top - page as f64 * printable,
        });
        remaining -= printable;
    }

    Ok(PagePlan { image_width, image_height, placements })
}

/// Build a PDF that redraws `capture` on each planned page.
pub fn assemble_shifted(
    title: &str,
    capture: &Capture,
    geometry: &PageGeometry,
) -> Result<(Vec<u8>, PagePlan), PaginateError> {
    let plan = plan_shifted(capture.width, capture.height, geometry)?;
    let decoded = image_crate::load_from_memory_with_format(&capture.jpeg, ImageFormat::Jpeg)?;
    let dpi = dpi_for(capture.width, plan.image_width);

    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(geometry.page_width as f32), Mm(geometry.page_height as f32), "Layer 1");

    for placement in &plan.placements {
        let layer = if placement.page == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            new_page(&doc, geometry, placement.page)
        };
        place(&layer, &decoded, placement.x, placement.y, plan.image_height, geometry.page_height, dpi);
    }

    let bytes = save(doc)?;
    tracing::debug!(pages = plan.page_count(), bytes = bytes.len(), "Shifted PDF assembled");
    Ok((bytes, plan))
}

/// One page per capture, each drawn from the top-left corner at full page width.
pub fn assemble_pages(title: &str, captures: &[Capture], geometry: &PageGeometry) -> Result<Vec<u8>, PaginateError> {
    let first = captures.first().ok_or(PaginateError::Empty)?;
    if captures.iter().any(|c| c.width == 0 || c.height == 0) {
        return Err(PaginateError::ZeroSizedImage);
    }

    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(geometry.page_width as f32), Mm(geometry.page_height as f32), "Layer 1");

    for (i, capture) in captures.iter().enumerate() {
        let decoded = image_crate::load_from_memory_with_format(&capture.jpeg, ImageFormat::Jpeg)?;
        let image_height = capture.height as f64 * geometry.page_width / capture.width as f64;
        let dpi = dpi_for(capture.width, geometry.page_width);
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            new_page(&doc, geometry, i)
        };
        place(&layer, &decoded, 0.0, 0.0, image_height, geometry.page_height, dpi);
    }

    let bytes = save(doc)?;
    tracing::debug!(pages = captures.len(), first_width = first.width, bytes = bytes.len(), "Paged PDF assembled");
    Ok(bytes)
}

/// Resolution at which `width_px` pixels span exactly `width_mm`.
fn dpi_for(width_px: u32, width_mm: f64) -> f32 {
    (width_px as f64 * 25.4 / width_mm) as f32
}

fn new_page(doc: &PdfDocumentReference, geometry: &PageGeometry, index: usize) -> PdfLayerReference {
    let (page, layer) = doc.add_page(
        Mm(geometry.page_width as f32),
        Mm(geometry.page_height as f32),
        format!("Layer {}", index + 1),
    );
    doc.get_page(page).get_layer(layer)
}

/// PDF origin is bottom-left, so convert the top-down offset.
fn place(
    layer: &PdfLayerReference,
    decoded: &image_crate::DynamicImage,
    x: f64,
    y_top: f64,
    image_height: f64,
    page_height: f64,
    dpi: f32,
) {
    let translate_y = page_height - y_top - image_height;
    Image::from_dynamic_image(decoded).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x as f32)),
            translate_y: Some(Mm(translate_y as f32)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>, PaginateError> {
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| PaginateError::Pdf(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| PaginateError::Pdf(format!("PDF buffer error: {e}")))
}
