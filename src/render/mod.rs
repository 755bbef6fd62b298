//! Document rendering: template conversion, composition, rasterization
//! and PDF assembly.

pub mod compose;
pub mod font;
pub mod lab_report;
pub mod layout;
pub mod paginate;
pub mod raster;
pub mod surface;
pub mod template;

pub use compose::{default_stamp, format_am_pm, ComposeError, PrescriptionComposer, DEFAULT_STAMP};
pub use lab_report::{LabReportComposer, Letterhead};
pub use layout::{Layout, OverlaySource};
pub use paginate::{PageGeometry, PaginateError, PagePlan};
pub use raster::{Capture, RasterError, RasterOptions, Rasterizer};
pub use surface::{MountGuard, RenderSurface};
pub use template::{load_template, DocxConverter, TemplateConverter, TemplateError};
