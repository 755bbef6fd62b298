//! Prescription composition: patient field grid, visit times and the
//! converted template body, merged into one capped-height layout.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use super::layout::{Align, Edges, Layout, LayoutBuilder, Node, OverlaySource, Run, TextStyle, BLACK};
use crate::lab_catalog::LabError;
use crate::models::{parse_clock, PatientRecord};

pub const PAGE_WIDTH: f32 = 700.0;
pub const PADDING_TOP: f32 = 80.0;
pub const PADDING_BOTTOM: f32 = 120.0;
/// Content past this height is cut before capture.
pub const MAX_HEIGHT: f32 = 1000.0;

const GRID_COLUMNS: usize = 5;
const GRID_GAP: f32 = 6.0;
const GRID_PT: f32 = 8.0;
const TIME_PT: f32 = 9.0;
const BODY_PT: f32 = 10.0;
const HEADING_PT: f32 = 12.0;
const PARAGRAPH_MARGIN: f32 = 2.0;
const BODY_MARGIN_TOP: f32 = 20.0;

/// Clinic stamp placed on every prescription unless overridden.
pub static DEFAULT_STAMP: &[u8] = include_bytes!("../../resources/stamp.png");

const STAMP_WIDTH: f32 = 120.0;
const STAMP_RIGHT: f32 = 20.0;
const STAMP_BOTTOM: f32 = 400.0;

#[derive(Error, Debug, PartialEq)]
pub enum ComposeError {
    #[error("Please choose a template: the template body is empty")]
    MissingTemplate,

    #[error("Appointment record is missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Lab(#[from] LabError),
}

/// One block-level element of the template body.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub runs: Vec<Run>,
    pub heading: bool,
}

impl Block {
    fn has_text(&self) -> bool {
        self.runs.iter().any(|r| !r.text.trim().is_empty())
    }
}

/// Render a desk-entered time as `h:MM AM|PM`. Unparseable input is
/// returned trimmed, and a missing time prints as "-".
pub fn format_am_pm(time: Option<&str>) -> String {
    let Some(raw) = time.map(str::trim).filter(|t| !t.is_empty()) else {
        return "-".to_string();
    };
    match parse_clock(raw) {
        Some(t) => t.format("%-I:%M %p").to_string(),
        None => raw.to_string(),
    }
}

static STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(style|script)\b[^>]*>.*?</(?:style|script)>").unwrap());
static BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(p|h[1-6]|li)\b[^>]*>(.*?)</(?:p|h[1-6]|li)>").unwrap());
static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(/?)(strong|b)(?:\s[^>]*)?>|<br\s*/?>|<[^>]*>|[^<]+").unwrap());
static ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

/// Split an HTML fragment from template conversion into blocks of runs.
pub fn parse_fragment(html: &str) -> Vec<Block> {
    let html = STRIP.replace_all(html, "");
    let mut blocks: Vec<Block> = BLOCK
        .captures_iter(&html)
        .map(|c| Block {
            heading: c[1].to_ascii_lowercase().starts_with('h'),
            runs: inline_runs(&c[2]),
        })
        .collect();

    if blocks.is_empty() {
        let runs = inline_runs(&html);
        if runs.iter().any(|r| !r.text.trim().is_empty()) {
            blocks.push(Block { runs, heading: false });
        }
    }
    blocks
}

fn inline_runs(html: &str) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut bold_depth = 0usize;
    for m in INLINE.captures_iter(html) {
        let token = &m[0];
        if m.get(2).is_some() {
            if m.get(1).is_some_and(|s| s.as_str() == "/") {
                bold_depth = bold_depth.saturating_sub(1);
            } else {
                bold_depth += 1;
            }
        } else if token.to_ascii_lowercase().starts_with("<br") {
            push_text(&mut runs, "\n", bold_depth > 0);
        } else if token.starts_with('<') {
            continue;
        } else {
            push_text(&mut runs, &decode_entities(token), bold_depth > 0);
        }
    }
    runs
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |c: &regex::Captures<'_>| {
            let name = &c[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                "rsquo" => Some('\u{2019}'),
                "lsquo" => Some('\u{2018}'),
                "rdquo" => Some('\u{201D}'),
                "ldquo" => Some('\u{201C}'),
                "ndash" => Some('\u{2013}'),
                "mdash" => Some('\u{2014}'),
                "bull" => Some('\u{2022}'),
                "hellip" => Some('\u{2026}'),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map(String::from).unwrap_or_else(|| c[0].to_string())
        })
        .into_owned()
}

fn push_text(runs: &mut Vec<Run>, text: &str, bold: bool) {
    match runs.last_mut() {
        Some(last) if last.bold == bold => last.text.push_str(text),
        _ => runs.push(Run { text: text.to_string(), bold }),
    }
}

pub fn default_stamp() -> OverlaySource {
    OverlaySource::Bytes(Arc::from(DEFAULT_STAMP))
}

/// Builds the prescription layout around a template body.
pub struct PrescriptionComposer {
    stamp: Option<OverlaySource>,
}

impl PrescriptionComposer {
    pub fn new(stamp: Option<OverlaySource>) -> Self {
        Self { stamp }
    }

    pub fn compose(&self, patient: &PatientRecord, body_html: &str) -> Result<Layout, ComposeError> {
        if patient.mrn.trim().is_empty() {
            return Err(ComposeError::MissingField("mrn"));
        }
        if patient.name.trim().is_empty() {
            return Err(ComposeError::MissingField("name"));
        }
        let blocks = parse_fragment(body_html);
        if !blocks.iter().any(Block::has_text) {
            return Err(ComposeError::MissingTemplate);
        }

        let mut b = LayoutBuilder::new(PAGE_WIDTH, Edges::vertical(PADDING_TOP, PADDING_BOTTOM));

        b.grid(&field_cells(patient), GRID_COLUMNS, GRID_GAP, TextStyle::new(GRID_PT));
        b.rule(1.0, BLACK, 12.0);

        let time_style = TextStyle::new(TIME_PT);
        b.paragraph(
            &[Run::bold("Time In:"), Run::plain(format!(" {}", format_am_pm(patient.time_in.as_deref())))],
            time_style,
            Align::Right,
        );
        b.paragraph(
            &[Run::bold("Time Out:"), Run::plain(format!(" {}", format_am_pm(patient.time_out.as_deref())))],
            time_style,
            Align::Right,
        );

        b.advance(BODY_MARGIN_TOP);
        for block in &blocks {
            let style = if block.heading { TextStyle::new(HEADING_PT).bold() } else { TextStyle::new(BODY_PT) };
            b.advance(PARAGRAPH_MARGIN);
            b.paragraph(&block.runs, style, Align::Left);
            b.advance(PARAGRAPH_MARGIN);
        }
        let body_bottom = b.cursor();

        if let Some(stamp) = &self.stamp {
            b.push(Node::Image {
                x: b.content_left() + b.content_width() - STAMP_RIGHT - STAMP_WIDTH,
                bottom: body_bottom - STAMP_BOTTOM,
                width: STAMP_WIDTH,
                source: stamp.clone(),
            });
        }

        let layout = b.finish(Some(MAX_HEIGHT));
        if layout.is_clipped() {
            tracing::warn!(
                mrn = %patient.mrn,
                natural_height = layout.natural_height,
                cap = MAX_HEIGHT,
                "Prescription content exceeds the page cap and will be cut"
            );
        }
        Ok(layout)
    }
}

fn or_dash(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

fn field_cells(p: &PatientRecord) -> Vec<Vec<Run>> {
    let fields: [(&str, String); 14] = [
        ("MRN:", p.mrn.clone()),
        ("Name:", p.name.clone()),
        ("Age:", or_dash(Some(&p.age))),
        ("Sex:", p.sex.to_string()),
        ("Phone:", or_dash(Some(&p.phone))),
        ("CNIC:", or_dash(Some(&p.cnic))),
        ("Date:", p.date.format("%d/%m/%Y").to_string()),
        ("Height:", or_dash(p.vitals.height.as_deref())),
        ("Weight:", or_dash(p.vitals.weight.as_deref())),
        ("BP:", or_dash(p.vitals.bp.as_deref())),
        ("Pulse:", or_dash(p.vitals.pulse.as_deref())),
        ("Temperature:", or_dash(p.vitals.temperature.as_deref())),
        ("VCO:", if p.vco { "Yes".into() } else { "No".into() }),
        ("Address:", or_dash(p.address.as_deref())),
    ];
    fields
        .into_iter()
        .map(|(label, value)| vec![Run::bold(label), Run::plain(format!(" {value}"))])
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Local, NaiveDate};
    use uuid::Uuid;

    use super::*;
    use crate::models::*;

    pub(crate) fn patient() -> PatientRecord {
        PatientRecord {
            id: Uuid::new_v4(),
            mrn: "M123".into(),
            name: "Ayesha Khan".into(),
            sex: Sex::Female,
            age: "29".into(),
            phone: "0300-1234567".into(),
            cnic: "35202-1234567-1".into(),
            address: None,
            doctor: Department::Gynae,
            vitals: Vitals { bp: Some("120/80".into()), ..Vitals::default() },
            vco: false,
            status: AppointmentStatus::Pending,
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            time_in: Some("14:05".into()),
            time_out: Some("00:30".into()),
            template: String::new(),
            lab_order: None,
            created_at: Local::now().naive_local(),
        }
    }

    #[test]
    fn am_pm_formatting() {
        assert_eq!(format_am_pm(Some("14:05")), "2:05 PM");
        assert_eq!(format_am_pm(Some("00:30")), "12:30 AM");
        assert_eq!(format_am_pm(Some("12:00")), "12:00 PM");
        assert_eq!(format_am_pm(Some("9:7")), "9:07 AM");
        assert_eq!(format_am_pm(Some("09:15:42")), "9:15 AM");
        assert_eq!(format_am_pm(None), "-");
        assert_eq!(format_am_pm(Some("  ")), "-");
        assert_eq!(format_am_pm(Some("soon")), "soon");
        assert_eq!(format_am_pm(Some("25:00")), "25:00");
    }

    #[test]
    fn am_pm_suffix_is_kept() {
        assert_eq!(format_am_pm(Some("2:05 PM")), "2:05 PM");
        assert_eq!(format_am_pm(Some("12:30 am")), "12:30 AM");
        assert_eq!(format_am_pm(Some("11:59pm")), "11:59 PM");
    }

    #[test]
    fn fragment_blocks_and_bold() {
        let blocks = parse_fragment("<h2>Rx</h2><p>Take <strong>two</strong> daily<br/>after meals &amp; rest</p>");
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].heading);
        assert_eq!(
            blocks[1].runs,
            vec![Run::plain("Take "), Run::bold("two"), Run::plain(" daily\nafter meals & rest")]
        );
    }

    #[test]
    fn bare_text_becomes_one_block() {
        let blocks = parse_fragment("just text &#65;&#x42;");
        assert_eq!(blocks, vec![Block { runs: vec![Run::plain("just text AB")], heading: false }]);
    }

    #[test]
    fn typographic_entities_decode_to_their_characters() {
        let blocks = parse_fragment("<p>Patient&rsquo;s dose &ndash; 1&#8211;2 &bull; daily&hellip;</p>");
        assert_eq!(blocks[0].runs, vec![Run::plain("Patient\u{2019}s dose \u{2013} 1\u{2013}2 \u{2022} daily\u{2026}")]);
    }

    #[test]
    fn style_blocks_are_dropped() {
        let blocks = parse_fragment("<style>p { color: red }</style><p>x</p>");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].runs, vec![Run::plain("x")]);
    }

    #[test]
    fn empty_template_rejected() {
        let composer = PrescriptionComposer::new(None);
        assert_eq!(composer.compose(&patient(), "").unwrap_err(), ComposeError::MissingTemplate);
        assert_eq!(composer.compose(&patient(), "<p> </p>").unwrap_err(), ComposeError::MissingTemplate);
    }

    #[test]
    fn missing_patient_fields_rejected() {
        let mut p = patient();
        p.mrn = " ".into();
        let err = PrescriptionComposer::new(None).compose(&p, "<p>x</p>").unwrap_err();
        assert_eq!(err, ComposeError::MissingField("mrn"));
    }

    #[test]
    fn layout_carries_fields_times_and_body() {
        let layout = PrescriptionComposer::new(None).compose(&patient(), "<p>Paracetamol</p>").unwrap();
        assert_eq!(layout.width, PAGE_WIDTH);
        let text = layout.text();
        for needle in ["MRN:", "M123", "Ayesha Khan", "14/03/2026", "120/80", "No", "2:05 PM", "12:30 AM", "Paracetamol"] {
            assert!(text.contains(needle), "missing {needle} in {text}");
        }
        assert!(layout.height <= MAX_HEIGHT);
        assert!(layout.overlays().next().is_none());
    }

    #[test]
    fn long_body_is_capped() {
        let body: String = (0..200).map(|i| format!("<p>line {i}</p>")).collect();
        let layout = PrescriptionComposer::new(None).compose(&patient(), &body).unwrap();
        assert_eq!(layout.height, MAX_HEIGHT);
        assert!(layout.is_clipped());
    }

    #[tokio::test]
    async fn default_stamp_is_decoded_and_painted() {
        use crate::render::raster::{RasterOptions, Rasterizer};

        let body: String = (0..30).map(|i| format!("<p>line {i}</p>")).collect();
        let layout = PrescriptionComposer::new(Some(default_stamp())).compose(&patient(), &body).unwrap();
        let raster = Rasterizer::new(RasterOptions::default());
        let overlays = raster.load_overlays(&layout).await.unwrap();
        assert_eq!(overlays.len(), 1);

        let canvas = raster.paint(&layout, &overlays).unwrap();
        let ink = canvas.pixels().filter(|p| p.0 == [30, 60, 160]).count();
        assert!(ink > 1000, "stamp left {ink} pixels");
    }

    #[test]
    fn stamp_anchored_from_body_bottom() {
        let stamp = OverlaySource::Bytes(Arc::from(&b"png"[..]));
        let body: String = (0..60).map(|i| format!("<p>line {i}</p>")).collect();
        let layout = PrescriptionComposer::new(Some(stamp)).compose(&patient(), &body).unwrap();
        let (_, _) = layout.overlays().next().unwrap();
        let image = layout.nodes.iter().find_map(|n| match n {
            Node::Image { x, bottom, width, .. } => Some((*x, *bottom, *width)),
            _ => None,
        });
        let (x, bottom, width) = image.unwrap();
        assert_eq!(width, STAMP_WIDTH);
        assert_eq!(x, PAGE_WIDTH - STAMP_RIGHT - STAMP_WIDTH);
        assert!((bottom - (layout.natural_height - PADDING_BOTTOM - STAMP_BOTTOM)).abs() < 1e-3);
    }
}
