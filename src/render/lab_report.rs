//! Lab report composition: two fixed-size pages sharing one letterhead.
//!
//! Page one carries the CBC panel, page two every other ordered test. Each
//! page is captured on its own and placed whole on its PDF page, so nothing
//! here depends on the shifted pagination used for prescriptions.

use chrono::NaiveDate;

use super::compose::ComposeError;
use super::layout::{
    Align, Edges, Layout, LayoutBuilder, Node, Run, TextStyle, BLACK, DARK, DARK_RED, GREY,
};
use crate::lab_catalog::{test_kind, LabResults, ResultValue, TestKind, CBC_PANEL, CBC_TEST};
use crate::models::PatientRecord;

pub const LAB_PAGE_WIDTH: f32 = 700.0;
pub const LAB_PAGE_HEIGHT: f32 = 950.0;
const PAGE_PADDING: f32 = 30.0;

const INFO_PT: f32 = 9.0;
const TABLE_PT: f32 = 9.0;
const SECTION_PT: f32 = 11.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Signatory {
    pub name: String,
    /// Printed one per line under the name.
    pub lines: Vec<String>,
}

/// Fixed header and footer content repeated on every lab page.
#[derive(Debug, Clone, PartialEq)]
pub struct Letterhead {
    pub hospital: String,
    pub department: String,
    pub motto: String,
    pub signatories: Vec<Signatory>,
    pub phone: String,
    pub address: String,
}

impl Default for Letterhead {
    fn default() -> Self {
        Self {
            hospital: "Family Care Hospital".into(),
            department: "CLINICAL LABORATORY".into(),
            motto: "\"Determined to serve humanity\"".into(),
            signatories: vec![
                Signatory {
                    name: "Dr. Ejaz Mazari".into(),
                    lines: vec!["MBBS, FCPS".into(), "Child Specialist".into()],
                },
                Signatory { name: "Dr. Saima Ejaz".into(), lines: vec!["MBBS".into()] },
                Signatory { name: "Sadaf Raheem".into(), lines: vec!["Lab Technologist".into()] },
            ],
            phone: "0333-6438402".into(),
            address: "Qutub Canal Link Road, Rajanpur".into(),
        }
    }
}

pub struct LabReportComposer {
    letterhead: Letterhead,
}

impl LabReportComposer {
    pub fn new(letterhead: Letterhead) -> Self {
        Self { letterhead }
    }

    /// Build both pages. Results must already be validated against the order.
    pub fn compose(
        &self,
        patient: &PatientRecord,
        results: &LabResults,
        report_date: NaiveDate,
    ) -> Result<[Layout; 2], ComposeError> {
        if patient.mrn.trim().is_empty() {
            return Err(ComposeError::MissingField("mrn"));
        }
        let order = patient.lab_order.as_ref().ok_or(ComposeError::MissingField("lab order"))?;

        let header = segment(|b| self.header(b, patient, report_date));
        let footer = segment(|b| self.footer(b));

        let cbc_body = segment(|b| {
            if order.tests.contains(CBC_TEST) {
                cbc_section(b, results);
            } else {
                b.paragraph(&[Run::plain("No CBC Test Available")], TextStyle::new(10.0), Align::Center);
            }
        });

        let mut kinds = Vec::new();
        for test in order.tests.iter().filter(|t| t.as_str() != CBC_TEST) {
            kinds.push((test.as_str(), test_kind(test, order.location)?));
        }
        let other_body = segment(|b| {
            if kinds.is_empty() {
                b.paragraph(&[Run::plain("No Additional Tests")], TextStyle::new(10.0), Align::Center);
            }
            for (test, kind) in &kinds {
                test_section(b, test, *kind, results);
            }
        });

        tracing::debug!(
            mrn = %patient.mrn,
            tests = order.tests.len(),
            location = %order.location,
            "Lab report pages composed"
        );
        Ok([page(&header, &cbc_body, &footer), page(&header, &other_body, &footer)])
    }

    fn header(&self, b: &mut LayoutBuilder, patient: &PatientRecord, report_date: NaiveDate) {
        let lh = &self.letterhead;
        b.paragraph(&[Run::bold(lh.hospital.as_str())], TextStyle::new(18.0).bold().color(DARK), Align::Center);
        b.advance(5.0);
        b.paragraph(&[Run::bold(lh.department.as_str())], TextStyle::new(13.0).bold().color(DARK_RED), Align::Center);
        b.advance(5.0);
        b.paragraph(&[Run::plain(lh.motto.as_str())], TextStyle::new(9.0), Align::Center);
        b.advance(6.0);
        b.rule(2.0, BLACK, 0.0);
        b.advance(8.0);

        let field = |label: &str, value: String| vec![Run::bold(label), Run::plain(format!(" {value}"))];
        let dash = |v: &str| if v.trim().is_empty() { "-".to_string() } else { v.to_string() };
        let cells = vec![
            field("MRN:", patient.mrn.clone()),
            field("Date:", report_date.format("%B %-d, %Y").to_string()),
            field("Name:", patient.name.clone()),
            field("Doctor:", patient.doctor.to_string()),
            field("Age:", dash(&patient.age)),
            field("Sex:", patient.sex.to_string()),
            field("Phone:", dash(&patient.phone)),
            field("CNIC:", dash(&patient.cnic)),
        ];
        b.grid(&cells, 2, 4.0, TextStyle::new(INFO_PT));
    }

    fn footer(&self, b: &mut LayoutBuilder) {
        let lh = &self.letterhead;
        let style = TextStyle::new(INFO_PT);
        b.rule(2.0, BLACK, 0.0);
        b.advance(10.0);

        let columns = lh.signatories.len().max(1);
        let col_width = b.content_width() / columns as f32;
        let top = b.cursor();
        let mut tallest: f32 = 0.0;
        for (i, s) in lh.signatories.iter().enumerate() {
            let mut runs = vec![Run::bold(s.name.as_str())];
            for line in &s.lines {
                runs.push(Run::plain(format!("\n{line}")));
            }
            let x = b.content_left() + i as f32 * col_width;
            tallest = tallest.max(b.paragraph_at(&runs, style, Align::Center, x, top, col_width));
        }
        b.advance(tallest + 10.0);

        let inset = b.content_width() * 0.125;
        let y = b.cursor();
        b.push(Node::Rule { x: b.content_left() + inset, y, width: b.content_width() * 0.75, thickness: 1.0, color: GREY });
        b.advance(11.0);

        b.paragraph(&[Run::bold(lh.phone.as_str())], style, Align::Center);
        b.paragraph(&[Run::plain(lh.address.as_str())], style, Align::Center);
    }
}

impl Default for LabReportComposer {
    fn default() -> Self {
        Self::new(Letterhead::default())
    }
}

fn cbc_section(b: &mut LayoutBuilder, results: &LabResults) {
    b.paragraph(&[Run::bold("CBC (Complete Blood Count)")], TextStyle::new(12.0).bold(), Align::Left);
    b.advance(8.0);
    let mut rows = vec![vec!["Test".to_string(), "Result".into(), "Normal Range".into(), "Unit".into()]];
    rows.extend(CBC_PANEL.iter().map(|row| {
        vec![row.name.to_string(), results.panel_value(row.name).to_string(), row.range.to_string(), row.unit.to_string()]
    }));
    b.table(&rows, &[0.3, 0.2, 0.3, 0.2], true, TextStyle::new(TABLE_PT), 4.0);
    b.advance(20.0);
}

fn test_section(b: &mut LayoutBuilder, test: &str, kind: TestKind, results: &LabResults) {
    b.paragraph(&[Run::bold(test)], TextStyle::new(SECTION_PT).bold(), Align::Left);
    b.advance(6.0);
    let style = TextStyle::new(TABLE_PT);
    match kind {
        TestKind::CategoricalPair => {
            let (abo, rhesus) = match results.get(test) {
                Some(ResultValue::BloodGroup { abo, rhesus }) => (abo.as_str(), rhesus.as_str()),
                _ => ("-", "-"),
            };
            let rows = vec![
                vec!["ABO Group".to_string(), "Rhesus (Rh)".to_string()],
                vec![abo.to_string(), rhesus.to_string()],
            ];
            b.table(&rows, &[0.5, 0.5], true, style, 5.0);
            b.advance(18.0);
        }
        TestKind::BinaryResult => {
            let value = match results.get(test) {
                Some(ResultValue::Binary(outcome)) => outcome.as_str(),
                _ => "-",
            };
            b.table(&[vec!["Result".to_string(), value.to_string()]], &[0.3, 0.7], false, style, 5.0);
            b.advance(15.0);
        }
        TestKind::ExternalOnly => {
            b.table(&[vec!["Result".to_string(), "Outsourced".to_string()]], &[0.3, 0.7], false, style, 5.0);
            b.advance(15.0);
        }
        // Only the CBC is a panel, and it is filtered onto page one
        TestKind::StructuredPanel => cbc_section(b, results),
    }
}

/// A block laid out at the page's side padding, starting at y = 0.
struct Segment {
    nodes: Vec<Node>,
    height: f32,
}

fn segment(build: impl FnOnce(&mut LayoutBuilder)) -> Segment {
    let padding = Edges { top: 0.0, right: PAGE_PADDING, bottom: 0.0, left: PAGE_PADDING };
    let mut b = LayoutBuilder::new(LAB_PAGE_WIDTH, padding);
    build(&mut b);
    let layout = b.finish(None);
    Segment { nodes: layout.nodes, height: layout.natural_height }
}

/// Header at the top, footer at the bottom, body centred in between.
fn page(header: &Segment, body: &Segment, footer: &Segment) -> Layout {
    let available = LAB_PAGE_HEIGHT - 2.0 * PAGE_PADDING - header.height - footer.height;
    let body_top = PAGE_PADDING + header.height + ((available - body.height) / 2.0).max(0.0);
    let footer_top = LAB_PAGE_HEIGHT - PAGE_PADDING - footer.height;

    let mut nodes = vec![Node::Frame {
        x: 0.0,
        y: 0.0,
        width: LAB_PAGE_WIDTH,
        height: LAB_PAGE_HEIGHT,
        thickness: 1.0,
        color: BLACK,
    }];
    nodes.extend(shifted(&header.nodes, PAGE_PADDING));
    nodes.extend(shifted(&body.nodes, body_top));
    nodes.extend(shifted(&footer.nodes, footer_top));

    let natural_height = (2.0 * PAGE_PADDING + header.height + body.height + footer.height).max(LAB_PAGE_HEIGHT);
    Layout { width: LAB_PAGE_WIDTH, height: LAB_PAGE_HEIGHT, natural_height, nodes }
}

fn shifted(nodes: &[Node], dy: f32) -> impl Iterator<Item = Node> + '_ {
    nodes.iter().cloned().map(move |mut node| {
        match &mut node {
            Node::Text { y, .. } | Node::Rule { y, .. } | Node::Frame { y, .. } | Node::Fill { y, .. } => *y += dy,
            Node::Image { bottom, .. } => *bottom += dy,
        }
        node
    })
}
