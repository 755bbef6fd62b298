//! Document generation orchestrator.
//!
//! Drives one prescription or lab report from patient lookup to server
//! acknowledgement:
//! compose → rasterize → paginate → upload.
//!
//! Every run walks `Idle → Composing → Rasterizing → Paginating → Uploading`
//! and ends in `Done` or `Failed`. Nothing is kept between steps, and a
//! failure returns the tracker to `Idle`. Composed layouts are only mounted
//! for the duration of their capture.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::client::{ClientError, Receipt, Submission, SubmissionClient};
use crate::lab_catalog::{LabError, LabResults, ResultValue};
use crate::models::{DocumentKind, PatientRecord};
use crate::render::paginate::{assemble_pages, assemble_shifted};
use crate::render::raster::Capture;
use crate::render::{
    default_stamp, load_template, ComposeError, DocxConverter, LabReportComposer, Layout, Letterhead, OverlaySource, PageGeometry,
    PaginateError, PrescriptionComposer, RasterError, RasterOptions, Rasterizer, RenderSurface, TemplateConverter,
    TemplateError,
};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Composing,
    Rasterizing,
    Paginating,
    Uploading,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Composing => "composing",
            Stage::Rasterizing => "rasterizing",
            Stage::Paginating => "paginating",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// Current stage plus every transition taken so far.
#[derive(Debug, Default)]
pub struct StageTracker {
    current: Stage,
    history: Vec<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Stages entered, in order, across all runs.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn enter(&mut self, stage: Stage) {
        tracing::info!(from = %self.current, to = %stage, "Generation stage");
        self.current = stage;
        self.history.push(stage);
    }

    fn settle<T>(&mut self, result: &Result<T, GenerationError>) {
        match result {
            Ok(_) => self.enter(Stage::Done),
            Err(e) => {
                tracing::warn!(stage = %e.stage, error = %e.source, "Generation failed");
                self.enter(Stage::Failed);
                self.enter(Stage::Idle);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Lab(#[from] LabError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Paginate(#[from] PaginateError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// A failed run, tagged with the stage that failed.
#[derive(Debug, thiserror::Error)]
#[error("Document generation failed while {stage}: {source}")]
pub struct GenerationError {
    pub stage: Stage,
    #[source]
    pub source: StepError,
}

fn at<E: Into<StepError>>(stage: Stage) -> impl FnOnce(E) -> GenerationError {
    move |e| GenerationError { stage, source: e.into() }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientRef {
    Id(Uuid),
    Mrn(String),
}

#[derive(Debug, Clone)]
pub struct PrescriptionJob {
    pub patient: PatientRef,
    /// A `.docx` template on disk.
    pub template: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LabReportJob {
    pub patient: PatientRef,
    /// Entered results keyed by test name. Unentered tests print as "-".
    pub results: BTreeMap<String, ResultValue>,
    pub report_date: NaiveDate,
}

pub struct GeneratorOptions {
    /// Prescription stamp. Defaults to the bundled clinic stamp.
    pub stamp: Option<OverlaySource>,
    pub raster: RasterOptions,
    pub geometry: PageGeometry,
    pub letterhead: Letterhead,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            stamp: Some(default_stamp()),
            raster: RasterOptions::default(),
            geometry: PageGeometry::A4,
            letterhead: Letterhead::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct Generator {
    converter: Box<dyn TemplateConverter>,
    prescriptions: PrescriptionComposer,
    lab_reports: LabReportComposer,
    rasterizer: Rasterizer,
    geometry: PageGeometry,
    surface: RenderSurface,
    submitter: SubmissionClient,
}

impl Generator {
    pub fn new(options: GeneratorOptions, submitter: SubmissionClient) -> Self {
        Self {
            converter: Box::new(DocxConverter::new()),
            prescriptions: PrescriptionComposer::new(options.stamp),
            lab_reports: LabReportComposer::new(options.letterhead),
            rasterizer: Rasterizer::new(options.raster),
            geometry: options.geometry,
            surface: RenderSurface::new(),
            submitter,
        }
    }

    /// Swap the template converter.
    pub fn with_converter(mut self, converter: Box<dyn TemplateConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// The off-screen surface layouts are mounted on during capture.
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// Template + patient → single tall capture → shift-redraw PDF → upload.
    pub async fn prescription(
        &self,
        job: &PrescriptionJob,
        stages: &mut StageTracker,
    ) -> Result<Receipt, GenerationError> {
        let result = self.prescription_steps(job, stages).await;
        stages.settle(&result);
        result
    }

    async fn prescription_steps(
        &self,
        job: &PrescriptionJob,
        stages: &mut StageTracker,
    ) -> Result<Receipt, GenerationError> {
        stages.enter(Stage::Composing);
        let patient = self.fetch_patient(&job.patient).await.map_err(at(Stage::Composing))?;
        let body = load_template(self.converter.as_ref(), &job.template).map_err(at(Stage::Composing))?;
        let layout = self.prescriptions.compose(&patient, &body).map_err(at(Stage::Composing))?;

        stages.enter(Stage::Rasterizing);
        let capture = self.capture(layout).await.map_err(at(Stage::Rasterizing))?;

        stages.enter(Stage::Paginating);
        let title = format!("Prescription {}", patient.mrn);
        let (pdf, plan) = assemble_shifted(&title, &capture, &self.geometry).map_err(at(Stage::Paginating))?;
        tracing::info!(mrn = %patient.mrn, pages = plan.page_count(), "Prescription paginated");

        stages.enter(Stage::Uploading);
        let template_name = job
            .template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self.submitter
            .submit(Submission { kind: DocumentKind::Prescription, mrn: patient.mrn, pdf, template_name })
            .await
            .map_err(at(Stage::Uploading))
    }

    /// Two fixed pages, each captured alone and placed one per PDF page.
    pub async fn lab_report(&self, job: &LabReportJob, stages: &mut StageTracker) -> Result<Receipt, GenerationError> {
        let result = self.lab_report_steps(job, stages).await;
        stages.settle(&result);
        result
    }

    async fn lab_report_steps(
        &self,
        job: &LabReportJob,
        stages: &mut StageTracker,
    ) -> Result<Receipt, GenerationError> {
        stages.enter(Stage::Composing);
        let patient = self.fetch_patient(&job.patient).await.map_err(at(Stage::Composing))?;
        let order = patient
            .lab_order
            .as_ref()
            .ok_or(ComposeError::MissingField("lab order"))
            .map_err(at(Stage::Composing))?;
        let results = LabResults::validate(job.results.clone(), &order.tests, order.location)
            .map_err(at(Stage::Composing))?;
        let pages = self
            .lab_reports
            .compose(&patient, &results, job.report_date)
            .map_err(at(Stage::Composing))?;

        stages.enter(Stage::Rasterizing);
        let mut captures = Vec::with_capacity(pages.len());
        for page in pages {
            captures.push(self.capture(page).await.map_err(at(Stage::Rasterizing))?);
        }

        stages.enter(Stage::Paginating);
        let title = format!("Lab Report {}", patient.mrn);
        let pdf = assemble_pages(&title, &captures, &self.geometry).map_err(at(Stage::Paginating))?;

        stages.enter(Stage::Uploading);
        self.submitter
            .submit(Submission { kind: DocumentKind::LabReport, mrn: patient.mrn, pdf, template_name: None })
            .await
            .map_err(at(Stage::Uploading))
    }

    async fn fetch_patient(&self, patient: &PatientRef) -> Result<PatientRecord, ClientError> {
        match patient {
            PatientRef::Id(id) => self.submitter.api().get_patient(*id).await,
            PatientRef::Mrn(mrn) => self.submitter.api().find_patient_by_mrn(mrn).await,
        }
    }

    /// Mount, wait for overlays, capture. The mount is released on return.
    async fn capture(&self, layout: Layout) -> Result<Capture, RasterError> {
        let mounted = self.surface.mount(layout);
        let overlays = self.rasterizer.load_overlays(&mounted).await?;
        self.rasterizer.capture(&mounted, &overlays)
    }
}
