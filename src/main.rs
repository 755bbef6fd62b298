//! FrontDesk command line.
//!
//! Usage:
//!   frontdesk serve
//!   frontdesk prescribe --mrn <mrn> --template <file.docx> [--stamp <path|url>]
//!   frontdesk lab-report --mrn <mrn> --results <results.json> [--date <YYYY-MM-DD>]
//!   frontdesk login <role> | logout | pending [--role <role>]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use frontdesk_lib::api::{start_api_server, AppState};
use frontdesk_lib::client::{ApiClient, Receipt, SubmissionClient};
use frontdesk_lib::config::{self, AppConfig};
use frontdesk_lib::db::open_database;
use frontdesk_lib::generation::{
    Generator, GeneratorOptions, LabReportJob, PatientRef, PrescriptionJob, StageTracker,
};
use frontdesk_lib::lab_catalog::ResultValue;
use frontdesk_lib::models::Role;
use frontdesk_lib::render::{OverlaySource, RasterOptions};
use frontdesk_lib::session::SessionContext;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Client request timeout for the generation commands.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "frontdesk", version, about = "Clinic front desk: intake API and document generation")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Address `serve` listens on
    #[arg(long, global = true, env = "FRONTDESK_BIND", default_value = config::DEFAULT_BIND)]
    bind: SocketAddr,

    /// Data directory (database, stored documents, exports, session)
    #[arg(long, global = true, env = "FRONTDESK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// API base URL used by the client commands
    #[arg(long, global = true, env = "FRONTDESK_API_URL", default_value = config::DEFAULT_API_URL)]
    api_url: String,

    /// Key for signing document links. Random per process when unset.
    #[arg(long, global = true, env = "FRONTDESK_SIGNING_KEY", hide_env_values = true)]
    signing_key: Option<String>,

    /// Lifetime of a signed document link, in seconds
    #[arg(long, global = true, env = "FRONTDESK_LINK_TTL_SECS", default_value_t = config::DEFAULT_LINK_TTL_SECS)]
    link_ttl_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Generate and upload a prescription from a .docx template
    Prescribe {
        #[command(flatten)]
        patient: PatientArgs,

        /// Prescription template (.docx)
        #[arg(long)]
        template: PathBuf,

        /// Replacement stamp image: a file path or an http(s) URL
        #[arg(long)]
        stamp: Option<String>,

        /// Fetch a remote stamp during capture
        #[arg(long)]
        allow_cross_origin: bool,
    },

    /// Generate and upload a lab report from entered results
    LabReport {
        #[command(flatten)]
        patient: PatientArgs,

        /// JSON object of results keyed by test name
        #[arg(long)]
        results: Option<PathBuf>,

        /// Report date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Sign in as a role on this machine
    Login { role: Role },

    /// Clear the signed-in role
    Logout,

    /// List pending appointments for a role (defaults to the signed-in role)
    Pending {
        #[arg(long)]
        role: Option<Role>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PatientArgs {
    /// Appointment id
    #[arg(long)]
    id: Option<Uuid>,

    /// Medical record number
    #[arg(long)]
    mrn: Option<String>,
}

impl PatientArgs {
    fn to_ref(&self) -> Result<PatientRef, &'static str> {
        match (&self.id, &self.mrn) {
            (Some(id), _) => Ok(PatientRef::Id(*id)),
            (None, Some(mrn)) => Ok(PatientRef::Mrn(mrn.clone())),
            (None, None) => Err("either --id or --mrn is required"),
        }
    }
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        let mut cfg = AppConfig::with_data_dir(self.data_dir.clone().unwrap_or_else(config::app_data_dir));
        cfg.bind = self.bind;
        cfg.api_url = self.api_url.clone();
        cfg.link_ttl = Duration::from_secs(self.link_ttl_secs);
        if let Some(key) = &self.signing_key {
            cfg.signing_key = key.as_bytes().to_vec();
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    frontdesk_lib::init_tracing();

    let cli = Cli::parse();
    let cfg = cli.app_config();
    tracing::debug!(data_dir = %cfg.data_dir.display(), "{} v{}", config::APP_NAME, config::APP_VERSION);

    let result = match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::Prescribe { patient, template, stamp, allow_cross_origin } => {
            prescribe(&cfg, &patient, template, stamp, allow_cross_origin).await
        }
        Command::LabReport { patient, results, date } => lab_report(&cfg, &patient, results, date).await,
        Command::Login { role } => login(&cfg, role),
        Command::Logout => logout(&cfg),
        Command::Pending { role } => pending(&cfg, role).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(cfg: &AppConfig) -> CliResult {
    // Run migrations before accepting traffic
    open_database(&cfg.database_path())?;
    let state = AppState::from_config(cfg)?;
    let mut server = start_api_server(state, cfg.bind).await?;
    println!("Listening on {}", server.base_url());

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.wait().await;
    Ok(())
}

fn generator(cfg: &AppConfig, options: GeneratorOptions) -> Result<Generator, Box<dyn std::error::Error>> {
    let api = ApiClient::new(&cfg.api_url, CLIENT_TIMEOUT)?;
    Ok(Generator::new(options, SubmissionClient::new(api, cfg.exports_dir())))
}

fn stamp_source(stamp: String) -> OverlaySource {
    if stamp.starts_with("http://") || stamp.starts_with("https://") {
        OverlaySource::Remote(stamp)
    } else {
        OverlaySource::File(PathBuf::from(stamp))
    }
}

async fn prescribe(
    cfg: &AppConfig,
    patient: &PatientArgs,
    template: PathBuf,
    stamp: Option<String>,
    allow_cross_origin: bool,
) -> CliResult {
    let mut options = GeneratorOptions {
        raster: RasterOptions { allow_cross_origin, ..RasterOptions::default() },
        ..GeneratorOptions::default()
    };
    if let Some(stamp) = stamp {
        options.stamp = Some(stamp_source(stamp));
    }
    let generator = generator(cfg, options)?;
    let job = PrescriptionJob { patient: patient.to_ref()?, template };

    let mut stages = StageTracker::new();
    let receipt = generator.prescription(&job, &mut stages).await?;
    report(&receipt);
    Ok(())
}

async fn lab_report(
    cfg: &AppConfig,
    patient: &PatientArgs,
    results: Option<PathBuf>,
    date: Option<NaiveDate>,
) -> CliResult {
    let results: BTreeMap<String, ResultValue> = match results {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => BTreeMap::new(),
    };
    let generator = generator(cfg, GeneratorOptions::default())?;
    let job = LabReportJob {
        patient: patient.to_ref()?,
        results,
        report_date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
    };

    let mut stages = StageTracker::new();
    let receipt = generator.lab_report(&job, &mut stages).await?;
    report(&receipt);
    Ok(())
}

fn report(receipt: &Receipt) {
    println!("{}", receipt.message);
    match &receipt.local_copy {
        Some(path) => println!("Saved a copy to {}", path.display()),
        None => println!("Uploaded, but no local copy was saved"),
    }
}

fn login(cfg: &AppConfig, role: Role) -> CliResult {
    let mut session = SessionContext::load(cfg.session_path())?;
    session.login(role)?;
    println!("Signed in as {role}");
    Ok(())
}

fn logout(cfg: &AppConfig) -> CliResult {
    let mut session = SessionContext::load(cfg.session_path())?;
    session.logout()?;
    println!("Signed out");
    Ok(())
}

async fn pending(cfg: &AppConfig, role: Option<Role>) -> CliResult {
    let session = SessionContext::load(cfg.session_path())?;
    let role = role
        .or(session.role())
        .ok_or("Not signed in: run `frontdesk login <role>` or pass --role")?;

    let api = ApiClient::new(&cfg.api_url, CLIENT_TIMEOUT)?;
    let patients = api.pending(role).await?;
    println!("{} pending for {role}", patients.len());
    for p in patients {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            p.mrn,
            p.name,
            p.doctor,
            p.date.format("%d/%m/%Y"),
            p.time_in.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
