use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use carelith_core::delivery::CONSOLE_DELIVERY_TARGET;
use carelith_core::{
    Caller, CoreConfig, DoctorId, GrantId, HospitalId, PatientId, PortalService, UploadRequest,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "carelith")]
#[command(about = "Carelith patient portal CLI")]
struct Cli {
    /// Acting party, as `doctor:<id>` or `patient:<id>`
    #[arg(long = "as", global = true, value_parser = parse_caller)]
    caller: Option<Caller>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Request an access code for a patient's record (doctor)
    RequestAccess {
        patient_id: String,
        /// Organisation the record is shared with
        #[arg(long)]
        destination_org: Option<String>,
    },
    /// Submit the code a patient shared (doctor)
    Verify { grant_id: String, code: String },
    /// Report whether the caller may currently read a patient's record
    Check { patient_id: String },
    /// Print a patient's documents as a FHIR searchset bundle
    Documents { patient_id: String },
    /// Print document summaries split into mine and others
    Records { patient_id: String },
    /// Attach a file to a patient's record (doctor)
    Upload {
        patient_id: String,
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// List a patient's access grants (patient)
    Grants { patient_id: String },
    /// Print a patient's medical history (patient, encounters, observations)
    History { patient_id: String },
}

fn parse_caller(value: &str) -> Result<Caller, String> {
    let (role, id) = value
        .split_once(':')
        .ok_or_else(|| "expected `doctor:<id>` or `patient:<id>`".to_string())?;
    match role.trim().to_ascii_lowercase().as_str() {
        "doctor" => id.parse::<DoctorId>().map(Caller::Doctor).map_err(|e| e.to_string()),
        "patient" => id.parse::<PatientId>().map(Caller::Patient).map_err(|e| e.to_string()),
        other => Err(format!("unknown role: {other}")),
    }
}

/// `RUST_LOG` when set, else core warnings only. Console-delivered access codes always show, since
/// `verify` needs them.
fn log_filter(rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    let base = match rust_log {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::new("carelith_core=warn"),
    };
    Ok(base.add_directive(format!("{CONSOLE_DELIVERY_TARGET}=info").parse()?))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::registry()
        .with(log_filter(rust_log.as_deref())?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'carelith --help' for commands");
        return Ok(());
    };
    let caller = cli
        .caller
        .context("--as doctor:<id> or --as patient:<id> is required")?;

    let cfg = Arc::new(CoreConfig::from_lookup(|key| std::env::var(key).ok())?);
    let portal = PortalService::open(cfg)?;

    match command {
        Commands::RequestAccess {
            patient_id,
            destination_org,
        } => {
            let destination = destination_org
                .map(|org| org.parse::<HospitalId>())
                .transpose()?;
            let issued = portal.request_access(&caller, &patient_id.parse()?, destination)?;
            print_json(&serde_json::json!({
                "grant_id": issued.grant_id.to_string(),
                "expires_at": issued.expires_at.to_rfc3339(),
                "delivered_via": issued.delivered_via.to_string(),
                "superseded": issued.superseded.iter().map(|g| g.to_string()).collect::<Vec<_>>(),
            }))?;
        }
        Commands::Verify { grant_id, code } => {
            let grant_id = GrantId::parse(&grant_id)?;
            let outcome = portal.verify_otp(&caller, &grant_id, &code)?;
            println!("{}", outcome.as_str());
        }
        Commands::Check { patient_id } => {
            let authorized = portal.check_access(&caller, &patient_id.parse()?)?;
            println!("{}", if authorized { "authorized" } else { "not authorized" });
        }
        Commands::Documents { patient_id } => {
            let documents = portal.document_bundle(&caller, &patient_id.parse()?)?;
            if let Some(error) = &documents.fetch_error {
                eprintln!("Could not load documents: {error}");
            }
            print_json(&documents.bundle)?;
        }
        Commands::Records { patient_id } => {
            print_json(&portal.record_summaries(&caller, &patient_id.parse()?)?)?;
        }
        Commands::Upload {
            patient_id,
            file,
            description,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("upload path has no file name")?;
            let outcome = portal.upload_document(
                &caller,
                &patient_id.parse()?,
                UploadRequest {
                    file_name,
                    bytes,
                    description,
                },
            )?;
            print_json(&outcome)?;
            if !outcome.is_success() {
                anyhow::bail!("upload failed with status {}", outcome.status);
            }
        }
        Commands::Grants { patient_id } => {
            print_json(&portal.patient_grants(&caller, &patient_id.parse()?)?)?;
        }
        Commands::History { patient_id } => {
            print_json(&portal.medical_history(&caller, &patient_id.parse()?)?)?;
        }
    }

    Ok(())
}
