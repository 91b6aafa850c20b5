//! Mobility CDS - command-line front end
//!
//! Runs the decision-support core over JSON inputs. Results are printed as
//! JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use mobility_cds::fatigue::{
    run_session, FatigueDetection, FatigueDetector, FatigueMonitor, MetricSample,
};
use mobility_cds::patient::{extract_features, PatientProfile};
use mobility_cds::progression::{ExerciseSession, ProgressionEngine, ProgressionService};
use mobility_cds::protocols::{
    ClinicalProtocol, MatchContext, ProtocolCriteria, ProtocolMatcher, ProtocolService,
};
use mobility_cds::risk::RiskModel;
use mobility_cds::storage::{
    load_config, load_config_from, AssessmentStore, Database, EngineConfig, PatientStore,
    PersonalizationStore,
};

#[derive(Parser)]
#[command(name = "mobility-cds")]
#[command(about = "Clinical decision support for inpatient mobility therapy", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score risks and derive a prescription for a patient
    Assess {
        patient: PathBuf,
        /// Save the patient and assessment to the database
        #[arg(long)]
        store: bool,
    },
    /// Rank clinical protocols for a patient
    Match {
        patient: PathBuf,
        /// JSON list of protocols; the database is used when omitted
        #[arg(long)]
        protocols: Option<PathBuf>,
        /// Assign the best match if it reaches the auto-assignment score
        #[arg(long)]
        assign: bool,
    },
    /// Replay recorded samples through the fatigue detector
    ReplayFatigue {
        samples: PathBuf,
        #[arg(long)]
        patient_id: Option<Uuid>,
        /// Analyse only; do not store events or update personalization
        #[arg(long)]
        dry_run: bool,
    },
    /// Record a completed session and run progression
    Session { session: PathBuf },
    /// Advance the patient's protocol phase if it is complete
    Advance { patient_id: Uuid },
}

/// Protocol file entry: a protocol with optional matching criteria.
#[derive(Deserialize)]
struct ProtocolEntry {
    #[serde(flatten)]
    protocol: ClinicalProtocol,
    #[serde(default)]
    criteria: Option<ProtocolCriteria>,
}

#[derive(Serialize)]
struct ReplayReport {
    detections: Vec<FatigueDetection>,
    samples_seen: u64,
    duration_minutes: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;

    tracing::debug!("Mobility CDS v{}", config.version);

    match cli.command {
        Commands::Assess { patient, store } => {
            let profile: PatientProfile = read_json(&patient)?;
            let assessment = RiskModel::new().assess(&profile);

            if store {
                let db = open_database(&config)?;
                PatientStore::new(db.connection()).upsert(&profile)?;
                AssessmentStore::new(db.connection()).insert(&assessment)?;
                tracing::info!(patient_id = %profile.id, "Assessment stored");
            }

            print_json(&assessment)?;
        }
        Commands::Match {
            patient,
            protocols,
            assign,
        } => {
            let profile: PatientProfile = read_json(&patient)?;
            let flags = extract_features(&profile);
            let assessment = RiskModel::new().assess(&profile);

            let mut ctx = MatchContext::new(&flags);
            ctx.comorbidities = &profile.comorbidities;
            ctx.diagnosis_codes = &profile.diagnosis_codes;
            ctx.diagnosis_text = profile.admission_diagnosis.as_deref();
            ctx.assessment = Some(&assessment);

            let matcher = ProtocolMatcher::new(config.matching.clone());
            match protocols {
                Some(path) => {
                    let entries: Vec<ProtocolEntry> = read_json(&path)?;
                    let candidates: Vec<(ClinicalProtocol, Option<ProtocolCriteria>)> = entries
                        .into_iter()
                        .map(|e| (e.protocol, e.criteria))
                        .collect();
                    print_json(&matcher.rank(&candidates, &ctx))?;
                }
                None => {
                    let db = open_database(&config)?;
                    let personalization =
                        PersonalizationStore::new(db.connection()).get(profile.id)?;
                    ctx.personalization = personalization.as_ref();

                    let service = ProtocolService::new(db.connection(), matcher);
                    if assign {
                        match service.auto_assign(profile.id, &ctx) {
                            Some((best, assignment)) => {
                                print_json(&serde_json::json!({
                                    "match": best,
                                    "assignment": assignment,
                                }))?;
                            }
                            None => anyhow::bail!("no protocol qualified for assignment"),
                        }
                    } else {
                        print_json(&service.find_matches(&ctx))?;
                    }
                }
            }
        }
        Commands::ReplayFatigue {
            samples,
            patient_id,
            dry_run,
        } => {
            let samples: Vec<MetricSample> = read_json(&samples)?;
            let patient_id = patient_id.unwrap_or_else(Uuid::new_v4);
            let database = if dry_run {
                None
            } else {
                Some(open_database(&config)?)
            };
            let report = replay_fatigue(&config, database, samples, patient_id).await?;
            print_json(&report)?;
        }
        Commands::Session { session } => {
            let session: ExerciseSession = read_json(&session)?;
            let db = open_database(&config)?;
            let service = ProgressionService::new(
                db.connection(),
                ProgressionEngine::new(config.progression.clone()),
            );
            print_json(&service.process_completed_session(&session))?;
        }
        Commands::Advance { patient_id } => {
            let db = open_database(&config)?;
            let service =
                ProtocolService::new(db.connection(), ProtocolMatcher::new(config.matching.clone()));
            let advanced = service.check_and_advance(patient_id);
            print_json(&serde_json::json!({
                "advanced": advanced,
                "assignment": service.active_assignment(patient_id),
            }))?;
        }
    }

    Ok(())
}

async fn replay_fatigue(
    config: &EngineConfig,
    database: Option<Database>,
    samples: Vec<MetricSample>,
    patient_id: Uuid,
) -> anyhow::Result<ReplayReport> {
    let detector = FatigueDetector::new(config.fatigue.clone());
    let session = match &database {
        Some(db) => FatigueMonitor::new(db.connection(), detector.clone())
            .open_session(Uuid::new_v4(), patient_id),
        None => detector.open_session(Uuid::new_v4(), patient_id, None),
    };

    let (sample_tx, sample_rx) = mpsc::channel(64);
    let (detection_tx, mut detection_rx) = mpsc::channel(64);
    let task = tokio::spawn(run_session(
        detector,
        database,
        session,
        sample_rx,
        detection_tx,
    ));

    let collector = tokio::spawn(async move {
        let mut detections = Vec::new();
        while let Some(detection) = detection_rx.recv().await {
            detections.push(detection);
        }
        detections
    });

    for sample in samples {
        sample_tx
            .send(sample)
            .await
            .context("fatigue session ended early")?;
    }
    drop(sample_tx);

    let summary = task.await.context("fatigue session task failed")?;
    let detections = collector.await.context("detection collector failed")?;

    tracing::info!(
        samples = summary.samples_seen,
        detections = summary.detections,
        peak = ?summary.peak_severity,
        "Replay finished"
    );

    Ok(ReplayReport {
        detections,
        samples_seen: summary.samples_seen,
        duration_minutes: summary.duration_minutes,
    })
}

fn open_database(config: &EngineConfig) -> anyhow::Result<Database> {
    let path = config.database_path();
    Database::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
