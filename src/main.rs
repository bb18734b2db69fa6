//! PE Risk: Preeclampsia risk scoring
//!
//! Main entry point for the command-line application.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pe_risk::adapters::model::{load_model, ModelArtifact};
use pe_risk::adapters::table::{read_table_path, write_report_path};
use pe_risk::application::{PredictionService, ServiceConfig};
use pe_risk::config::{AppConfig, LogMode};
use pe_risk::domain::schema::BINARY_FEATURES;
use pe_risk::ports::RiskModel;
use pe_risk::{DerivedFeature, RawRecord};

#[derive(Debug, Parser)]
#[command(
    name = "pe-risk",
    version,
    about = "Preeclampsia risk scoring from routine clinical measurements"
)]
struct Cli {
    /// Model file or directory holding model.json [env: PE_RISK_MODEL_PATH]
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// LMR denominator: lymphocyte_monocyte or lymphocyte_wbc [env: PE_RISK_LMR_DEFINITION]
    #[arg(long, global = true)]
    lmr: Option<String>,

    /// Manifest check: auto, required or off [env: PE_RISK_VERIFY_MANIFEST]
    #[arg(long, global = true)]
    verify_manifest: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Score one subject
    Predict(PredictArgs),
    /// Score every row of a CSV file
    Batch(BatchArgs),
    /// List the features the model expects, in order
    Schema,
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Measurement as NAME=VALUE (repeatable)
    #[arg(long = "value", value_name = "NAME=VALUE")]
    values: Vec<String>,

    /// JSON object of measurements; --value entries take precedence
    #[arg(long)]
    input: Option<PathBuf>,

    /// Subject reference to attach to the assessment
    #[arg(long)]
    subject: Option<String>,

    /// Print the assessment as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// CSV file with one subject per row
    #[arg(long)]
    input: PathBuf,

    /// Destination CSV with probability and risk columns appended
    #[arg(long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    // Logs never go to stdout; it carries the reports.
    let (writer, _guard) = match config.log.mode {
        LogMode::File => {
            if let Some(parent) = config.log.file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating log directory {parent:?}"))?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log.file)
                .with_context(|| format!("opening log file {:?}", config.log.file))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    let model = Arc::new(load_model(&config.model_path, config.manifest_policy)?);

    match cli.command {
        Commands::Predict(args) => predict(model, &config, args),
        Commands::Batch(args) => batch(model, &config, &args),
        Commands::Schema => {
            print_schema(&model);
            Ok(())
        }
    }
}

/// Environment first, then command-line overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if let Some(path) = &cli.model {
        config.model_path = path.clone();
    }
    if let Some(lmr) = &cli.lmr {
        config.lmr = lmr.parse()?;
    }
    if let Some(policy) = &cli.verify_manifest {
        config.manifest_policy = policy.parse()?;
    }
    Ok(config)
}

fn parse_value(pair: &str) -> Result<(String, f64)> {
    let Some((name, value)) = pair.split_once('=') else {
        bail!("expected NAME=VALUE, got '{pair}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("missing name in '{pair}'");
    }
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("value for {name} is not a number: '{value}'"))?;
    if !value.is_finite() {
        bail!("value for {name} must be finite");
    }
    Ok((name.to_string(), value))
}

fn build_record(args: &PredictArgs) -> Result<RawRecord> {
    let mut record = RawRecord::new();
    for pair in &args.values {
        let (name, value) = parse_value(pair)?;
        if !record.insert(&name, value) {
            tracing::warn!("{} given more than once; keeping first value", name);
        }
    }
    if let Some(path) = &args.input {
        let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
        let from_file: RawRecord = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("{path:?} is not a JSON object of numbers"))?;
        for (name, value) in from_file.iter() {
            record.insert(name, value);
        }
    }
    if record.is_empty() {
        bail!("no measurements given; use --value NAME=VALUE or --input FILE");
    }
    Ok(record)
}

fn predict(model: Arc<ModelArtifact>, config: &AppConfig, args: PredictArgs) -> Result<()> {
    let record = build_record(&args)?;
    let service = PredictionService::new(model, ServiceConfig { lmr: config.lmr });

    let mut assessment = service.predict_one(&record)?;
    if let Some(subject) = args.subject {
        assessment = assessment.with_subject(subject);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    if let Some(subject) = &assessment.subject_id {
        println!("Subject:      {subject}");
    }
    println!("PE risk:      {:.2}%", assessment.percent());
    println!(
        "Risk level:   {} ({})",
        assessment.risk_level,
        assessment.risk_level.description()
    );
    if !assessment.defaulted_features.is_empty() {
        println!("Defaulted to 0: {}", assessment.defaulted_features.join(", "));
    }
    Ok(())
}

fn batch(model: Arc<ModelArtifact>, config: &AppConfig, args: &BatchArgs) -> Result<()> {
    let table = read_table_path(&args.input)
        .with_context(|| format!("reading batch input {:?}", args.input))?;
    let service = PredictionService::new(model, ServiceConfig { lmr: config.lmr });

    let report = service.predict_batch(&table.records);
    write_report_path(&args.output, &table, &report)
        .with_context(|| format!("writing report {:?}", args.output))?;

    println!("{}", report.summary());
    println!("Results written to {}", args.output.display());
    Ok(())
}

fn print_schema(model: &ModelArtifact) {
    println!("{} model, {} features:", model.name(), model.schema().len());
    for (i, name) in model.schema().iter().enumerate() {
        let note = if DerivedFeature::from_name(name).is_some() {
            "  (derived)"
        } else if BINARY_FEATURES.contains(&name) {
            "  (0/1)"
        } else {
            ""
        };
        println!("{:>3}  {name}{note}", i + 1);
    }
}
