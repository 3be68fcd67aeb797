use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use aquasentry::config::{ServeArgs, TrainingArgs};
use aquasentry::corpus::TrainingCorpus;
use aquasentry::predictor::Predictor;
use aquasentry::server::{run_server, ModelInfo};
use aquasentry::types::PartialSample;

/// Water-quality monitoring backend: potability prediction, sensor and
/// health-report records, and satellite scan analysis.
#[derive(Parser, Debug)]
#[command(name = "aquasentry", version, about)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Train the model and serve the HTTP API
    Serve(ServeArgs),
    /// Train and print the evaluation report as JSON
    Train {
        #[command(flatten)]
        training: TrainingArgs,
    },
    /// Train, then classify one sample given as `--set field=value`
    Predict {
        #[command(flatten)]
        training: TrainingArgs,
        /// A measured field, e.g. `--set ph=7.1`; repeatable
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    log_subscriber(cli.verbose).init();

    match cli.cmd {
        Cmd::Serve(args) => run_server(args).await,
        Cmd::Train { training } => {
            let (corpus, predictor) = train(&training)?;
            let info = ModelInfo::new(&predictor, &corpus);
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Cmd::Predict { training, fields } => {
            let input = parse_fields(&fields)?;
            let (_, predictor) = train(&training)?;
            let result = predictor.predict(&input);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

/// Only this crate's events pass, at a level set by the `-v` count. Logs
/// go to stderr so JSON on stdout stays pipeable.
fn log_subscriber(verbose: u8) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter = match verbose {
        0 => EnvFilter::new("aquasentry=info"),
        1 => EnvFilter::new("aquasentry=debug"),
        _ => EnvFilter::new("aquasentry=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
}

fn train(args: &TrainingArgs) -> Result<(TrainingCorpus, Predictor)> {
    let corpus = TrainingCorpus::from_csv_path(&args.data)?;
    let predictor = Predictor::train(&corpus, &args.params()).context("training potability model")?;
    Ok((corpus, predictor))
}

fn parse_fields(pairs: &[String]) -> Result<PartialSample> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("expected FIELD=VALUE, got {pair:?}");
        };
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("{name} is not a number"))?;
        parsed.push((name.trim(), Some(value)));
    }
    Ok(PartialSample::from_fields(parsed)?)
}
