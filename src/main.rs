use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use riskcast::application::features::{
    PriceFeatureBuilder, SelectionMethod, SeriesFeatureBuilder, TabularFeatureBuilder, TabularSchema,
    select_features,
};
use riskcast::application::ml::ModelCatalog;
use riskcast::application::pipeline::{PipelineRun, run_credit, run_forecast};
use riskcast::application::reporting::{
    PipelineReport, TestEntry, print_approval_curve, print_classification_report,
    print_comparison, print_feature_importance, print_statuses,
};
use riskcast::config::PipelineConfig;
use riskcast::domain::market::PriceField;
use riskcast::domain::ml::{Dataset, EnsembleMethod, Task};
use riskcast::infrastructure::csv_loader::{self, load_price_bars, load_raw_table};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Multi-model forecasting and credit-risk pipeline", long_about = None)]
struct Cli {
    /// TOML config file; environment variables are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast a price series with the regression families
    Forecast {
        /// CSV of OHLCV bars (or any numeric table with --generic)
        #[arg(short, long)]
        input: PathBuf,

        /// Column to forecast
        #[arg(short, long, default_value = "close")]
        target: String,

        /// Bars ahead to forecast
        #[arg(long)]
        horizon: Option<usize>,

        /// Treat the input as a plain numeric table instead of OHLCV bars
        #[arg(long)]
        generic: bool,

        /// Models to train (comma separated); all regression models when omitted
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// mean, median or weighted
        #[arg(short, long)]
        ensemble: Option<String>,

        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Score loan applications with the classification families
    Credit {
        /// CSV of loan applications with a bad_flag column
        #[arg(short, long)]
        input: PathBuf,

        /// Models to train (comma separated); all classification models when omitted
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Keep only the k most informative features
        #[arg(long)]
        select: Option<usize>,

        /// rfe, kbest_f, kbest_mi or importance
        #[arg(long, default_value = "kbest_f")]
        selection_method: String,

        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => PipelineConfig::from_env(),
    }
}

fn print_run(task: Task, run: &PipelineRun) {
    println!();
    print_statuses(&run.registry);
    print_comparison(task, &run.registry.comparison());

    for model in run.registry.trained() {
        if let Some(report) = model.metrics.classification_report() {
            print_classification_report(&model.name, report);
        }
        if let Some(scores) = run.registry.feature_importance(&model.name) {
            print_feature_importance(&model.name, scores, 10);
        }
    }
    if !run.test_metrics.is_empty() {
        println!("\n🧪 Test partition ({} rows)", run.split.test.len());
        for (name, metrics) in &run.test_metrics {
            println!("  {:<22} {} = {}", name, metrics.headline_name(), metrics.headline());
        }
    }
    if let Some(ensemble) = &run.ensemble {
        println!(
            "\n🔗 {} ensemble of {} models, latest value {:.4}",
            ensemble.method,
            ensemble.contributors.len(),
            ensemble.latest().unwrap_or(f64::NAN)
        );
    }
    for curve in &run.approval_curves {
        print_approval_curve(curve);
    }
}

fn write_report(path: &PathBuf, task: Task, dataset: &Dataset, run: PipelineRun) -> Result<()> {
    let mut report = PipelineReport::new(task, dataset.len(), dataset.feature_names.clone(), &run.registry);
    report.test_metrics = run
        .test_metrics
        .iter()
        .map(|(model, metrics)| TestEntry {
            model: model.clone(),
            metric: metrics.headline_name().to_string(),
            value: metrics.headline().value(),
        })
        .collect();
    report.ensemble = run.ensemble;
    report.approval_curves = run.approval_curves;
    report.write(path)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Forecast {
            input,
            target,
            horizon,
            generic,
            models,
            ensemble,
            report,
        } => {
            if let Some(horizon) = horizon {
                config.training.horizon = horizon;
            }
            if !models.is_empty() {
                config.training.models = models;
            }
            if let Some(method) = ensemble {
                config.training.ensemble_method = EnsembleMethod::from_str(&method)?;
            }
            config.validate()?;

            let dataset = if generic {
                let table = load_raw_table(csv_loader::open(&input)?)?;
                let mut builder =
                    SeriesFeatureBuilder::new(&target, config.training.horizon, config.training.min_rows)?;
                builder.build(&table)?
            } else {
                let bars = load_price_bars(csv_loader::open(&input)?)?;
                let field = PriceField::from_str(&target)?;
                let mut builder =
                    PriceFeatureBuilder::new(field, config.training.horizon, config.training.min_rows)?;
                builder.build(&bars)?
            };
            info!(
                "Built {} rows x {} features, forecasting {} {} step(s) ahead",
                dataset.len(),
                dataset.n_features(),
                target,
                config.training.horizon
            );

            let run = run_forecast(&dataset, ModelCatalog::standard(), &config)
                .context("Forecast pipeline failed")?;
            print_run(Task::Regression, &run);
            if let Some(path) = report {
                write_report(&path, Task::Regression, &dataset, run)?;
            }
        }
        Commands::Credit {
            input,
            models,
            select,
            selection_method,
            report,
        } => {
            if !models.is_empty() {
                config.training.models = models;
            }
            config.validate()?;

            let table = load_raw_table(csv_loader::open(&input)?)?;
            let mut builder =
                TabularFeatureBuilder::new(TabularSchema::loan_default(), config.training.min_rows);
            let mut dataset = builder.fit_transform(&table)?;
            if let Some(k) = select {
                let method = SelectionMethod::from_str(&selection_method)?;
                let selection = select_features(&dataset, method, k, config.training.seed)?;
                for score in &selection.scores {
                    match score.p_value {
                        Some(p) => info!("Selected {} ({} score {:.4}, p = {:.4})", score.name, method, score.score, p),
                        None => info!("Selected {} ({} score {:.4})", score.name, method, score.score),
                    }
                }
                dataset = selection.dataset;
            }

            let run = run_credit(&dataset, ModelCatalog::standard(), &config)
                .context("Credit pipeline failed")?;
            print_run(Task::Classification, &run);
            if let Some(path) = report {
                write_report(&path, Task::Classification, &dataset, run)?;
            }
        }
    }
    Ok(())
}
