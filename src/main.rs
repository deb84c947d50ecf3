//! Return Forecaster - headless training and forecasting run
//!
//! Loads a daily price series from CSV, prints its insights, trains the
//! sequence regressor on normalized returns and prints the forecast as JSON.
//!
//! # Usage
//! ```sh
//! EPOCHS=20 cargo run --bin forecaster -- --input prices.csv
//! ```
//!
//! # Environment Variables
//! See `Config::from_env`. Command line flags take precedence.

use anyhow::Result;
use clap::Parser;
use return_forecaster::application::ml::training_orchestrator::TrainingEvent;
use return_forecaster::application::session::ForecastSession;
use return_forecaster::config::Config;
use return_forecaster::infrastructure::csv_source;
use return_forecaster::infrastructure::ml::rnn_backend::RnnBackendFactory;
use return_forecaster::infrastructure::observability::Metrics;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train on a price series and forecast future returns", long_about = None)]
struct Args {
    /// CSV file with `date` and `price` (or `close`) columns
    #[arg(short, long)]
    input: PathBuf,

    /// Training epochs (overrides EPOCHS)
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Input window length (overrides WINDOW_SIZE)
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Steps to forecast (overrides PREDICTION_HORIZON)
    #[arg(long)]
    horizon: Option<usize>,

    /// Train fraction of windows (overrides SPLIT_RATIO)
    #[arg(long)]
    split_ratio: Option<f64>,
}

impl Args {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(horizon) = self.horizon {
            config.prediction_horizon = horizon;
        }
        if let Some(split_ratio) = self.split_ratio {
            config.split_ratio = split_ratio;
        }
        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Return Forecaster {} starting...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = Config::from_env()?;
    args.apply(&mut config)?;
    info!(
        "Configuration loaded: window={}, horizon={}, split={}, epochs={}, batch={}",
        config.window_size,
        config.prediction_horizon,
        config.split_ratio,
        config.epochs,
        config.batch_size
    );

    let metrics = Metrics::new()?;
    let mut session = ForecastSession::new(
        config.clone(),
        Arc::new(RnnBackendFactory),
        metrics.clone(),
    );

    let observations = csv_source::load_observations(&args.input)?;
    let insights = session.load_series(observations)?;
    println!("{}", serde_json::to_string_pretty(insights)?);

    session.prepare_default_dataset()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TrainingEvent::Progress(p) => info!(
                    "Epoch {}/{} loss={:.6} ({:.0}%, {:.1}s)",
                    p.epoch, p.total_epochs, p.loss, p.progress_percent, p.elapsed_seconds
                ),
                TrainingEvent::Completed(summary) => info!(
                    "Training complete: loss={:.6} rmse={:.6}",
                    summary.final_loss, summary.evaluation.rmse
                ),
                TrainingEvent::Failed { message } => error!("Training failed: {}", message),
            }
        }
    });

    let outcome = session.train(config.epochs, &tx).await;
    drop(tx);
    if let Err(e) = listener.await {
        warn!("Progress listener stopped abnormally: {}", e);
    }
    outcome?;

    let evaluation = session.evaluate()?;
    info!(
        "Held-out evaluation: loss={:.6} mse={:.6} rmse={:.6}",
        evaluation.loss, evaluation.mse, evaluation.rmse
    );

    let forecast = session.predict()?;
    if forecast.is_degraded {
        warn!("Forecast is degraded (model could not produce a prediction)");
    }
    println!("{}", serde_json::to_string_pretty(&forecast)?);

    if config.observability_enabled {
        info!("Metrics:\n{}", metrics.render());
    }

    session.dispose();
    Ok(())
}
