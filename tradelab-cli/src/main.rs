//! TradeLab CLI: backtests, walk-forward optimization and the live signal service.
//!
//! Commands:
//! - `backtest`: run strategies over CSV history and print trade metrics
//! - `optimize`: walk-forward optimization from a TOML config
//! - `live`: reconcile and run strategies from a TOML file, replaying CSV bars
//! - `strategies`: list registered strategies and their parameters

mod telemetry;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use tradelab_core::config::{parse_strategy_list, StrategyConfig};
use tradelab_core::data::CsvStore;
use tradelab_core::engine::EngineConfig;
use tradelab_core::params::{ParamKind, ParamSet, ParamValue};
use tradelab_core::risk::RiskConfig;
use tradelab_core::strategy::descriptors;
use tradelab_live::{
    CancellationToken, ConsoleHandler, JsonlSignalSink, LiveConfig, Orchestrator, ReplayFeed, SignalHandler,
    TomlConfigSource,
};
use tradelab_runner::{optimize, run_single_backtest, BacktestReport, ObjectiveMetric, OptimizationReport, OptimizeConfig};

#[derive(Parser)]
#[command(name = "tradelab", about = "TradeLab: strategy backtesting, optimization and live signals")]
struct Cli {
    /// Log filter, e.g. `info` or `tradelab_live=debug`. RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one strategy, or every `[[strategy]]` in a TOML file.
    Backtest {
        /// TOML file with `[[strategy]]` tables.
        #[arg(long, conflicts_with_all = ["strategy", "instrument"])]
        config: Option<PathBuf>,

        /// Strategy id (see `tradelab strategies`).
        #[arg(long, requires = "instrument")]
        strategy: Option<String>,

        #[arg(long)]
        instrument: Option<String>,

        /// Parameter override, repeatable: `--param sma_period=20`.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,

        #[arg(long, value_enum, default_value_t = RiskKind::Fixed)]
        risk: RiskKind,

        /// Candle interval label, e.g. `1hour`.
        #[arg(long)]
        interval: Option<String>,

        /// Directory holding `<INSTRUMENT>.csv` files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        #[arg(long, default_value = "calmar")]
        metric: ObjectiveMetric,

        /// Starting capital. Defaults to the engine default.
        #[arg(long)]
        capital: Option<f64>,

        /// Write the full reports as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Walk-forward optimization.
    Optimize {
        /// Optimization TOML file.
        config: PathBuf,

        /// Write the report (windows, best params, OOS ledger) as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the live reconciliation loop until Ctrl-C.
    Live {
        /// Live TOML file. Its `[[strategy]]` list is re-read every poll.
        config: PathBuf,
    },
    /// List registered strategies and their parameters.
    Strategies,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RiskKind {
    Fixed,
    Atr,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Backtest {
            config,
            strategy,
            instrument,
            params,
            risk,
            interval,
            data_dir,
            metric,
            capital,
            output,
        } => {
            let configs = match (config, strategy, instrument) {
                (Some(path), _, _) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    parse_strategy_list(&text).with_context(|| format!("invalid strategy list {}", path.display()))?
                }
                (None, Some(strategy), Some(instrument)) => {
                    let risk = match risk {
                        RiskKind::Fixed => RiskConfig::default(),
                        RiskKind::Atr => RiskConfig::atr(),
                    };
                    let mut config = StrategyConfig::new(strategy, instrument)
                        .with_params(params.into_iter().collect::<ParamSet>())
                        .with_risk(risk);
                    config.interval = interval;
                    vec![config]
                }
                _ => bail!("pass either --config or --strategy with --instrument"),
            };
            let mut engine = EngineConfig::default();
            if let Some(capital) = capital {
                engine = engine.with_capital(capital);
            }
            run_backtest_cmd(&configs, &data_dir, &engine, metric, output.as_deref())
        }
        Commands::Optimize { config, output } => run_optimize_cmd(&config, output.as_deref()),
        Commands::Live { config } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(run_live_cmd(config))
        }
        Commands::Strategies => {
            print_strategies();
            Ok(())
        }
    }
}

fn parse_param(arg: &str) -> Result<(String, ParamValue), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{arg}'"))?;
    let value = if let Ok(v) = raw.parse::<i64>() {
        ParamValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        ParamValue::Float(v)
    } else {
        ParamValue::Text(raw.to_string())
    };
    Ok((name.trim().to_string(), value))
}

fn run_backtest_cmd(
    configs: &[StrategyConfig],
    data_dir: &Path,
    engine: &EngineConfig,
    metric: ObjectiveMetric,
    output: Option<&Path>,
) -> Result<()> {
    if configs.is_empty() {
        bail!("no strategies to run");
    }
    let store = CsvStore::new(data_dir);
    let mut reports = Vec::with_capacity(configs.len());
    for config in configs {
        let report = run_single_backtest(config, &store, engine, metric)
            .with_context(|| format!("backtest failed for {}", config.identity()))?;
        print_backtest(&report);
        reports.push(report);
    }
    if let Some(path) = output {
        write_json(path, &reports)?;
        println!("Reports saved to: {}", path.display());
    }
    Ok(())
}

fn run_optimize_cmd(path: &Path, output: Option<&Path>) -> Result<()> {
    let config = OptimizeConfig::load(path).with_context(|| format!("invalid optimization config {}", path.display()))?;
    let report = optimize(&config).context("optimization failed")?;
    print_optimization(&report);
    if let Some(out) = output {
        write_json(out, &report)?;
        println!("Report saved to: {}", out.display());
    }
    Ok(())
}

async fn run_live_cmd(path: PathBuf) -> Result<()> {
    let config = LiveConfig::load(&path).with_context(|| format!("invalid live config {}", path.display()))?;

    let feed = Arc::new(
        ReplayFeed::new(CsvStore::new(&config.data_dir), config.replay_delay()).with_capacity(config.channel_capacity),
    );
    let mut handlers: Vec<Arc<dyn SignalHandler>> = vec![Arc::new(ConsoleHandler)];
    if let Some(log) = &config.signal_log {
        let sink = JsonlSignalSink::open(log)
            .await
            .with_context(|| format!("failed to open signal log {}", log.display()))?;
        handlers.push(Arc::new(sink));
    }

    let source = Arc::new(TomlConfigSource::new(&path));
    let mut orchestrator = Orchestrator::new(source, feed, handlers, config.orchestrator_settings());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            trigger.cancel();
        }
    });

    let report = orchestrator.run(shutdown).await;
    info!(stopped = report.stopped, aborted = report.aborted, "live service exited");
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn print_backtest(report: &BacktestReport) {
    let result = &report.result;
    let m = &report.metrics;
    println!();
    println!("=== Backtest: {} on {} ===", result.strategy_id, result.instrument);
    if let (Some(first), Some(last)) = (result.first_timestamp, result.last_timestamp) {
        println!("Period:         {first} to {last}");
    }
    println!("Trades:         {}", m.trade_count);
    println!("Start Capital:  {:.2}", result.initial_capital);
    println!("End Equity:     {:.2}", result.ending_equity);
    println!("Net PnL:        {:.2}", m.pnl);
    println!();
    println!("--- Performance ---");
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("SQN:            {:.2}", m.sqn);
    println!("Objective ({}): {:.4}", report.metric, report.objective);
    if !m.valid {
        println!();
        println!("WARNING: fewer than two trades, ratios are not meaningful");
    }
}

fn print_optimization(report: &OptimizationReport) {
    println!();
    println!("=== Walk-Forward: {} on {} ===", report.strategy, report.instruments.join(", "));
    println!(
        "Windows:        {} ({} with a solution)",
        report.windows.len(),
        report.successful_windows()
    );
    println!();
    println!("{:<4} {:<13} {:<13} {:<11} {:>7} {:>10}  Best params", "#", "Train", "Test", "Status", "Trials", "OOS PnL");
    println!("{}", "-".repeat(80));
    for w in &report.windows {
        let params = w
            .best_params
            .as_ref()
            .map(|p| p.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" "))
            .unwrap_or_else(|| w.error.clone().unwrap_or_else(|| "-".into()));
        let oos = w.out_of_sample.as_ref().map_or(0.0, |m| m.pnl);
        println!(
            "{:<4} {:<13} {:<13} {:<11} {:>7} {:>10.2}  {}",
            w.index,
            format!("{}..{}", w.train.start, w.train.end),
            format!("{}..{}", w.test.start, w.test.end),
            format!("{:?}", w.status),
            format!("{}/{}", w.trials_complete, w.trials_run),
            oos,
            params
        );
    }
    println!();
    println!("--- Out-of-sample ledger ---");
    println!("Trades:         {}", report.ledger.len());
    println!("Net PnL:        {:.2}", report.oos_metrics.pnl);
    println!("Max Drawdown:   {:.2}%", report.oos_metrics.max_drawdown * 100.0);
    println!("Objective:      {:.4}", report.oos_objective);
}

fn print_strategies() {
    for descriptor in descriptors() {
        println!("{}  {}", descriptor.id, descriptor.description);
        for spec in (descriptor.param_specs)() {
            let range = match &spec.kind {
                ParamKind::Int { low, high, step } => format!("int [{low}, {high}] step {step}"),
                ParamKind::Float { low, high, step } => format!("float [{low}, {high}] step {step}"),
                ParamKind::Text => "text".to_string(),
            };
            let fixed = if spec.optimizable { "" } else { " (fixed)" };
            println!("    {:<24} default {:<8} {range}{fixed}", spec.name, spec.default.to_string());
        }
    }
}
