//! CLI definition and dispatch.

use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_record_adapter::{CsvRecordAdapter, RecordPaths};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::{PaperBook, PaperBroker};
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::config_validation::{LIVE_PORT, PAPER_PORT, integer, number, validate_config};
use crate::domain::cost::CostModel;
use crate::domain::error::DeskError;
use crate::domain::live::{self as live_runner, LiveConfig, LiveOutcome};
use crate::domain::ohlcv::{HistoryDuration, HistoryRequest};
use crate::domain::order::OrderType;
use crate::domain::portfolio::construct_targets;
use crate::domain::risk::{RiskConfig, target_violations};
use crate::domain::signal::{Reversal, SignalGenerator};
use crate::domain::universe::{load_universe, parse_symbols};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::record_port::RecordPort;

#[derive(Parser, Debug)]
#[command(name = "revdesk", about = "Daily reversal desk: backtest and live rebalancing")]
pub struct Cli {
    /// Log filter (overridden by REVDESK_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Paper,
    Live,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay the strategy over historical bars
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "2 Y")]
        duration: String,
        #[arg(long, default_value = "1 day")]
        bar_size: String,
        #[arg(long, default_value_t = 5.0)]
        cost_bps: f64,
        /// Equity curve CSV; trades go next to it as <stem>_trades.csv.
        /// Defaults to outputs/backtest_<timestamp>.csv
        #[arg(long)]
        out: Option<PathBuf>,
        /// Comma-separated symbols overriding [universe] symbols
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Run one live decision cycle against the broker
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "20 D")]
        duration: String,
        #[arg(long, default_value = "1 day")]
        bar_size: String,
        #[arg(long, default_value_t = 5.0)]
        cost_bps: f64,
        /// Compute and log intended orders without submitting them
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value_t = Mode::Paper)]
        mode: Mode,
        /// Required together with --mode live to touch the live port
        #[arg(long)]
        i_understand_live: bool,
        /// Overrides [ibkr] port
        #[arg(long)]
        ibkr_port: Option<i64>,
    },
    /// Validate configuration and run a risk check on an all-long target set
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub const LOG_FILE: &str = "desk.log";

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Backtest { config, .. }
            | Command::Live { config, .. }
            | Command::Check { config } => config,
        }
    }
}

/// The `[logs] dir` of the config at `path`, or `logs` when unset. `None`
/// when the config cannot be read; the command reports that itself.
pub fn log_dir(path: &Path) -> Option<PathBuf> {
    let config = FileConfigAdapter::from_file(path).ok()?;
    let dir = config
        .get_string("logs", "dir")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "logs".to_string());
    Some(PathBuf::from(dir))
}

/// Install the global subscriber: stderr in `log_format`, plus a plain-text
/// copy appended to `<log_dir>/desk.log` when a directory is given.
///
/// The returned guard flushes the file writer when dropped.
pub fn init_tracing(
    log_level: &str,
    log_format: &str,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>, String> {
    let filter = std::env::var("REVDESK_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let console = match log_format.trim().to_lowercase().as_str() {
        "json" => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        "text" => fmt::layer().with_writer(std::io::stderr).boxed(),
        other => return Err(format!("unknown log format '{other}' (expected text or json)")),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|err| format!("cannot create log dir {}: {err}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| format!("cannot install log subscriber: {err}"))?;
    Ok(guard)
}

/// Timestamped default for `backtest --out`, so each run gets its own files.
pub fn default_backtest_out(now: NaiveDateTime) -> PathBuf {
    PathBuf::from(format!(
        "outputs/backtest_{}.csv",
        now.format("%Y%m%d_%H%M%S")
    ))
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(cli: Cli) -> Result<(), DeskError> {
    match cli.command {
        Command::Backtest {
            config,
            duration,
            bar_size,
            cost_bps,
            out,
            symbols,
        } => {
            let out = out.unwrap_or_else(|| default_backtest_out(Local::now().naive_local()));
            run_backtest(&config, &duration, &bar_size, cost_bps, &out, symbols.as_deref())
        }
        Command::Live {
            config,
            duration,
            bar_size,
            cost_bps,
            dry_run,
            mode,
            i_understand_live,
            ibkr_port,
        } => run_live(&LiveArgs {
            config,
            duration,
            bar_size,
            cost_bps,
            dry_run,
            mode,
            i_understand_live,
            ibkr_port,
        }),
        Command::Check { config } => run_check(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, DeskError> {
    tracing::info!(config = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_config(&adapter)?;
    Ok(adapter)
}

pub fn build_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, DeskError> {
    let defaults = RiskConfig::default();
    Ok(RiskConfig {
        max_position_pct: number(config, "risk", "max_position_pct", defaults.max_position_pct)?,
        max_gross_exposure: number(
            config,
            "risk",
            "max_gross_exposure",
            defaults.max_gross_exposure,
        )?,
    })
}

pub fn build_generator(config: &dyn ConfigPort) -> Result<Reversal, DeskError> {
    let defaults = Reversal::default();
    let lookback = integer(config, "strategy", "lookback", defaults.lookback as i64)?;
    let lookback = usize::try_from(lookback)
        .map_err(|_| DeskError::config_invalid("strategy", "lookback", "must be positive"))?;
    Ok(Reversal::new(
        lookback,
        number(config, "strategy", "threshold", defaults.threshold)?,
    ))
}

pub fn check_cost_bps(cost_bps: f64) -> Result<CostModel, DeskError> {
    if !cost_bps.is_finite() || cost_bps < 0.0 {
        return Err(DeskError::config_invalid(
            "cli",
            "cost_bps",
            "cost_bps must be a non-negative number",
        ));
    }
    Ok(CostModel::new(cost_bps))
}

pub fn build_backtest_config(
    config: &dyn ConfigPort,
    cost_bps: f64,
) -> Result<BacktestConfig, DeskError> {
    Ok(BacktestConfig {
        initial_capital: number(config, "backtest", "initial_capital", 100_000.0)?,
        risk: build_risk_config(config)?,
        cost: check_cost_bps(cost_bps)?,
    })
}

pub fn build_live_config(
    config: &dyn ConfigPort,
    cost_bps: f64,
    dry_run: bool,
    history: HistoryRequest,
) -> Result<LiveConfig, DeskError> {
    let order_type = match config.get_string("ibkr", "order_type") {
        Some(s) => OrderType::parse(&s)?,
        None => OrderType::Market,
    };
    let timeout = number(config, "ibkr", "fill_timeout_seconds", 60.0)?;
    Ok(LiveConfig {
        risk: build_risk_config(config)?,
        cost: check_cost_bps(cost_bps)?,
        order_type,
        fill_timeout: Duration::from_secs_f64(timeout),
        dry_run,
        history,
    })
}

pub fn resolve_symbols(
    symbols_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, DeskError> {
    let raw = match symbols_override {
        Some(s) => s.to_string(),
        None => config
            .get_string("universe", "symbols")
            .ok_or_else(|| DeskError::ConfigMissing {
                section: "universe".to_string(),
                key: "symbols".to_string(),
            })?,
    };
    Ok(parse_symbols(&raw)?)
}

/// Refuse live-port connections unless live mode is explicitly acknowledged,
/// and refuse live mode pointed at the paper port.
pub fn enforce_port_safety(mode: Mode, port: i64, understand_live: bool) -> Result<(), DeskError> {
    let refuse = |reason: String| {
        tracing::error!(port, mode = ?mode, "{reason}");
        Err(DeskError::config_invalid("ibkr", "port", reason))
    };
    if mode == Mode::Live && !understand_live {
        return refuse("refusing to run in live mode without --i-understand-live".to_string());
    }
    if port == LIVE_PORT && mode != Mode::Live {
        return refuse(format!(
            "refusing to use live port {LIVE_PORT} unless --mode live is set"
        ));
    }
    if mode == Mode::Live && port == PAPER_PORT {
        return refuse(format!(
            "--mode live selected but port is {PAPER_PORT} (paper); use {LIVE_PORT} or --mode paper"
        ));
    }
    Ok(())
}

fn data_adapter(config: &dyn ConfigPort) -> CsvAdapter {
    let path = config
        .get_string("data", "path")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "data".to_string());
    CsvAdapter::new(PathBuf::from(path))
}

fn run_backtest(
    config_path: &Path,
    duration: &str,
    bar_size: &str,
    cost_bps: f64,
    out: &Path,
    symbols_override: Option<&str>,
) -> Result<(), DeskError> {
    let config = load_config(config_path)?;
    let request = HistoryRequest::parse(duration, bar_size)?;
    let symbols = resolve_symbols(symbols_override, &config)?;
    let generator = build_generator(&config)?;
    let bt_config = build_backtest_config(&config, cost_bps)?;
    let paths = RecordPaths::backtest(out);
    if let Some(existing) = paths.files().find(|p| p.exists()) {
        return Err(DeskError::config_invalid(
            "cli",
            "out",
            format!("{} already exists; choose another --out", existing.display()),
        ));
    }

    tracing::info!(
        symbols = %symbols.join(","),
        duration = %request.duration,
        bar_size = %request.bar_size,
        cost_bps,
        "backtest requested"
    );

    let data = data_adapter(&config);
    let universe = load_universe(&data, &symbols, &request, generator.lookback())?;
    let result = backtest_engine::run_backtest(
        &universe.store,
        &universe.symbols,
        &generator,
        &bt_config,
    )?;
    let metrics = result.metrics();

    let records = CsvRecordAdapter::fresh(paths);
    records.append_equity(&result.equity_curve)?;
    records.append_trades(&result.trades)?;

    eprintln!("\n=== Backtest Results ===");
    eprintln!(
        "Symbols:          {} of {}",
        universe.symbols.len(),
        symbols.len()
    );
    eprintln!("Days:             {}", result.equity_curve.len());
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    match metrics.sharpe_ratio {
        Some(s) => eprintln!("Sharpe Ratio:     {:.2}", s),
        None => eprintln!("Sharpe Ratio:     n/a"),
    }
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Turnover:         {:.2}", metrics.total_turnover);
    eprintln!("Costs:            {:.2}", metrics.total_cost);
    eprintln!("Trades:           {}", metrics.trade_count);
    eprintln!("\nEquity curve written to: {}", out.display());
    eprintln!("Trades written to:       {}", records.paths().trades.display());
    Ok(())
}

struct LiveArgs {
    config: PathBuf,
    duration: String,
    bar_size: String,
    cost_bps: f64,
    dry_run: bool,
    mode: Mode,
    i_understand_live: bool,
    ibkr_port: Option<i64>,
}

/// Last close per symbol, for marking the paper book. Symbols without data
/// are left out.
fn latest_closes(
    data: &dyn DataPort,
    symbols: &BTreeSet<String>,
    request: &HistoryRequest,
) -> Result<BTreeMap<String, f64>, DeskError> {
    let mut closes = BTreeMap::new();
    for symbol in symbols {
        match data.fetch_bars(symbol, request) {
            Ok(bars) => {
                if let Some(last) = bars.last() {
                    closes.insert(symbol.clone(), last.close);
                }
            }
            Err(e) if e.is_symbol_local() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(closes)
}

fn run_live(args: &LiveArgs) -> Result<(), DeskError> {
    let config = load_config(&args.config)?;
    let port = match args.ibkr_port {
        Some(p) => p,
        None => integer(&config, "ibkr", "port", PAPER_PORT)?,
    };
    enforce_port_safety(args.mode, port, args.i_understand_live)?;

    let request = HistoryRequest::parse(&args.duration, &args.bar_size)?;
    let symbols = resolve_symbols(None, &config)?;
    let generator = build_generator(&config)?;
    let live_config = build_live_config(&config, args.cost_bps, args.dry_run, request)?;
    if matches!(request.duration, HistoryDuration::Days(n) if (n as usize) < generator.lookback()) {
        tracing::warn!(
            duration = %request.duration,
            lookback = generator.lookback(),
            "duration shorter than lookback; every symbol will be skipped"
        );
    }

    let book_path = PathBuf::from(
        config
            .get_string("paper", "book")
            .unwrap_or_else(|| "data/paper_book.csv".to_string()),
    );
    let starting_cash = number(&config, "paper", "cash", 100_000.0)?;
    let data = data_adapter(&config);

    let held: BTreeSet<String> = PaperBook::load(&book_path, starting_cash)?
        .positions
        .into_keys()
        .collect();
    let marked: BTreeSet<String> = symbols.iter().cloned().chain(held).collect();
    let marks = latest_closes(&data, &marked, &request)?;

    tracing::info!(
        host = %config.get_string("ibkr", "host").unwrap_or_else(|| "127.0.0.1".to_string()),
        port,
        client_id = config.get_int("ibkr", "client_id", 1),
        mode = ?args.mode,
        "using paper book broker"
    );
    let broker = PaperBroker::open(book_path, starting_cash, marks)?;

    let logs_dir = PathBuf::from(
        config
            .get_string("logs", "dir")
            .unwrap_or_else(|| "logs".to_string()),
    );
    let records = CsvRecordAdapter::new(RecordPaths::live(&logs_dir));
    let prior = records.read_snapshot_history()?;

    let outcome = live_runner::run_live(
        &data,
        &broker,
        &records,
        &generator,
        &symbols,
        &live_config,
        &prior,
        Local::now().naive_local(),
    )?;

    print_live_summary(&outcome, &live_config.cost, records.paths());
    Ok(())
}

fn print_live_summary(outcome: &LiveOutcome, cost: &CostModel, paths: &RecordPaths) {
    let longs = outcome.targets.len();
    eprintln!(
        "\n--- LIVE SUMMARY {} ---",
        outcome.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    eprintln!(
        "Target weights:  n_longs={}, per_name={:.4}",
        longs, outcome.targets.per_name
    );
    let signals: Vec<String> = outcome
        .signals
        .iter()
        .map(|(s, v)| format!("{s}={}", v.as_i8()))
        .collect();
    eprintln!("Signals:         {}", signals.join(" "));
    eprintln!("Orders placed:   {}", outcome.orders.len());
    let fills: Vec<String> = outcome
        .fills()
        .map(|t| format!("{} {} {} @ {:.2}", t.side, t.quantity, t.symbol, t.fill_price))
        .collect();
    eprintln!("Fills:           {}", fills.join(", "));
    if !outcome.failures.is_empty() {
        eprintln!("Failures:        {}", outcome.failures.len());
        for f in &outcome.failures {
            eprintln!("  - {f}");
        }
    }
    eprintln!(
        "Est. cost:       {:.2} ({:.4}% of value)",
        outcome.estimated_cost,
        100.0 * cost.cost_pct(outcome.turnover, outcome.snapshot.portfolio_value)
    );
    eprintln!("Portfolio value: {:.2}", outcome.snapshot.portfolio_value);
    if let Some(d) = outcome.snapshot.daily_pnl {
        eprintln!("Daily P&L:       {:+.2}", d);
    }
    if let Some(r) = outcome.snapshot.running_pnl {
        eprintln!("Running P&L:     {:+.2}", r);
    }
    if let Some(p) = &paths.positions {
        eprintln!("Position log:    {}", p.display());
    }
    eprintln!("Trade log:       {}", paths.trades.display());
    if let Some(p) = &paths.snapshots {
        eprintln!("P&L snapshots:   {}", p.display());
    }
}

fn run_check(config_path: &Path) -> Result<(), DeskError> {
    let config = load_config(config_path)?;
    eprintln!("Config validated: {}", config_path.display());

    let symbols = resolve_symbols(None, &config)?;
    let risk = build_risk_config(&config)?;
    let generator = build_generator(&config)?;
    eprintln!(
        "Universe:        {} ({} symbols)",
        symbols.join(", "),
        symbols.len()
    );
    eprintln!(
        "Strategy:        {} (lookback {})",
        generator.name(),
        generator.lookback()
    );
    eprintln!(
        "Risk:            max_position_pct={} max_gross_exposure={}",
        risk.max_position_pct, risk.max_gross_exposure
    );

    let targets = construct_targets(&symbols, &risk)?;
    let universe: BTreeSet<String> = symbols.iter().cloned().collect();
    let violations = target_violations(&targets.weights, Some(&universe), &risk);
    if violations.is_empty() {
        eprintln!(
            "Risk check passed: all-long targets at {:.4} per name, gross {:.4}",
            targets.per_name,
            targets.gross_exposure()
        );
        Ok(())
    } else {
        for v in &violations {
            eprintln!("  - {v}");
        }
        Err(DeskError::RiskLimitViolation { violations })
    }
}
