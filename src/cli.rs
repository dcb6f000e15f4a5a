//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::{read_period_returns, read_returns_series};
use crate::adapters::fallback_store::FallbackStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_store::{JsonFileStore, write_curves_csv, write_history_json};
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::text_report::TextReportAdapter;
use crate::domain::allocation::{RawProposal, TargetAllocation, normalize, normalize_response};
use crate::domain::calendar::{trading_weeks, week_label};
use crate::domain::config_validation::{
    backtest_dates, validate_backtest_config, validate_portfolio_config, validate_trading_config,
};
use crate::domain::error::TraderError;
use crate::domain::execution::execute_plan;
use crate::domain::ledger::{Ledger, market_average_return};
use crate::domain::metrics;
use crate::domain::portfolio::PortfolioState;
use crate::domain::rebalance::{RebalanceConfig, rebalance, snapshot_from_balance};
use crate::domain::report::WeeklyReport;
use crate::ports::broker_port::MarketDataPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::security_port::SecurityNamePort;
use crate::ports::store_port::{AllocationStore, StateStore};

pub const DEFAULT_STATE_PATH: &str = "portfolio_state.json";
pub const DEFAULT_INITIAL_CASH: f64 = 10_000_000.0;
pub const DEFAULT_STRATEGY: &str = "Balanced approach";
pub const DEFAULT_BACKTEST_CAPITAL: f64 = 100_000_000.0;
pub const DEFAULT_OUTPUT_DIR: &str = "./results";

#[derive(Parser, Debug)]
#[command(name = "threes-trader", about = "Weekly portfolio rebalancer and evaluator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebalance the persisted portfolio toward a producer allocation
    Rebalance {
        #[arg(short, long)]
        config: PathBuf,
        /// Allocation producer output (JSON, optionally inside prose)
        #[arg(short, long)]
        allocation: PathBuf,
        /// Quote snapshot CSV: code,price[,name]
        #[arg(short, long)]
        prices: PathBuf,
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Plan only; no orders, no state write
        #[arg(long)]
        dry_run: bool,
    },
    /// Store a normalized allocation for later execution
    Schedule {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        allocation: PathBuf,
        #[arg(short, long)]
        date: NaiveDate,
    },
    /// Execute the pending scheduled allocation for a date
    Execute {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        prices: PathBuf,
        /// Defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Producer output used when nothing is scheduled
        #[arg(short, long)]
        allocation: Option<PathBuf>,
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Replay weekly proposals against realized returns
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// JSON object keyed by week Monday (YYYY-MM-DD)
        #[arg(long)]
        proposals: PathBuf,
        /// CSV: date,code,return
        #[arg(long)]
        returns: PathBuf,
    },
    /// Score a series of period returns
    Evaluate {
        /// CSV with a `return` column
        #[arg(long)]
        returns: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Rebalance {
            config,
            allocation,
            prices,
            report,
            dry_run,
        } => run_rebalance(&config, &allocation, &prices, report.as_deref(), dry_run),
        Command::Schedule {
            config,
            allocation,
            date,
        } => run_schedule(&config, &allocation, date),
        Command::Execute {
            config,
            prices,
            date,
            allocation,
            report,
        } => run_execute(
            &config,
            &prices,
            date.unwrap_or_else(|| Local::now().date_naive()),
            allocation.as_deref(),
            report.as_deref(),
        ),
        Command::Backtest {
            config,
            proposals,
            returns,
        } => run_backtest(&config, &proposals, &returns),
        Command::Evaluate { returns } => run_evaluate(&returns),
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    FileConfigAdapter::from_file(path).map_err(|e| TraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Trading limits from `[trading]`. Call after [`validate_trading_config`].
pub fn build_rebalance_config(config: &dyn ConfigPort) -> RebalanceConfig {
    let defaults = RebalanceConfig::default();
    RebalanceConfig {
        max_positions: config
            .get_int("trading", "max_positions", defaults.max_positions as i64)
            .max(1) as usize,
        cash_reserve_fraction: config.get_double(
            "trading",
            "cash_reserve",
            defaults.cash_reserve_fraction,
        ),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_dir: PathBuf,
    pub max_positions: usize,
    pub initial_strategy: String,
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestSettings, TraderError> {
    validate_backtest_config(config)?;
    let (start_date, end_date) = backtest_dates(config)?;

    Ok(BacktestSettings {
        initial_capital: config.get_double("backtest", "initial_capital", DEFAULT_BACKTEST_CAPITAL),
        start_date,
        end_date,
        output_dir: PathBuf::from(
            config
                .get_string("backtest", "output_dir")
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        ),
        max_positions: build_rebalance_config(config).max_positions,
        initial_strategy: initial_strategy(config),
    })
}

fn initial_strategy(config: &dyn ConfigPort) -> String {
    config
        .get_string("portfolio", "initial_strategy")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string())
}

/// JSON file store, fronted by the database store when one is given.
pub fn build_state_store(
    config: &dyn ConfigPort,
    db: Option<&dyn AllocationBackend>,
) -> Box<dyn StateStore> {
    let path = config
        .get_string("portfolio", "state_path")
        .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string());
    let json = Box::new(JsonFileStore::new(path));

    match db {
        Some(db) => Box::new(FallbackStore::new(db.state_store(), json)),
        None => json,
    }
}

/// Relational store used for scheduled allocations and stock names.
pub trait AllocationBackend: AllocationStore + SecurityNamePort {
    fn names(&self) -> &dyn SecurityNamePort;

    /// State store over the same connection pool.
    fn state_store(&self) -> Box<dyn StateStore>;
}

#[cfg(feature = "sqlite")]
impl AllocationBackend for crate::adapters::sqlite_adapter::SqliteStore {
    fn names(&self) -> &dyn SecurityNamePort {
        self
    }

    fn state_store(&self) -> Box<dyn StateStore> {
        Box::new(self.clone())
    }
}

#[cfg(feature = "postgres")]
impl AllocationBackend for crate::adapters::postgres_adapter::PostgresStore {
    fn names(&self) -> &dyn SecurityNamePort {
        self
    }

    fn state_store(&self) -> Box<dyn StateStore> {
        Box::new(self.clone())
    }
}

/// `[postgres]` takes precedence over `[sqlite]`; `None` when neither is set.
pub fn build_database(
    config: &dyn ConfigPort,
) -> Result<Option<Box<dyn AllocationBackend>>, TraderError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            let store = crate::adapters::postgres_adapter::PostgresStore::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Some(Box::new(store)));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        if config.get_string("sqlite", "path").is_some() {
            let store = crate::adapters::sqlite_adapter::SqliteStore::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Some(Box::new(store)));
        }
    }

    let _ = config;
    Ok(None)
}

fn require_database(config: &dyn ConfigPort) -> Result<Box<dyn AllocationBackend>, TraderError> {
    build_database(config)?.ok_or_else(|| TraderError::ConfigMissing {
        section: "sqlite".into(),
        key: "path".into(),
    })
}

fn load_or_init_state(
    store: &dyn StateStore,
    config: &dyn ConfigPort,
) -> Result<PortfolioState, TraderError> {
    match store.load()? {
        Some(state) => {
            info!(cash = state.cash, positions = state.position_count(), "state loaded");
            Ok(state)
        }
        None => {
            let cash = config.get_double("portfolio", "initial_cash", DEFAULT_INITIAL_CASH);
            info!(cash, "no saved state, starting all cash");
            Ok(PortfolioState::new(cash, &initial_strategy(config)))
        }
    }
}

fn run_rebalance(
    config_path: &Path,
    allocation_path: &Path,
    prices_path: &Path,
    report_path: Option<&Path>,
    dry_run: bool,
) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_trading_config(&config)?;
    validate_portfolio_config(&config)?;
    let rebalance_config = build_rebalance_config(&config);

    let db = build_database(&config)?;
    let store = build_state_store(&config, db.as_deref());
    let state = load_or_init_state(store.as_ref(), &config)?;
    let broker = PaperBroker::from_quotes_csv(prices_path, state.cash)?.with_state(&state);

    let text = fs::read_to_string(allocation_path)?;
    let (target, rationale) =
        normalize_response(&text, rebalance_config.max_positions, &broker);
    if !rationale.is_empty() {
        info!(rationale = %rationale, "allocation rationale");
    }

    run_cycle(
        &config,
        store.as_ref(),
        &state,
        &target,
        &broker,
        &rebalance_config,
        Local::now().date_naive(),
        report_path,
        dry_run,
    )
}

fn run_schedule(config_path: &Path, allocation_path: &Path, date: NaiveDate) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_trading_config(&config)?;
    let max_positions = build_rebalance_config(&config).max_positions;
    let db = require_database(&config)?;

    let text = fs::read_to_string(allocation_path)?;
    let (target, rationale) = normalize_response(&text, max_positions, db.names());

    let id = db.schedule(date, &target, &rationale)?;
    println!("{id}");
    Ok(())
}

fn run_execute(
    config_path: &Path,
    prices_path: &Path,
    date: NaiveDate,
    fallback_allocation: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_trading_config(&config)?;
    validate_portfolio_config(&config)?;
    let rebalance_config = build_rebalance_config(&config);
    let db = require_database(&config)?;

    let store = build_state_store(&config, Some(db.as_ref()));
    let state = load_or_init_state(store.as_ref(), &config)?;
    let broker = PaperBroker::from_quotes_csv(prices_path, state.cash)?.with_state(&state);

    let (target, scheduled_id) = match db.pending(date)? {
        Some(scheduled) => {
            info!(id = scheduled.id, date = %date, "executing scheduled allocation");
            (scheduled.allocation, Some(scheduled.id))
        }
        None => {
            let path = fallback_allocation.ok_or_else(|| TraderError::AllocationMalformed {
                reason: format!("no scheduled allocation for {date} and no fallback file"),
            })?;
            warn!(date = %date, path = %path.display(), "nothing scheduled, using allocation file");
            let text = fs::read_to_string(path)?;
            let (target, _) = normalize_response(&text, rebalance_config.max_positions, db.names());
            (target, None)
        }
    };

    let result = run_cycle(
        &config,
        store.as_ref(),
        &state,
        &target,
        &broker,
        &rebalance_config,
        date,
        report_path,
        false,
    );

    // Orders are out even if the state write failed; never replay them.
    if let Some(id) = scheduled_id {
        if let Err(e) = db.mark_executed(id) {
            error!(id, error = %e, "failed to mark allocation executed");
        }
    }
    result
}

/// Plan, submit and persist one rebalance, then print the report.
///
/// The saved state carries one more history record, settling the change in
/// value since the previous cycle, and the next revision number.
#[allow(clippy::too_many_arguments)]
fn run_cycle(
    config: &dyn ConfigPort,
    store: &dyn StateStore,
    state: &PortfolioState,
    target: &TargetAllocation,
    broker: &PaperBroker,
    rebalance_config: &RebalanceConfig,
    period: NaiveDate,
    report_path: Option<&Path>,
    dry_run: bool,
) -> Result<(), TraderError> {
    let outcome = rebalance(state, target, broker, rebalance_config);
    let initial_value = config.get_double("portfolio", "initial_cash", DEFAULT_INITIAL_CASH);

    let mut new_state = outcome.state;
    let mut execution = None;
    if !dry_run {
        let report = execute_plan(&outcome.plan, broker);
        info!(
            submitted = report.submitted(),
            failures = report.failures.len(),
            "plan executed"
        );
        if !report.is_clean() {
            new_state = reconcile(state, broker, &outcome.prices)?;
        }
        execution = Some(report);
        settle_cycle(state, &mut new_state, target, outcome.plan.value_before, initial_value, period)?;
    }

    let report = WeeklyReport::build(
        &outcome.plan,
        execution.as_ref(),
        &new_state,
        &outcome.prices,
        initial_value,
        Local::now().naive_local(),
    );
    let adapter = TextReportAdapter;
    println!("{}", adapter.render(&report));
    if let Some(path) = report_path {
        adapter.write(&report, &path.display().to_string())?;
    }

    if dry_run {
        info!("dry run, state not saved");
        return Ok(());
    }
    store.save(&new_state)
}

/// Book the value change since the previous cycle as a realized period
/// labelled with this cycle's date, holding the allocation applied now.
fn settle_cycle(
    previous: &PortfolioState,
    next: &mut PortfolioState,
    applied: &TargetAllocation,
    value_before: f64,
    initial_value: f64,
    period: NaiveDate,
) -> Result<(), TraderError> {
    let period_return = if previous.total_value > 0.0 {
        value_before / previous.total_value - 1.0
    } else {
        0.0
    };

    let mut ledger = Ledger::resume(initial_value, &previous.strategy, previous.history.clone());
    // No universe-wide returns are observed between live cycles.
    ledger.record_realized_period(&period.format("%Y-%m-%d").to_string(), applied, period_return, 0.0)?;
    next.history = ledger.into_history();
    next.revision = previous.revision + 1;
    Ok(())
}

/// Rebuild state from what the broker actually holds after a partially
/// failed execution.
fn reconcile(
    previous: &PortfolioState,
    broker: &PaperBroker,
    prices: &HashMap<String, f64>,
) -> Result<PortfolioState, TraderError> {
    let balance = broker.balance()?;
    let mut state = snapshot_from_balance(&balance, &previous.strategy);
    state.revalue(prices);
    warn!(total_value = state.total_value, "state reconciled from broker balance");
    Ok(state)
}

fn run_backtest(config_path: &Path, proposals_path: &Path, returns_path: &Path) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    let settings = build_backtest_config(&config)?;

    let proposals: BTreeMap<String, Value> =
        serde_json::from_str(&fs::read_to_string(proposals_path)?)?;
    let returns = read_period_returns(returns_path)?;
    let names: HashMap<String, String> = HashMap::new();

    let weeks = trading_weeks(settings.start_date, settings.end_date);
    info!(
        start = %settings.start_date,
        end = %settings.end_date,
        weeks = weeks.len(),
        "backtest started"
    );

    let mut ledger = Ledger::new(settings.initial_capital, &settings.initial_strategy);
    for (i, week) in weeks.iter().enumerate() {
        let label = week_label(i, week.monday);
        let key = week.monday.format("%Y-%m-%d").to_string();

        let Some(proposal) = proposals.get(&key) else {
            warn!(period = %label, "no proposal for week");
            ledger.record_failed_period(&label)?;
            continue;
        };
        let Some(asset_returns) = returns.get(&week.monday) else {
            warn!(period = %label, "no returns for week");
            ledger.record_failed_period(&label)?;
            continue;
        };

        if let Some(strategy) = proposal.get("strategy").and_then(Value::as_str) {
            ledger.update_strategy(strategy);
        }
        let target = proposal_allocation(proposal, settings.max_positions, &names);
        let benchmark = market_average_return(asset_returns);
        ledger.record_period(&label, &target, asset_returns, benchmark)?;
    }

    let strategy_metrics = ledger.finalize();
    let benchmark_metrics = metrics::evaluate_all(&ledger.benchmark_returns());

    println!("{}", strategy_metrics.summary());
    println!(
        "Benchmark AR: {:+.2}%  MDD: {:.2}%",
        benchmark_metrics.accumulated_return * 100.0,
        benchmark_metrics.max_drawdown * 100.0
    );
    println!("Final capital: {:.0}", ledger.capital());

    let history_path = write_history_json(&settings.output_dir, ledger.history())?;
    let curves_path = write_curves_csv(&settings.output_dir, ledger.history())?;
    info!(
        history = %history_path.display(),
        curves = %curves_path.display(),
        "results written"
    );
    Ok(())
}

/// A proposal is either raw producer text or an already-parsed object.
fn proposal_allocation(
    proposal: &Value,
    max_positions: usize,
    names: &dyn SecurityNamePort,
) -> TargetAllocation {
    match proposal {
        Value::String(text) => normalize_response(text, max_positions, names).0,
        other => match RawProposal::from_value(other) {
            Ok(raw) => normalize(&raw, max_positions, names),
            Err(e) => {
                warn!(error = %e, "proposal rejected, holding 100% cash");
                TargetAllocation::all_cash()
            }
        },
    }
}

fn run_evaluate(returns_path: &Path) -> Result<(), TraderError> {
    let returns = read_returns_series(returns_path)?;
    info!(periods = returns.len(), "evaluating return series");
    println!("{}", metrics::evaluate_all(&returns).summary());
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), TraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;

    validate_trading_config(&config)?;
    validate_portfolio_config(&config)?;
    if config.get_string("backtest", "start_date").is_some()
        || config.get_string("backtest", "end_date").is_some()
    {
        validate_backtest_config(&config)?;
    }

    let rebalance_config = build_rebalance_config(&config);
    eprintln!("Config validated successfully");
    eprintln!("  max_positions: {}", rebalance_config.max_positions);
    eprintln!(
        "  cash_reserve:  {:.1}%",
        rebalance_config.cash_reserve_fraction * 100.0
    );
    Ok(())
}
