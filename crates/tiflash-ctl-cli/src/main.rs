//! tiflash-ctl CLI - consistency checks for TiFlash replicas.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tiflash_ctl::check::{
    summarize, BisectEngine, BisectOutcome, BoundaryMode, BoundaryReport, BoundaryScanner,
    ConsistencyOracle, DistributionSummary, RegionWalker, WalkReport, WorklistPolicy,
};
use tiflash_ctl::tidb::query::region_distribution_query;
use tiflash_ctl::tidb::{HandleType, TableResolver};
use tiflash_ctl::tiflash::{dispatch, dump_all_region_command, instance_host, DispatchReply};
use tiflash_ctl::{Config, CtlError, PdClient, TableInfo, TableRef, TidbClient, TiflashClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tiflash-ctl")]
#[command(about = "Consistency checks for TiFlash replicas of TiDB tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// TiDB host, overrides tidb.host
    #[arg(long)]
    tidb_ip: Option<String>,

    /// TiDB port, overrides tidb.port
    #[arg(long)]
    tidb_port: Option<u16>,

    /// TiDB user, overrides tidb.user
    #[arg(long)]
    user: Option<String>,

    /// TiDB password, overrides tidb.password
    #[arg(long)]
    password: Option<String>,

    /// PD address (host:port), overrides pd.address
    #[arg(long)]
    pd_address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a table's TiFlash replica and Regions
    #[command(subcommand)]
    Check(CheckCommands),

    /// Send a command to every TiFlash instance
    #[command(subcommand)]
    Dispatch(DispatchCommands),
}

#[derive(Args)]
struct TableArgs {
    /// Database of the table to check
    #[arg(long)]
    database: String,

    /// Table to check
    #[arg(long)]
    table: String,
}

#[derive(Subcommand)]
enum CheckCommands {
    /// Compare TiKV and TiFlash row counts and locate inconsistent Regions
    Consistency {
        #[command(flatten)]
        target: TableArgs,

        /// Count pairs taken while they match, overrides check.num_replica
        #[arg(long)]
        num_replica: Option<usize>,

        /// Lowest row id to check (inclusive)
        #[arg(long, allow_hyphen_values = true)]
        lower_bound: Option<i64>,

        /// Highest row id to check (exclusive)
        #[arg(long, allow_hyphen_values = true)]
        upper_bound: Option<i64>,

        /// Row id column, overrides check.row_id_column
        #[arg(long)]
        row_id_col_name: Option<String>,

        /// Keep pending ranges after a mismatch instead of dropping them
        #[arg(long)]
        full_coverage: bool,
    },

    /// Check that Region boundaries fall on row keys
    Boundary {
        #[command(flatten)]
        target: TableArgs,

        /// Regions per PD request, overrides check.region_batch
        #[arg(long)]
        batch: Option<usize>,

        /// Commands to print for invalid boundaries
        #[arg(long, value_enum, default_value = "split")]
        cmd: BoundaryCmd,
    },

    /// Show the Region distribution of a table per store
    Dist {
        #[command(flatten)]
        target: TableArgs,

        /// Only print the distribution query text
        #[arg(long)]
        dry: bool,
    },
}

#[derive(Args)]
struct TiflashArgs {
    /// TiFlash HTTP port
    #[arg(long, default_value_t = tiflash_ctl::tiflash::DEFAULT_HTTP_PORT)]
    tiflash_http_port: u16,

    /// Per-instance request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum DispatchCommands {
    /// Dump the Regions each TiFlash instance holds for a table
    #[command(alias = "fetch_region")]
    FetchRegion {
        #[command(flatten)]
        target: TableArgs,

        #[command(flatten)]
        tiflash: TiflashArgs,
    },

    /// Send an arbitrary command
    Any {
        /// Command text posted to every instance
        #[arg(long)]
        cmd: String,

        #[command(flatten)]
        tiflash: TiflashArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BoundaryCmd {
    Split,
    Merge,
}

impl From<BoundaryCmd> for BoundaryMode {
    fn from(cmd: BoundaryCmd) -> Self {
        match cmd {
            BoundaryCmd::Split => BoundaryMode::Split,
            BoundaryCmd::Merge => BoundaryMode::Merge,
        }
    }
}

#[derive(Serialize)]
struct ConsistencyResult {
    table: TableRef,
    table_id: i64,
    duration_ms: u64,
    bisect: BisectOutcome,
    walk: Option<WalkReport>,
}

#[derive(Serialize)]
struct BoundaryResult<'a> {
    report: &'a BoundaryReport,
    valid_regions: usize,
    actions: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);

    match cli.command {
        Commands::Check(CheckCommands::Consistency {
            target,
            num_replica,
            lower_bound,
            upper_bound,
            row_id_col_name,
            full_coverage,
        }) => {
            if let Some(n) = num_replica {
                config.check.num_replica = n;
            }
            if let Some(col) = row_id_col_name {
                config.check.row_id_column = col;
            }
            if full_coverage {
                config.check.worklist_policy = WorklistPolicy::FullCoverage;
            }
            config.validate()?;
            check_consistency(&config, &target, lower_bound, upper_bound, cli.output_json).await?;
        }

        Commands::Check(CheckCommands::Boundary { target, batch, cmd }) => {
            if let Some(b) = batch {
                config.check.region_batch = b;
            }
            config.validate()?;
            check_boundary(&config, &target, cmd.into(), cli.output_json).await?;
        }

        Commands::Check(CheckCommands::Dist { target, dry }) => {
            if dry {
                let sql = region_distribution_query(&target.database, &target.table);
                println!("{}", sql.replace('\t', "").replace('\n', " "));
                return Ok(());
            }
            config.validate()?;
            check_distribution(&config, &target, cli.output_json).await?;
        }

        Commands::Dispatch(command) => {
            config.validate()?;
            dispatch_to_tiflash(&config, command, cli.output_json).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.tidb_ip {
        config.tidb.host = host.clone();
    }
    if let Some(port) = cli.tidb_port {
        config.tidb.port = port;
    }
    if let Some(user) = &cli.user {
        config.tidb.user = user.clone();
    }
    if let Some(password) = &cli.password {
        config.tidb.password = password.clone();
    }
    if let Some(address) = &cli.pd_address {
        config.pd.address = Some(address.clone());
    }
}

/// Resolve the table up front so a bad name fails before any scan.
async fn resolve(client: &mut TidbClient, target: &TableArgs) -> Result<TableInfo, CtlError> {
    let table = client.resolve_table(&target.database, &target.table).await?;
    info!(
        "Table `{}`.`{}` resolved, table id: {}, handle: {:?}",
        target.database, target.table, table.table_id, table.handle
    );
    Ok(table)
}

/// PD from the config, or the first PD instance TiDB knows about.
async fn connect_pd(config: &Config, client: &mut TidbClient) -> Result<PdClient, CtlError> {
    let address = match &config.pd.address {
        Some(address) => address.clone(),
        None => client
            .instances("pd")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CtlError::MetadataLookup("no PD instance in information_schema.cluster_info".into())
            })?,
    };
    let pd = PdClient::new(&address, Duration::from_secs(config.pd.timeout_secs))?;
    info!("Using PD at {}", pd.base_url());
    Ok(pd)
}

async fn check_consistency(
    config: &Config,
    target: &TableArgs,
    lower_bound: Option<i64>,
    upper_bound: Option<i64>,
    output_json: bool,
) -> Result<(), CtlError> {
    let start = Instant::now();
    let mut client = TidbClient::connect(&config.tidb).await?;
    let table_info = resolve(&mut client, target).await?;
    if table_info.handle == HandleType::Common {
        warn!(
            "`{}`.`{}` is clustered on a common handle, row ids may not map to Regions",
            target.database, target.table
        );
    }

    let table = TableRef::new(
        &target.database,
        &target.table,
        &config.check.row_id_column,
    );
    let engine = BisectEngine::new(config.check.worklist_policy);

    let bisect = {
        let mut oracle =
            ConsistencyOracle::new(&mut client, table.clone(), config.check.num_replica);
        let initial = engine
            .initial_range(&mut oracle, lower_bound, upper_bound)
            .await?;
        engine.run(&mut oracle, vec![initial]).await?
    };
    info!(
        "Bisection done: {} ranges checked, {} splits, consistent: {}",
        bisect.ranges_checked, bisect.splits, bisect.consistent
    );

    let walk = match bisect.seed_key(table_info.table_id)? {
        Some(seed) => {
            info!("Checking Regions from key {}", seed);
            let pd = connect_pd(config, &mut client).await?;
            let mut oracle =
                ConsistencyOracle::new(&mut client, table.clone(), config.check.num_replica);
            let walker =
                RegionWalker::new(&pd, table_info.table_id, config.check.walk_streak_limit);
            let report = walker
                .walk(&mut oracle, seed, |action| {
                    if !output_json {
                        println!("{}", action);
                    }
                })
                .await?;
            Some(report)
        }
        None => None,
    };
    client.close().await?;

    let result = ConsistencyResult {
        table,
        table_id: table_info.table_id,
        duration_ms: start.elapsed().as_millis() as u64,
        bisect,
        walk,
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("\nConsistency check of {}:", result.table.qualified_name());
    println!("  Table id: {}", result.table_id);
    println!("  Ranges checked: {}", result.bisect.ranges_checked);
    match &result.walk {
        None => println!("  Result: consistent"),
        Some(walk) => {
            if let Some(range) = result.bisect.seed_range() {
                println!("  Suspect range: {}", range);
            }
            println!("  Regions checked: {}", walk.regions_checked);
            println!("  Inconsistent Regions: {:?}", walk.inconsistent_regions);
            for action in &walk.actions {
                println!("    pd-ctl {}", action.pd_ctl_command());
            }
        }
    }
    println!("  Duration: {:.2}s", result.duration_ms as f64 / 1000.0);
    Ok(())
}

async fn check_boundary(
    config: &Config,
    target: &TableArgs,
    mode: BoundaryMode,
    output_json: bool,
) -> Result<(), CtlError> {
    let mut client = TidbClient::connect(&config.tidb).await?;
    let table_info = resolve(&mut client, target).await?;
    let pd = connect_pd(config, &mut client).await?;
    client.close().await?;

    let report = BoundaryScanner::new(&pd, config.check.region_batch)
        .scan(&table_info)
        .await?;
    let actions = report.actions(mode);

    if output_json {
        let result = BoundaryResult {
            report: &report,
            valid_regions: report.valid_count(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if report.unsupported {
        println!("Checking boundary on clustered index table is not supported");
        return Ok(());
    }
    println!(
        "Regions: {} (PD expected {}), valid: {}, invalid: {}",
        report.regions.len(),
        report.expected_regions,
        report.valid_count(),
        report.invalid_regions.len()
    );
    for action in &actions {
        println!("{}", action);
    }
    Ok(())
}

async fn check_distribution(
    config: &Config,
    target: &TableArgs,
    output_json: bool,
) -> Result<(), CtlError> {
    let mut client = TidbClient::connect(&config.tidb).await?;
    let counts = client
        .region_distribution(&target.database, &target.table)
        .await?;
    client.close().await?;

    let summary = summarize(counts);
    if output_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_distribution(&summary);
    }
    Ok(())
}

async fn dispatch_to_tiflash(
    config: &Config,
    command: DispatchCommands,
    output_json: bool,
) -> Result<(), CtlError> {
    let mut client = TidbClient::connect(&config.tidb).await?;
    let (tiflash, text) = match command {
        DispatchCommands::FetchRegion { target, tiflash } => {
            let table_info = resolve(&mut client, &target).await?;
            (tiflash, dump_all_region_command(table_info.table_id))
        }
        DispatchCommands::Any { cmd, tiflash } => (tiflash, cmd),
    };
    let hosts: Vec<String> = client
        .instances("tiflash")
        .await?
        .iter()
        .map(|address| instance_host(address).to_string())
        .collect();
    client.close().await?;
    if hosts.is_empty() {
        warn!("No TiFlash instance in information_schema.cluster_info");
    }

    let http = TiflashClient::new(
        tiflash.tiflash_http_port,
        Duration::from_secs(tiflash.timeout_secs),
    )?;
    let replies = dispatch(&http, &hosts, &text).await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&replies)?);
        return Ok(());
    }
    for reply in &replies {
        print_reply(reply, tiflash.tiflash_http_port);
    }
    Ok(())
}

fn print_reply(reply: &DispatchReply, http_port: u16) {
    println!("TiFlash {}:{}", reply.host, http_port);
    if let Some(body) = &reply.response {
        println!("{}", body.trim_end());
    }
    if let Some(error) = &reply.error {
        println!("err: {}", error);
    }
}

fn print_distribution(summary: &DistributionSummary) {
    println!(
        "{:<10} {:>8}  {:<24} {:>9} {:>11} {:>9}",
        "STORE TYPE", "STORE ID", "ADDRESS", "IS LEADER", "NUM REGIONS", "DIFF PER"
    );
    for row in &summary.rows {
        let diff = row
            .diff_percent
            .map(|d| format!("{:6.2}%", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:>8}  {:<24} {:>9} {:>11} {:>9}",
            row.store.store_type,
            row.store.store_id,
            row.store.address,
            row.store.is_leader,
            row.store.num_regions,
            diff
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries results only
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
