//! CLI entry point for `mailtriage`.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailtriage::config::Config;
use mailtriage::engine::{Engine, TickReport};
use mailtriage::events::JsonLinesSubscriber;
use mailtriage::model::mail::{Folder, MailRecord};
use mailtriage::service::Daemon;
use mailtriage::stats::FolderStats;
use mailtriage::store::{wire, Scope};

#[derive(Parser)]
#[command(
    name = "mailtriage",
    version,
    about = "Auto-assign and reconcile a folder tree of JSON mail records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Mail tree root (overrides the config file)
    #[arg(long, global = true, env = "MAILTRIAGE_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Write change events to stdout as JSON lines
    #[arg(long, global = true)]
    events: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the tree and reconcile on an interval until stopped
    Run {
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long, value_name = "SECS")]
        for_secs: Option<u64>,
    },
    /// Run one reclassify + auto-assign pass and print a report
    Reconcile {
        #[arg(long)]
        json: bool,
    },
    /// List mail records
    List {
        /// Only this status folder (mustRep, rep, chuaRep, daRep, pending, processed)
        #[arg(long, value_parser = parse_folder)]
        folder: Option<Folder>,
        #[arg(long)]
        json: bool,
    },
    /// Show folder counts
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Assign a mail manually
    Assign {
        id: String,
        #[arg(long, value_name = "GROUP_ID")]
        group: String,
        #[arg(long, value_name = "PIC_ID")]
        pic: Option<String>,
    },
    /// Move a mail into ReviewMail/processed
    Review { id: String },
    /// Mark a mail as replied
    Replied { id: String },
    /// Finish a pending review
    Processed { id: String },
    /// Import a mail JSON file into the tree
    Ingest { file: PathBuf },
    /// Show the effective configuration and where it lives
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn parse_folder(raw: &str) -> Result<Folder, String> {
    Folder::from_status_dir(raw).ok_or_else(|| format!("unknown status folder '{raw}'"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = mailtriage::config::load_config();
    if let Some(root) = &cli.root {
        config.general.root = root.clone();
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Completions { shell } => return cmd_completions(shell),
        Commands::Manpage => return cmd_manpage(),
        Commands::Config { init } => return cmd_config(&config, init),
        _ => {}
    }

    let engine = Arc::new(Engine::from_config(&config)?);
    if cli.events {
        engine
            .notifier()
            .subscribe(Arc::new(JsonLinesSubscriber::new(std::io::stdout())));
    }

    match cli.command {
        Commands::Run { for_secs } => cmd_run(engine, &config, for_secs),
        Commands::Reconcile { json } => cmd_reconcile(&engine, json),
        Commands::List { folder, json } => cmd_list(&engine, folder, json),
        Commands::Stats { json } => cmd_stats(&engine, json),
        Commands::Assign { id, group, pic } => {
            let actions = engine.actions();
            let assignee = actions.manual_assignee(&group, pic.as_deref())?;
            let record = actions.assign_manually(&id, assignee, Utc::now())?;
            print_done(&record, "assigned");
            Ok(())
        }
        Commands::Review { id } => {
            let record = engine.actions().move_to_review(&id, Utc::now())?;
            print_done(&record, "moved to review");
            Ok(())
        }
        Commands::Replied { id } => {
            let record = engine.actions().mark_replied(&id)?;
            print_done(&record, "marked replied");
            Ok(())
        }
        Commands::Processed { id } => {
            let record = engine.actions().mark_processed(&id, Utc::now())?;
            print_done(&record, "marked processed");
            Ok(())
        }
        Commands::Ingest { file } => cmd_ingest(&engine, &file),
        Commands::Completions { .. } | Commands::Manpage | Commands::Config { .. } => Ok(()),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailtriage::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailtriage.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailtriage", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the effective configuration as TOML, optionally saving it.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = mailtriage::config::config_file_path();
    if init {
        mailtriage::config::save_config(config)?;
    }
    println!(
        "# Config file: {}",
        path.map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    println!(
        "# Log file:    {}",
        mailtriage::config::log_file_path(config).display()
    );
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Run the watch worker and poller until Enter / EOF or `for_secs` elapses.
fn cmd_run(engine: Arc<Engine>, config: &Config, for_secs: Option<u64>) -> anyhow::Result<()> {
    let daemon = Daemon::start(engine, config)?;
    eprintln!(
        "  Reconciling {} (poll every {}s)",
        config.general.root.display(),
        config.reconcile.poll_interval().as_secs()
    );

    match for_secs {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            eprintln!("  Press Enter to stop.");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
        }
    }

    daemon.shutdown();
    Ok(())
}

/// One full pass with a spinner.
fn cmd_reconcile(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Reconciling mail tree");
    pb.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let report = engine.tick(Utc::now());
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_table(&report, start.elapsed());
    }
    Ok(())
}

fn cmd_list(engine: &Engine, folder: Option<Folder>, json: bool) -> anyhow::Result<()> {
    let scope = folder.map_or(Scope::All, Scope::Folder);
    let records = engine.store().list_valid(scope);

    if json {
        let offset = engine.store().offset();
        let items = records
            .iter()
            .map(|r| -> anyhow::Result<serde_json::Value> {
                Ok(serde_json::from_slice(&wire::encode(r, offset)?)?)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print_records_table(&records);
    }
    Ok(())
}

fn cmd_stats(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let stats = FolderStats::collect(engine.store());
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats_table(&stats);
    }
    Ok(())
}

fn cmd_ingest(engine: &Engine, file: &Path) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let record = engine.store().load_external(file)?;
    let stored = engine.actions().ingest(record, Utc::now())?;
    print_done(&stored, "ingested");
    if let Some(a) = &stored.assignment {
        println!("  {:<20} {}", "Assigned to", a.assignee.label());
    }
    Ok(())
}

fn print_done(record: &MailRecord, what: &str) {
    println!("  Mail {} {what} ({})", record.id, record.folder);
}

fn print_report_table(report: &TickReport, elapsed: Duration) {
    println!();
    println!("  {:<20} {}", "Scanned", report.scanned);
    println!("  {:<20} {}", "Moved", report.reconcile.moved);
    println!("  {:<20} {}", "Review annotated", report.reconcile.annotated);
    println!("  {:<20} {}", "Assigned to PIC", report.assign.assigned);
    println!("  {:<20} {}", "Assigned to group", report.assign.group_only);
    println!("  {:<20} {}", "No group match", report.assign.no_group_match);
    let failed = report.reconcile.failed + report.assign.failed;
    if failed > 0 {
        println!("  {:<20} {}", "Failed", failed);
    }
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!();
}

fn print_records_table(records: &[MailRecord]) {
    println!();
    println!("  {} record(s)", records.len());
    println!();

    if records.is_empty() {
        return;
    }

    println!(
        "  {:<16} {:<17} {:<25} {:<34} {:<18}",
        "Folder", "Date", "From", "Subject", "Assigned"
    );
    println!("  {}", "-".repeat(114));

    for record in records {
        let date = record.sent_at.format("%Y-%m-%d %H:%M").to_string();
        let from = record.sender_address();
        let from = if from.display_name.is_empty() {
            from.address
        } else {
            from.display_name
        };
        let from_trunc: String = from.chars().take(24).collect();
        let subj_trunc: String = record.subject.chars().take(33).collect();
        let assigned: String = record
            .assignment
            .as_ref()
            .map_or("-", |a| a.assignee.label())
            .chars()
            .take(18)
            .collect();

        println!(
            "  {:<16} {:<17} {:<25} {:<34} {:<18}",
            record.folder.to_string(),
            date,
            from_trunc,
            subj_trunc,
            assigned
        );
    }
    println!();
}

fn print_stats_table(stats: &FolderStats) {
    println!();
    for folder in Folder::ALL {
        println!("  {:<20} {}", folder.to_string(), stats.count(folder));
    }
    println!("  {}", "-".repeat(26));
    println!("  {:<20} {}", "Total", stats.total());
    println!("  {:<20} {}", "Needs attention", stats.warning_total());
    println!("  {:<20} {}", "Unassigned", stats.unassigned);

    if !stats.by_assignee.is_empty() {
        println!();
        println!("  By assignee:");
        for (label, count) in &stats.by_assignee {
            println!("    {count:>6}  {label}");
        }
    }
    println!();
}
