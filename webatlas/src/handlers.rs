use anyhow::{bail, Context};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use webatlas_core::{Database, GraphSnapshot, UrlNormalizer};
use webatlas_engine::{
    AgentDeps, CrawlConfig, CrawlEvent, CrawlReport, DomLinkExtractor, FormAuthenticator,
    FormInventory, PluginRegistry, SemanticFingerprinter, SessionManager,
};

const DEFAULT_DB_DIR: &str = "~/.config/webatlas/";
const DB_FILE_NAME: &str = "webatlas.db";

pub fn print_banner() {
    println!(
        "{}",
        r#"
              __         __  __
 _    _____  / /  ___ _ / /_/ /__ ____
| |/|/ / -_)/ _ \/ _ `// __/ / _ `(_-<
|__,__/\__//_.__/\_,_/ \__/_/\_,_/___/
"#
        .bright_cyan()
    );
    println!(
        "  {} v{}\n",
        "navigation-persistent web state crawler".bright_blue(),
        env!("CARGO_PKG_VERSION")
    );
}

/// Resolve the database file path, expanding `~`.
pub fn resolve_db_path(custom: Option<&String>) -> PathBuf {
    let dir = custom.map(|s| s.as_str()).unwrap_or(DEFAULT_DB_DIR);
    let expanded = shellexpand::tilde(dir);
    let path = Path::new(expanded.as_ref());
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.join(DB_FILE_NAME)
    }
}

/// Split a comma-separated role list, trimming blanks and duplicates
/// while keeping first-seen order.
pub fn parse_roles(raw: &str) -> Vec<String> {
    let mut roles = Vec::new();
    for part in raw.split(',') {
        let role = part.trim();
        if !role.is_empty() && !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }
    roles
}

/// Human-readable crawl summary.
pub fn render_summary(report: &CrawlReport) -> String {
    let mut out = String::new();
    let finished = chrono::DateTime::from_timestamp(report.merged.exported_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    out.push_str(&format!(
        "Session: {} (finished {})\n\n",
        report.session_id, finished
    ));
    out.push_str("Roles:\n");
    for role in &report.roles {
        let status = role.status.as_str();
        let nodes = role
            .subgraph
            .as_ref()
            .map(|g| g.stats.node_count)
            .unwrap_or(0);
        match &role.error {
            Some(error) => {
                out.push_str(&format!("  {:<12} {:<10} {}\n", role.role, status, error))
            }
            None => out.push_str(&format!(
                "  {:<12} {:<10} {} states\n",
                role.role, status, nodes
            )),
        }
    }
    let stats = &report.merged.stats;
    out.push_str(&format!(
        "\nMerged graph: {} states, {} transitions, {} unconfirmed, max depth {}\n",
        stats.node_count, stats.edge_count, stats.synthetic_count, stats.max_depth
    ));
    out
}

pub fn write_graph_json(path: &Path, snapshot: &GraphSnapshot) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn open_database(db_arg: Option<&String>) -> anyhow::Result<Database> {
    let path = resolve_db_path(db_arg);
    if !Database::exists(&path) {
        bail!(
            "no database at {} - run `webatlas init` first",
            path.display()
        );
    }
    Database::new(&path).context("opening database")
}

// Command handlers

pub fn handle_init(args: &ArgMatches) -> anyhow::Result<()> {
    let location = args.get_one::<String>("PATH");
    let force = args.get_flag("force");
    let db_path = resolve_db_path(location);
    let config_dir = db_path
        .parent()
        .context("invalid database path")?
        .to_path_buf();

    if Database::exists(&db_path) {
        if !force {
            bail!(
                "database already exists at {} (use --force to overwrite)",
                db_path.display()
            );
        }
        Database::drop(&db_path)?;
    }

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating {}", config_dir.display()))?;
    Database::new(&db_path).context("creating database")?;

    println!("{} {}", "database initialized at".green(), db_path.display());
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = args
        .get_one::<Url>("url")
        .context("--url is required")?
        .clone();
    let roles = parse_roles(args.get_one::<String>("roles").map(|s| s.as_str()).unwrap_or("default"));
    if roles.is_empty() {
        bail!("--roles must name at least one role");
    }
    let depth = *args.get_one::<usize>("depth").unwrap_or(&3);
    let timeout_secs = *args.get_one::<u64>("timeout").unwrap_or(&30);
    let deep_scan = !args.get_flag("no-deep-scan");
    let output = args.get_one::<PathBuf>("output");

    let db = Arc::new(Mutex::new(open_database(args.get_one::<String>("db"))?));

    let config = CrawlConfig::new()
        .with_max_depth(depth)
        .with_navigation_timeout(Duration::from_secs(timeout_secs))
        .with_deep_discovery(deep_scan);
    let deps = AgentDeps {
        extractor: Arc::new(DomLinkExtractor),
        fingerprinter: Arc::new(SemanticFingerprinter),
        plugins: PluginRegistry::new().register(Arc::new(FormInventory)),
        normalizer: UrlNormalizer::new(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let manager = SessionManager::new(
        db,
        config,
        deps,
        Arc::new(FormAuthenticator::new()),
        events_tx,
    );

    let stop = manager.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstop requested, finishing current page");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    if !quiet {
        println!(
            "Crawling {} as [{}], max depth {}\n",
            url.as_str().bright_white(),
            roles.join(", "),
            depth
        );
    }

    let progress = spawn_progress_reporter(events_rx, quiet);
    let result = manager.run(url.as_str(), &roles).await;
    // The manager owns the event sender; dropping it closes the channel
    // so the reporter drains and exits.
    drop(manager);
    let report = match result {
        Ok(report) => {
            progress.await.ok();
            report
        }
        Err(e) => {
            progress.abort();
            bail!("crawl failed: {}", e);
        }
    };

    println!("\n{}\n", "crawl complete".green().bold());
    print!("{}", render_summary(&report));

    if let Some(path) = output {
        write_graph_json(path, &report.merged)?;
        println!("\nmerged graph written to {}", path.display());
    }
    Ok(())
}

fn spawn_progress_reporter(
    mut events: mpsc::UnboundedReceiver<CrawlEvent>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")
            {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };

        while let Some(event) = events.recv().await {
            match event {
                CrawlEvent::RoleStarted { role } => {
                    bar.set_message(format!("[{}] starting", role));
                }
                CrawlEvent::PageCaptured {
                    role,
                    url,
                    depth,
                    synthetic,
                    nodes_total,
                    frontier_len,
                } => {
                    let marker = if synthetic { " (unconfirmed)" } else { "" };
                    bar.set_message(format!(
                        "[{}] d{} {}{} - {} states, {} queued",
                        role, depth, url, marker, nodes_total, frontier_len
                    ));
                }
                CrawlEvent::NavigationTimedOut { url } => {
                    bar.println(format!("{} {}", "timeout".yellow(), url));
                }
                CrawlEvent::MemoryWarning { used_bytes } => {
                    bar.println(format!(
                        "{} crawl state at {} MiB",
                        "memory".yellow(),
                        used_bytes / (1024 * 1024)
                    ));
                }
                CrawlEvent::RoleCompleted { role, nodes, edges } => {
                    bar.println(format!(
                        "{} [{}] {} states, {} transitions",
                        "done".green(),
                        role,
                        nodes,
                        edges
                    ));
                }
                CrawlEvent::RoleFailed { role, error } => {
                    bar.println(format!("{} [{}] {}", "failed".red(), role, error));
                }
            }
        }
        bar.finish_and_clear();
    })
}

pub fn handle_auth_set(args: &ArgMatches) -> anyhow::Result<()> {
    let role = args.get_one::<String>("role").context("--role is required")?;
    let username = args
        .get_one::<String>("username")
        .context("--username is required")?;
    let secret = args
        .get_one::<String>("secret")
        .context("--secret is required")?;
    let login_url = args
        .get_one::<Url>("login-url")
        .context("--login-url is required")?;

    let db = open_database(args.get_one::<String>("db"))?;
    db.store_credential(role, username, secret, Some(login_url.as_str()))?;
    println!("credential stored for role {}", role.bright_white());
    Ok(())
}

pub fn handle_auth_show(args: &ArgMatches) -> anyhow::Result<()> {
    let role = args.get_one::<String>("role").context("--role is required")?;
    let db = open_database(args.get_one::<String>("db"))?;

    match db.get_credential(role)? {
        Some((username, _, login_url)) => {
            println!("role:      {}", role);
            println!("username:  {}", username);
            println!("secret:    {}", "********".dimmed());
            println!(
                "login url: {}",
                login_url.unwrap_or_else(|| "(none)".to_string())
            );
        }
        None => bail!("no credential stored for role {}", role),
    }
    Ok(())
}

pub fn handle_export(args: &ArgMatches) -> anyhow::Result<()> {
    let session_id = args
        .get_one::<String>("session")
        .context("--session is required")?;
    let output = args
        .get_one::<PathBuf>("output")
        .context("--output is required")?;

    let db = open_database(args.get_one::<String>("db"))?;
    let snapshot = db
        .load_merged_graph(session_id)?
        .with_context(|| format!("no merged graph for session {}", session_id))?;
    write_graph_json(output, &snapshot)?;
    println!(
        "exported {} states to {}",
        snapshot.stats.node_count,
        output.display()
    );
    Ok(())
}
