use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use agent_skills_sync::{
    builtin_platforms, detect_platforms, list, scan, ConfigStore, DefaultPrompter, Platform,
    Presence, Resolver, SyncConfig, SyncEngine, SyncError, SyncReport, TerminalPrompter,
    Workspace,
};

#[derive(Parser)]
#[command(
    name = "agent-skills-sync",
    version,
    about = "Keep Agent Skills in sync across AI assistant directories"
)]
struct Cli {
    /// Fail instead of prompting when conflicts or out-of-sync skills are found
    #[arg(long)]
    fail_on_conflict: bool,

    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// List skills and their sync state, then exit
    #[arg(long)]
    list: bool,

    /// Sync the skills in your home directory
    #[arg(long, conflicts_with = "root")]
    home: bool,

    /// Choose enabled platforms again
    #[arg(long)]
    reconfigure: bool,

    /// Restrict this run to some of the enabled platforms
    #[arg(long, value_delimiter = ',')]
    platforms: Option<Vec<String>>,

    /// Project root (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,agent_skills_sync=info",
        1 => "info,agent_skills_sync=debug",
        2 => "debug,agent_skills_sync=trace",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, SyncError> {
    let Some(root) = project_root(cli) else {
        eprintln!("Unable to determine the project root.");
        return Ok(ExitCode::FAILURE);
    };

    let mut resolver = if cli.fail_on_conflict {
        Resolver::fail_fast()
    } else if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Resolver::interactive(TerminalPrompter::new())
    } else {
        Resolver::interactive(DefaultPrompter)
    };

    let config = load_config(&root, cli, &mut resolver)?;
    let platforms = config.platforms(cli.platforms.as_deref());
    if platforms.is_empty() {
        eprintln!("No platforms enabled. Run with --reconfigure to choose some.");
        return Ok(ExitCode::FAILURE);
    }

    if cli.list {
        print_listing(&root, &platforms);
        return Ok(ExitCode::SUCCESS);
    }

    let workspace = Workspace::new(root.clone(), cli.dry_run);
    let report = SyncEngine::new(workspace, platforms, resolver).run()?;
    if !cli.quiet {
        print_report(&report, cli.dry_run);
    }
    Ok(ExitCode::SUCCESS)
}

fn project_root(cli: &Cli) -> Option<PathBuf> {
    if cli.home {
        return dirs::home_dir();
    }
    match &cli.root {
        Some(root) => Some(root.clone()),
        None => std::env::current_dir().ok(),
    }
}

/// Load the persisted platform selection, asking for one on first run or `--reconfigure`.
fn load_config(root: &Path, cli: &Cli, resolver: &mut Resolver) -> Result<SyncConfig, SyncError> {
    let store = ConfigStore::new(root);
    let existing = store.read();
    if !cli.reconfigure {
        if let Some(config) = existing {
            return Ok(config);
        }
    }

    let known = builtin_platforms();
    let detected = detect_platforms(root);
    let labels: Vec<String> = known
        .iter()
        .map(|platform| format!("{} ({})", platform.name, platform.skills_dir.display()))
        .collect();
    let defaults: Vec<bool> = known
        .iter()
        .map(|platform| match &existing {
            Some(config) => config.enabled_platforms.contains(&platform.name),
            None => detected.contains(&platform.name),
        })
        .collect();

    let chosen = resolver.select_many("Select platforms to keep in sync", &labels, &defaults)?;
    let config = SyncConfig::new(
        chosen
            .into_iter()
            .filter_map(|index| known.get(index))
            .map(|platform| platform.name.clone())
            .collect(),
    );

    if cli.dry_run {
        info!(path = %store.path().display(), "would write config");
    } else {
        store.write(&config)?;
        info!(
            path = %store.path().display(),
            platforms = ?config.enabled_platforms,
            "saved config"
        );
    }
    Ok(config)
}

fn print_listing(root: &Path, platforms: &[Platform]) {
    let statuses = list(&scan(root, platforms), platforms);
    if statuses.is_empty() {
        println!("No skills found.");
        return;
    }

    let width = statuses
        .iter()
        .map(|status| status.skill_name.len())
        .max()
        .unwrap_or(0)
        .max("skill".len());

    let mut header = format!("{:<width$}  {:<9}", "skill", "canonical");
    for platform in platforms {
        header.push_str(&format!("  {:<8}", platform.name));
    }
    println!("{}", header.trim_end());

    for status in &statuses {
        let canonical = if status.canonical { "yes" } else { "-" };
        let mut line = format!("{:<width$}  {canonical:<9}", status.skill_name);
        for (_, presence) in &status.platforms {
            line.push_str(&format!("  {:<8}", presence.to_string()));
        }
        println!("{}", line.trim_end());
    }

    let drifted = statuses
        .iter()
        .flat_map(|status| &status.platforms)
        .filter(|(_, presence)| *presence == Presence::OutOfSync)
        .count();
    if drifted > 0 {
        println!("\n{drifted} occurrence(s) out of sync. Run without --list to resolve.");
    }
}

fn print_report(report: &SyncReport, dry_run: bool) {
    let lines = [
        (report.promoted, "skill(s) promoted"),
        (report.linked, "copy(ies) linked to canonical"),
        (report.conflicts_resolved, "conflict(s) resolved"),
        (report.out_of_sync_resolved, "out-of-sync skill(s) resolved"),
        (report.consolidated, "dependent file(s) consolidated"),
        (report.propagated, "reference(s) updated"),
        (report.created, "reference(s) created"),
    ];
    for (count, label) in lines {
        if count > 0 {
            println!("{count} {label}");
        }
    }

    if !report.missing_canonical.is_empty() {
        let missing: Vec<&str> = report.missing_canonical.iter().map(String::as_str).collect();
        println!("Missing canonical skill: {}", missing.join(", "));
    }
    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(String::as_str).collect();
        println!("Skipped: {}", skipped.join(", "));
    } else if dry_run {
        println!("Dry run complete. No files were changed.");
    } else if report.is_clean() {
        println!("All skills in sync.");
    }
}
