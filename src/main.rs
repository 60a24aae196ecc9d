use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hostpatch::bundle::{read_bundle, write_module, BundleModule};
use hostpatch::config::load_dir;
use hostpatch::settings::{JsonFileStore, MemoryStore, SettingsStore};
use hostpatch::{
    DeclarativePlugin, Plugin, PatchError, PatchOutcome, PatchReport, Runtime,
};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "HOSTPATCH_LOG";

#[derive(Parser)]
#[command(name = "hostpatch")]
#[command(about = "Apply plugin patches to a host application bundle", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply plugin patches to a bundle
    Apply {
        /// Bundle directory, one module per .js file
        #[arg(short, long)]
        bundle: PathBuf,

        /// Directory of plugin manifests (*.toml)
        #[arg(short, long)]
        plugins: PathBuf,

        /// Host build version, checked against plugin version ranges
        #[arg(long)]
        host_version: Option<String>,

        /// Settings file deciding which plugins are enabled
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Write patched modules here instead of back into the bundle
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Dry run - show what would be changed without writing files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check status of plugin patches without writing anything
    Status {
        /// Bundle directory, one module per .js file
        #[arg(short, long)]
        bundle: PathBuf,

        /// Directory of plugin manifests (*.toml)
        #[arg(short, long)]
        plugins: PathBuf,

        /// Host build version, checked against plugin version ranges
        #[arg(long)]
        host_version: Option<String>,
    },

    /// List plugins and their patches
    List {
        /// Directory of plugin manifests (*.toml)
        #[arg(short, long)]
        plugins: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            bundle,
            plugins,
            host_version,
            settings,
            out,
            dry_run,
            diff,
        } => cmd_apply(ApplyArgs {
            bundle,
            plugins,
            host_version,
            settings,
            out,
            dry_run,
            show_diff: diff,
        }),

        Commands::Status {
            bundle,
            plugins,
            host_version,
        } => cmd_status(&bundle, &plugins, host_version),

        Commands::List { plugins } => cmd_list(&plugins),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Helper: Load every manifest in `dir` as a plugin.
fn load_plugins(dir: &Path) -> Result<Vec<DeclarativePlugin>> {
    let manifests = load_dir(dir)?;
    if manifests.is_empty() {
        anyhow::bail!("No .toml plugin manifests found in {}", dir.display());
    }

    manifests
        .into_iter()
        .map(|(path, manifest)| {
            DeclarativePlugin::from_manifest(manifest)
                .with_context(|| format!("failed to build plugin from {}", path.display()))
        })
        .collect()
}

/// Outcome of running plugins over a bundle in memory.
struct BundleRun {
    modules: Vec<BundleModule>,
    runtime: Runtime,
    reports: Vec<PatchReport>,
    start_failures: Vec<(String, String)>,
}

/// Helper: Register plugins, enable them, then load the bundle through the
/// runtime so each module is patched as it loads.
///
/// Every plugin is enabled unless the settings explicitly disable it.
fn run_bundle(
    bundle: &Path,
    plugins: Vec<DeclarativePlugin>,
    host_version: Option<String>,
    settings: Box<dyn SettingsStore>,
) -> Result<BundleRun> {
    let modules = read_bundle(bundle)?;
    if modules.is_empty() {
        anyhow::bail!("No .js modules found in {}", bundle.display());
    }

    let mut runtime = Runtime::new(settings);
    if let Some(version) = host_version {
        runtime = runtime.with_host_version(version);
    }
    for plugin in plugins {
        runtime.register(plugin)?;
    }

    let mut reports = Vec::new();
    let mut start_failures = Vec::new();
    for name in runtime.plugins().load_order() {
        if runtime.settings().is_enabled(&name) == Some(false) {
            tracing::info!(plugin = %name, "disabled in settings");
            continue;
        }
        match runtime.enable(&name) {
            Ok(r) => reports.extend(r),
            Err(e) => start_failures.push((name, e.to_string())),
        }
    }

    for module in &modules {
        reports.extend(runtime.load_module(module.id.clone(), module.source.clone(), Value::Null));
    }
    reports.extend(runtime.unmatched_patches());

    Ok(BundleRun {
        modules,
        runtime,
        reports,
        start_failures,
    })
}

fn report_target(report: &PatchReport) -> String {
    let id = format!("{}/{}", report.plugin, report.patch);
    match &report.module {
        Some(module) => format!("{id} [module {module}]"),
        None => id,
    }
}

/// Helper: Show unified diff between original and patched module source
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    if !modified.ends_with('\n') {
        println!();
    }
}

struct ApplyArgs {
    bundle: PathBuf,
    plugins: PathBuf,
    host_version: Option<String>,
    settings: Option<PathBuf>,
    out: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
}

fn cmd_apply(args: ApplyArgs) -> Result<()> {
    let plugins = load_plugins(&args.plugins)?;
    // A dry run reads the settings file but never writes it back
    let settings: Box<dyn SettingsStore> = match &args.settings {
        Some(path) if args.dry_run => {
            let store = JsonFileStore::open(path)?;
            Box::new(MemoryStore::from(store.snapshot().clone()))
        }
        Some(path) => Box::new(JsonFileStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };

    println!("Bundle: {}", args.bundle.display());
    if let Some(version) = &args.host_version {
        println!("Host version: {}", version);
    }
    println!();

    let run = run_bundle(&args.bundle, plugins, args.host_version.clone(), settings)?;
    if args.dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
    }

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_skipped = 0;
    let mut total_failed = 0;

    for (plugin, reason) in &run.start_failures {
        eprintln!("{} {}: Failed to load - {}", "✗".red(), plugin, reason);
        total_failed += 1;
    }

    for report in &run.reports {
        let target = report_target(report);
        match &report.result {
            Ok(PatchOutcome::Applied { replacements }) => {
                let verb = if args.dry_run { "Would apply" } else { "Applied" };
                println!(
                    "{} {}: {} ({} replacements)",
                    "✓".green(),
                    target,
                    verb,
                    replacements
                );
                total_applied += 1;
            }
            Ok(PatchOutcome::AlreadyApplied) => {
                println!("{} {}: Already applied", "⊙".yellow(), target);
                total_already_applied += 1;
            }
            Ok(outcome @ (PatchOutcome::SkippedPredicate | PatchOutcome::SkippedVersion { .. })) => {
                println!("{} {}: {}", "⊘".cyan(), target, outcome);
                total_skipped += 1;
            }
            Err(e) => {
                eprintln!("{} {}: Failed - {}", "✗".red(), target, e);
                total_failed += 1;

                match e {
                    PatchError::TargetNotFound { .. } => {
                        eprintln!("  {}", "CONFLICT: Find target matched no module".red());
                        eprintln!("  Possible causes:");
                        eprintln!("    - Host build changed the code the patch targets");
                        eprintln!("    - Another plugin already rewrote the target");
                        eprintln!(
                            "    - Already patched by an earlier run (only fixed-text replacements are recognised)"
                        );
                    }
                    PatchError::RegexNoMatch { .. } => {
                        eprintln!(
                            "  {}",
                            "CONFLICT: Module found but replacement pattern did not match".red()
                        );
                        eprintln!("  Action: Update the match pattern for this host build");
                    }
                    PatchError::ReplacementThrew { .. } => {}
                }
            }
        }
    }

    let out_dir = args.out.as_deref().unwrap_or(&args.bundle);
    for original in &run.modules {
        let Some(patched) = run.runtime.modules().get(&original.id) else {
            continue;
        };
        if patched.source == original.source {
            continue;
        }
        if args.show_diff {
            display_diff(&original.file, &original.source, &patched.source);
        }
        if !args.dry_run {
            let path = write_module(out_dir, original, &patched.source)?;
            tracing::info!(path = %path.display(), "module written");
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} skipped", format!("{}", total_skipped).cyan());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(bundle: &Path, plugins: &Path, host_version: Option<String>) -> Result<()> {
    let plugins = load_plugins(plugins)?;

    println!("{}", "Patch Status Report".bold());
    println!("Bundle: {}", bundle.display());
    if let Some(version) = &host_version {
        println!("Host version: {}", version);
    }
    println!();

    // Runs entirely in memory; nothing is written back
    let run = run_bundle(bundle, plugins, host_version, Box::new(MemoryStore::new()))?;

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();
    let mut skipped = Vec::new();

    for (plugin, reason) in run.start_failures {
        not_applied.push((plugin, reason));
    }
    for report in &run.reports {
        let target = report_target(report);
        match &report.result {
            Ok(PatchOutcome::Applied { .. }) => {
                not_applied.push((target, "target found but was not applied".to_string()));
            }
            Ok(PatchOutcome::AlreadyApplied) => applied.push(target),
            Ok(outcome) => skipped.push((target, outcome.to_string())),
            Err(e) => not_applied.push((target, e.to_string())),
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !skipped.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (id, reason) in &skipped {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_list(plugins: &Path) -> Result<()> {
    let plugins = load_plugins(plugins)?;

    for plugin in &plugins {
        let meta = &plugin.manifest().plugin;
        let mut flags = Vec::new();
        if meta.required {
            flags.push("required");
        }
        if meta.enabled_by_default {
            flags.push("default");
        }

        print!("{}", plugin.name().bold());
        if !flags.is_empty() {
            print!(" [{}]", flags.join(", "));
        }
        println!();
        if !plugin.description().is_empty() {
            println!("  {}", plugin.description().dimmed());
        }
        if !meta.authors.is_empty() {
            println!("  by: {}", meta.authors.join(", "));
        }
        if let Some(range) = plugin.host_version_range() {
            println!("  host: {}", range.cyan());
        }
        if !meta.dependencies.is_empty() {
            println!("  depends on: {}", meta.dependencies.join(", "));
        }
        for patch in plugin.patches() {
            println!(
                "  - {} ({} replacements)",
                patch.label(),
                patch.replacements.len()
            );
        }
    }

    Ok(())
}
