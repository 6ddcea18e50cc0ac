use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeguard_analyzer::{analyze_project, plan_build, AnalysisRequest};
use pipeguard_core::Settings;
use pipeguard_policy::{PolicyEngine, PolicyStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_PASSED: u8 = 0;
const EXIT_BLOCKED: u8 = 1;
const EXIT_INTERNAL: u8 = 2;

#[derive(Parser)]
#[command(name = "pipeguard", about = "Dependency analysis and policy gates for CI/CD pipelines", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a repository's dependency graph and print the result.
    Analyze {
        /// Repository path to analyze.
        repo_path: PathBuf,
        /// Restrict scanning to these languages.
        #[arg(long)]
        languages: Vec<String>,
        /// Glob patterns to include.
        #[arg(long)]
        include: Vec<String>,
        /// Glob patterns to exclude.
        #[arg(long)]
        exclude: Vec<String>,
        /// Maximum walk depth relative to the project root.
        #[arg(long)]
        max_depth: Option<usize>,
        /// Changed files to compute an incremental build plan for.
        #[arg(long)]
        changed_file: Vec<String>,
        /// Parallel job cap for scanning and build batches.
        #[arg(long, default_value_t = 4)]
        max_parallel_jobs: usize,
        /// Skip package-manager scanning.
        #[arg(long)]
        no_packages: bool,
    },
    /// Evaluate active policies against a target document; the exit
    /// code is the gate decision.
    Enforce {
        /// Target document (JSON or YAML).
        target: PathBuf,
        /// Policy directory override (defaults to settings/env).
        #[arg(long)]
        policy_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "pipeguard failed");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Analyze {
            repo_path,
            languages,
            include,
            exclude,
            max_depth,
            changed_file,
            max_parallel_jobs,
            no_packages,
        } => {
            let request = AnalysisRequest {
                repo_path,
                languages,
                include_patterns: include,
                exclude_patterns: exclude,
                max_depth,
                analyze_imports: true,
                analyze_calls: true,
                analyze_hierarchy: true,
                analyze_packages: !no_packages,
                max_parallel_jobs,
            };
            let (graph, response) = analyze_project(&request).await?;

            let mut output = serde_json::to_value(&response)?;
            if !changed_file.is_empty() {
                let plan = plan_build(&graph, Some(&changed_file), max_parallel_jobs);
                output["build_plan"] = serde_json::to_value(&plan)?;
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::from(EXIT_PASSED))
        }
        Command::Enforce { target, policy_dir } => {
            let content = std::fs::read_to_string(&target)
                .with_context(|| format!("reading target {}", target.display()))?;
            let target_value: serde_json::Value = if target
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                serde_yaml::from_str(&content).context("parsing YAML target")?
            } else {
                serde_json::from_str(&content).context("parsing JSON target")?
            };

            let mut settings = Settings::from_env();
            if let Some(dir) = policy_dir {
                settings.policy_dir = dir;
            }
            let store = PolicyStore::new(settings);
            let policies = store.list_policies().await?;

            let engine = PolicyEngine::new();
            let outcome = engine.enforce(&policies, &target_value);

            let report = serde_json::json!({
                "blocked": outcome.blocked,
                "policies_evaluated": outcome.results.len(),
                "violations": outcome.violations,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);

            if outcome.blocked {
                Ok(ExitCode::from(EXIT_BLOCKED))
            } else {
                Ok(ExitCode::from(EXIT_PASSED))
            }
        }
    }
}
