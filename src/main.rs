use anyhow::{Context, Result};
use aoigen::cli::{Cli, Commands, OutputFormat};
use aoigen::config::RunConfig;
use aoigen::error::AoiError;
use aoigen::jobs::{RunContext, generate_domain, generate_forcing, generate_surfdata};
use aoigen::log::{
    config_echo, show_farewell_with_timing, show_greeting, show_resolution, show_run_summary,
};
use aoigen::sample::{SampleRequest, sample_grid_ids};
use aoigen::scheduler::{
    OUTCOME_FILE_VAR, RankEnvironment, RunSummary, WorkerCommand, select_strategy,
    write_outcome_report,
};
use aoigen::schema::{
    get_container_schema, print_schema_csv, print_schema_human, print_schema_json,
    print_schema_yaml,
};
use chrono::Local;
use clap::{CommandFactory, Parser};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_AOI_NOT_FOUND: u8 = 2;
const EXIT_TASKS_FAILED: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            exit_code_for(&e)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Maps the first library error in the chain to a process exit code.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    let not_found = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<AoiError>())
        .any(|e| matches!(e, AoiError::AoiFileNotFound(_)));
    if not_found {
        ExitCode::from(EXIT_AOI_NOT_FOUND)
    } else {
        ExitCode::from(EXIT_RUN_FAILED)
    }
}

fn load_config(path: Option<&Path>, quiet: bool) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid environment configuration")?;
    if quiet {
        config.progress = false;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let start_time = Instant::now();
    let quiet = cli.quiet;
    let command_name = cli.command.name();

    match cli.command {
        Commands::Domain {
            reference,
            output_dir,
            aoi_path,
            aoi_file,
        } => {
            let config = load_config(cli.config.as_deref(), quiet)?;
            let ctx = RunContext::new(&aoi_path, &aoi_file, Local::now());
            if !quiet {
                show_greeting(command_name);
                config_echo(&config, &ctx);
            }
            let points = ctx.load_points(&config)?;
            let outcome = generate_domain(&reference, &output_dir, &points, &ctx, &config)
                .with_context(|| format!("Failed to generate domain from {}", reference.display()))?;
            if !quiet {
                show_resolution(&outcome.resolution);
                println!("\nWrote {}", outcome.destination.display());
                show_farewell_with_timing(start_time.elapsed());
            }
        }

        Commands::Surfdata {
            surfdata,
            output_dir,
            aoi_path,
            aoi_file,
        } => {
            let config = load_config(cli.config.as_deref(), quiet)?;
            let ctx = RunContext::new(&aoi_path, &aoi_file, Local::now());
            if !quiet {
                show_greeting(command_name);
                config_echo(&config, &ctx);
            }
            let points = ctx.load_points(&config)?;
            let outcome = generate_surfdata(&surfdata, &output_dir, &points, &ctx, &config)
                .with_context(|| format!("Failed to subset {}", surfdata.display()))?;
            if !quiet {
                show_resolution(&outcome.resolution);
                println!("\nWrote {}", outcome.destination.display());
                show_farewell_with_timing(start_time.elapsed());
            }
        }

        Commands::Forcing {
            input_root,
            output_root,
            aoi_path,
            aoi_file,
        } => {
            let config = load_config(cli.config.as_deref(), quiet)?;
            let ctx = RunContext::new(&aoi_path, &aoi_file, Local::now());
            let rank = RankEnvironment::detect();
            // set only in processes launched by a local worker pool
            let report = std::env::var_os(OUTCOME_FILE_VAR).map(PathBuf::from);
            let leader = report.is_none() && rank.is_none_or(|env| env.rank == 0);
            if !quiet && leader {
                show_greeting(command_name);
                config_echo(&config, &ctx);
            }
            let points = ctx.load_points(&config)?;
            let strategy =
                select_strategy(rank, config.workers, config.progress, WorkerCommand::current());
            let outcomes =
                generate_forcing(&input_root, &output_root, &points, &ctx, &config, strategy)
                    .with_context(|| {
                        format!("Failed to schedule forcing files in {}", input_root.display())
                    })?;
            if let Some(path) = &report {
                write_outcome_report(path, &outcomes)
                    .with_context(|| format!("Failed to write outcome report {}", path.display()))?;
            }

            let summary = RunSummary::from_outcomes(&outcomes);
            for failed in &summary.failed {
                log::warn!("Task {} failed", failed.task.source_path().display());
            }
            if !quiet && report.is_none() {
                show_run_summary(&summary);
                show_farewell_with_timing(start_time.elapsed());
            }
            if !summary.is_success() && config.strict {
                return Ok(ExitCode::from(EXIT_TASKS_FAILED));
            }
        }

        Commands::Info {
            file,
            variable,
            format,
        } => {
            let schema = get_container_schema(&file, variable.as_deref())?;
            match format.unwrap_or(cli.output_format) {
                OutputFormat::Human => print_schema_human(&schema),
                OutputFormat::Json => print_schema_json(&schema)?,
                OutputFormat::Yaml => print_schema_yaml(&schema)?,
                OutputFormat::Csv => print_schema_csv(&schema)?,
            }
        }

        Commands::Sample {
            domain,
            percent,
            case_name,
            out,
            output_dir,
            seed,
            like,
            no_sort,
        } => {
            let config = load_config(cli.config.as_deref(), quiet)?;
            let request = SampleRequest {
                domain,
                percent,
                case_name,
                out,
                output_dir,
                seed,
                like,
                sort: !no_sort,
                identifier_variable: config.identifier_variable.clone(),
            };
            let outcome = sample_grid_ids(&request)
                .with_context(|| format!("Failed to sample {}", request.domain.display()))?;
            if !quiet {
                println!(
                    "Selected {} of {} gridIDs into {}",
                    outcome.selected.len(),
                    outcome.total,
                    outcome.path.display()
                );
            }
        }

        Commands::Completions { shell, output } => {
            let mut command = Cli::command();
            match output {
                Some(path) => {
                    let mut file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    clap_complete::generate(shell, &mut command, "aoigen", &mut file);
                    log::info!("Completions written to {}", path.display());
                }
                None => {
                    clap_complete::generate(shell, &mut command, "aoigen", &mut io::stdout());
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
