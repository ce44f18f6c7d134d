//! Multi-agent task pipeline CLI.
//!
//! Decomposes a task with a planning model, dispatches each sub-task to its
//! automation backend, and judges every answer before moving on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use taskchain::agents::AnswerValidator;
use taskchain::coordinator::{RunOutcome, RunStop, StepReport};
use taskchain::exit_codes;
use taskchain::io::config::{PipelineConfig, load_config, write_config};
use taskchain::io::llm::HttpChatModel;
use taskchain::io::task_file::load_task_file;
use taskchain::logging;
use taskchain::pipeline::{decompose_task, execute_task, run_task};

#[derive(Parser)]
#[command(
    name = "taskchain",
    version,
    about = "Decompose a task into sub-tasks, dispatch them to automation backends, validate every answer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArg {
    /// Pipeline config (TOML). Missing file means defaults.
    #[arg(long, default_value = "taskchain.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        #[command(flatten)]
        config: ConfigArg,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Decompose a task, then execute the decomposition.
    Run {
        #[command(flatten)]
        config: ConfigArg,
        /// Task file (JSON) with the instruction and optional ground truth.
        #[arg(long)]
        task: PathBuf,
    },
    /// Decompose a task and print the run directory.
    Decompose {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        task: PathBuf,
    },
    /// Execute an existing decomposition directory.
    Execute {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        task: PathBuf,
        /// Directory holding `Task_Split_Original.json`.
        #[arg(long)]
        log_dir: PathBuf,
    },
    /// Judge one answer against ground truth and print the verdict.
    Judge {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long)]
        truth: String,
    },
}

fn main() {
    logging::init();
    match run_command(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { config, force } => cmd_init(&config.config, force),
        Command::Run { config, task } => {
            let cfg = load_config(&config.config)?;
            let task = load_task_file(&task)?;
            let outcome = run_task(&cfg, &task, print_step)?;
            Ok(report(&outcome))
        }
        Command::Decompose { config, task } => {
            let cfg = load_config(&config.config)?;
            let task = load_task_file(&task)?;
            let dir = decompose_task(&cfg, &task)?;
            println!("{}", dir.display());
            Ok(exit_codes::OK)
        }
        Command::Execute {
            config,
            task,
            log_dir,
        } => {
            let cfg = load_config(&config.config)?;
            let task = load_task_file(&task)?;
            let outcome = execute_task(&cfg, &task, &log_dir, print_step)?;
            Ok(report(&outcome))
        }
        Command::Judge {
            config,
            question,
            answer,
            truth,
        } => cmd_judge(&config.config, &question, &answer, &truth),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &PipelineConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_judge(config: &Path, question: &str, answer: &str, truth: &str) -> Result<i32> {
    let cfg = load_config(config)?;
    let model = HttpChatModel::new(&cfg.validator, cfg.proxy.as_deref())
        .context("build validator client")?;
    let verdict = AnswerValidator::new(model).validate(1, question, answer, truth);
    let rendered = serde_json::to_string_pretty(&verdict).context("serialize verdict")?;
    println!("{rendered}");
    Ok(if verdict.status {
        exit_codes::OK
    } else {
        exit_codes::HALTED
    })
}

fn print_step(step: &StepReport) {
    eprintln!(
        "sub-task {}: {} -> {}",
        step.subtask_id,
        step.outcome,
        step.checkpoint.display()
    );
}

fn report(outcome: &RunOutcome) -> i32 {
    println!("{}", outcome.log_dir.display());
    match &outcome.stop {
        RunStop::Completed { final_answer } => {
            println!("{final_answer}");
            exit_codes::OK
        }
        RunStop::ValidationFailed {
            subtask_id,
            rationale,
        } => {
            eprintln!("halted at sub-task {subtask_id}: {rationale}");
            exit_codes::HALTED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults_config() {
        let cli = Cli::parse_from(["taskchain", "run", "--task", "task.json"]);
        match cli.command {
            Command::Run { config, task } => {
                assert_eq!(config.config, PathBuf::from("taskchain.toml"));
                assert_eq!(task, PathBuf::from("task.json"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_execute_requires_log_dir() {
        assert!(Cli::try_parse_from(["taskchain", "execute", "--task", "t.json"]).is_err());
        let cli = Cli::parse_from([
            "taskchain",
            "execute",
            "--task",
            "t.json",
            "--log-dir",
            "logs/run",
        ]);
        assert!(matches!(cli.command, Command::Execute { .. }));
    }

    #[test]
    fn init_refuses_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskchain.toml");
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(cmd_init(&path, true).expect("force"), exit_codes::OK);
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, PipelineConfig::default());
    }

    #[test]
    fn halted_run_maps_to_halted_code() {
        let outcome = RunOutcome {
            task_id: "7".to_string(),
            log_dir: PathBuf::from("logs/run"),
            steps_executed: 2,
            stop: RunStop::ValidationFailed {
                subtask_id: 2,
                rationale: "wrong".to_string(),
            },
        };
        assert_eq!(report(&outcome), exit_codes::HALTED);
    }
}
