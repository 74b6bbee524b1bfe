//! Arbor 命令行入口
//!
//! 用法：`arbor [dag|tree] [--command <mode>] [--reflect] <goal...>`，模式缺省为 dag。
//! 配置见 config/default.toml 与 ARBOR__* 环境变量。

use anyhow::{bail, Context};
use arbor::{agent::Orchestrator, config::load_config, observability, prompts::CommandMode};

const USAGE: &str = "usage: arbor [dag|tree] [--command <mode>] [--reflect] <goal...>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Dag,
    Tree,
}

#[derive(Debug)]
struct Cli {
    mode: Mode,
    /// 覆盖 engine.command
    command: Option<CommandMode>,
    reflect: bool,
    goal: String,
}

fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    let (mode, rest) = match args.first().map(String::as_str) {
        Some("dag") => (Mode::Dag, &args[1..]),
        Some("tree") => (Mode::Tree, &args[1..]),
        _ => (Mode::Dag, args),
    };

    let mut command = None;
    let mut reflect = false;
    let mut words: Vec<&str> = Vec::new();
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--reflect" => reflect = true,
            "--command" => match iter.next() {
                Some(name) => command = Some(CommandMode::from_name(name)),
                None => bail!("--command needs a value\n{}", USAGE),
            },
            word => words.push(word),
        }
    }

    let goal = words.join(" ");
    if goal.trim().is_empty() {
        bail!(USAGE);
    }
    Ok(Cli {
        mode,
        command,
        reflect,
        goal,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    let goal = cli.goal.as_str();

    let cfg = load_config(None).context("Failed to load config")?;
    let mut orchestrator =
        Orchestrator::from_config(&cfg).context("Failed to build orchestrator")?;
    if let Some(mode) = cli.command {
        orchestrator = orchestrator.with_command(mode);
    }

    let (answer, reflection) = match cli.mode {
        Mode::Dag => {
            let run = orchestrator.run_dag(goal).await.context("DAG run failed")?;
            tracing::info!(
                steps = run.plan.len(),
                rounds = run.report.rounds.len(),
                unreachable = run.report.unreachable.len(),
                "DAG run finished"
            );
            let reflection = if cli.reflect {
                Some(orchestrator.reflect_dag(goal, &run).await)
            } else {
                None
            };
            (run.answer, reflection)
        }
        Mode::Tree => {
            let run = orchestrator.run_tree(goal).await.context("Tree run failed")?;
            tracing::info!(
                thoughts = run.report.thoughts.len(),
                depth = run.report.levels.len(),
                "Tree run finished"
            );
            let reflection = if cli.reflect {
                Some(orchestrator.reflect_tree(goal, &run).await)
            } else {
                None
            };
            (run.answer, reflection)
        }
    };

    let (prompt, completion, total) = orchestrator.token_usage();
    tracing::info!(prompt, completion, total, "Token usage");
    println!("{}", answer);
    if let Some(reflection) = reflection {
        println!("\n{}", reflection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_mode_defaults_to_dag() {
        let cli = parse_args(&args(&["list", "files"])).unwrap();
        assert_eq!(cli.mode, Mode::Dag);
        assert_eq!(cli.goal, "list files");
        assert!(!cli.reflect);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_flags_are_taken_out_of_goal() {
        let cli = parse_args(&args(&["tree", "--reflect", "why", "--command", "debug", "slow"]))
            .unwrap();
        assert_eq!(cli.mode, Mode::Tree);
        assert!(cli.reflect);
        assert_eq!(cli.command, Some(CommandMode::Debug));
        assert_eq!(cli.goal, "why slow");
    }

    #[test]
    fn test_missing_goal_or_value_is_an_error() {
        assert!(parse_args(&args(&["tree", "--reflect"])).is_err());
        assert!(parse_args(&args(&["explain", "--command"])).is_err());
        assert!(parse_args(&[]).is_err());
    }
}
