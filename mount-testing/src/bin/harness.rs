// SPDX-License-Identifier: GPL-3.0-only

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mount_testing::cases;
use mount_testing::harness::{self, CaseStatus, RunConfig};

#[derive(Debug, Parser)]
#[command(name = "harness")]
#[command(about = "Hardware-in-the-loop harness for the WSL disk bridge")]
struct HarnessCli {
    #[command(subcommand)]
    command: HarnessCommand,
}

#[derive(Debug, Subcommand)]
enum HarnessCommand {
    /// Print the available cases
    List,
    Run {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        suite: Option<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = HarnessCli::parse();

    match cli.command {
        HarnessCommand::List => {
            for test in cases::instantiate_tests() {
                let kind = if test.destructive() { "destructive" } else { "read-only" };
                println!("{:<28} {:<8} {}", test.id(), test.suite(), kind);
            }
            Ok(ExitCode::SUCCESS)
        }
        HarnessCommand::Run { case, suite, json } => {
            let summary = harness::run(&RunConfig {
                suite,
                case_id: case,
            })
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            println!(
                "passed: {}, failed: {}, skipped: {}",
                summary.count(|s| *s == CaseStatus::Passed),
                summary.count(|s| matches!(s, CaseStatus::Failed(_))),
                summary.count(|s| matches!(s, CaseStatus::Skipped(_))),
            );

            Ok(if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
