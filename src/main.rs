// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use digest_pipeline::config::AppConfig;
use digest_pipeline::workflow::{build_engine, Collaborators, Cursor, WorkflowState};
use dotenv::dotenv;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run (or resume) the article pipeline
    Run {
        /// The request to write an article for
        #[arg(short, long)]
        prompt: String,

        /// Session id; reuse one to resume an interrupted run
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Show the stored result of a session
    Status {
        #[arg(short, long)]
        session: String,
    },
}

fn report(session_id: &str, state: &WorkflowState) {
    println!("session: {}", session_id);
    println!("published: {}", state.published);
    println!("post_id: {}", state.post_id.as_deref().unwrap_or("-"));
    println!("revisions: {}", state.fix_num);
    if state.publish_pending {
        println!("warning: a publish attempt was interrupted; check the wall before reposting");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    let checkpointer = config.checkpointer()?;

    match args.command {
        Commands::Run { prompt, session } => {
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let collaborators = Collaborators::from_config(&config)?;
            let engine = build_engine(&collaborators, &config.pipeline, checkpointer)?;

            log::info!("Running session {}", session_id);
            let state = engine
                .invoke(&session_id, &prompt)
                .await
                .with_context(|| format!("session {} aborted", session_id))?;
            report(&session_id, &state);
        }
        Commands::Status { session } => {
            let checkpoint = checkpointer
                .load(&session)
                .await?
                .with_context(|| format!("no checkpoint for session {}", session))?;
            report(&session, &checkpoint.state);
            match &checkpoint.cursor {
                Cursor::Next(node) => println!("next: {}", node),
                Cursor::Terminal => println!("next: -"),
            }
        }
    }

    Ok(())
}
