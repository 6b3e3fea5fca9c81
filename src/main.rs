use std::path::PathBuf;
use std::process;
use std::time::Duration;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};
use yansi::Paint;

use repocast::{
    config::Config,
    logging,
    service::{Artifact, ArtifactRequest, ArtifactService, NarrationLength},
};

#[derive(Parser)]
#[command(author, version, about = "Turn a GitHub repository into diagrams, slides and narrated podcasts", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate what a diagram of the repository would cost
    Cost(RepoArgs),
    /// Generate a Mermaid architecture diagram
    Diagram(RepoArgs),
    /// Generate a Marp slide deck
    Slides(RepoArgs),
    /// Generate a narrated podcast script as SSML
    Narrate {
        #[command(flatten)]
        repo: RepoArgs,

        /// Narration length
        #[arg(short, long, value_enum, default_value_t = NarrationLength::Long)]
        length: NarrationLength,
    },
}

#[derive(Args)]
struct RepoArgs {
    /// Repository as owner/repo or a GitHub URL
    repository: String,

    /// GitHub token for private repositories (defaults to GITHUB_TOKEN)
    #[arg(long)]
    github_token: Option<String>,

    /// Additional instructions for the model
    #[arg(short, long)]
    instructions: Option<String>,

    /// Write the artifact to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RepoArgs {
    fn request(&self) -> anyhow::Result<ArtifactRequest> {
        Ok(ArtifactRequest::parse(&self.repository)?
            .with_credential(self.github_token.clone())
            .with_instructions(self.instructions.clone()))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("[WARNING] {}", e);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        let message = match e.downcast_ref::<repocast::PipelineError>() {
            Some(pipeline_error) => pipeline_error.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{} {}", "Error:".red().bold(), message);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    let service = ArtifactService::from_config(config).context("Failed to set up the pipeline")?;

    match cli.command {
        Command::Cost(args) => {
            let request = args.request()?;
            let pb = create_spinner(format!("Estimating cost for {}/{}", request.owner, request.repo));
            let estimate = service.estimate_cost(&request).await;
            pb.finish_and_clear();

            let estimate = estimate?;
            debug!("{} input tokens, {} output tokens", estimate.input_tokens, estimate.output_tokens);
            println!("{} {}", Paint::green("[OK]"), estimate);
        }
        Command::Diagram(args) => {
            let request = args.request()?;
            let pb = create_spinner(format!("Drawing {}/{}", request.owner, request.repo));
            let artifact = service.generate_diagram(&request).await;
            finish(pb, artifact.is_ok());
            deliver(&artifact?, args.output.as_ref()).await?;
        }
        Command::Slides(args) => {
            let request = args.request()?;
            let pb = create_spinner(format!("Writing slides for {}/{}", request.owner, request.repo));
            let artifact = service.generate_slides(&request).await;
            finish(pb, artifact.is_ok());
            deliver(&artifact?, args.output.as_ref()).await?;
        }
        Command::Narrate { repo, length } => {
            let request = repo.request()?;
            let pb = create_spinner(format!("Narrating {}/{} ({})", request.owner, request.repo, length));
            let artifact = service.generate_narration(&request, length).await;
            finish(pb, artifact.is_ok());
            deliver(&artifact?, repo.output.as_ref()).await?;
        }
    }

    Ok(())
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style.tick_strings(&["-", "\\", "|", "/", "-", "\\", "|", "/"]));
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message);
    pb
}

fn finish(pb: ProgressBar, ok: bool) {
    if ok {
        pb.finish_with_message(format!("{} {}", Paint::green("[OK]"), Paint::blue("Generation completed")));
    } else {
        pb.finish_and_clear();
    }
}

async fn deliver(artifact: &Artifact, output: Option<&PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, artifact.body())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Saved to {}", Paint::green("[OK]"), Paint::blue(path.display()));
        }
        None => {
            if let Artifact::Diagram(diagram) = artifact {
                println!("{}\n\n{}\n", "Explanation".bright_yellow().bold(), diagram.explanation);
            }
            println!("{}", artifact.body());
        }
    }
    Ok(())
}
