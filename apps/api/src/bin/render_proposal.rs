//! Interactive export: composes a proposal JSON file into a PDF on disk.
//!
//! ```text
//! render_proposal --input proposal.json [--output proposal.pdf] [--draft]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proposal_api::llm_client::LlmClient;
use proposal_api::proposal::models::attachment_filename;
use proposal_api::proposal::{
    ExportedProposal, Letterhead, LlmDrafter, OutputTarget, ProposalComposer, ProposalDocument,
};

#[derive(Parser)]
#[command(name = "render_proposal", version, about = "Render a proposal JSON document to PDF")]
struct Cli {
    /// Proposal document (camelCase JSON, as accepted by POST /api/v1/proposals/render)
    #[arg(short, long)]
    input: PathBuf,

    /// Output path. Defaults to the attachment name in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run the AI drafting pass first (needs ANTHROPIC_API_KEY)
    #[arg(long)]
    draft: bool,

    /// Upper bound on the drafting call
    #[arg(long, default_value_t = 90)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let doc: ProposalDocument = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", cli.input.display()))?;

    let mut composer = ProposalComposer::new(Letterhead::default());
    if cli.draft {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => {
                let llm = LlmClient::new(key).context("building LLM client")?;
                composer = composer.with_drafter(
                    Arc::new(LlmDrafter::new(llm)),
                    Duration::from_secs(cli.timeout_secs),
                );
            }
            Err(_) => warn!("--draft given but ANTHROPIC_API_KEY is not set; rendering original content"),
        }
    }

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(attachment_filename(&doc.id, &doc.title)));

    let composed = composer
        .compose(doc, cli.draft, OutputTarget::File(output))
        .await
        .context("Failed to export PDF")?;

    let ExportedProposal::Saved(path) = composed.output else {
        bail!("expected the PDF to be written to disk");
    };
    info!(
        path = %path.display(),
        pages = composed.page_count,
        drafted = composed.drafted,
        "Proposal written"
    );
    println!("{}", path.display());
    Ok(())
}
