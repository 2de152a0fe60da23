use std::sync::Arc;

use anyhow::Context;

use inbox_assist::config::{AssistConfig, ReportFormat, RuntimeConfig};
use inbox_assist::llm::{MeteredProvider, create_provider};
use inbox_assist::mail::{GmailClient, MailClient};
use inbox_assist::pipeline::Orchestrator;
use inbox_assist::report;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays clean for the transcript or JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::warn!("A rustls crypto provider was already installed");
    }

    let config = AssistConfig::from_env().context("Invalid assistant configuration")?;
    let runtime = RuntimeConfig::from_env().context("Invalid runtime configuration")?;

    eprintln!("Inbox Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} <{}>", config.user_name, config.user_email);
    eprintln!(
        "   Model: {} ({})",
        runtime.llm.model, runtime.llm.backend
    );
    eprintln!("   Tone: {}   Max emails: {}", config.tone, config.max_emails);
    eprintln!("   Drafts only. Nothing is sent.\n");

    let llm = create_provider(&runtime.llm).context("Failed to create LLM provider")?;
    let metered = Arc::new(MeteredProvider::new(llm));

    let from = format!("{} <{}>", config.user_name, config.user_email);
    let gmail = GmailClient::connect(
        &runtime.token_file,
        runtime.access_token.clone(),
        from,
        config.selection,
    )
    .await
    .context("Gmail authentication failed")?;
    let mail: Arc<dyn MailClient> = Arc::new(gmail);

    let orchestrator =
        Orchestrator::metered(mail, metered).with_transcript(runtime.report == ReportFormat::Text);

    let run = orchestrator.run(&config).await.context("Run aborted")?;

    if runtime.report == ReportFormat::Json {
        println!("{}", report::render_json(&run)?);
    }

    Ok(())
}
