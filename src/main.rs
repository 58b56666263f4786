use std::sync::Arc;

use anyhow::Context;

use mail_sift::config::Config;
use mail_sift::llm::create_provider;
use mail_sift::mailbox::ImapMailbox;
use mail_sift::mailbox::smtp::SmtpSender;
use mail_sift::pipeline::{Orchestrator, PipelineSettings, spawn_scheduler, stop_scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    eprintln!("📬 mail-sift v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Mailbox: {}@{}", config.mail.username, config.mail.imap_host);
    eprintln!("   Forward to: {}", config.forward_to);
    eprintln!("   Label: {}", config.label_name);
    if config.run_once {
        eprintln!("   Mode: single pass");
    } else {
        eprintln!("   Mode: every {} min", config.scan_interval.as_secs() / 60);
    }

    let llm = create_provider(&config.llm);
    let mailbox = Arc::new(ImapMailbox::new(config.mail.clone()));
    let sender = Arc::new(SmtpSender::new(config.mail.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        mailbox.clone(),
        mailbox,
        sender,
        llm,
        PipelineSettings::from_config(&config),
    ));

    orchestrator
        .verify_setup()
        .await
        .context("Setup check failed")?;

    if config.run_once {
        let report = orchestrator.run().await.context("Pass failed")?;
        eprintln!(
            "   Done: {} matched, {} forwarded, {} thread(s) labeled",
            report.matches, report.forwarded, report.labeled
        );
        return Ok(());
    }

    let (handle, shutdown) = spawn_scheduler(Arc::clone(&orchestrator), config.scan_interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    if let Err(e) = stop_scheduler(handle, &shutdown).await {
        tracing::error!(error = %e, "Scheduler task failed");
    }

    Ok(())
}
