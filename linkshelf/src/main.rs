use clap::Parser;
use linkshelf::{Application, Config, config::Args, telemetry};
use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal = received, "Shutting down linkshelf");
}

/// `--validate` output: what this configuration would run
fn describe(config: &Config) -> String {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    format!(
        "Configuration is valid. bind={} public_url={} registration={} trending={} webhooks={} leader_election={} metrics={}",
        config.bind_address(),
        config.public_url,
        on_off(config.auth.native.enabled && config.auth.native.allow_registration),
        on_off(config.trending.enabled),
        on_off(config.webhooks.enabled),
        on_off(config.background_services.leader_election.enabled),
        on_off(config.enable_metrics),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before anything builds a TLS client (SMTP, webhooks, OTLP)
    if rustls::crypto::aws_lc_rs::default_provider().install_default().is_err() {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("{}", describe(&config));
        return Ok(());
    }

    // The tracer provider stays in `telemetry` and is flushed at the end of `serve`
    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::debug!(?args, "Starting");

    Application::new(config).await?.serve(shutdown_signal()).await
}
