//! Spotnet Provider
//!
//! Long-running daemon that answers compute demands on the Spotnet
//! marketplace with signed offers.
//!
//! # Usage
//!
//! ```bash
//! # Start with config/default.toml (+ config/local.toml if present)
//! spotnet-provider
//!
//! # Start with a specific config
//! spotnet-provider --config /path/to/provider.toml
//!
//! # Override individual settings from the environment
//! SPOTNET__NEGOTIATION__MODEL=QmModel spotnet-provider
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spotnet_agent::{DispatchOutcome, NegotiationAgent};
use spotnet_bus::{BusMessage, IpfsPubsub, MessageBus, Subscription};
use spotnet_chain::RpcContractClient;

use crate::config::ProviderConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Spotnet Provider - negotiation agent for the compute marketplace
#[derive(Parser, Debug)]
#[command(name = "spotnet-provider")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "SPOTNET_CONFIG")]
    config: Option<String>,

    /// IPFS daemon HTTP API
    #[arg(long, env = "SPOTNET_IPFS_API")]
    ipfs_api: Option<String>,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, env = "SPOTNET_NODE")]
    node: Option<String>,

    /// Model identifier to serve
    #[arg(long, env = "SPOTNET_MODEL")]
    model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SPOTNET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "SPOTNET_LOG_FORMAT")]
    log_format: Option<String>,

    /// Use the built-in development configuration (hardhat key, local daemons)
    #[arg(long, env = "SPOTNET_DEV_MODE")]
    dev_mode: bool,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut provider_config = if args.dev_mode {
        ProviderConfig::development()
    } else {
        ProviderConfig::load(args.config.as_deref())?
    };

    if let Some(url) = args.ipfs_api {
        provider_config.bus.ipfs_api_url = url;
    }
    if let Some(node) = args.node {
        provider_config.chain.http_node_provider = node;
    }
    if let Some(model) = args.model {
        provider_config.negotiation.model = model;
    }
    if let Some(level) = args.log_level {
        provider_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        provider_config.logging.format = format;
    }

    init_logging(&provider_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Spotnet provider"
    );

    provider_config.validate()?;

    let signer = provider_config.identity.signer()?;
    let agent_config = provider_config.agent_config()?;

    let chain = Arc::new(RpcContractClient::new(
        provider_config.chain.http_node_provider.clone(),
        provider_config.chain.factory()?,
    ));
    tracing::info!(
        node = %chain.endpoint(),
        factory = %chain.factory(),
        "Chain client ready"
    );

    let backoff = provider_config.bus.reconnect_backoff();
    let bus = Arc::new(
        IpfsPubsub::new(provider_config.bus.ipfs_api_url.clone())
            .with_reconnect_backoff(backoff.0, backoff.1),
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // The daemon may come up before the IPFS node does
    let (mut provider_sub, mut spot_sub) = tokio::select! {
        subs = async {
            let provider = subscribe_with_retry(bus.as_ref(), &agent_config.provider_topic, backoff).await;
            let spot = subscribe_with_retry(bus.as_ref(), &agent_config.spot_topic, backoff).await;
            (provider, spot)
        } => subs,
        _ = &mut shutdown => return Ok(()),
    };

    let mut agent = NegotiationAgent::new(agent_config, signer, chain, bus.clone());

    tracing::info!(
        address = %agent.address(),
        model = %agent.config().model,
        provider_topic = %provider_sub.topic(),
        spot_topic = %spot_sub.topic(),
        "Provider listening"
    );

    loop {
        let (from_provider, message) = tokio::select! {
            message = provider_sub.recv() => (true, message),
            message = spot_sub.recv() => (false, message),
            _ = &mut shutdown => break,
        };
        if let Some(message) = message {
            handle(&mut agent, &message).await;
            continue;
        }

        let closed = if from_provider {
            &mut provider_sub
        } else {
            &mut spot_sub
        };
        let topic = closed.topic().to_string();
        tracing::warn!(topic = %topic, "subscription closed, resubscribing");
        tokio::select! {
            fresh = subscribe_with_retry(bus.as_ref(), &topic, backoff) => *closed = fresh,
            _ = &mut shutdown => break,
        }
    }

    tracing::info!(
        status = agent.status().as_str(),
        queued = agent.state().queue().len(),
        trace_events = agent.trace().events.len(),
        "Provider shutdown complete"
    );
    if let Ok(trace) = serde_json::to_string(agent.trace()) {
        tracing::debug!(trace = %trace, "negotiation trace");
    }

    Ok(())
}

/// One message at a time, to completion
async fn handle(agent: &mut NegotiationAgent, message: &BusMessage) {
    let outcome = agent.dispatch(message).await;
    match &outcome {
        DispatchOutcome::Dropped(e) => {
            tracing::debug!(topic = %message.topic, kind = e.kind(), "message dropped")
        }
        other => tracing::debug!(topic = %message.topic, outcome = ?other, "message handled"),
    }
}

/// Subscribe, doubling the wait after each refusal up to `max`
async fn subscribe_with_retry(
    bus: &dyn MessageBus,
    topic: &str,
    (initial, max): (Duration, Duration),
) -> Subscription {
    let mut delay = initial;
    loop {
        match bus.subscribe(topic).await {
            Ok(subscription) => return subscription,
            Err(e) => {
                tracing::warn!(
                    topic,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "subscribe failed"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max);
            }
        }
    }
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use spotnet_bus::{BusError, BusResult, InProcBus};

    use super::*;

    /// Refuses the first `refusals` subscriptions, then delegates
    struct RestartingDaemon {
        inner: InProcBus,
        refusals: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MessageBus for RestartingDaemon {
        async fn publish(&self, topic: &str, data: Vec<u8>) -> BusResult<()> {
            self.inner.publish(topic, data).await
        }

        async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.refusals {
                return Err(BusError::Subscribe {
                    topic: topic.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.inner.subscribe(topic).await
        }
    }

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "spotnet-provider",
            "--model",
            "QmModel",
            "--log-format",
            "json",
            "--dev-mode",
        ]);
        assert_eq!(args.model.as_deref(), Some("QmModel"));
        assert_eq!(args.log_format.as_deref(), Some("json"));
        assert!(args.dev_mode);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = ProviderConfig::development();
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_retries_until_the_daemon_is_back() {
        let daemon = RestartingDaemon {
            inner: InProcBus::new("provider"),
            refusals: 3,
            attempts: AtomicUsize::new(0),
        };
        let started = tokio::time::Instant::now();

        let mut subscription = subscribe_with_retry(
            &daemon,
            "spotnet.provider",
            (Duration::from_millis(100), Duration::from_millis(250)),
        )
        .await;

        assert_eq!(daemon.attempts.load(Ordering::SeqCst), 4);
        // 100 + 200 + 250 (capped)
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(550), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(600), "waited {:?}", waited);

        daemon
            .inner
            .publish("spotnet.provider", b"{\"finalized\":true}".to_vec())
            .await
            .unwrap();
        let message = subscription.recv().await.unwrap();
        assert_eq!(message.topic, "spotnet.provider");
    }
}
