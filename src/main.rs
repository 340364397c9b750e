use anyhow::Context;
use clap::Parser;
use kubenotify::chat::{ChatTransport, ConsoleTransport};
use kubenotify::commands::CommandHandler;
use kubenotify::config::{DEFAULT_DB_LOCATION, DEFAULT_RESTART_DELAY_SECONDS, DEFAULT_SEND_TIMEOUT_SECONDS, WatchConfig};
use kubenotify::k8s::{KubeResourceApi, ResourceApi, WatchScope};
use kubenotify::store::{MemoryStorage, SqliteStorage, Storage, SubscriberStore};
use kubenotify::watch::{EventRouter, PollerScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat notifications for pod and namespace changes", long_about = None)]
struct Args {
    /// Only watch pods in this namespace (default: all namespaces)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Kube context to use (default: current context)
    #[arg(long)]
    context: Option<String>,

    /// Subscriber database file, or :memory:
    #[arg(long, default_value = DEFAULT_DB_LOCATION)]
    db: String,

    /// Seconds to wait before reopening a terminated watch (at least 1)
    #[arg(long, default_value_t = DEFAULT_RESTART_DELAY_SECONDS, value_parser = clap::value_parser!(u64).range(1..))]
    restart_delay: u64,

    /// Seconds allowed for one chat delivery (at least 1)
    #[arg(long, default_value_t = DEFAULT_SEND_TIMEOUT_SECONDS, value_parser = clap::value_parser!(u64).range(1..))]
    send_timeout: u64,

    /// Stop a watcher after this many consecutive restarts (default: never)
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Do not start the watchers until someone sends `start`
    #[arg(long)]
    no_autostart: bool,
}

impl Args {
    fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            restart_delay: Duration::from_secs(self.restart_delay),
            max_restarts: self.max_restarts,
            send_timeout: Duration::from_secs(self.send_timeout),
            ..WatchConfig::default()
        }
    }
}

async fn open_storage(db: &str) -> anyhow::Result<Arc<dyn Storage>> {
    if db == ":memory:" {
        return Ok(Arc::new(MemoryStorage::new()));
    }
    let storage = SqliteStorage::open(db)
        .await
        .with_context(|| format!("opening subscriber database {db}"))?;
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kubenotify=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    let config = args.watch_config();

    let store = Arc::new(SubscriberStore::new(open_storage(&args.db).await?));
    let repaired = store.reconcile_index().await?;
    if repaired > 0 {
        warn!("repaired {} subscriber index entries", repaired);
    }

    let api: Arc<dyn ResourceApi> = Arc::new(KubeResourceApi::new(config.watch_timeout_secs));
    let transport: Arc<dyn ChatTransport> = Arc::new(ConsoleTransport::new());
    let router = Arc::new(EventRouter::new(store.clone(), transport.clone(), config.send_timeout));
    let scheduler = Arc::new(PollerScheduler::new(config.clone()));
    let scope = WatchScope {
        namespace: args.namespace.clone(),
        context: args.context.clone(),
    };
    let handler = CommandHandler::new(
        store,
        scheduler.clone(),
        router,
        api,
        scope,
        config.idle_timeout,
    );

    if !args.no_autostart {
        for line in handler.start_watchers().await {
            info!("{}", line);
        }
    }

    info!("🚀 kubenotify ready, reading `<user> <command>` lines from stdin");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("🛑 interrupt received"),
        answered = handler.serve(BufReader::new(tokio::io::stdin()), transport.as_ref()) => {
            info!("stdin closed after {} commands", answered);
        }
    }

    scheduler.stop_all().await;
    info!("👋 all watchers stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["kubenotify"]).unwrap();
        let config = args.watch_config();
        assert_eq!(config.restart_delay, Duration::from_secs(DEFAULT_RESTART_DELAY_SECONDS));
        assert_eq!(config.send_timeout, Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECONDS));
        assert!(config.max_restarts.is_none());
    }

    #[test]
    fn test_zero_delays_rejected() {
        assert!(Args::try_parse_from(["kubenotify", "--restart-delay", "0"]).is_err());
        assert!(Args::try_parse_from(["kubenotify", "--send-timeout", "0"]).is_err());
        let args = Args::try_parse_from(["kubenotify", "--restart-delay", "1"]).unwrap();
        assert_eq!(args.watch_config().restart_delay, Duration::from_secs(1));
    }
}
