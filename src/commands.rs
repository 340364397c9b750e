/**
 * Chat command surface
 *
 * Each chat line is parsed with clap and answered with a list of text lines.
 * Failures never escape: they come back as a single line for the user.
 */
use crate::chat::ChatTransport;
use crate::config::{NAMESPACE_TASK, POD_TASK};
use crate::error::Result;
use crate::k8s::{ResourceApi, ResourceKind, WatchScope};
use crate::store::{MonitorOutcome, SubscriberStore, UnmonitorOutcome, Verbosity};
use crate::watch::{EventRouter, PollerScheduler, StartOutcome, StopOutcome, WatchTarget};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, warn};

#[derive(Parser, Debug)]
#[command(
    name = "kubenotify",
    no_binary_name = true,
    disable_version_flag = true,
    about = "Watch pods and namespaces from chat"
)]
struct ChatCommand {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Start the pod and namespace watchers
    Start,
    /// Stop the pod and namespace watchers
    Stop,
    /// Show your settings and the watcher states
    Status,
    /// Set the minimum severity delivered to you
    Verbosity {
        #[arg(value_enum)]
        level: Verbosity,
    },
    /// Show or set your default namespace
    Namespace { name: Option<String> },
    /// Get events for a pod
    Monitor { pod: String },
    /// Stop getting events for a pod
    Unmonitor { pod: String },
    /// List pods with their IPs
    Pods {
        /// Only list pods in your namespace
        #[arg(long)]
        here: bool,
    },
    /// List namespaces
    Namespaces,
    /// List kube contexts
    Contexts,
    /// Delete a pod or a namespace
    Delete {
        #[command(subcommand)]
        target: DeleteTarget,
    },
}

#[derive(Subcommand, Debug)]
enum DeleteTarget {
    /// Delete a pod, in your namespace unless -n is given
    Pod {
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Delete a namespace
    Namespace { name: String },
}

pub struct CommandHandler {
    store: Arc<SubscriberStore>,
    scheduler: Arc<PollerScheduler>,
    router: Arc<EventRouter>,
    api: Arc<dyn ResourceApi>,
    scope: WatchScope,
    idle_timeout: Option<Duration>,
}

impl CommandHandler {
    #[must_use]
    pub fn new(
        store: Arc<SubscriberStore>,
        scheduler: Arc<PollerScheduler>,
        router: Arc<EventRouter>,
        api: Arc<dyn ResourceApi>,
        scope: WatchScope,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            scheduler,
            router,
            api,
            scope,
            idle_timeout,
        }
    }

    /// Answer `<user> <command>` lines from `input` until it ends or a read
    /// fails, replying through `transport`. Returns how many lines were answered.
    pub async fn serve<R>(&self, input: R, transport: &dyn ChatTransport) -> usize
    where
        R: AsyncBufRead + Unpin,
    {
        let mut answered = 0;
        let mut lines = input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("❌ reading commands failed: {}", e);
                    break;
                }
            };
            let Some((user, command)) = line.trim().split_once(char::is_whitespace) else {
                continue;
            };
            let chat_id = match transport.resolve(user).await {
                Ok(chat_id) => chat_id,
                Err(e) => {
                    warn!("cannot reply to {}: {}", user, e);
                    continue;
                }
            };
            for reply in self.handle(user, command).await {
                if let Err(e) = transport.send(&chat_id, &reply).await {
                    warn!("reply to {} failed: {}", user, e);
                }
            }
            answered += 1;
        }
        answered
    }

    /// Answer one chat line from `user`
    pub async fn handle(&self, user: &str, line: &str) -> Vec<String> {
        debug!("{} > {}", user, line);
        let command = match ChatCommand::try_parse_from(line.split_whitespace()) {
            Ok(command) => command,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) =>
            {
                return e
                    .to_string()
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Err(e) => {
                let rendered = e.to_string();
                let first = rendered
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("error: invalid command");
                return vec![first.trim().to_string()];
            }
        };

        match self.execute(user, command.action).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("command from {} failed: {}", user, e);
                vec![e.user_message()]
            }
        }
    }

    async fn execute(&self, user: &str, action: Action) -> Result<Vec<String>> {
        match action {
            Action::Start => Ok(self.start_watchers().await),
            Action::Stop => Ok(self.stop_watchers().await),
            Action::Status => self.status(user).await,
            Action::Verbosity { level } => {
                let config = self.store.set_verbosity(user, level).await?;
                Ok(vec![format!("verbosity set to {}", config.verbosity)])
            }
            Action::Namespace { name: None } => {
                let config = self.store.get_or_create(user).await?;
                Ok(vec![format!("namespace is {}", config.namespace)])
            }
            Action::Namespace { name: Some(name) } => {
                let config = self.store.set_namespace(user, &name).await?;
                Ok(vec![format!("namespace set to {}", config.namespace)])
            }
            Action::Monitor { pod } => Ok(vec![match self.store.monitor(user, &pod).await? {
                MonitorOutcome::Added => format!("monitoring pod {pod}"),
                MonitorOutcome::AlreadyMonitoring => format!("already monitoring pod {pod}"),
            }]),
            Action::Unmonitor { pod } => Ok(vec![match self.store.unmonitor(user, &pod).await? {
                UnmonitorOutcome::Removed => format!("stopped monitoring pod {pod}"),
                UnmonitorOutcome::NotMonitoring => format!("not monitoring pod {pod}"),
            }]),
            Action::Pods { here } => self.list_pods(user, here).await,
            Action::Namespaces => self.list_namespaces().await,
            Action::Contexts => Ok(self.api.contexts().await?),
            Action::Delete {
                target: DeleteTarget::Pod { name, namespace },
            } => {
                let namespace = match namespace {
                    Some(ns) => ns,
                    None => self.store.get_or_create(user).await?.namespace,
                };
                self.api
                    .delete(ResourceKind::Pod, &name, Some(&namespace), self.scope.context.as_deref())
                    .await?;
                Ok(vec![format!("deleted pod {namespace}/{name}")])
            }
            Action::Delete {
                target: DeleteTarget::Namespace { name },
            } => {
                self.api
                    .delete(ResourceKind::Namespace, &name, None, self.scope.context.as_deref())
                    .await?;
                Ok(vec![format!("deleted namespace {name}")])
            }
        }
    }

    fn targets(&self) -> [(&'static str, ResourceKind, WatchScope); 2] {
        let cluster = WatchScope {
            namespace: None,
            context: self.scope.context.clone(),
        };
        [
            (POD_TASK, ResourceKind::Pod, self.scope.clone()),
            (NAMESPACE_TASK, ResourceKind::Namespace, cluster),
        ]
    }

    /// Start both poller tasks, reporting each one's outcome
    pub async fn start_watchers(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (task, kind, scope) in self.targets() {
            let target = Arc::new(WatchTarget {
                api: self.api.clone(),
                kind,
                scope,
                idle_timeout: self.idle_timeout,
            });
            let outcome = self
                .scheduler
                .start_task(task, target, self.router.clone())
                .await;
            lines.push(match outcome {
                StartOutcome::Started => format!("{task} watcher started"),
                StartOutcome::AlreadyRunning => format!("{task} watcher already running"),
            });
        }
        lines
    }

    /// Stop both poller tasks, reporting each one's outcome
    pub async fn stop_watchers(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (task, _, _) in self.targets() {
            lines.push(match self.scheduler.stop_task(task).await {
                StopOutcome::Stopped => format!("{task} watcher stopped"),
                StopOutcome::NotRunning => format!("{task} watcher not running"),
            });
        }
        lines
    }

    async fn status(&self, user: &str) -> Result<Vec<String>> {
        let config = self.store.get_or_create(user).await?;
        let monitoring = if config.monitored.is_empty() {
            "nothing".to_string()
        } else {
            config.monitored.iter().join(", ")
        };

        let mut lines = vec![
            format!("namespace: {}", config.namespace),
            format!("verbosity: {}", config.verbosity),
            format!("monitoring: {monitoring}"),
        ];
        let tasks = self.scheduler.tasks().await;
        for (task, _, _) in self.targets() {
            let line = match tasks.iter().find(|t| t.name == task) {
                Some(t) => format!(
                    "{} watcher: {} (restarts: {})",
                    task,
                    t.state.as_str(),
                    t.restarts
                ),
                None => format!("{task} watcher: stopped"),
            };
            lines.push(line);
        }
        let stats = self.router.stats();
        lines.push(format!(
            "events routed: {}, delivered: {}, failed: {}",
            stats.events_routed, stats.deliveries, stats.delivery_failures
        ));
        Ok(lines)
    }

    async fn list_pods(&self, user: &str, here: bool) -> Result<Vec<String>> {
        let scope = if here {
            WatchScope {
                namespace: Some(self.store.get_or_create(user).await?.namespace),
                context: self.scope.context.clone(),
            }
        } else {
            self.scope.clone()
        };
        let pods = self.api.list_all(ResourceKind::Pod, &scope).await?;

        let mut lines = vec!["Listing pods with their IPs:".to_string()];
        lines.extend(pods.into_iter().map(|p| {
            format!(
                "{}\t{}\t{}",
                p.ip.as_deref().unwrap_or("-"),
                p.namespace.as_deref().unwrap_or("-"),
                p.name
            )
        }));
        Ok(lines)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let scope = WatchScope {
            namespace: None,
            context: self.scope.context.clone(),
        };
        let namespaces = self.api.list_all(ResourceKind::Namespace, &scope).await?;
        Ok(namespaces
            .into_iter()
            .map(|ns| {
                format!(
                    "{}\t{}\t{}",
                    ns.name,
                    ns.phase.as_deref().unwrap_or("Unknown"),
                    ns.age
                )
            })
            .collect())
    }
}
