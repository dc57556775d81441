//! Chat commands.
//!
//! Every command is a thin renderer over one of two reads: the committed
//! fleet state from [`FleetStore::current`] or a direct runtime query.
//! Nothing here triggers a poll.

use std::sync::Arc;

use crate::confirm::{ConfirmOutcome, Confirmations, PendingAction};
use crate::llm::LlmClient;
use crate::monitor::store::FleetStore;
use crate::render::{
    MESSAGE_LIMIT, StatusFilter, format_bytes, render_counts, render_fleet, render_fleet_context,
    render_usage, split_message,
};
use crate::runtime::{ContainerRuntime, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Up,
    Down,
    Count,
    Ping,
    Stats(String),
    Restart(String),
    Prune,
    Confirm(String),
    Ask(String),
    Diagnose(String),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("❌ Command not found. Use `{prefix}help` to see the available commands.")]
    Unknown { prefix: String },
    #[error("❌ Missing argument. Usage: `{prefix}{usage}`")]
    MissingArgument { prefix: String, usage: &'static str },
}

impl Command {
    /// Parses a chat message. Returns `Ok(None)` for messages that are not
    /// addressed to the bot.
    pub fn parse(prefix: &str, text: &str) -> Result<Option<Self>, CommandError> {
        let Some(rest) = text.trim().strip_prefix(prefix) else {
            return Ok(None);
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());
        let missing = |usage| CommandError::MissingArgument {
            prefix: prefix.to_string(),
            usage,
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "status" => Command::Status,
            "up" => Command::Up,
            "down" => Command::Down,
            "count" => Command::Count,
            "ping" => Command::Ping,
            "stats" => Command::Stats(arg.ok_or_else(|| missing("stats <name>"))?),
            "restart" => Command::Restart(arg.ok_or_else(|| missing("restart <name>"))?),
            "prune" => Command::Prune,
            "confirm" => Command::Confirm(arg.ok_or_else(|| missing("confirm <token>"))?),
            "ask" => Command::Ask(arg.ok_or_else(|| missing("ask <question>"))?),
            "diagnose" => Command::Diagnose(arg.ok_or_else(|| missing("diagnose <question>"))?),
            "help" => Command::Help,
            _ => {
                return Err(CommandError::Unknown {
                    prefix: prefix.to_string(),
                });
            }
        };
        Ok(Some(command))
    }

    fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::Restart(_) | Command::Prune | Command::Confirm(_)
        )
    }
}

/// Who sent a command. `is_admin` is asserted by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: String,
    pub is_admin: bool,
}

pub struct CommandContext {
    pub store: Arc<FleetStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub confirmations: Confirmations,
    pub llm: Option<LlmClient>,
    pub prefix: String,
}

impl CommandContext {
    /// Handles one chat message. `None` if the message is not a command,
    /// otherwise the reply split into sendable chunks.
    pub async fn handle(&self, caller: &Caller, text: &str) -> Option<Vec<String>> {
        let reply = match Command::parse(&self.prefix, text) {
            Ok(None) => return None,
            Ok(Some(command)) => {
                log::debug!("{} issued {command:?}", caller.user);
                self.execute(caller, command).await
            }
            Err(e) => e.to_string(),
        };
        Some(split_message(&reply, MESSAGE_LIMIT))
    }

    pub async fn execute(&self, caller: &Caller, command: Command) -> String {
        if command.requires_admin() && !caller.is_admin {
            log::warn!("{} is not allowed to run {command:?}", caller.user);
            return "⛔ This command requires administrator permissions.".to_string();
        }

        match command {
            Command::Status => render_fleet(&self.store.current(), StatusFilter::All),
            Command::Up => render_fleet(&self.store.current(), StatusFilter::Running),
            Command::Down => render_fleet(&self.store.current(), StatusFilter::Stopped),
            Command::Count => render_counts(&self.store.current()),
            Command::Ping => self.ping().await,
            Command::Stats(name) => match self.runtime.resource_usage(&name).await {
                Ok(sample) => render_usage(&name, &sample),
                Err(e) => runtime_failure(&name, &e),
            },
            Command::Restart(name) => match self.runtime.restart(&name).await {
                Ok(()) => format!("✅ Container `{name}` restarted successfully!"),
                Err(e) => runtime_failure(&name, &e),
            },
            Command::Prune => self.request_prune(caller),
            Command::Confirm(token) => self.confirm(&token).await,
            Command::Ask(question) => self.ask(&question, false).await,
            Command::Diagnose(question) => self.ask(&question, true).await,
            Command::Help => self.help(),
        }
    }

    async fn ping(&self) -> String {
        let docker = match self.runtime.ping().await {
            Ok(()) => "✅ Connected".to_string(),
            Err(e) => {
                log::warn!("Docker ping failed: {e}");
                "❌ Unreachable".to_string()
            }
        };
        let last_poll = match self.store.current().last_update {
            Some(at) => {
                let age = chrono::Utc::now().signed_duration_since(at).num_seconds().max(0);
                format!("{age}s ago")
            }
            None => "never".to_string(),
        };
        format!("🏓 **Pong!**\nBot: ✅ Online\nDocker: {docker}\nLast poll: {last_poll}")
    }

    fn request_prune(&self, caller: &Caller) -> String {
        let stopped = self
            .store
            .current()
            .containers
            .values()
            .filter(|r| r.lifecycle_status.is_stopped())
            .count();
        let token = self
            .confirmations
            .request(PendingAction::PruneStopped, &caller.user);
        format!(
            "⚠️ This removes all stopped containers ({stopped} at the last poll).\n\
             Reply `{}confirm {token}` within {}s to proceed.",
            self.prefix,
            self.confirmations.timeout().as_secs()
        )
    }

    async fn confirm(&self, token: &str) -> String {
        match self.confirmations.confirm(token) {
            ConfirmOutcome::Confirmed(PendingAction::PruneStopped) => {
                match self.runtime.prune_stopped().await {
                    Ok(report) => format!(
                        "🧹 Removed {} containers, reclaimed {}.",
                        report.removed.len(),
                        format_bytes(report.space_reclaimed_bytes)
                    ),
                    Err(e) => format!("❌ Prune failed: {e}"),
                }
            }
            ConfirmOutcome::Expired => "⌛ Confirmation timed out, nothing was done.".to_string(),
            ConfirmOutcome::Unknown => "❌ Unknown or already used confirmation token.".to_string(),
        }
    }

    async fn ask(&self, question: &str, with_fleet: bool) -> String {
        let Some(llm) = &self.llm else {
            return "❌ Language model integration is not configured.".to_string();
        };
        let context = with_fleet.then(|| render_fleet_context(&self.store.current()));
        match llm.ask(question, context.as_deref()).await {
            Ok(answer) => format!("🤖 {answer}"),
            Err(e) => {
                log::error!("Language model request failed: {e}");
                format!("❌ Language model error: {e}")
            }
        }
    }

    fn help(&self) -> String {
        let p = &self.prefix;
        format!(
            "🤖 **Homelab Monitor - Commands**\n\
             📊 **Monitoring**\n\
             `{p}status` - All containers\n\
             `{p}up` - Running containers\n\
             `{p}down` - Stopped containers\n\
             `{p}count` - Quick summary\n\
             `{p}stats <name>` - Live resource usage\n\
             🔧 **Control** (administrators)\n\
             `{p}restart <name>` - Restart a container\n\
             `{p}prune` - Remove stopped containers (asks for confirmation)\n\
             `{p}confirm <token>` - Confirm a pending action\n\
             🧠 **Assistant**\n\
             `{p}ask <question>` - Ask the language model\n\
             `{p}diagnose <question>` - Ask with the current container state\n\
             ❓ `{p}ping` - Connection check, `{p}help` - This message"
        )
    }
}

fn runtime_failure(name: &str, e: &RuntimeError) -> String {
    match e {
        RuntimeError::NotFound(_) => format!("❌ Container `{name}` not found"),
        e => {
            log::error!("Runtime call for {name} failed: {e}");
            format!("❌ Error talking to Docker: {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::record::LifecycleStatus;
    use crate::monitor::testing::{FakeRuntime, record, snapshot};
    use crate::runtime::UsageSample;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn admin() -> Caller {
        Caller {
            user: "alice".to_string(),
            is_admin: true,
        }
    }

    fn guest() -> Caller {
        Caller {
            user: "bob".to_string(),
            is_admin: false,
        }
    }

    fn context(runtime: Arc<FakeRuntime>) -> CommandContext {
        let store = Arc::new(FleetStore::new());
        store.commit(snapshot(vec![
            record("web", LifecycleStatus::Running, Some(1)),
            record("db", LifecycleStatus::Exited, Some(1)),
        ]));
        CommandContext {
            store,
            runtime,
            confirmations: Confirmations::new(Duration::from_secs(30)),
            llm: None,
            prefix: "!".to_string(),
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("!", "hello"), Ok(None));
        assert_eq!(Command::parse("!", "!status"), Ok(Some(Command::Status)));
        assert_eq!(Command::parse("!", "  !UP  "), Ok(Some(Command::Up)));
        assert_eq!(
            Command::parse("!", "!restart  portainer "),
            Ok(Some(Command::Restart("portainer".to_string())))
        );
        assert_eq!(
            Command::parse("!", "!ask why is it slow?"),
            Ok(Some(Command::Ask("why is it slow?".to_string())))
        );
        assert_eq!(
            Command::parse("!", "!restart"),
            Err(CommandError::MissingArgument {
                prefix: "!".to_string(),
                usage: "restart <name>"
            })
        );
        assert!(matches!(
            Command::parse("!", "!launch"),
            Err(CommandError::Unknown { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_reads_committed_state() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(runtime.clone());
        let reply = ctx.handle(&guest(), "!status").await.expect("reply");
        assert_eq!(reply.len(), 1);
        assert!(reply[0].contains("1 running, 1 stopped, 2 total"));
        // Served from the store, not the runtime.
        assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 0);

        let down = ctx.handle(&guest(), "!down").await.expect("reply");
        assert!(down[0].contains("db-name"));
        assert!(!down[0].contains("web-name"));
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let ctx = context(Arc::new(FakeRuntime::new()));
        assert!(ctx.handle(&guest(), "good morning").await.is_none());
        let unknown = ctx.handle(&guest(), "!launch").await.expect("reply");
        assert!(unknown[0].contains("`!help`"));
    }

    #[tokio::test]
    async fn test_restart_requires_admin() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_fleet(vec![record("web", LifecycleStatus::Running, Some(1))]);
        let ctx = context(runtime.clone());

        let denied = ctx
            .execute(&guest(), Command::Restart("web-name".to_string()))
            .await;
        assert!(denied.contains("administrator"));
        assert!(runtime.restarts.lock().unwrap().is_empty());

        let done = ctx
            .execute(&admin(), Command::Restart("web-name".to_string()))
            .await;
        assert!(done.contains("restarted successfully"));
        assert_eq!(*runtime.restarts.lock().unwrap(), vec!["web-name".to_string()]);

        let missing = ctx
            .execute(&admin(), Command::Restart("ghost".to_string()))
            .await;
        assert_eq!(missing, "❌ Container `ghost` not found");
    }

    #[tokio::test]
    async fn test_stats_queries_runtime() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_usage(
            "web",
            UsageSample {
                cpu_percent: 12.5,
                memory_usage_bytes: 512 * 1024 * 1024,
                memory_limit_bytes: 1024 * 1024 * 1024,
                network_rx_bytes: 2048,
                network_tx_bytes: 1024,
            },
        );
        let ctx = context(runtime);
        let out = ctx.execute(&guest(), Command::Stats("web".to_string())).await;
        assert!(out.contains("CPU: 12.5%"));
        assert!(out.contains("512.0 MiB / 1.0 GiB (50.0%)"));
    }

    #[tokio::test]
    async fn test_ping_reports_unreachable_runtime() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_unreachable(true);
        let ctx = context(runtime);
        let out = ctx.execute(&guest(), Command::Ping).await;
        assert!(out.contains("Docker: ❌ Unreachable"));
        assert!(out.contains("s ago"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_needs_confirmation() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_fleet(vec![
            record("web", LifecycleStatus::Running, Some(1)),
            record("db", LifecycleStatus::Exited, Some(1)),
        ]);
        let ctx = context(runtime.clone());

        let prompt = ctx.execute(&admin(), Command::Prune).await;
        assert!(prompt.contains("1 at the last poll"));
        assert_eq!(runtime.prunes.load(Ordering::SeqCst), 0);

        let token = prompt
            .split("confirm ")
            .nth(1)
            .and_then(|s| s.split('`').next())
            .expect("token in prompt")
            .to_string();
        let done = ctx.execute(&admin(), Command::Confirm(token)).await;
        assert!(done.contains("Removed 1 containers"));
        assert_eq!(runtime.prunes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_times_out_without_side_effects() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = context(runtime.clone());

        let prompt = ctx.execute(&admin(), Command::Prune).await;
        let token = prompt
            .split("confirm ")
            .nth(1)
            .and_then(|s| s.split('`').next())
            .expect("token in prompt")
            .to_string();

        tokio::time::advance(Duration::from_secs(31)).await;
        let out = ctx.execute(&admin(), Command::Confirm(token)).await;
        assert!(out.contains("timed out"));
        assert_eq!(runtime.prunes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ask_without_llm() {
        let ctx = context(Arc::new(FakeRuntime::new()));
        let out = ctx
            .execute(&guest(), Command::Diagnose("what is down?".to_string()))
            .await;
        assert!(out.contains("not configured"));
    }
}
