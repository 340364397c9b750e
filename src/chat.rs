use crate::error::{DeliveryFailure, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// Outbound side of the chat integration
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Map a user identity to the chat identifier messages are addressed to
    async fn resolve(&self, user: &str) -> Result<String>;

    /// Deliver `text` to an already resolved chat identifier
    async fn send(&self, chat_id: &str, text: &str) -> Result<()>;
}

/// Writes every message to stdout as `<chat id> <- <text>`
pub struct ConsoleTransport {
    out: Mutex<Stdout>,
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn resolve(&self, user: &str) -> Result<String> {
        let user = user.trim();
        if user.is_empty() {
            return Err(DeliveryFailure::Unreachable(user.to_string()).into());
        }
        Ok(format!("@{user}"))
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let line = format!("{chat_id} <- {text}\n");
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_resolve() {
        let transport = ConsoleTransport::new();
        assert_eq!(transport.resolve("alice").await.unwrap(), "@alice");
        assert!(transport.resolve("  ").await.is_err());
    }
}
