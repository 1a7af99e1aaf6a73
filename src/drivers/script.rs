//! External script execution
//!
//! Runs keymap `script` actions and the fallback chain's scripted
//! keypresses through the shell. The command is awaited inline: a slow
//! script blocks dispatch for its duration, which is the accepted
//! simplicity/latency trade-off of the single-task design.

use tokio::process::Command;
use tracing::{debug, warn};

pub struct ScriptRunner {
    /// Template for scripted keypresses; `{key}` is replaced with the key
    /// name. Absent template means the scripted-keypress actuator is off.
    key_template: Option<String>,
}

impl ScriptRunner {
    pub fn new(key_template: Option<String>) -> Self {
        Self { key_template }
    }

    /// Run a shell command, reporting whether it succeeded.
    pub async fn run(&self, command: &str) -> bool {
        debug!("Running script '{}'", command);
        match Command::new("sh").arg("-c").arg(command).status().await {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!("Script '{}' exited with {}", command, status);
                false
            }
            Err(e) => {
                warn!("Couldn't run script '{}': {}", command, e);
                false
            }
        }
    }

    /// Produce a keypress through the configured script template.
    pub async fn key(&self, key: &str) -> bool {
        let Some(template) = &self.key_template else {
            return false;
        };
        self.run(&template.replace("{key}", key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_reports_exit_status() {
        let runner = ScriptRunner::new(None);
        assert!(runner.run("exit 0").await);
        assert!(!runner.run("exit 3").await);
    }

    #[tokio::test]
    async fn key_without_template_is_a_soft_failure() {
        let runner = ScriptRunner::new(None);
        assert!(!runner.key("p").await);
    }

    #[tokio::test]
    async fn key_substitutes_into_template() {
        let runner = ScriptRunner::new(Some("test {key} = p".into()));
        assert!(runner.key("p").await);
        assert!(!runner.key("q").await);
    }
}
