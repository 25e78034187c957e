//! High-level entry point: resolve a command and issue it.

use tracing::debug;

use crate::command::{CommandTable, Resolved};
use crate::config::SessionConfig;
use crate::error::EiscpError;
use crate::navigation::{MacroReport, Navigator};
use crate::network::{ConnectionInfo, Session, SessionEvents};

/// Queries sent after connecting so the state starts populated.
pub const REFRESH_COMMANDS: &[&str] = &["artist", "track", "title", "ls", "v?", "m?", "s?", "n?"];

/// Result of [`Client::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent(String),
    Macro(MacroReport),
}

pub struct Client {
    session: Session,
    table: CommandTable,
    navigator: Navigator,
}

impl Client {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_table(config, CommandTable::standard())
    }

    pub fn with_table(config: SessionConfig, table: CommandTable) -> Self {
        let navigator = Navigator::from_config(&config);
        Self {
            session: Session::new(config),
            table,
            navigator,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub async fn connect(&mut self, info: &ConnectionInfo) -> Result<SessionEvents, EiscpError> {
        self.session.connect(info).await
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Resolve `(name, arg)` and send the opcode, or run the macro.
    ///
    /// Resolution errors are returned before anything touches the link.
    pub async fn execute(&self, name: Option<&str>, arg: Option<&str>) -> Result<Outcome, EiscpError> {
        match self.table.resolve(name, arg)? {
            Resolved::Opcode(opcode) => {
                self.session.send_raw(&opcode).await?;
                Ok(Outcome::Sent(opcode))
            }
            Resolved::Macro(plan) => {
                let report = self.navigator.run(&self.session, &plan).await?;
                debug!(%plan, issued = report.issued, "macro done");
                Ok(Outcome::Macro(report))
            }
        }
    }

    /// Ask the receiver for everything the state model tracks, spacing the
    /// queries by the command interval.
    pub async fn refresh(&self) -> Result<(), EiscpError> {
        for name in REFRESH_COMMANDS {
            tokio::time::sleep(self.navigator.interval()).await;
            self.execute(Some(*name), None).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolution_errors_come_first() {
        let client = Client::new(SessionConfig::default());
        assert!(matches!(
            client.execute(Some("nope"), None).await,
            Err(EiscpError::UnknownCommand(_))
        ));
        assert!(matches!(
            client.execute(Some("v"), None).await,
            Err(EiscpError::ArgumentCount { .. })
        ));
    }

    #[tokio::test]
    async fn commands_and_macros_need_a_connection() {
        let client = Client::new(SessionConfig::default());
        assert!(matches!(
            client.execute(Some("p1"), Some("ignored")).await,
            Err(EiscpError::NotConnected)
        ));
        assert!(matches!(
            client.execute(Some("go"), Some("dlna")).await,
            Err(EiscpError::NotConnected)
        ));
    }

    #[test]
    fn refresh_commands_are_literals() {
        let table = CommandTable::standard();
        for name in REFRESH_COMMANDS {
            assert!(matches!(
                table.resolve(Some(*name), None),
                Ok(Resolved::Opcode(_))
            ));
        }
    }
}
