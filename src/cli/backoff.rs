//! Backoff command implementation

use crate::config::Config;
use crate::ws::ConnectionState;
use clap::Args;

#[derive(Args, Debug)]
pub struct BackoffArgs {
    /// Number of reconnect attempts to show
    #[arg(short, long, default_value_t = 8)]
    pub attempts: u32,
}

impl BackoffArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ws_config = config.ws_config()?;
        println!("Reconnect schedule for {}:", ws_config.endpoint);
        for line in self.schedule_lines(config)? {
            println!("  {}", line);
        }
        Ok(())
    }

    fn schedule_lines(&self, config: &Config) -> anyhow::Result<Vec<String>> {
        let backoff = config.ws_config()?.backoff();
        Ok(backoff
            .schedule(self.attempts)
            .into_iter()
            .enumerate()
            .map(|(attempt, delay)| {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let state = ConnectionState::Reconnecting { delay_ms };
                format!("attempt {:>2}: {:>5} ms  {}", attempt, delay_ms, state.label())
            })
            .collect())
    }
}
