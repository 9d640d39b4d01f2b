use super::Target;
use crate::display;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use worldvault_server::api::DEFAULT_BACKUP_MESSAGE;

pub fn run(target: &Target, words: Vec<String>) -> Result<()> {
    let message = if words.is_empty() {
        DEFAULT_BACKUP_MESSAGE.to_string()
    } else {
        words.join(" ")
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!("Backing up: {}", message));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = match target.client() {
        Some(client) => client.backup(Some(&message)),
        None => target
            .orchestrator()
            .and_then(|orchestrator| Ok(orchestrator.run_backup(&message)?)),
    };
    spinner.finish_and_clear();

    display::backup_result(&result?);
    Ok(())
}
