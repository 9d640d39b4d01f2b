use super::Target;
use crate::display;
use anyhow::Result;

pub fn run(target: &Target, page: usize) -> Result<()> {
    let history = match target.client() {
        Some(client) => client.snapshots(page)?,
        None => target.orchestrator()?.history_page(page)?,
    };

    display::history_page(&history);
    Ok(())
}
