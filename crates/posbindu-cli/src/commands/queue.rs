use chrono::Utc;

use crate::commands::common::{format_queue_lines, AppContext, GlobalArgs};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, args: &GlobalArgs) -> Result<(), CliError> {
    let context = AppContext::open(args).await?;
    let items = context.store.pending_items().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Sync queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&items, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}
