use posbindu_core::SyncReport;

use crate::commands::common::{AppContext, GlobalArgs};
use crate::error::CliError;

pub async fn run_sync(args: &GlobalArgs) -> Result<(), CliError> {
    if args.offline {
        return Err(CliError::Offline);
    }

    let context = AppContext::open(args).await?;
    let engine = context.engine()?;
    let Some(report) = engine.run_pass().await else {
        println!("A sync pass is already running");
        return Ok(());
    };

    for line in format_sync_report(&report) {
        println!("{line}");
    }

    match report.aborted {
        Some(reason) => Err(CliError::SyncAborted(reason)),
        None => Ok(()),
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Pushed: {} committed, {} retrying, {} failed, {} waiting on a dependency",
        report.committed, report.retried, report.evicted, report.deferred
    )];

    match (&report.aborted, report.pulled, &report.pull_error) {
        (Some(_), _, _) => lines.push("Pull skipped".to_string()),
        (None, Some(count), _) => lines.push(format!("Pulled: {count} patients merged")),
        (None, None, Some(error)) => lines.push(format!("Pull failed: {error}")),
        (None, None, None) => {}
    }

    if report.evicted > 0 {
        lines.push("Failed records are kept locally; see `posbindu patient list`.".to_string());
    }
    lines
}
