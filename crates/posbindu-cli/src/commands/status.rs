use serde::Serialize;

use crate::commands::common::{format_sync_timestamp, AppContext, GlobalArgs};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub profile: String,
    pub remote: Option<String>,
    /// `None` when reachability could not be determined
    pub online: Option<bool>,
    pub queued_items: usize,
    pub unsynced_patients: usize,
    pub unsynced_examinations: usize,
    pub last_pull_at: Option<i64>,
    pub last_pass_at: Option<i64>,
}

impl StatusReport {
    pub fn lines(&self) -> Vec<String> {
        let connectivity = match (self.remote.as_deref(), self.online) {
            (None, _) => "no remote configured (offline)".to_string(),
            (Some(url), Some(true)) => format!("online ({url})"),
            (Some(url), Some(false)) => format!("offline ({url} unreachable)"),
            (Some(url), None) => format!("unknown ({url})"),
        };
        let timestamp = |value: Option<i64>| {
            value.map_or_else(|| "never".to_string(), format_sync_timestamp)
        };

        vec![
            format!("Profile       {}", self.profile),
            format!("Remote        {connectivity}"),
            format!("Queued items  {}", self.queued_items),
            format!(
                "Unsynced      {} patients, {} examinations",
                self.unsynced_patients, self.unsynced_examinations
            ),
            format!("Last pull     {}", timestamp(self.last_pull_at)),
            format!("Last pass     {}", timestamp(self.last_pass_at)),
        ]
    }
}

pub async fn run_status(as_json: bool, args: &GlobalArgs) -> Result<(), CliError> {
    let context = AppContext::open(args).await?;
    let summary = context.store.pending_summary().await?;
    let meta = context.store.sync_meta().await?;
    let online = context.reachability(args.offline).await;

    let report = StatusReport {
        profile: context.profile_name.clone(),
        remote: context.remote_url().map(str::to_string),
        online,
        queued_items: summary.queued_items,
        unsynced_patients: summary.unsynced_patients,
        unsynced_examinations: summary.unsynced_examinations,
        last_pull_at: meta.last_pull_at,
        last_pass_at: meta.last_pass_at,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.lines() {
            println!("{line}");
        }
    }
    Ok(())
}
