use std::time::Duration;

use posbindu_core::{ConnectivityMonitor, Listener, SyncPhase};

use crate::commands::common::{AppContext, GlobalArgs};
use crate::error::CliError;

pub async fn run_watch(interval_secs: u64, args: &GlobalArgs) -> Result<(), CliError> {
    if interval_secs == 0 {
        return Err(CliError::InvalidArgument(
            "interval must be at least one second".to_string(),
        ));
    }
    if args.offline {
        return Err(CliError::Offline);
    }

    let context = AppContext::open(args).await?;
    let engine = context.engine()?;
    let probe = context.probe().ok_or(CliError::RemoteNotConfigured)?;

    let monitor = ConnectivityMonitor::new(probe.check().await);
    engine.attach(&monitor);
    monitor.subscribe(
        Listener::new()
            .on_online(|| {
                println!("Remote reachable, syncing queued work");
                Ok(())
            })
            .on_offline(|| {
                println!("Remote unreachable, new work will be queued");
                Ok(())
            }),
    );

    println!(
        "Watching {} every {interval_secs}s (Ctrl-C to stop)",
        probe.target()
    );
    if monitor.is_online() && context.store.queue_len().await? > 0 && engine.trigger().is_some() {
        println!("Remote reachable, syncing queued work");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                monitor.update(probe.check().await);
            }
        }
    }

    while engine.phase() != SyncPhase::Idle {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let summary = context.store.pending_summary().await?;
    println!("Stopped; {} items still queued", summary.queued_items);
    Ok(())
}
