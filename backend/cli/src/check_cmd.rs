//! `idlewatch check`: dry-run reconciliation.

use std::sync::Arc;

use anyhow::Result;
use idlewatch_channels::{SlackClient, SlackConfig};
use idlewatch_scheduler::Inspection;
use tokio::sync::mpsc;

use crate::config::Config;

pub async fn run(config: &Config, json: bool) -> Result<()> {
    let client = Arc::new(SlackClient::new(SlackConfig::new(&config.bot_token)));
    // Nothing is ever armed, so the inbox stays empty.
    let (inbox_tx, _inbox_rx) = mpsc::channel(1);
    let watchdog = crate::build_watchdog(config, &client, inbox_tx);

    let inspection = watchdog.inspect().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print!("{}", render(&inspection));
    }
    Ok(())
}

fn render(inspection: &Inspection) -> String {
    let report = &inspection.report;
    let mut out = format!(
        "Scanned {} channel(s), {} message(s) in the look-back window\n",
        report.channels_scanned, report.events_seen
    );
    match &report.baseline {
        Some(last) => out.push_str(&format!("Last activity: {last}\n")),
        None => out.push_str("Last activity: none found\n"),
    }
    match inspection.deadline {
        Some(deadline) if !inspection.overdue => {
            out.push_str(&format!("Idle deadline: {}\n", deadline.to_rfc3339()));
        }
        _ => out.push_str("Idle deadline: already passed, run would notify now\n"),
    }
    for skipped in &report.skipped {
        out.push_str(&format!(
            "Skipped #{} ({}): {}\n",
            skipped.name, skipped.channel_id, skipped.reason
        ));
    }
    out
}
