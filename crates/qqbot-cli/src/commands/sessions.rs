//! Session snapshot inspection.

use clap::Args;
use qqbot_core::{paths, BotConfig};
use qqbot_session::{SessionRecord, SnapshotStore};
use std::path::PathBuf;

/// Sessions command arguments.
#[derive(Args)]
pub struct SessionsArgs {
    /// Bot id whose snapshot to read
    pub bot_id: String,

    /// Snapshot directory, overriding the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Print one line per persisted record.
pub async fn run(args: SessionsArgs, config: Option<BotConfig>) -> anyhow::Result<()> {
    let dir = match (args.dir, config) {
        (Some(dir), _) => dir,
        (None, Some(config)) => config.session_commit_dir()?,
        (None, None) => paths::sessions_dir()?,
    };
    let store = SnapshotStore::new(paths::session_snapshot_file(&dir, &args.bot_id));

    let Some(table) = store.read().await? else {
        println!("No snapshot at {}", store.path().display());
        return Ok(());
    };

    let mut total = 0;
    for (scope, identities) in &table {
        for (identity, keys) in identities {
            for (key, record) in keys {
                println!("{}", describe(&scope.to_string(), identity, key, record));
                total += 1;
            }
        }
    }
    println!("\n{} session(s) in {}", total, store.path().display());
    Ok(())
}

fn describe(scope: &str, identity: &str, key: &str, record: &SessionRecord) -> String {
    let who = if identity.is_empty() { "-" } else { identity };
    format!(
        "{:<8} {:<24} {:<20} {:<8} last {}",
        scope,
        who,
        key,
        format!("{:?}", record.status),
        record.last_operate_at.to_rfc3339()
    )
}
