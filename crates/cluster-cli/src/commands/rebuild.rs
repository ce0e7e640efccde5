//! `rebuild` subcommands: querying the per-pool rebuild status.

use comfy_table::{presets::UTF8_FULL, Cell, Table};

use crate::demo;

/// Queries every pool given on the command line (the demo seeds pool 1)
/// and prints each one's `done`/`errno` status.
pub async fn ls(pools: &[u64]) -> anyhow::Result<()> {
    let runtime = demo::spawn().await?;
    let default_pools = [1u64];
    let pools: &[u64] = if pools.is_empty() { &default_pools } else { pools };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["pool", "done", "errno"]);
    for &pool in pools {
        let result = runtime.rebuild.query(pool).await;
        table.add_row(vec![Cell::new(pool), Cell::new(result.done), Cell::new(result.errno)]);
    }
    println!("{table}");
    Ok(())
}

/// Queries one pool and prints its status.
pub async fn query(pool: u64) -> anyhow::Result<()> {
    let runtime = demo::spawn().await?;
    let result = runtime.rebuild.query(pool).await;
    println!("{result:#?}");
    Ok(())
}
