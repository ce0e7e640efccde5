//! `member` subcommands: listing and inspecting the membership view.

use comfy_table::{presets::UTF8_FULL, Cell, Table};

use crate::demo;

/// Lists every known member, its status, incarnation, and delay estimate.
pub async fn ls() -> anyhow::Result<()> {
    let runtime = demo::spawn().await?;
    let members = runtime.membership.members().await;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["rank", "status", "incarnation", "delay_ms"]);
    for member in members {
        table.add_row(vec![
            Cell::new(member.id),
            Cell::new(format!("{:?}", member.status)),
            Cell::new(member.incarnation),
            Cell::new(member.delay_ms),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Prints one member's full state.
pub async fn get(rank: u64) -> anyhow::Result<()> {
    let runtime = demo::spawn().await?;
    let member = runtime.membership.state_get(rank).await?;
    println!("{member:#?}");
    Ok(())
}
