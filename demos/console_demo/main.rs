//! Console list page walkthrough
//!
//! This example demonstrates:
//! - Loading list profiles (built-in, or a YAML file given as first argument)
//! - Mounting a seeded list against an in-memory source
//! - Search box, date picker and grid events editing one query
//! - A failed refresh keeping the previous rows
//! - Background polling released on unmount

use chrono::TimeZone;
use serde_json::json;
use table_query::prelude::*;
use table_query::telemetry;

fn sample_rows() -> Vec<serde_json::Value> {
    let nicknames = ["alice", "bob", "carol", "dave", "erin", "frank", "grace"];
    nicknames
        .iter()
        .enumerate()
        .map(|(i, nickname)| {
            json!({
                "id": format!("tx-{}", i + 1),
                "type": if i % 2 == 0 { "deposit" } else { "withdrawal" },
                "status": if i % 3 == 0 { "pending" } else { "approved" },
                "amount": (i as i64 + 1) * 10_000,
                "users": {"userid": format!("{}{:02}", nickname, i), "role": if i == 5 { "partner" } else { "user" }},
                "profiles": {"nickname": nickname},
                "created_at": format!("2024-03-{:02}T09:00:00.000Z", i * 4 + 1),
            })
        })
        .collect()
}

fn print_rows(title: &str, controller: &RemoteListController) {
    let state = controller.state();
    println!(
        "{} [{:?}] page {}/{} ({} rows)",
        title, state.status, state.pagination.page, state.pagination.total_pages, state.total
    );
    for row in &state.rows {
        println!("   {:>8} {}", row.key, row.data);
    }
    if let Some(error) = &state.last_error {
        println!("   last error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("table_query=debug,info");

    println!("table-query console demo");
    println!("========================\n");

    let config = match std::env::args().nth(1) {
        Some(path) => ConsoleConfig::from_yaml_file(&path)?,
        None => ConsoleConfig::default_config(),
    };
    println!("Loaded {} list profiles", config.lists.len());
    let list = config.find_list("member_dw_history")?;

    let source = Arc::new(InMemorySource::with_rows(sample_rows()));
    let controller = RemoteListController::from_config(list, source.clone());

    let mut notifications = controller.notifications().subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = notifications.recv().await {
            if envelope.event.is_failure() {
                println!("   ! notification: {}", serde_json::to_string(&envelope.event)?);
            }
        }
        Ok::<(), serde_json::Error>(())
    });

    controller.mount().await;
    print_rows("Mounted", &controller);

    controller.quick_search("a").await;
    print_rows("\nSearch 'a'", &controller);

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap();
    controller.set_period(Some(start), Some(end)).await;
    print_rows("\nMarch 1-15", &controller);

    let mut filters = ColumnFilters::new();
    filters.insert("status".to_string(), Some(vec!["approved".into()]));
    let event = TableEvent {
        pagination: TablePagination::new(1, 25),
        filters,
        sorter: Sorter::Single(SorterResult::column("amount", SortOrder::Descend)),
        extra: TableExtra {
            action: TableAction::Filter,
        },
    };
    controller.on_table_event(&event).await;
    print_rows("\nApproved, by amount", &controller);

    println!(
        "\nQuery sent to the backend:\n{}",
        serde_json::to_string_pretty(&controller.options())?
    );

    source.fail_next("upstream unavailable")?;
    controller.refresh().await;
    print_rows("\nAfter failed refresh", &controller);

    if let Some(period) = list.poll_interval() {
        controller.start_polling(period)?;
        tokio::time::sleep(period * 2 + period / 2).await;
        print_rows("\nAfter polling", &controller);
    }

    controller.unmount();
    println!("\nUnmounted; polling: {}", controller.is_polling());
    Ok(())
}
