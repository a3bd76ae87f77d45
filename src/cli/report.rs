use super::ui;
use crate::core::error::FetchError;
use crate::core::fetch::FetchOrchestrator;
use crate::core::metrics::{self, PerformanceRecord};
use crate::core::series::Period;
use anyhow::bail;
use futures::{StreamExt, stream};
use std::collections::HashMap;

struct ReportRow {
    instrument: String,
    record: Option<PerformanceRecord>,
    error: Option<String>,
}

/// Prints a performance table for one or more instruments. A failed
/// instrument is shown with an error marker; the command only fails when
/// nothing could be fetched.
pub async fn run(
    orchestrator: &FetchOrchestrator,
    instruments: &[String],
    period: &Period,
    max_concurrent: usize,
) -> anyhow::Result<()> {
    let ids: Vec<String> = instruments.iter().map(|s| s.trim().to_uppercase()).collect();

    let pb = ui::new_progress_bar(ids.len() as u64);
    let results: HashMap<String, Result<PerformanceRecord, FetchError>> =
        stream::iter(ids.iter().map(|id| {
            let pb = pb.clone();
            async move {
                let result = orchestrator
                    .get_series(id, period)
                    .await
                    .map(|series| metrics::compute(&series));
                pb.inc(1);
                (id.clone(), result)
            }
        }))
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    pb.finish_and_clear();

    let mut rows = Vec::new();
    for id in &ids {
        match results.get(id.as_str()) {
            Some(Ok(record)) => rows.push(ReportRow {
                instrument: id.clone(),
                record: Some(record.clone()),
                error: None,
            }),
            Some(Err(e)) => rows.push(ReportRow {
                instrument: id.clone(),
                record: None,
                error: Some(e.to_string()),
            }),
            None => {}
        }
    }

    if rows.iter().all(|r| r.record.is_none()) {
        bail!("No price history available for any requested instrument");
    }

    display_rows(&rows, period);
    Ok(())
}

fn display_rows(rows: &[ReportRow], period: &Period) {
    println!(
        "\n{}",
        ui::style_text(&format!("Performance over {period}"), ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Instrument"),
        ui::header_cell("Total Return"),
        ui::header_cell("Annualized"),
        ui::header_cell("Volatility"),
        ui::header_cell("Sharpe"),
        ui::header_cell("Max Drawdown"),
    ]);

    for row in rows {
        match &row.record {
            Some(record) => {
                table.add_row(vec![
                    comfy_table::Cell::new(&row.instrument),
                    ui::change_cell(record.total_return),
                    ui::change_cell(record.annualized_return),
                    ui::value_cell(format!("{:.2}%", record.annualized_volatility * 100.0)),
                    ui::format_optional_cell(record.sharpe_ratio, |s| format!("{s:.2}")),
                    ui::change_cell(record.max_drawdown),
                ]);
            }
            None => {
                table.add_row(vec![
                    comfy_table::Cell::new(&row.instrument),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                ]);
            }
        }
    }
    println!("{table}");

    for row in rows {
        if let Some(error) = &row.error {
            println!(
                "{}",
                ui::style_text(
                    &format!("{}: {}", row.instrument, error),
                    ui::StyleType::Error
                )
            );
        }
    }
}
