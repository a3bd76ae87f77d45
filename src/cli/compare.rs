use super::ui;
use crate::core::compare::{self, Alignment, BASE_VALUE, ComparisonResult};
use crate::core::fetch::FetchOrchestrator;
use crate::core::metadata::MetadataResolver;
use crate::core::series::Period;
use anyhow::bail;
use comfy_table::Cell;

/// Prints a base-100 comparison of several instruments over one period.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    orchestrator: &FetchOrchestrator,
    resolver: Option<&dyn MetadataResolver>,
    instruments: &[String],
    period: &Period,
    alignment: Alignment,
    max_concurrent: usize,
    show_points: bool,
) -> anyhow::Result<()> {
    let pb = ui::new_progress_bar(instruments.len() as u64);
    let result = compare::compare(
        orchestrator,
        instruments,
        period,
        alignment,
        max_concurrent,
        &|| pb.inc(1),
    )
    .await;
    pb.finish_and_clear();

    if result.summaries.is_empty() {
        for entry in &result.unavailable {
            println!(
                "{}",
                ui::style_text(
                    &format!("{}: {}", entry.instrument, entry.reason),
                    ui::StyleType::Error
                )
            );
        }
        bail!("No comparable price history for the requested instruments");
    }

    display_summaries(&result, resolver, period).await;
    if show_points {
        display_points(&result);
    }

    for entry in &result.unavailable {
        println!(
            "{}",
            ui::style_text(
                &format!("{}: {}", entry.instrument, entry.reason),
                ui::StyleType::Error
            )
        );
    }

    Ok(())
}

async fn display_summaries(
    result: &ComparisonResult,
    resolver: Option<&dyn MetadataResolver>,
    period: &Period,
) {
    println!(
        "\n{}",
        ui::style_text(
            &format!("Comparison over {period} (rebased to {BASE_VALUE:.0})"),
            ui::StyleType::Title
        )
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Instrument"),
        ui::header_cell("Name"),
        ui::header_cell("Start"),
        ui::header_cell("End"),
        ui::header_cell("Total Return"),
        ui::header_cell("Volatility"),
    ]);

    for summary in &result.summaries {
        let name = super::series::lookup_name(resolver, &summary.instrument).await;
        table.add_row(vec![
            Cell::new(&summary.instrument),
            ui::format_optional_cell(name, |n| n),
            ui::value_cell(format!("{BASE_VALUE:.2}")),
            ui::value_cell(format!("{:.2}", summary.end_value)),
            ui::change_cell(summary.total_return),
            ui::value_cell(format!("{:.2}%", summary.annualized_volatility * 100.0)),
        ]);
    }
    println!("{table}");
}

fn display_points(result: &ComparisonResult) {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date")];
    for summary in &result.summaries {
        header.push(ui::header_cell(&summary.instrument));
    }
    table.set_header(header);

    for point in &result.points {
        let mut row = vec![Cell::new(point.date.to_string())];
        for summary in &result.summaries {
            row.push(ui::format_optional_cell(
                point.values.get(&summary.instrument).copied(),
                |v| format!("{v:.2}"),
            ));
        }
        table.add_row(row);
    }
    println!("{table}");
}
