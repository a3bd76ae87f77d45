use super::ui;
use crate::core::fetch::FetchOrchestrator;
use crate::core::metadata::MetadataResolver;
use crate::core::series::Period;
use anyhow::Result;
use comfy_table::Cell;
use tracing::debug;

/// Prints the canonical price history for a single instrument.
pub async fn run(
    orchestrator: &FetchOrchestrator,
    resolver: Option<&dyn MetadataResolver>,
    instrument: &str,
    period: &Period,
) -> Result<()> {
    let series = orchestrator.get_series(instrument, period).await?;

    let title = match lookup_name(resolver, instrument).await {
        Some(name) => format!("{} ({})", series.instrument, name),
        None => series.instrument.clone(),
    };
    println!("\n{}", ui::style_text(&title, ui::StyleType::Title));

    let mut table = ui::new_styled_table();
    if series.is_adjusted {
        table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Price")]);
        for bar in &series.bars {
            table.add_row(vec![
                Cell::new(bar.date.to_string()),
                ui::value_cell(format!("{:.2}", bar.price)),
            ]);
        }
    } else {
        table.set_header(vec![
            ui::header_cell("Date"),
            ui::header_cell("Price"),
            ui::header_cell("Dividend"),
            ui::header_cell("Capital Gain"),
        ]);
        for bar in &series.bars {
            table.add_row(vec![
                Cell::new(bar.date.to_string()),
                ui::value_cell(format!("{:.2}", bar.price)),
                ui::value_cell(format!("{:.2}", bar.dividend)),
                ui::value_cell(format!("{:.2}", bar.capital_gain)),
            ]);
        }
    }
    println!("{table}");

    let provenance = format!(
        "{} bars from {} ({} prices), fetched {}",
        series.len(),
        series.source,
        if series.is_adjusted {
            "adjusted"
        } else {
            "unadjusted"
        },
        series.fetched_at.format("%Y-%m-%d %H:%M UTC"),
    );
    println!("{}", ui::style_text(&provenance, ui::StyleType::Subtle));

    Ok(())
}

pub(super) async fn lookup_name(
    resolver: Option<&dyn MetadataResolver>,
    instrument: &str,
) -> Option<String> {
    let resolver = resolver?;
    match resolver.resolve(instrument).await {
        Ok(meta) => Some(meta.name),
        Err(e) => {
            debug!("Metadata lookup failed for {instrument}: {e}");
            None
        }
    }
}
