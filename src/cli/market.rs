use super::ui;
use crate::core::context::RequestContext;
use crate::core::quote::{HistoryPoint, Quote, SymbolMatch, normalize_symbol};
use crate::services::QuoteService;
use anyhow::Result;
use comfy_table::Cell;

impl Quote {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Price"),
            ui::header_cell("Change"),
            ui::header_cell("Change (%)"),
            ui::header_cell("High"),
            ui::header_cell("Low"),
            ui::header_cell("Volume"),
        ]);
        table.add_row(vec![
            ui::number_cell(self.price),
            ui::signed_cell(self.change, |c| format!("{c:+.2}")),
            ui::change_cell(self.change_pct),
            ui::number_cell(self.high),
            ui::number_cell(self.low),
            Cell::new(self.volume),
        ]);

        let title = if self.name.is_empty() {
            self.symbol.clone()
        } else {
            format!("{} ({})", self.symbol, self.name)
        };
        format!(
            "{}\n\n{}",
            ui::style_text(&title, ui::StyleType::Title),
            table
        )
    }
}

pub fn history_table(symbol: &str, history: &[HistoryPoint]) -> String {
    let mut output = format!(
        "History: {}\n\n",
        ui::style_text(symbol, ui::StyleType::Title)
    );
    if history.is_empty() {
        output.push_str(&ui::style_text("No data", ui::StyleType::Subtle));
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Close"),
        ui::header_cell("Volume"),
    ]);
    for point in history {
        table.add_row(vec![
            Cell::new(point.date),
            ui::number_cell(point.close),
            Cell::new(point.volume),
        ]);
    }
    output.push_str(&table.to_string());

    if let (Some(first), Some(last)) = (history.first(), history.last()) {
        let change = crate::core::quote::percent_change(last.close, first.close);
        output.push_str(&format!(
            "\n\n{} {}",
            ui::style_text("Change over period:", ui::StyleType::TotalLabel),
            ui::style_text(&format!("{change:+.2}%"), ui::StyleType::TotalValue)
        ));
    }
    output
}

pub fn search_table(query: &str, results: &[SymbolMatch]) -> String {
    let mut output = format!(
        "Search: {}\n\n",
        ui::style_text(query, ui::StyleType::Title)
    );
    if results.is_empty() {
        output.push_str(&ui::style_text("No matches", ui::StyleType::Subtle));
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("Price"),
    ]);
    for result in results {
        let price = (result.price > 0.0).then_some(result.price);
        table.add_row(vec![
            Cell::new(&result.symbol),
            Cell::new(&result.name),
            ui::format_optional_cell(price, |p| format!("{p:.2}")),
        ]);
    }
    output.push_str(&table.to_string());
    output
}

pub async fn run_quote(ctx: &RequestContext, market: &QuoteService, symbol: &str) -> Result<()> {
    let pb = ui::new_spinner("Fetching quote...");
    let quote = market.get_quote(ctx, symbol).await;
    pb.finish_and_clear();
    println!("{}", quote?.display_as_table());
    Ok(())
}

pub async fn run_history(
    ctx: &RequestContext,
    market: &QuoteService,
    symbol: &str,
    range: Option<&str>,
    interval: Option<&str>,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching history...");
    let history = market.get_history(ctx, symbol, range, interval).await;
    pb.finish_and_clear();
    println!("{}", history_table(&normalize_symbol(symbol), &history?));
    Ok(())
}

pub async fn run_search(
    ctx: &RequestContext,
    market: &QuoteService,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let pb = ui::new_spinner("Searching...");
    let results = market.search_symbols(ctx, query, limit).await;
    pb.finish_and_clear();
    println!("{}", search_table(query, &results?));
    Ok(())
}
