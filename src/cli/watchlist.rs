use super::ui;
use crate::core::context::RequestContext;
use crate::core::quote::normalize_symbol;
use crate::core::watchlist::WatchlistView;
use crate::services::WatchlistService;
use anyhow::Result;
use comfy_table::Cell;

impl WatchlistView {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "{}\n\n",
            ui::style_text("Watchlist", ui::StyleType::Title)
        );
        if self.items.is_empty() {
            output.push_str(&ui::style_text("Watchlist is empty", ui::StyleType::Subtle));
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Symbol"),
            ui::header_cell("Name"),
            ui::header_cell("Price"),
            ui::header_cell("Change (%)"),
        ]);

        let degraded = self.is_degraded();
        for (item, quote) in self.pairs() {
            let row = match quote {
                Some(q) => vec![
                    Cell::new(&item.symbol),
                    Cell::new(&q.name),
                    ui::number_cell(q.price),
                    ui::change_cell(q.change_pct),
                ],
                None => vec![
                    Cell::new(&item.symbol),
                    Cell::new(""),
                    ui::na_cell(degraded),
                    ui::na_cell(degraded),
                ],
            };
            table.add_row(row);
        }
        output.push_str(&table.to_string());

        if degraded {
            output.push_str(&format!(
                "\n\n{}",
                ui::style_text("Quotes are currently unavailable", ui::StyleType::Error)
            ));
        }
        output
    }
}

pub async fn run_list(ctx: &RequestContext, watchlist: &WatchlistService, owner: &str) -> Result<()> {
    let pb = ui::new_spinner("Fetching quotes...");
    let view = watchlist.list(ctx, owner).await;
    pb.finish_and_clear();
    println!("{}", view?.display_as_table());
    Ok(())
}

pub async fn run_add(
    ctx: &RequestContext,
    watchlist: &WatchlistService,
    owner: &str,
    symbol: &str,
) -> Result<()> {
    let item = watchlist.add(ctx, owner, symbol).await?;
    println!("Added {} to the watchlist", item.symbol);
    Ok(())
}

pub async fn run_remove(watchlist: &WatchlistService, owner: &str, symbol: &str) -> Result<()> {
    watchlist.remove(owner, symbol).await?;
    println!("Removed {} from the watchlist", normalize_symbol(symbol));
    Ok(())
}
