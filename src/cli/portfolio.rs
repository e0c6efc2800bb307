use super::ui;
use crate::core::context::RequestContext;
use crate::core::portfolio::PortfolioSummary;
use crate::services::PortfolioService;
use anyhow::Result;
use comfy_table::Cell;

impl PortfolioSummary {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "{}\n\n",
            ui::style_text("Portfolio", ui::StyleType::Title)
        );
        if self.holdings.is_empty() {
            output.push_str(&ui::style_text("No holdings", ui::StyleType::Subtle));
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("ID"),
            ui::header_cell("Symbol"),
            ui::header_cell("Quantity"),
            ui::header_cell("Buy Price"),
            ui::header_cell("Price"),
            ui::header_cell("Value"),
            ui::header_cell("P&L"),
            ui::header_cell("P&L (%)"),
        ]);

        for row in &self.holdings {
            table.add_row(vec![
                Cell::new(row.holding.id),
                Cell::new(&row.holding.symbol),
                ui::number_cell(row.holding.quantity),
                ui::number_cell(row.holding.buy_price),
                ui::number_cell(row.current_price),
                ui::number_cell(row.market_value),
                ui::signed_cell(row.pnl, |v| format!("{v:+.2}")),
                ui::change_cell(row.pnl_percent),
            ]);
        }
        output.push_str(&table.to_string());

        let pnl_style = if self.total_pnl >= 0.0 {
            ui::StyleType::TotalValue
        } else {
            ui::StyleType::Error
        };
        output.push_str(&format!(
            "\n\n{} {:.2}\n{} {:.2}\n{} {}",
            ui::style_text("Total Value:", ui::StyleType::TotalLabel),
            self.total_value,
            ui::style_text("Total Cost:", ui::StyleType::TotalLabel),
            self.total_cost,
            ui::style_text("Total P&L:", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:+.2} ({:+.2}%)", self.total_pnl, self.return_pct),
                pnl_style
            ),
        ));
        output
    }
}

pub async fn run_summary(
    ctx: &RequestContext,
    portfolio: &PortfolioService,
    owner: &str,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching prices...");
    let summary = portfolio.summary(ctx, owner).await;
    pb.finish_and_clear();
    println!("{}", summary?.display_as_table());
    Ok(())
}

pub async fn run_add(
    ctx: &RequestContext,
    portfolio: &PortfolioService,
    owner: &str,
    symbol: &str,
    quantity: f64,
    buy_price: f64,
) -> Result<()> {
    let holding = portfolio
        .add_holding(ctx, owner, symbol, quantity, buy_price)
        .await?;
    println!(
        "Added {} x {} at {:.2} (id {})",
        holding.quantity, holding.symbol, holding.buy_price, holding.id
    );
    Ok(())
}

pub async fn run_remove(portfolio: &PortfolioService, owner: &str, id: i64) -> Result<()> {
    portfolio.remove_holding(owner, id).await?;
    println!("Removed holding {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::portfolio::{Holding, HoldingWithQuote};

    #[test]
    fn test_summary_table() {
        let row = HoldingWithQuote::new(
            Holding {
                id: 7,
                owner: "u1".into(),
                symbol: "AAPL".into(),
                quantity: 10.0,
                buy_price: 100.0,
            },
            110.0,
        );
        let summary = PortfolioSummary {
            holdings: vec![row],
            total_value: 1100.0,
            total_cost: 1000.0,
            total_pnl: 100.0,
            return_pct: 10.0,
        };

        let output = console::strip_ansi_codes(&summary.display_as_table()).to_string();
        assert!(output.contains("AAPL"));
        assert!(output.contains("1100.00"));
        assert!(output.contains("+100.00 (+10.00%)"));
    }

    #[test]
    fn test_empty_summary() {
        let output =
            console::strip_ansi_codes(&PortfolioSummary::default().display_as_table()).to_string();
        assert!(output.contains("No holdings"));
    }
}
