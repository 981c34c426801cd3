#![allow(clippy::format_push_string)]

use crate::metrics::PerformanceMetrics;
use rust_decimal::Decimal;

const RULE: &str = "═══════════════════════════════════════════════════════════════\n";
const SECTION: &str = "───────────────────────────────────────────────────────────────\n";

pub struct MetricsFormatter;

impl MetricsFormatter {
    #[must_use]
    pub fn format(symbol: &str, metrics: &PerformanceMetrics) -> String {
        let hundred = Decimal::ONE_HUNDRED;
        let mut output = String::new();

        output.push('\n');
        output.push_str(RULE);
        output.push_str(&format!("              REPLAY RESULTS: {symbol}\n"));
        output.push_str(RULE);
        output.push('\n');

        output.push_str("Time Period\n");
        output.push_str(SECTION);
        output.push_str(&format!(
            "Start:                 {}\n",
            metrics.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!(
            "End:                   {}\n",
            metrics.end_time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!(
            "Duration:              {} days {} hours\n",
            metrics.duration.num_days(),
            metrics.duration.num_hours() % 24
        ));
        output.push('\n');

        output.push_str("Portfolio Performance\n");
        output.push_str(SECTION);
        output.push_str(&format!("Initial Equity:        ${:.2}\n", metrics.initial_equity));
        output.push_str(&format!("Final Equity:          ${:.2}\n", metrics.final_equity));
        output.push_str(&format!("Equity Peak:           ${:.2}\n", metrics.equity_peak));
        output.push_str(&format!("Total Return:          {:.2}%\n", metrics.total_return * hundred));
        output.push_str(&format!("Buy & Hold Return:     {:.2}%\n", metrics.buy_hold_return * hundred));
        output.push_str(&format!("Max Drawdown:          {:.2}%\n", metrics.max_drawdown * hundred));
        output.push('\n');

        output.push_str("Activity\n");
        output.push_str(SECTION);
        output.push_str(&format!(
            "Trades:                {} ({} buys, {} sells)\n",
            metrics.num_trades, metrics.num_buys, metrics.num_sells
        ));
        output.push_str(&format!("Commissions Paid:      ${:.2}\n", metrics.total_commission));
        output.push_str(&format!("Dividends Received:    ${:.2}\n", metrics.total_dividends));
        output.push_str(&format!(
            "Evaluations:           {} ({} holds)\n",
            metrics.evaluations, metrics.holds
        ));
        output.push('\n');
        output.push_str(RULE);

        if metrics.num_trades == 0 {
            output.push_str("\n⚠️  No trades were made during this replay.\n");
            output.push_str("    Consider tighter trigger thresholds or a longer range.\n\n");
        }

        output
    }
}
