use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BacktestArgs, ConfigArgs, TriggerArgs};

#[derive(Parser)]
#[command(name = "volbal")]
#[command(about = "Volatility-balancing engine for equity positions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay historical bars through the tick engine
    Backtest(BacktestArgs),
    /// Evaluate the trigger for one price against an anchor
    Trigger(TriggerArgs),
    /// Print the resolved, validated configuration as JSON
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for reports and JSON.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Backtest(args) => {
            commands::run_backtest(args).await?;
        }
        Commands::Trigger(args) => {
            commands::run_trigger(&args)?;
        }
        Commands::Config(args) => {
            commands::run_config(&args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use volbal_core::BarInterval;

    #[test]
    fn test_parse_backtest() {
        let cli = Cli::try_parse_from([
            "volbal", "backtest", "--data", "bars.csv", "--symbol", "AAPL", "--cash", "25000.50",
            "--quantity", "40", "--anchor", "187.5", "--interval", "1h",
        ])
        .unwrap();

        let Commands::Backtest(args) = cli.command else {
            panic!("expected backtest");
        };
        assert_eq!(args.symbol.as_deref(), Some("AAPL"));
        assert_eq!(args.cash, dec!(25000.50));
        assert_eq!(args.quantity, dec!(40));
        assert_eq!(args.anchor, Some(dec!(187.5)));
        assert_eq!(args.interval, BarInterval::HOUR);
        assert!(args.events_out.is_none());
    }

    #[test]
    fn test_parse_trigger_defaults() {
        let cli = Cli::try_parse_from(["volbal", "trigger", "--price", "103", "--anchor", "100"]).unwrap();
        let Commands::Trigger(args) = cli.command else {
            panic!("expected trigger");
        };
        assert_eq!(args.up, dec!(0.03));
        assert_eq!(args.down, dec!(0.03));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["volbal", "trigger", "--price", "abc"]).is_err());
        assert!(Cli::try_parse_from(["volbal", "backtest", "--data", "x.csv", "--interval", "1w"]).is_err());
        assert!(Cli::try_parse_from(["volbal", "backtest"]).is_err());
    }
}
