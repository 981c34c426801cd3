use anyhow::{bail, Result};
use clap::Args;
use rust_decimal::Decimal;
use volbal_core::{evaluate_trigger, TriggerConfig, TriggerDecision, TriggerDirection};

#[derive(Args, Debug, Clone)]
pub struct TriggerArgs {
    /// Current price
    #[arg(long)]
    pub price: Decimal,

    /// Anchor price. Without one the trigger never fires.
    #[arg(long)]
    pub anchor: Option<Decimal>,

    /// Rise that fires UP, as a fraction (0.03 = 3%)
    #[arg(long, default_value = "0.03")]
    pub up: Decimal,

    /// Fall that fires DOWN, as a fraction (0.03 = 3%)
    #[arg(long, default_value = "0.03")]
    pub down: Decimal,

    /// Print the decision as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs the trigger command.
///
/// # Errors
/// Returns an error for a non-positive price or negative thresholds.
pub fn run_trigger(args: &TriggerArgs) -> Result<()> {
    let decision = evaluate(args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{}", render(&decision));
    }
    Ok(())
}

fn evaluate(args: &TriggerArgs) -> Result<TriggerDecision> {
    if args.price <= Decimal::ZERO {
        bail!("price must be positive, got {}", args.price);
    }
    if args.up < Decimal::ZERO || args.down < Decimal::ZERO {
        bail!("thresholds must not be negative");
    }
    let config = TriggerConfig {
        up_threshold: args.up,
        down_threshold: args.down,
    };
    Ok(evaluate_trigger(args.price, args.anchor, &config))
}

fn render(decision: &TriggerDecision) -> String {
    let Some(anchor) = decision.anchor.filter(|a| !a.is_zero()) else {
        return format!("NONE  price {} has no anchor", decision.price);
    };
    let (label, action) = match decision.direction {
        TriggerDirection::Up => ("UP", "SELL candidate"),
        TriggerDirection::Down => ("DOWN", "BUY candidate"),
        TriggerDirection::None => ("NONE", "hold"),
    };
    format!(
        "{label}  {:+.2}% from anchor {anchor} at {} ({action})",
        decision.pct_change * Decimal::ONE_HUNDRED,
        decision.price
    )
}
