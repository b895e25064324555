//! Audit a CSV dataset for extremal-expressivity subgroups.
//!
//! cargo run --example audit_csv -- <data.csv> <target> <sensitive,columns> [train_exps] [test_exps]
//!
//! With both expressivity caches the game strategy runs on them; without, the gradient
//! strategy runs on the data alone.
use expressivity_audit::{run_system, CachedExpressivity, Dataset, ExpressivityFactory, RunConfig, Strategy};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        return Err("usage: audit_csv <data.csv> <target> <sensitive,columns> [train_exps] [test_exps]".into());
    }
    let dataset = Dataset::from_csv(&args[1])?;
    let sensitive: Vec<&str> = args[3].split(',').collect();

    let mut config = RunConfig::new(&args[2], &sensitive);
    config.windows = vec![[0.1, 0.5], [0.05, 0.1]];

    let cache = match (args.get(4), args.get(5)) {
        (Some(train), Some(test)) => Some(CachedExpressivity::new(train.as_str(), test.as_str())),
        _ => {
            config.strategy = Strategy::Gradient;
            None
        }
    };
    let report = run_system(
        &dataset,
        &config,
        cache.as_ref().map(|c| c as &dyn ExpressivityFactory),
    )?;

    for row in &report.rows {
        println!(
            "{:<24} {:<10} alpha {} | F(D) {:>10.4} | F(S) {:>10.4} | size {:.3} | {}",
            row.feature, row.direction, row.alpha, row.full_value, row.subgroup_value, row.size, row.coefficients
        );
    }
    report.write_csv("audit_report.csv")?;
    Ok(())
}
