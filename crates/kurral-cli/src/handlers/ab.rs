use anyhow::{bail, Context, Result};

use kurral_engine::{model_migration, Recommendation};
use kurral_store::LocalStore;

use crate::args::AbCommands;
use crate::output;

pub fn handle(command: AbCommands) -> Result<()> {
    match command {
        AbCommands::ModelMigration {
            baseline,
            model_a,
            model_b,
            threshold,
        } => {
            let store = LocalStore::open(&baseline)
                .with_context(|| format!("opening baseline store {}", baseline.display()))?;
            if store.rebuild_index()? == 0 {
                bail!("no .kurral artifacts under {}", baseline.display());
            }
            let suite = store.load_all()?;

            let result = model_migration(&suite, &model_a, &model_b, Some(threshold))?;

            println!(
                "A/B model migration: {} -> {} over {} artifacts",
                model_a, model_b, result.test_suite_size
            );
            println!("Replays executed: {}", result.replays_executed);
            println!(
                "Mean ARS: A {:.4}  B {:.4}  (improvement {:+.4})",
                result.a_mean_ars, result.b_mean_ars, result.b_improvement
            );
            println!(
                "Range:    A [{:.4}, {:.4}]  B [{:.4}, {:.4}]",
                result.a_min_ars, result.a_max_ars, result.b_min_ars, result.b_max_ars
            );
            for failure in &result.failures {
                println!(
                    "{}",
                    output::bad(&format!(
                        "  regression {:.4} on {}",
                        failure.regression,
                        output::short_id(&failure.artifact_id)
                    ))
                );
            }
            println!("Recommendation: {}", result.recommendation.as_str());

            if result.recommendation == Recommendation::Reject
                || result.b_mean_ars < threshold
            {
                bail!(
                    "candidate mean ARS {:.4} below threshold {:.2}",
                    result.b_mean_ars,
                    threshold
                );
            }
            Ok(())
        }
    }
}
