use std::path::Path;

use anyhow::Result;

use kurral_sdk::Client;

use crate::args::ListArgs;
use crate::output;

pub fn handle(args: ListArgs, store_root: &Path) -> Result<()> {
    let client = Client::connect(store_root)?;
    let records: Vec<_> = client
        .list()?
        .into_iter()
        .filter(|record| match &args.bucket {
            Some(bucket) => record.semantic_buckets.iter().any(|b| b == bucket),
            None => true,
        })
        .take(args.limit)
        .collect();

    if records.is_empty() {
        println!("No artifacts found.");
        return Ok(());
    }

    println!("{:<10} {:<28} {:<22} {}", "ID", "RUN", "CREATED", "BUCKETS");
    for record in records {
        println!(
            "{:<10} {:<28} {:<22} {}",
            output::short_id(&record.kurral_id),
            record.run_id.chars().take(28).collect::<String>(),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.semantic_buckets.join(",")
        );
    }
    Ok(())
}
