use std::io::Read;

use anyhow::Context;

use stockledger_infra::LedgerConfig;

fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let input = match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read operations from stdin")?;
            buf
        }
    };

    let script = stockledger_cli::parse_script(&input)?;
    let config = LedgerConfig::from_env();
    tracing::info!(
        operations = script.operations.len(),
        transfer_posting = ?config.transfer_posting,
        "running batch"
    );

    let report = stockledger_cli::run(&script, config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    Ok(())
}
