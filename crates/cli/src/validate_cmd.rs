use anyhow::{Context, Result, bail};
use std::io::BufReader;
use std::path::Path;
use tracepanel_core::jsonl::read_trace_log;
use tracepanel_core::validate::validate_steps;

pub fn run_validate(log: &Path) -> Result<()> {
    let file = std::fs::File::open(log)
        .with_context(|| format!("Failed to open trace log {}", log.display()))?;
    let trace = read_trace_log(BufReader::new(file))
        .with_context(|| format!("Invalid trace log {}", log.display()))?;

    match validate_steps(&trace.inputs.steps) {
        Ok(()) => {
            println!("OK: {} steps", trace.inputs.steps.len());
            Ok(())
        }
        Err(findings) => {
            for finding in &findings {
                println!("  - {finding}");
            }
            bail!("{} finding(s) in {}", findings.len(), log.display());
        }
    }
}
