use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;
use tracepanel_parsers::extract_with;
use tracepanel_parsers::json_scan::{parse_json_objects, split_customer_ready};
use tracepanel_runtime_config::PanelConfig;

/// Read `file`, or stdin when absent.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

pub fn run_extract(file: Option<&Path>, config: &PanelConfig) -> Result<()> {
    let text = read_input(file)?;
    let extracted = extract_with(&text, &config.extractor.syntaxes);
    println!("{}", serde_json::to_string_pretty(&extracted)?);
    Ok(())
}

/// Print every JSON object embedded in the text, one per line, or the
/// customer-ready split when `customer_ready` is set.
pub fn run_scan_json(file: Option<&Path>, customer_ready: bool, config: &PanelConfig) -> Result<()> {
    let text = read_input(file)?;

    if customer_ready {
        let window = config.scanner.customer_ready_prefix_chars;
        let Some(split) = split_customer_ready(&text, window) else {
            bail!("No customer-ready payload found");
        };
        println!("{}", serde_json::to_string_pretty(&split)?);
        return Ok(());
    }

    let objects = parse_json_objects(&text);
    if objects.is_empty() {
        bail!("No JSON objects found");
    }
    for object in objects {
        println!("{}", serde_json::to_string(&object)?);
    }
    Ok(())
}
