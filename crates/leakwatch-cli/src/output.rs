//! Dual-channel reporting: the full `CrawlResult` as JSON (stdout, or a
//! `--output` file), a human-readable summary on stderr.

use std::path::Path;

use leakwatch_protocol::CrawlResult;

use crate::error::Result;

pub fn print_json(result: &CrawlResult, output: Option<&Path>) -> Result<()> {
    let body = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => std::fs::write(path, body)?,
        None => println!("{body}"),
    }
    Ok(())
}

pub fn print_summary(url: &str, result: &CrawlResult) {
    eprintln!("leakwatch audit of {url}");
    eprintln!("  pages visited:    {}", result.visited_targets.len());
    eprintln!("  fields filled:    {}", result.fields.iter().filter(|f| f.filled).count());
    eprintln!("  fields submitted: {}", result.fields.iter().filter(|f| f.submitted).count());

    if result.dom_leaks.is_empty() {
        eprintln!("  DOM leaks:        none");
    } else {
        eprintln!("  DOM leaks:        {}", result.dom_leaks.len());
        for leak in &result.dom_leaks {
            eprintln!(
                "    - attribute \"{}\" at {}",
                leak.attribute,
                leak.identifier.encode()
            );
        }
    }

    if result.console_leaks.is_empty() {
        eprintln!("  console leaks:    none");
    } else {
        eprintln!("  console leaks:    {}", result.console_leaks.len());
        for leak in &result.console_leaks {
            eprintln!("    - {:?}: {}", leak.kind, leak.rendered_message);
        }
    }

    if !result.errors.is_empty() {
        eprintln!("  errors:           {}", result.errors.len());
        for err in &result.errors {
            eprintln!("    - [{:?}] {}", err.level, err.message);
        }
    }
}
