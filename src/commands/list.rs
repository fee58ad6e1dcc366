//! `keysync list` - print the entries of one authorized_keys file

use anyhow::{Context as AnyhowContext, Result};
use authkeys::{AuthorizationFile, Entry, KeyRecord};
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, path: &Path) -> Result<()> {
    let path = paths::expand(&path.to_string_lossy());
    let file = AuthorizationFile::load(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    ui::header(&path.display().to_string());

    let mut passthrough = 0;
    for (line, entry) in file.entries().iter().enumerate() {
        match entry {
            Entry::Key(record) => print_record(ctx, line + 1, record),
            Entry::Passthrough(_) => passthrough += 1,
        }
    }

    let keys = file.keys().count();
    println!();
    if keys == 0 {
        ui::info("No keys");
    }
    ui::kv("Keys", &keys.to_string());
    ui::kv("Comments and blank lines", &passthrough.to_string());

    Ok(())
}

fn print_record(ctx: &Context, line: usize, record: &KeyRecord) {
    let comment = if record.comment().is_empty() {
        "(no comment)".dimmed().to_string()
    } else {
        record.comment().bold().to_string()
    };

    println!(
        "  {} {} {} {}",
        format!("{line:>3}").dimmed(),
        record.key_type().cyan(),
        short_content(record.content()),
        comment
    );

    if !ctx.quiet && !record.options().is_empty() {
        ui::dim(&format!("      options: {}", record.options().join(",")));
    }
}

/// First and last characters of a key blob
fn short_content(content: &str) -> String {
    const EDGE: usize = 8;
    if content.len() <= EDGE * 2 + 3 || !content.is_ascii() {
        return content.to_string();
    }
    format!(
        "{}...{}",
        &content[..EDGE],
        &content[content.len() - EDGE..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content() {
        assert_eq!(short_content("AAAA"), "AAAA");
        assert_eq!(
            short_content("AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl"),
            "AAAAC3Nz...h2l9GKJl"
        );
    }
}
