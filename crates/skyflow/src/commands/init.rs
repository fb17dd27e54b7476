use colored::Colorize;
use skyflow_core::SAMPLE_TOPOLOGY;
use skyflow_core::discovery::ROOT_FILE;
use std::fs;
use std::path::Path;

/// Entries kept out of version control: key material, state and local overrides
const GITIGNORE_ENTRIES: &[&str] = &["id_rsa", "id_rsa.pub", ".skyflow/", "skyflow.local.kdl"];

pub fn handle(dir: &Path, force: bool) -> anyhow::Result<()> {
    let path = dir.join(ROOT_FILE);
    if path.exists() && !force {
        eprintln!(
            "{} {} already exists (use --force to overwrite)",
            "✗".red().bold(),
            path.display()
        );
        std::process::exit(1);
    }

    fs::create_dir_all(dir)?;
    fs::write(&path, SAMPLE_TOPOLOGY)?;
    println!("{} Created {}", "✓".green().bold(), path.display());

    let added = update_gitignore(dir)?;
    if !added.is_empty() {
        println!("  .gitignore: added {}", added.join(", "));
    }

    println!();
    println!("Next steps:");
    println!("  sky validate");
    println!("  sky preview");
    println!("  sky apply --yes");
    Ok(())
}

/// Append missing entries to `.gitignore`, returning the ones added
fn update_gitignore(dir: &Path) -> anyhow::Result<Vec<&'static str>> {
    let path = dir.join(".gitignore");
    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let added: Vec<&'static str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !present.contains(entry))
        .collect();

    if !added.is_empty() {
        let mut content = existing.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for entry in &added {
            content.push_str(entry);
            content.push('\n');
        }
        fs::write(&path, content)?;
    }
    Ok(added)
}
