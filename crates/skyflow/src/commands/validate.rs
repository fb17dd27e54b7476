use crate::project::Project;
use colored::Colorize;
use skyflow_cloud::{ApplyMode, Graph};

pub fn handle(project: &Project) -> anyhow::Result<()> {
    println!("{}", "Validating topology...".blue());
    println!("Project root: {}", project.root.display().to_string().cyan());

    let topology = &project.topology;
    let graph = match Graph::build(topology.declarations.clone()).and_then(|graph| {
        for export in &topology.exports {
            graph.check_references(&export.name, export.reference())?;
        }
        Ok(graph)
    }) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid topology".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Topology is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  Project: {}", topology.name.cyan());
    println!("  Resources: {}", graph.len());
    for name in graph.topological_order() {
        let kind = graph.node(name).map(|n| n.kind()).unwrap_or_default();
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
            println!("    - {} ({})", name.cyan(), kind);
        } else {
            println!(
                "    - {} ({}) after {}",
                name.cyan(),
                kind,
                deps.join(", ").dimmed()
            );
        }
    }

    if !topology.exports.is_empty() {
        println!("  Exports: {}", topology.exports.len());
        for export in &topology.exports {
            let source = export
                .reference()
                .map(|r| r.to_string())
                .unwrap_or_default();
            let marker = if export.is_sensitive() { " (sensitive)" } else { "" };
            println!("    - {} = {}{}", export.name.cyan(), source, marker);
        }
    }

    if !topology.secrets.is_empty() {
        println!("  Keypairs: {}", topology.secrets.len());
        for binding in &topology.secrets {
            println!(
                "    - {} ({} bits, {}) -> {}.{}, export {}",
                binding.name.cyan(),
                binding.bits,
                binding.path.display(),
                binding.target,
                binding.field,
                binding.export
            );
        }
    }

    match topology.settings.apply_mode() {
        ApplyMode::Sequential => println!("  Mode: sequential"),
        ApplyMode::Parallel { max_concurrency } => {
            println!("  Mode: parallel (up to {})", max_concurrency)
        }
    }

    Ok(())
}
