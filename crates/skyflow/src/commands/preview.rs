use super::print_plan;
use crate::project::Project;
use colored::Colorize;
use skyflow_cloud::{Reconciler, SimulatedProvider};

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    println!("{}", "Previewing changes...".blue().bold());
    println!("Project: {}", project.topology.name.cyan());

    // Preview never generates keys
    let (key_pairs, missing) = project.stored_key_pairs().await?;
    for binding in &missing {
        println!(
            "  {} keypair '{}' is not generated yet; it will be written to {} on apply",
            "!".yellow().bold(),
            binding.name,
            binding.path.display()
        );
    }

    let (declarations, exports) = project.resolve(&key_pairs)?;
    let graph = project.build_graph(declarations, &exports)?;
    let state = project.state_manager().load().await?;
    let provider = SimulatedProvider::from_state(&state);

    let plan = Reconciler::new(&provider).plan(&graph, &state);
    print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "✓ No changes".green());
    }
    Ok(())
}
