use super::{print_failure, print_plan, print_result};
use crate::project::Project;
use colored::Colorize;
use skyflow_cloud::{Reconciler, SimulatedProvider};
use tokio_util::sync::CancellationToken;

pub async fn handle(project: &Project, yes: bool) -> anyhow::Result<()> {
    println!("{}", "Destroying resources...".red().bold());
    println!("Project: {}", project.topology.name.cyan());

    // Key material is not needed to delete
    let (key_pairs, _) = project.stored_key_pairs().await?;
    let (declarations, exports) = project.resolve(&key_pairs)?;
    let graph = project.build_graph(declarations, &exports)?;

    let state_manager = project.state_manager();
    let lock = state_manager.acquire_lock().await?;
    let mut state = state_manager.load().await?;
    let provider = SimulatedProvider::from_state(&state);

    let cancel = CancellationToken::new();
    let reconciler = Reconciler::new(&provider).with_cancellation(cancel.clone());

    let plan = reconciler.plan_destroy(&graph, &state);
    if plan.actions.is_empty() {
        println!("{}", "Nothing to destroy".dimmed());
        lock.release().await?;
        return Ok(());
    }
    print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "⚠ This deletes every resource listed above".yellow().bold()
        );
        println!("Run with --yes to destroy them");
        lock.release().await?;
        return Ok(());
    }
    println!();

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let outcome = reconciler.destroy(&graph, &mut state).await;
    watcher.abort();

    state_manager.save(&state).await?;
    lock.release().await?;

    match outcome {
        Ok(result) => {
            print_result(&result);
            println!();
            println!(
                "{} {} resource(s) deleted",
                "✓ Destroyed:".green().bold(),
                result.succeeded.len()
            );
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            std::process::exit(1);
        }
    }
}
