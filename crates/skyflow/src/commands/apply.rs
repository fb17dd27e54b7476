use super::{print_failure, print_outputs, print_plan, print_result};
use crate::ConcurrencyArgs;
use crate::project::Project;
use colored::Colorize;
use skyflow_cloud::{ApplyMode, Reconciler, SimulatedProvider};
use tokio_util::sync::CancellationToken;

/// Settings block overridden by the command line
pub fn apply_mode(project: &Project, concurrency: &ConcurrencyArgs) -> ApplyMode {
    let mut settings = project.topology.settings.clone();
    if concurrency.parallel {
        settings.parallel = Some(true);
    }
    if let Some(max) = concurrency.max_concurrency {
        settings.max_concurrency = Some(max as usize);
    }
    settings.apply_mode()
}

pub async fn handle(project: Project, concurrency: &ConcurrencyArgs, yes: bool) -> anyhow::Result<()> {
    println!("{}", "Applying topology...".blue().bold());
    println!("Project: {}", project.topology.name.cyan());

    let mode = apply_mode(&project, concurrency);
    let key_pairs = project.ensure_key_pairs().await?;
    let (declarations, exports) = project.resolve(&key_pairs)?;
    let mut graph = project.build_graph(declarations, &exports)?;

    let state_manager = project.state_manager();
    let lock = state_manager.acquire_lock().await?;
    let mut state = state_manager.load().await?;
    let provider = SimulatedProvider::from_state(&state);

    let cancel = CancellationToken::new();
    let reconciler = Reconciler::new(&provider)
        .with_mode(mode)
        .with_cancellation(cancel.clone());

    let plan = reconciler.plan(&graph, &state);
    print_plan(&plan);

    if plan.has_changes && !yes {
        println!();
        println!("Run with --yes to apply these changes");
        lock.release().await?;
        return Ok(());
    }

    if let ApplyMode::Parallel { max_concurrency } = mode {
        println!("Mode: parallel (up to {} at once)", max_concurrency);
    }
    println!();

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, waiting for in-flight resources");
                cancel.cancel();
            }
        }
    });

    let outcome = reconciler.apply(&mut graph, &exports, &mut state).await;
    watcher.abort();

    // Whatever was applied before a failure is kept
    state_manager.save(&state).await?;
    lock.release().await?;

    match outcome {
        Ok(reconciliation) => {
            print_result(&reconciliation.result);
            println!();
            println!(
                "{} {} in {}ms",
                "✓ Applied:".green().bold(),
                reconciliation.result.summary(),
                reconciliation.result.duration_ms
            );
            print_outputs(&reconciliation.outputs, false);
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyflow_core::{Settings, Topology};
    use std::path::PathBuf;

    fn project(settings: Settings) -> Project {
        let mut topology = Topology::new("test");
        topology.settings = settings;
        Project::from_parts(PathBuf::from("."), topology, "ssh-keygen".to_string())
    }

    #[test]
    fn test_flags_override_settings() {
        let project = project(Settings {
            parallel: Some(false),
            max_concurrency: Some(8),
            state_dir: None,
        });

        assert_eq!(
            apply_mode(&project, &ConcurrencyArgs::default()),
            ApplyMode::Sequential
        );
        assert_eq!(
            apply_mode(
                &project,
                &ConcurrencyArgs {
                    parallel: true,
                    max_concurrency: None,
                }
            ),
            ApplyMode::Parallel { max_concurrency: 8 }
        );
        assert_eq!(
            apply_mode(
                &project,
                &ConcurrencyArgs {
                    parallel: true,
                    max_concurrency: Some(2),
                }
            ),
            ApplyMode::Parallel { max_concurrency: 2 }
        );
    }

    #[test]
    fn test_max_concurrency_alone_keeps_sequential() {
        let project = project(Settings::default());
        let args = ConcurrencyArgs {
            parallel: false,
            max_concurrency: Some(3),
        };
        assert_eq!(apply_mode(&project, &args), ApplyMode::Sequential);
    }
}
