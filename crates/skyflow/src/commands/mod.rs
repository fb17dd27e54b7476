pub mod apply;
pub mod destroy;
pub mod init;
pub mod outputs;
pub mod preview;
pub mod validate;

use colored::Colorize;
use skyflow_cloud::{ActionType, ApplyResult, OutputSet, Plan, ReconcileError};

fn action_symbol(action_type: ActionType) -> colored::ColoredString {
    match action_type {
        ActionType::Create => "+".green().bold(),
        ActionType::Update => "~".yellow().bold(),
        ActionType::Delete => "-".red().bold(),
        ActionType::NoOp => "=".dimmed(),
    }
}

/// Print planned actions followed by their summary
pub fn print_plan(plan: &Plan) {
    println!();
    for action in &plan.actions {
        let line = format!("{} ({})", action.resource_id, action.resource_type);
        let line = if action.action_type == ActionType::NoOp {
            line.dimmed().to_string()
        } else {
            line
        };
        println!("  {} {}", action_symbol(action.action_type), line);
    }
    println!();
    println!("Plan: {}", plan.summary().to_string().bold());
}

/// Print what an apply or destroy did
pub fn print_result(result: &ApplyResult) {
    for done in &result.succeeded {
        if done.action_type != ActionType::NoOp {
            println!("  {} {}", action_symbol(done.action_type), done.message);
        }
    }
    for failed in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red().bold(),
            failed.action_id,
            failed.error.as_deref().unwrap_or_default()
        );
    }
}

/// Print outputs as `name = value`, masking sensitive values unless `reveal`
pub fn print_outputs(outputs: &OutputSet, reveal: bool) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("{}", "Outputs:".bold());
    for (name, value) in outputs.iter() {
        let shown = if reveal {
            value.expose().to_string()
        } else {
            value.to_string()
        };
        if value.is_sensitive() && !reveal {
            println!("  {} = {}", name.cyan(), shown.dimmed());
        } else if shown.contains('\n') {
            println!("  {} =", name.cyan());
            for line in shown.lines() {
                println!("    {}", line);
            }
        } else {
            println!("  {} = {}", name.cyan(), shown);
        }
    }
}

/// Explain a failed run on stderr
pub fn print_failure(error: &ReconcileError) {
    eprintln!();
    match error {
        ReconcileError::ProviderFailure { node, cause } => {
            eprintln!(
                "{} {}",
                "✗ Failed to apply resource".red().bold(),
                node.red().bold()
            );
            eprintln!("  {}", cause);
            eprintln!("  Resources applied before the failure were kept and recorded in state.");
        }
        ReconcileError::Cancelled { applied_nodes } => {
            eprintln!("{}", "✗ Cancelled".yellow().bold());
            if applied_nodes.is_empty() {
                eprintln!("  No resources were applied.");
            } else {
                eprintln!("  Applied before cancellation: {}", applied_nodes.join(", "));
            }
        }
        other => {
            eprintln!("{} {}", "✗".red().bold(), other);
        }
    }
}
