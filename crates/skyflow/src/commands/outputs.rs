use super::print_outputs;
use crate::project::Project;
use skyflow_cloud::recorded_outputs;

pub async fn handle(project: &Project, json: bool, show_secrets: bool) -> anyhow::Result<()> {
    let state = project.state_manager().load().await?;
    if state.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No resources applied yet. Run `sky apply` first.");
        }
        return Ok(());
    }

    let (key_pairs, _) = project.stored_key_pairs().await?;
    let (declarations, exports) = project.resolve(&key_pairs)?;
    let mut graph = project.build_graph(declarations, &exports)?;
    let outputs = recorded_outputs(&mut graph, &exports, &state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs.to_json(show_secrets))?);
    } else {
        print_outputs(&outputs, show_secrets);
    }
    Ok(())
}
