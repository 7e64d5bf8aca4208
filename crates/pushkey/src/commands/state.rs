//! State command

use anyhow::{bail, Result};
use camino::Utf8Path;
use pushkey_engine::apply::display_attributes;
use pushkey_engine::{Node, ResourceState, StateFile, StateStore};
use tabled::{settings::Style, Table, Tabled};

use super::load_config;
use crate::cli::StateArgs;
use crate::output;

#[derive(Tabled)]
struct ResourceRow {
    address: String,
    kind: String,
    id: String,
    updated: String,
}

pub fn run(args: StateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = StateStore::new(config.state_dir());
    let state = store.load()?;

    if let Some(address) = &args.address {
        let Some(resource) = state.resources.get(address) else {
            bail!("No resource '{}' in {}", address, store.path());
        };
        show(address, resource);
        return Ok(());
    }

    if state.is_empty() {
        output::info(&format!("No resources tracked in {}", store.path()));
        return Ok(());
    }

    output::header(&format!("State {}", store.path()));
    output::kv("serial", &state.serial.to_string());
    output::kv("lineage", state.lineage.as_deref().unwrap_or("-"));
    println!();

    let mut table = Table::new(rows(&state));
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

fn show(address: &str, resource: &ResourceState) {
    output::header(address);
    output::kv("kind", &resource.kind);
    output::kv("id", &masked_id(address, resource));
    for (name, value) in display_attributes(resource) {
        output::kv(&name, &value);
    }
    if !resource.dependencies.is_empty() {
        output::kv("depends on", &resource.dependencies.join(", "));
    }
}

// Access key ids are only shown by `pushkey output access_key_id`
fn masked_id(address: &str, resource: &ResourceState) -> String {
    match Node::from_address(address) {
        Some(Node::AccessKey) => "<sensitive>".to_string(),
        _ => resource.id.clone(),
    }
}

fn rows(state: &StateFile) -> Vec<ResourceRow> {
    state
        .resources
        .iter()
        .map(|(address, resource)| ResourceRow {
            address: address.clone(),
            kind: resource.kind.clone(),
            id: masked_id(address, resource),
            updated: resource.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        })
        .collect()
}
