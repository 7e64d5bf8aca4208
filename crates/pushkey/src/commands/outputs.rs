//! Output command

use anyhow::Result;
use camino::Utf8Path;
use pushkey_engine::{Outputs, StateStore};

use super::load_config;
use crate::cli::OutputArgs;
use crate::output;

pub fn run(args: OutputArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let state = StateStore::new(config.state_dir()).load()?;
    let outputs = Outputs::from_state(&state);

    // Asking for one output by name is the only way to see a sensitive value
    if let Some(name) = &args.name {
        let out = outputs.require(name)?;
        if args.raw {
            println!("{}", out.reveal());
        } else if args.json {
            let json = serde_json::json!({
                "name": out.name,
                "value": out.reveal(),
                "sensitive": out.sensitive,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            output::output_value(out, true);
        }
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outputs.masked())?);
        return Ok(());
    }

    if outputs.is_empty() {
        output::warning("No outputs found; run `pushkey deploy` first");
        return Ok(());
    }

    output::header("Outputs");
    for out in outputs.iter() {
        output::output_value(out, false);
    }
    Ok(())
}
