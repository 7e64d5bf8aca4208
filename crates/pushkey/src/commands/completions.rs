//! Shell completions generation

use crate::cli::{Cli, CompletionsArgs};
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use std::io::{self, Write};

pub fn run(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    let mut stdout = io::stdout().lock();
    generate(args.shell, &mut cmd, bin, &mut stdout);
    stdout.flush()?;
    Ok(())
}
