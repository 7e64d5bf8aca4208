//! Terminal output for pushkey
//!
//! Status lines go to stdout except errors and warnings. Values of sensitive
//! outputs are only ever printed through [`output_value`] so masking happens
//! in one place.

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use pushkey_engine::{Action, Output};

/// Placeholder shown instead of a sensitive value
pub const MASK: &str = "<sensitive>";

pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Indented `key: value` line
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// One output line; sensitive values stay masked unless `reveal` is set
pub fn output_value(out: &Output, reveal: bool) {
    if out.sensitive && !reveal {
        kv(out.name, &style(MASK).yellow().to_string());
    } else {
        kv(out.name, out.reveal());
    }
}

/// Repository secret to create in GitHub and where its value comes from
pub fn github_secret(name: &str, source: &str) {
    println!("  {:<24} {} {}", style(name).bold(), style("<-").dim(), source);
}

/// Plan symbol for `action`, padded and colored
pub fn action_symbol(action: Action) -> StyledObject<String> {
    let symbol = style(format!("{:>3}", action.symbol()));
    match action {
        Action::Create => symbol.green(),
        Action::Update => symbol.yellow(),
        Action::Replace => symbol.magenta(),
        Action::Delete | Action::NoOp => symbol.red(),
    }
    .bold()
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
