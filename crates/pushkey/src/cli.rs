//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// pushkey - least-privilege CI credentials for pushing images to ECR
#[derive(Parser, Debug)]
#[command(name = "pushkey")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to pushkey.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub aws: AwsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// AWS session overrides, taking precedence over pushkey.yaml
#[derive(Args, Debug, Clone, Default)]
pub struct AwsArgs {
    /// AWS region
    #[arg(long, global = true, env = "PUSHKEY_REGION")]
    pub region: Option<String>,

    /// Named AWS profile
    #[arg(long, global = true, env = "PUSHKEY_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision everything: verify, plan, apply and report
    Deploy,

    /// Write a default pushkey.yaml and verify credentials
    Init(InitArgs),

    /// Show the changes apply would make
    Plan(PlanArgs),

    /// Apply a saved plan, or plan and apply after confirmation
    Apply(ApplyArgs),

    /// Show outputs from the state file
    Output(OutputArgs),

    /// Tear down every provisioned resource
    Destroy(DestroyArgs),

    /// Print the registry push policy document
    Policy(PolicyArgs),

    /// List resources tracked in the state file
    State(StateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// Init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing pushkey.yaml
    #[arg(short, long)]
    pub force: bool,
}

// Plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Save the plan to this file for a later `apply`
    #[arg(short, long)]
    pub out: Option<Utf8PathBuf>,

    /// Plan a teardown instead
    #[arg(long)]
    pub destroy: bool,
}

// Apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Saved plan file from `pushkey plan --out`
    pub plan_file: Option<Utf8PathBuf>,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub auto_approve: bool,
}

// Output command
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Show a single output, unmasked
    pub name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the bare value (requires a name)
    #[arg(long, requires = "name")]
    pub raw: bool,
}

// Destroy command
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub force: bool,
}

// Policy command
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Account id to render for instead of the caller's
    #[arg(long)]
    pub account: Option<String>,
}

// State command
#[derive(Args, Debug)]
pub struct StateArgs {
    /// Show one resource's attributes, e.g. `identity`
    pub address: Option<String>,
}

// Completions command
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_takes_no_flags() {
        assert!(Cli::try_parse_from(["pushkey", "deploy"]).is_ok());
        assert!(Cli::try_parse_from(["pushkey", "deploy", "--auto-approve"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "pushkey", "-vv", "plan", "-c", "ci/pushkey.yaml", "--region", "eu-west-1",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref().map(|p| p.as_str()), Some("ci/pushkey.yaml"));
        assert_eq!(cli.aws.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_apply_plan_file() {
        let cli =
            Cli::try_parse_from(["pushkey", "apply", "tfplan.json", "--auto-approve"]).unwrap();
        match cli.command {
            Commands::Apply(args) => {
                assert_eq!(args.plan_file.as_deref().map(|p| p.as_str()), Some("tfplan.json"));
                assert!(args.auto_approve);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_output_raw_requires_name() {
        assert!(Cli::try_parse_from(["pushkey", "output", "--raw"]).is_err());
        assert!(Cli::try_parse_from(["pushkey", "output", "user_arn", "--raw"]).is_ok());
    }

    #[test]
    fn test_policy_account_override() {
        let cli = Cli::try_parse_from([
            "pushkey",
            "policy",
            "--account",
            "123456789012",
            "--region",
            "us-east-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Policy(args) => assert_eq!(args.account.as_deref(), Some("123456789012")),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.aws.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    #[serial]
    fn test_region_and_profile_from_env() {
        std::env::set_var("PUSHKEY_REGION", "ap-southeast-2");
        std::env::set_var("PUSHKEY_PROFILE", "ci-admin");
        let cli = Cli::try_parse_from(["pushkey", "state"]);
        std::env::remove_var("PUSHKEY_REGION");
        std::env::remove_var("PUSHKEY_PROFILE");

        let cli = cli.unwrap();
        assert_eq!(cli.aws.region.as_deref(), Some("ap-southeast-2"));
        assert_eq!(cli.aws.profile.as_deref(), Some("ci-admin"));
    }

    #[test]
    #[serial]
    fn test_flag_beats_env() {
        std::env::set_var("PUSHKEY_REGION", "ap-southeast-2");
        let cli = Cli::try_parse_from(["pushkey", "plan", "--region", "eu-central-1"]);
        std::env::remove_var("PUSHKEY_REGION");

        assert_eq!(cli.unwrap().aws.region.as_deref(), Some("eu-central-1"));
    }
}
