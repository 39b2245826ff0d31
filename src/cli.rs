//! CLI definitions for imsg.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// imsg - iMessage history toolkit
#[derive(Parser, Debug)]
#[command(name = "imsg")]
#[command(version)]
#[command(about = "Extract, label and analyse an iMessage history")]
#[command(long_about = r#"
imsg - Turn the macOS Messages database into a labeled message table and
descriptive statistics.

Pipeline:
  1. extract   chat.db            -> message table (CSV)
  2. contacts  contacts.vcf       -> contact table (CSV)
  3. label     messages + contacts -> labeled table with names and `To`
  4. report    labeled table      -> activity, time-of-day, group chats, contacts

Quick start:
  imsg extract
  imsg label --contacts ~/Downloads/contacts.vcf
  imsg report
"#)]
pub struct Cli {
    /// Output format (defaults to the configured format)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract messages from the Messages database into a CSV table
    Extract(ExtractArgs),

    /// Convert a vCard export into a flat contact table
    Contacts(ContactsArgs),

    /// Resolve senders and recipients to contact names
    Label(LabelArgs),

    /// Print statistics over a labeled table
    Report(ReportArgs),

    /// Show the canonical form of identifiers
    Normalize(NormalizeArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Path to chat.db
    #[arg(long)]
    pub chat_db: Option<PathBuf>,

    /// Message table to write
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ContactsArgs {
    /// vCard file (.vcf), or a contact table with --directory
    pub input: PathBuf,

    /// Contact table to write (stdout if not specified)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Print the normalized lookup keys and names used by `label`
    #[arg(long, conflicts_with = "output")]
    pub directory: bool,

    /// With --directory, drop rows without a number or name instead of failing
    #[arg(long, requires = "directory")]
    pub skip_malformed: bool,
}

#[derive(Args, Debug)]
pub struct LabelArgs {
    /// Message table to read
    #[arg(long)]
    pub messages: Option<PathBuf>,

    /// Contact list (.vcf or .csv)
    #[arg(long)]
    pub contacts: Option<PathBuf>,

    /// Labeled table to write
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Drop contact rows without a number or name instead of failing
    #[arg(long)]
    pub skip_malformed: bool,

    /// Sender label for your own messages
    #[arg(long)]
    pub owner_label: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Labeled table to analyse
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Which analysis to show
    #[arg(long, short = 's', default_value = "all")]
    pub section: ReportSection,

    /// Show the per-sender breakdown of one group chat
    #[arg(long, conflicts_with = "person")]
    pub chat: Option<String>,

    /// Show activity over time with one person
    #[arg(long)]
    pub person: Option<String>,

    /// Days per activity bucket
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub bucket_days: Option<u32>,

    /// Minutes per time-of-day segment
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1440))]
    pub segment_minutes: Option<u32>,

    /// Number of entries in top-N tables
    #[arg(long, short = 'n')]
    pub top: Option<usize>,

    /// Sparkline width in characters
    #[arg(long, default_value = "60")]
    pub width: usize,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Phone numbers or emails
    #[arg(required = true)]
    pub identifiers: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Write a default config file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportSection {
    #[default]
    All,
    Summary,
    Activity,
    TimeOfDay,
    GroupChats,
    Participation,
    Contacts,
    Interactions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_label_flags() {
        let cli = Cli::try_parse_from([
            "imsg",
            "label",
            "--contacts",
            "c.vcf",
            "--skip-malformed",
            "--owner-label",
            "Ada",
        ])
        .unwrap();
        let Commands::Label(args) = cli.command else {
            panic!("expected label command");
        };
        assert!(args.skip_malformed);
        assert_eq!(args.owner_label.as_deref(), Some("Ada"));
        assert_eq!(args.contacts, Some(PathBuf::from("c.vcf")));
    }

    #[test]
    fn contacts_directory_flags() {
        let cli = Cli::try_parse_from(["imsg", "contacts", "c.csv", "--directory", "--skip-malformed"])
            .unwrap();
        let Commands::Contacts(args) = cli.command else {
            panic!("expected contacts command");
        };
        assert!(args.directory && args.skip_malformed);
        assert!(Cli::try_parse_from(["imsg", "contacts", "c.vcf", "--skip-malformed"]).is_err());
        assert!(Cli::try_parse_from(["imsg", "contacts", "c.vcf", "--directory", "-o", "x.csv"]).is_err());
    }

    #[test]
    fn report_rejects_zero_segment() {
        assert!(Cli::try_parse_from(["imsg", "report", "--segment-minutes", "0"]).is_err());
        assert!(Cli::try_parse_from(["imsg", "report", "--segment-minutes", "1441"]).is_err());
        let cli = Cli::try_parse_from(["imsg", "report", "-s", "time-of-day"]).unwrap();
        let Commands::Report(args) = cli.command else {
            panic!("expected report command");
        };
        assert_eq!(args.section, ReportSection::TimeOfDay);
    }

    #[test]
    fn output_format_from_config_string() {
        assert_eq!("json-pretty".parse::<OutputFormat>().unwrap(), OutputFormat::JsonPretty);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
