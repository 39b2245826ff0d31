//! imsg - iMessage history toolkit CLI
//!
//! Main entry point for the imsg command-line tool.

use anyhow::{Result, anyhow, bail};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use imsg::analysis::{self, Report};
use imsg::config::Config;
use imsg::logging::{OperationGuard, init_cli_logging};
use imsg::normalize::is_phone_like;
use imsg::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging comes first so config warnings are visible; the config file
    // can only switch colors off afterwards.
    let env_colors = std::env::var_os("NO_COLOR").is_none()
        && std::env::var_os("IMSG_NO_COLOR").is_none();
    init_cli_logging(cli.quiet, cli.verbose, env_colors);

    let config = load_config(&cli)?;
    if !config.output.colors {
        colored::control::set_override(false);
    }

    let format = resolve_format(&cli, &config)?;
    debug!(?format, "Resolved output format");

    match &cli.command {
        Commands::Extract(args) => cmd_extract(&cli, format, &config, args),
        Commands::Contacts(args) => cmd_contacts(format, &config, args),
        Commands::Label(args) => cmd_label(&cli, format, &config, args),
        Commands::Report(args) => cmd_report(format, &config, args),
        Commands::Normalize(args) => cmd_normalize(format, args),
        Commands::Config(args) => cmd_config(format, &config, args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

/// Load the layered config. A broken config file is fatal, except for
/// `config --init`, which exists to replace it.
fn load_config(cli: &Cli) -> Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(err) if matches!(&cli.command, Commands::Config(args) if args.init) => {
            warn!("{err}");
            Ok(Config::default())
        }
        Err(err) => Err(with_hint(err)),
    }
}

fn resolve_format(cli: &Cli, config: &Config) -> Result<OutputFormat> {
    if let Some(format) = cli.format {
        return Ok(format);
    }
    config.output.format.parse().map_err(|_| {
        anyhow!(format_unknown_value_error(
            "output format",
            &config.output.format,
            &["text", "json", "json-pretty", "csv"],
        ))
    })
}

/// Attach the error's hint, if any, for display.
fn with_hint(err: ImsgError) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow!("{err}\n  {} {hint}", "Hint:".cyan()),
        None => err.into(),
    }
}

/// Run a pipeline stage under an operation guard.
fn stage<T>(name: &str, f: impl FnOnce() -> imsg::Result<T>) -> Result<T> {
    let guard = OperationGuard::new(name);
    match f() {
        Ok(value) => {
            guard.complete();
            Ok(value)
        }
        Err(err) => {
            guard.fail(&err);
            Err(with_hint(err))
        }
    }
}

fn spinner(cli: &Cli, format: OutputFormat, message: &str) -> Option<ProgressBar> {
    if cli.quiet || format != OutputFormat::Text {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn print_json<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let json = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn print_csv<S: Serialize>(rows: &[S]) -> Result<()> {
    table::write_rows_to(io::stdout().lock(), rows)?;
    Ok(())
}

fn header(title: &str) {
    println!("{}", title.bold().cyan());
    println!("{}", "─".repeat(HEADER_DIVIDER_WIDTH));
}

fn cmd_extract(
    cli: &Cli,
    format: OutputFormat,
    config: &Config,
    args: &cli::ExtractArgs,
) -> Result<()> {
    let paths = config.pipeline_paths();
    let chat_db = args.chat_db.clone().unwrap_or(paths.chat_db);
    let output = args.output.clone().unwrap_or(paths.message_source);

    let pb = spinner(cli, format, "Reading message database...");
    let result = stage("extract", || pipeline::extract_to_table(&chat_db, &output));
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let summary = result?;

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &summary)?,
        OutputFormat::Csv => print_csv(&[summary])?,
        OutputFormat::Text => {
            if !cli.quiet {
                println!(
                    "{} Extracted {} messages ({} in group chats)",
                    "✓".green(),
                    format_number_usize(summary.messages).cyan(),
                    format_number_usize(summary.group_messages)
                );
                println!("  Wrote: {}", summary.output.display());
            }
        }
    }
    Ok(())
}

fn cmd_contacts(format: OutputFormat, config: &Config, args: &cli::ContactsArgs) -> Result<()> {
    if args.directory {
        return print_directory(format, config, args);
    }

    let entries = vcard::parse_file(&args.input).map_err(with_hint)?;
    let rows = vcard::export_rows(&entries);

    if let Some(output) = &args.output {
        table::write_rows(output, &rows)?;
        match format {
            OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &rows)?,
            _ => println!(
                "{} Converted {} cards into {} contact rows: {}",
                "✓".green(),
                format_number_usize(entries.len()),
                format_number_usize(rows.len()).cyan(),
                output.display()
            ),
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &rows),
        OutputFormat::Csv | OutputFormat::Text => print_csv(&rows),
    }
}

/// Show the directory `label` would build from a contact list.
fn print_directory(format: OutputFormat, config: &Config, args: &cli::ContactsArgs) -> Result<()> {
    let policy = if args.skip_malformed {
        MalformedPolicy::Skip
    } else {
        config.labeling.on_malformed
    };
    let directory = stage("contacts", || pipeline::load_directory(&args.input, policy))?;
    let records = directory.records();

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &records),
        OutputFormat::Csv => print_csv(&records),
        OutputFormat::Text => {
            header(&format!(
                "Contact Directory ({} identifiers)",
                format_number_usize(records.len())
            ));
            for record in &records {
                println!("  {:<24} {}", record.normalized_identifier.cyan(), record.display_name);
            }
            let stats = directory.stats();
            if stats.overwritten > 0 || stats.skipped > 0 {
                println!();
                println!(
                    "  {} overwritten, {} skipped",
                    stats.overwritten, stats.skipped
                );
            }
            Ok(())
        }
    }
}

fn cmd_label(
    cli: &Cli,
    format: OutputFormat,
    config: &Config,
    args: &cli::LabelArgs,
) -> Result<()> {
    let defaults = config.pipeline_paths();
    let paths = PipelinePaths {
        message_source: args.messages.clone().unwrap_or(defaults.message_source),
        contact_source: args.contacts.clone().unwrap_or(defaults.contact_source),
        output: args.output.clone().unwrap_or(defaults.output),
        chat_db: defaults.chat_db,
    };
    let policy = if args.skip_malformed {
        MalformedPolicy::Skip
    } else {
        config.labeling.on_malformed
    };
    let mut options = config.label_options();
    if let Some(label) = &args.owner_label {
        options.owner_label.clone_from(label);
    }

    let pb = spinner(cli, format, "Labeling messages...");
    let result = stage("label", || pipeline::run_label(&paths, policy, &options));
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let summary = result?;

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &summary)?,
        OutputFormat::Csv => print_csv(&[summary.stats])?,
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            let stats = summary.stats;
            println!(
                "{} Labeled {} messages",
                "✓".green(),
                format_number_usize(stats.messages).cyan()
            );
            println!(
                "  Contacts:   {} ({} overwritten, {} skipped)",
                format_number_usize(summary.contacts),
                summary.contacts_overwritten,
                summary.contacts_skipped
            );
            println!(
                "  Senders:    {} resolved, {} unresolved, {} from you",
                format_number_usize(stats.senders_resolved).green(),
                format_number_usize(stats.senders_unresolved).yellow(),
                format_number_usize(stats.from_me)
            );
            println!(
                "  Recipients: {} resolved, {} unresolved",
                format_number_usize(stats.counterparts_resolved).green(),
                format_number_usize(stats.counterparts_unresolved).yellow()
            );
            println!("  Wrote: {}", summary.output.display());
        }
    }
    Ok(())
}

fn cmd_report(format: OutputFormat, config: &Config, args: &cli::ReportArgs) -> Result<()> {
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| config.pipeline_paths().output);
    let messages = table::read_labeled(&input).map_err(with_hint)?;

    let mut options = config.report_options();
    if let Some(days) = args.bucket_days {
        options.bucket_days = days;
    }
    if let Some(minutes) = args.segment_minutes {
        options.segment_minutes = minutes;
    }
    if let Some(top) = args.top {
        options.top_n = top;
    }

    if let Some(chat) = &args.chat {
        let breakdown = analysis::group_chat_breakdown(&messages, chat).map_err(|err| {
            unknown_value(err, "group chat", chat, &analysis::group_chat_names(&messages))
        })?;
        return match format {
            OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &breakdown),
            OutputFormat::Csv => print_csv(&breakdown.senders),
            OutputFormat::Text => {
                header(&format!(
                    "{} ({} messages)",
                    breakdown.chat,
                    format_number_u64(breakdown.total)
                ));
                println!("{}", analysis::format_breakdown(&breakdown));
                Ok(())
            }
        };
    }

    if let Some(person) = &args.person {
        let activity = analysis::person_activity(&messages, person, options.bucket_days)
            .map_err(|err| {
                unknown_value(err, "person", person, &analysis::person_names(&messages))
            })?;
        return match format {
            OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &activity),
            OutputFormat::Csv => print_csv(&activity.buckets),
            OutputFormat::Text => {
                header("Activity With Person");
                println!("{}", analysis::format_person_activity(&activity, args.width));
                Ok(())
            }
        };
    }

    print_section(format, args.section, &messages, &options, args.width)
}

/// Turn a not-found error into a "did you mean" message.
fn unknown_value(err: ImsgError, kind: &str, input: &str, known: &[String]) -> anyhow::Error {
    if !matches!(err, ImsgError::NotFound { .. }) {
        return with_hint(err);
    }
    let options: Vec<&str> = known.iter().map(String::as_str).collect();
    anyhow!(format_unknown_value_error(kind, input, &options))
}

fn print_section(
    format: OutputFormat,
    section: ReportSection,
    messages: &[LabeledMessage],
    options: &analysis::ReportOptions,
    width: usize,
) -> Result<()> {
    let top = options.top_n;
    match (section, format) {
        (ReportSection::All, OutputFormat::Json | OutputFormat::JsonPretty) => {
            print_json(format, &Report::compute(messages, options)?)
        }
        (ReportSection::All, OutputFormat::Csv) => {
            bail!("CSV output needs a single report section (use --section)")
        }
        (ReportSection::All, OutputFormat::Text) => {
            for section in [
                ReportSection::Summary,
                ReportSection::Activity,
                ReportSection::TimeOfDay,
                ReportSection::GroupChats,
                ReportSection::Participation,
                ReportSection::Contacts,
                ReportSection::Interactions,
            ] {
                print_section(format, section, messages, options, width)?;
                println!();
            }
            Ok(())
        }

        (ReportSection::Summary, _) => {
            let summary = analysis::summary(messages);
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &summary),
                OutputFormat::Csv => print_csv(&[summary]),
                OutputFormat::Text => {
                    print_summary(&summary);
                    Ok(())
                }
            }
        }
        (ReportSection::Activity, _) => {
            let activity = analysis::lifetime_activity(messages, options.bucket_days)?;
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &activity),
                OutputFormat::Csv => print_csv(&activity.buckets),
                OutputFormat::Text => {
                    header("Lifetime Activity");
                    println!("{}", analysis::format_lifetime(&activity, width));
                    Ok(())
                }
            }
        }
        (ReportSection::TimeOfDay, _) => {
            let tod = analysis::time_of_day(messages, options.segment_minutes)?;
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &tod),
                OutputFormat::Csv => print_csv(&tod.segments),
                OutputFormat::Text => {
                    header(&format!("Time of Day ({}-minute segments)", tod.segment_minutes));
                    println!("{}", analysis::format_time_of_day(&tod));
                    Ok(())
                }
            }
        }
        (ReportSection::GroupChats, _) => {
            let chats = analysis::top_group_chats(messages, top);
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &chats),
                OutputFormat::Csv => print_csv(&chats),
                OutputFormat::Text => {
                    header(&format!("Top {top} Group Chats"));
                    println!("{}", analysis::format_counts(&chats));
                    Ok(())
                }
            }
        }
        (ReportSection::Participation, _) => {
            let rows = analysis::group_participation(messages, top);
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &rows),
                OutputFormat::Csv => print_csv(&rows),
                OutputFormat::Text => {
                    header("Group Chat Participation");
                    println!("{}", analysis::format_participation(&rows));
                    Ok(())
                }
            }
        }
        (ReportSection::Contacts, _) => {
            let contacts = analysis::top_contacts(messages, top);
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &contacts),
                OutputFormat::Csv => print_csv(&contacts),
                OutputFormat::Text => {
                    header(&format!("Top {top} Contacts (direct messages)"));
                    println!("{}", analysis::format_counts(&contacts));
                    Ok(())
                }
            }
        }
        (ReportSection::Interactions, _) => {
            let rows = analysis::total_interactions(messages, top);
            match format {
                OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &rows),
                OutputFormat::Csv => print_csv(&rows),
                OutputFormat::Text => {
                    header(&format!("Top {top} Contacts (including group chats)"));
                    println!("{}", analysis::format_interactions(&rows));
                    Ok(())
                }
            }
        }
    }
}

fn print_summary(summary: &analysis::Summary) {
    header("Message History");
    println!("  {:<20} {:>10}", "Messages:", format_number_u64(summary.total));
    println!("  {:<20} {:>10}", "Sent:", format_number_u64(summary.sent));
    println!("  {:<20} {:>10}", "Received:", format_number_u64(summary.received));
    println!("  {:<20} {:>10}", "Direct:", format_number_u64(summary.direct));
    println!("  {:<20} {:>10}", "Group:", format_number_u64(summary.group));
    println!("  {:<20} {:>10}", "Contacts:", format_number_usize(summary.contacts));
    println!("  {:<20} {:>10}", "Group chats:", format_number_usize(summary.group_chats));
    if let (Some(first), Some(last)) = (summary.first_message, summary.last_message) {
        println!(
            "  First message: {}",
            first.format("%Y-%m-%d").to_string().green()
        );
        println!(
            "  Last message:  {}",
            last.format("%Y-%m-%d").to_string().green()
        );
    }
}

#[derive(Serialize)]
struct NormalizedIdentifier<'a> {
    input: &'a str,
    normalized: String,
    phone_like: bool,
}

fn cmd_normalize(format: OutputFormat, args: &cli::NormalizeArgs) -> Result<()> {
    let rows: Vec<NormalizedIdentifier<'_>> = args
        .identifiers
        .iter()
        .map(|input| NormalizedIdentifier {
            input,
            normalized: normalize(input),
            phone_like: is_phone_like(input),
        })
        .collect();

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, &rows),
        OutputFormat::Csv => print_csv(&rows),
        OutputFormat::Text => {
            for row in &rows {
                println!("{}  →  {}", row.input, row.normalized.cyan());
            }
            Ok(())
        }
    }
}

fn cmd_config(format: OutputFormat, config: &Config, args: &cli::ConfigArgs) -> Result<()> {
    if args.init {
        let path: PathBuf = Config::user_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        if path.exists() && !args.force {
            bail!(
                "Config file already exists at {} (use --force to overwrite)",
                path.display()
            );
        }
        let written = Config::default().save()?;
        println!("{} Wrote default config to {}", "✓".green(), written.display());
        return Ok(());
    }

    // --show is the default action.
    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(format, config),
        _ => {
            header("Current Configuration");
            if let Some(path) = Config::user_config_path() {
                let state = if path.exists() { "" } else { " (not present)" };
                println!("  File: {}{state}", path.display());
            }
            let paths = config.pipeline_paths();
            println!("  Messages DB:    {}", paths.chat_db.display());
            println!("  Message table:  {}", paths.message_source.display());
            println!("  Contacts:       {}", paths.contact_source.display());
            println!("  Labeled table:  {}", paths.output.display());
            println!();
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "imsg", &mut io::stdout());
    Ok(())
}
