use std::io::{self, IsTerminal, Write};
use std::process;

use anyhow::Context;
use clap::{arg, command, value_parser, ArgMatches, Command};
use log::debug;
use yansi::Paint;

use regex_thompson::{MatcherMemory, Regex, RegexBuilder};

fn cli() -> Command {
    command!()
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            arg!(--"max-pattern-len" <BYTES>)
                .help("Reject patterns longer than this many bytes")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--"max-nesting" <DEPTH>)
                .help("Reject patterns with groups nested deeper than this")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .subcommands([
            Command::new("match")
                .about("Match a pattern against one or more subjects")
                .long_about(
                    "Match a pattern against one or more subjects\n\n\
                     Every subject that matches the whole pattern is printed on \
                     its own line.",
                )
                .arg(arg!(<PATTERN> "Pattern to compile"))
                .arg(arg!(<SUBJECT> ... "Subjects to match"))
                .arg(arg!(-v --verbose "Print a verdict for every subject")),
            Command::new("postfix")
                .about("Print the postfix form of a pattern")
                .arg(arg!(<PATTERN> "Pattern to rewrite")),
            Command::new("dot")
                .about("Output DOT (Graphviz) representation of the NFA")
                .arg(arg!(<PATTERN> "Pattern to compile")),
        ])
}

fn compile(args: &ArgMatches) -> anyhow::Result<Regex> {
    let pattern = args.get_one::<String>("PATTERN").unwrap();
    let mut builder = RegexBuilder::default();

    if let Some(len) = args.get_one::<usize>("max-pattern-len") {
        builder.max_pattern_len(*len);
    }

    if let Some(depth) = args.get_one::<usize>("max-nesting") {
        builder.max_nesting(*depth);
    }

    let regex = builder
        .build(pattern)
        .with_context(|| format!("can not compile pattern `{}`", pattern))?;

    debug!(
        "compiled `{}` into {} states ({} bytes)",
        pattern,
        regex.state_count(),
        regex.memory_size()
    );

    Ok(regex)
}

fn exec_match(args: &ArgMatches) -> anyhow::Result<()> {
    let regex = compile(args)?;
    let verbose = args.get_flag("verbose");
    let mut memory = MatcherMemory::default();
    let mut out = io::stdout().lock();

    for subject in args.get_many::<String>("SUBJECT").unwrap() {
        let mut matcher = memory.matcher(&regex);
        matcher.chunk(subject.as_bytes());
        let matched = matcher.finish();

        if verbose {
            if matched {
                writeln!(out, "  {}  {:?}", "MATCH".green(), subject)?;
            } else {
                writeln!(out, "  {}  {:?}", "NO MATCH".red(), subject)?;
            }
        } else if matched {
            writeln!(out, "{}", subject)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn exec_postfix(args: &ArgMatches) -> anyhow::Result<()> {
    let regex = compile(args)?;
    println!("{}", regex.postfix());
    Ok(())
}

fn exec_dot(args: &ArgMatches) -> anyhow::Result<()> {
    let regex = compile(args)?;
    let mut out = io::stdout().lock();
    regex.to_dot(&mut out)?;
    out.flush()?;
    Ok(())
}

/// Render `err` the way compiler errors look: a red `error:` prefix, the
/// context, and the underlying cause if there is one.
fn error_message(err: &anyhow::Error) -> String {
    match err.source() {
        Some(source) => format!("{} {}: {}", "error:".red().bold(), err, source),
        None => format!("{} {}", "error:".red().bold(), err),
    }
}

fn main() {
    env_logger::init();

    // Keep escape codes out of redirected output.
    if !io::stdout().is_terminal() {
        yansi::disable();
    }

    let args = cli().get_matches();

    let result = match args.subcommand() {
        Some(("match", args)) => exec_match(args),
        Some(("postfix", args)) => exec_postfix(args),
        Some(("dot", args)) => exec_dot(args),
        _ => unreachable!(),
    };

    if let Err(err) = result {
        eprintln!("{}", error_message(&err));
        process::exit(1);
    }
}
