/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Tommaso Fontana
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line interface structs, functions, and methods.
//!
//! Each command is implemented as a submodule.

use crate::graphs::vec_graph::VecGraph;
use anyhow::{anyhow, bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use dsi_progress_logger::{progress_logger, ProgressLog};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

pub mod pagerank;

/// Returns the version string of the binary.
pub fn version_string() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Parses the number of threads from a string.
///
/// This function is meant to be used with `#[arg(...,  value_parser =
/// num_threads_parser)]`.
pub fn num_threads_parser(arg: &str) -> Result<usize> {
    let num_threads = arg.parse::<usize>()?;
    ensure!(num_threads > 0, "Number of threads must be greater than 0");
    Ok(num_threads)
}

/// Shared CLI arguments for commands that specify a number of threads.
#[derive(Args, Debug)]
pub struct NumThreadsArg {
    #[arg(
        short = 'j',
        long,
        default_value_t = num_cpus::get().max(1),
        value_parser = num_threads_parser
    )]
    /// The number of threads to use; it may be reduced if memory is not
    /// sufficient.
    pub num_threads: usize,
}

#[derive(Args, Debug)]
/// Shared CLI arguments for reading files containing arcs.
pub struct ArcsArgs {
    #[arg(long, default_value_t = '#')]
    /// Ignore lines that start with this symbol.
    pub line_comment_symbol: char,

    #[arg(long, default_value_t = '\t')]
    /// The column separator.
    pub separator: char,

    #[arg(long, default_value_t = 0)]
    /// The index of the column containing the source node of an arc.
    pub source_column: usize,

    #[arg(long, default_value_t = 1)]
    /// The index of the column containing the target node of an arc.
    pub target_column: usize,

    #[arg(long)]
    /// The index of the column containing the weight of an arc; if
    /// specified, the graph is weighted.
    pub weight_column: Option<usize>,

    #[arg(long, default_value_t = false)]
    /// Node labels are numerical identifiers, which are used as original
    /// identifiers of the nodes.
    pub exact: bool,
}

/// A graph read from a list of arcs, with the labels of its nodes.
#[derive(Debug)]
pub struct LabeledGraph {
    pub graph: VecGraph,
    /// The label of every node.
    pub labels: Vec<String>,
    /// The inverse of `labels`.
    pub ids: HashMap<String, usize>,
}

impl LabeledGraph {
    /// Returns the original identifier of the node with the given label.
    pub fn original_id(&self, label: &str) -> Option<u64> {
        self.ids.get(label).map(|&node| self.graph.original_id(node))
    }
}

/// Reads a list of arcs.
///
/// Nodes are numbered in order of appearance of their labels. If
/// [`exact`](ArcsArgs::exact) is set, labels must be integers, and they are
/// used as original identifiers.
pub fn read_arcs(args: &ArcsArgs, reader: impl BufRead) -> Result<LabeledGraph> {
    let mut graph = VecGraph::new();
    let mut labels = Vec::new();
    let mut ids = HashMap::new();

    let mut pl = progress_logger![];
    pl.display_memory(true).item_name("arc");
    pl.start("Reading arcs...");

    let biggest_idx = args
        .source_column
        .max(args.target_column)
        .max(args.weight_column.unwrap_or(0));
    let mut num_lines = 0;
    let mut node_id = |label: &str| -> usize {
        let next = labels.len();
        *ids.entry(label.to_owned()).or_insert_with(|| {
            labels.push(label.to_owned());
            next
        })
    };

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Could not read line {}", line_num + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(args.line_comment_symbol) {
            continue;
        }

        let vals = line.split(args.separator).collect::<Vec<_>>();
        ensure!(
            vals.len() > biggest_idx,
            "Line {}: {:?} does not have enough columns: got {} columns but expected at least {} columns separated by {:?} (you can change the separator using the --separator option)",
            line_num + 1,
            line,
            vals.len(),
            biggest_idx + 1,
            args.separator,
        );

        let src = node_id(vals[args.source_column].trim());
        let dst = node_id(vals[args.target_column].trim());
        match args.weight_column {
            Some(column) => {
                let weight = vals[column].trim().parse::<f64>().with_context(|| {
                    format!(
                        "Line {}: could not parse weight {:?}",
                        line_num + 1,
                        vals[column]
                    )
                })?;
                graph.add_weighted_arc(src, dst, weight);
            }
            None => {
                graph.add_arc(src, dst);
            }
        }
        num_lines += 1;
        pl.light_update();
    }
    pl.done();

    if num_lines == 0 {
        log::warn!("No arcs read: check that the --separator={:?} value is correct and that the --source-column={:?} and --target-column={:?} values are correct", args.separator, args.source_column, args.target_column);
    }
    log::info!("Read {num_lines} arcs on {} nodes", labels.len());

    if args.exact {
        let original_ids = labels
            .iter()
            .map(|label| {
                label
                    .parse::<u64>()
                    .map_err(|err| anyhow!("Could not parse node identifier {label:?}: {err}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let distinct = original_ids.iter().collect::<std::collections::HashSet<_>>();
        ensure!(
            distinct.len() == original_ids.len(),
            "Distinct labels parse to the same node identifier"
        );
        graph = graph.with_original_ids(original_ids);
    }

    Ok(LabeledGraph {
        graph,
        labels,
        ids,
    })
}

/// Stores values in ASCII format, one per line, with the given number of
/// decimal digits (or with the shortest representation if `None`).
pub fn store_floats(
    path: impl AsRef<Path>,
    values: &[f64],
    precision: Option<usize>,
) -> Result<()> {
    create_parent_dir(&path)?;
    let path_display = path.as_ref().display();
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Could not create vector at {}", path_display))?;
    let mut file = std::io::BufWriter::new(file);
    log::info!("Storing in ASCII format at {}", path_display);
    for value in values {
        match precision {
            None => writeln!(file, "{value}"),
            Some(precision) => writeln!(file, "{value:.precision$}"),
        }
        .with_context(|| format!("Could not write vector to {}", path_display))?;
    }
    file.flush()
        .with_context(|| format!("Could not write vector to {}", path_display))?;
    Ok(())
}

/// Stores strings, one per line.
pub fn store_labels(path: impl AsRef<Path>, labels: &[String]) -> Result<()> {
    create_parent_dir(&path)?;
    let path_display = path.as_ref().display();
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Could not create {}", path_display))?;
    let mut file = std::io::BufWriter::new(file);
    for label in labels {
        writeln!(file, "{label}").with_context(|| format!("Could not write to {}", path_display))?;
    }
    file.flush()
        .with_context(|| format!("Could not write to {}", path_display))?;
    Ok(())
}

/// Creates all parent directories of the given file path.
pub fn create_parent_dir(file_path: impl AsRef<Path>) -> Result<()> {
    // ensure that the dst directory exists
    if let Some(parent_dir) = file_path.as_ref().parent() {
        std::fs::create_dir_all(parent_dir).with_context(|| {
            format!(
                "Failed to create the directory {:?}",
                parent_dir.to_string_lossy()
            )
        })?;
    }
    Ok(())
}

/// Parses a duration from a string.
/// If no suffix is given, the value is in milliseconds.
/// You can use suffixes, the available ones are:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
///
/// Example: `1d2h3m4s567` this is parsed as: 1 day, 2 hours, 3 minutes, 4 seconds, and 567 milliseconds.
fn parse_duration(value: &str) -> Result<Duration> {
    if value.is_empty() {
        bail!("Empty duration string, if you want every 0 milliseconds use `0`.");
    }
    let mut duration = Duration::from_secs(0);
    let mut acc = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            acc.push(c);
        } else if c.is_whitespace() {
            continue;
        } else {
            let dur = acc.parse::<u64>()?;
            match c {
                's' => duration += Duration::from_secs(dur),
                'm' => duration += Duration::from_secs(dur * 60),
                'h' => duration += Duration::from_secs(dur * 60 * 60),
                'd' => duration += Duration::from_secs(dur * 60 * 60 * 24),
                _ => return Err(anyhow!("Invalid duration suffix: {}", c)),
            }
            acc.clear();
        }
    }
    if !acc.is_empty() {
        let dur = acc.parse::<u64>()?;
        duration += Duration::from_millis(dur);
    }
    Ok(duration)
}

/// Initializes the `env_logger` logger with a custom format including
/// timestamps with elapsed time since initialization.
pub fn init_env_logger() -> Result<()> {
    use jiff::fmt::friendly::{Designator, Spacing, SpanPrinter};
    use jiff::SpanRound;

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    let start = std::time::Instant::now();
    let printer = SpanPrinter::new()
        .spacing(Spacing::None)
        .designator(Designator::Compact);
    let span_round = SpanRound::new()
        .largest(jiff::Unit::Day)
        .smallest(jiff::Unit::Millisecond)
        .days_are_24_hours();

    builder.format(move |buf, record| {
        let Ok(ts) = jiff::Timestamp::try_from(SystemTime::now()) else {
            return Err(std::io::Error::other("Failed to get timestamp"));
        };
        let style = buf.default_level_style(record.level());
        let elapsed = start.elapsed();
        let span = jiff::Span::new()
            .seconds(elapsed.as_secs() as i64)
            .milliseconds(elapsed.subsec_millis() as i64);
        let span = span.round(span_round).map_err(std::io::Error::other)?;
        writeln!(
            buf,
            "{} {} {style}{}{style:#} [{:?}] {} - {}",
            ts.strftime("%F %T%.3f"),
            printer.span_to_string(&span),
            record.level(),
            std::thread::current().id(),
            record.target(),
            record.args()
        )
    });
    builder.try_init()?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    #[arg(long, value_parser = parse_duration, global=true, display_order = 1000)]
    /// How often to log progress. Default is 10s. You can use the suffixes "s"
    /// for seconds, "m" for minutes, "h" for hours, and "d" for days. If no
    /// suffix is provided it is assumed to be in milliseconds.
    /// Example: "1d2h3m4s567" is parsed as 1 day + 2 hours + 3 minutes + 4
    /// seconds + 567 milliseconds = 93784567 milliseconds.
    pub log_interval: Option<Duration>,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    #[clap(name = "pagerank", visible_alias = "pr")]
    PageRank(pagerank::CliArgs),
}

#[derive(Parser, Debug)]
#[command(name = "prank", version = version_string())]
/// Partition-based parallel centrality tools.
///
/// Environment (noteworthy environment variables used):
///
/// RUST_LOG: configuration for env_logger, pass `info` to see the progress
/// of the computation, and `debug` to see partitioning details.
pub struct Cli {
    #[clap(flatten)]
    args: GlobalArgs,
    #[command(subcommand)]
    command: SubCommands,
}

/// The entry point of the command-line interface.
pub fn main<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let start = std::time::Instant::now();
    let cli = Cli::parse_from(args);
    match cli.command {
        SubCommands::PageRank(args) => {
            pagerank::main(cli.args, args)?;
        }
    }

    log::info!(
        "The command took {}",
        pretty_print_elapsed(start.elapsed().as_secs_f64())
    );

    Ok(())
}

/// Pretty prints seconds in a humanly readable format.
fn pretty_print_elapsed(elapsed: f64) -> String {
    let mut result = String::new();
    let mut elapsed_seconds = elapsed as u64;
    let weeks = elapsed_seconds / (60 * 60 * 24 * 7);
    elapsed_seconds %= 60 * 60 * 24 * 7;
    let days = elapsed_seconds / (60 * 60 * 24);
    elapsed_seconds %= 60 * 60 * 24;
    let hours = elapsed_seconds / (60 * 60);
    elapsed_seconds %= 60 * 60;
    let minutes = elapsed_seconds / 60;

    match weeks {
        0 => {}
        1 => result.push_str("1 week "),
        _ => result.push_str(&format!("{} weeks ", weeks)),
    }
    match days {
        0 => {}
        1 => result.push_str("1 day "),
        _ => result.push_str(&format!("{} days ", days)),
    }
    match hours {
        0 => {}
        1 => result.push_str("1 hour "),
        _ => result.push_str(&format!("{} hours ", hours)),
    }
    match minutes {
        0 => {}
        1 => result.push_str("1 minute "),
        _ => result.push_str(&format!("{} minutes ", minutes)),
    }

    result.push_str(&format!("{:.3} seconds ({}s)", elapsed % 60.0, elapsed));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Graph;

    fn arcs_args(weight_column: Option<usize>, exact: bool) -> ArcsArgs {
        ArcsArgs {
            line_comment_symbol: '#',
            separator: '\t',
            source_column: 0,
            target_column: 1,
            weight_column,
            exact,
        }
    }

    #[test]
    fn test_parse_duration() -> Result<()> {
        assert_eq!(parse_duration("1s")?, Duration::from_secs(1));
        assert_eq!(parse_duration("1m30s")?, Duration::from_secs(90));
        assert_eq!(parse_duration("250")?, Duration::from_millis(250));
        assert_eq!(
            parse_duration("1d2h3m4s567")?,
            Duration::from_millis(93784567)
        );
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3x").is_err());
        Ok(())
    }

    #[test]
    fn test_read_labels() -> Result<()> {
        let input = "# a comment\nfoo\tbar\nbar\tbaz\n\nbaz\tfoo\nfoo\tbaz\n";
        let lg = read_arcs(&arcs_args(None, false), input.as_bytes())?;
        assert_eq!(lg.labels, vec!["foo", "bar", "baz"]);
        assert_eq!(lg.graph.num_nodes(), 3);
        assert_eq!(lg.graph.num_arcs(), 4);
        assert_eq!(lg.graph.successors(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(lg.original_id("baz"), Some(2));
        assert_eq!(lg.original_id("qux"), None);
        Ok(())
    }

    #[test]
    fn test_read_exact_weighted() -> Result<()> {
        let input = "10\t20\t0.5\n20\t10\t2\n";
        let lg = read_arcs(&arcs_args(Some(2), true), input.as_bytes())?;
        assert!(lg.graph.is_weighted());
        assert_eq!(lg.graph.to_mapped_node_id(20), Some(1));
        assert_eq!(lg.graph.to_mapped_node_id(0), None);
        assert_eq!(lg.original_id("10"), Some(10));
        let mut weights = vec![];
        lg.graph.for_each_successor(0, 1.0, |_, s, w| {
            weights.push((s, w));
            true
        });
        assert_eq!(weights, vec![(1, 0.5)]);
        Ok(())
    }

    #[test]
    fn test_read_errors() {
        assert!(read_arcs(&arcs_args(None, false), "foo\n".as_bytes()).is_err());
        assert!(read_arcs(&arcs_args(Some(2), false), "a\tb\tx\n".as_bytes()).is_err());
        assert!(read_arcs(&arcs_args(None, true), "a\tb\n".as_bytes()).is_err());
    }

    #[test]
    fn test_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sub").join("ranks.txt");
        store_floats(&path, &[1.123456789, 2.987654321], Some(3))?;
        let content = std::fs::read_to_string(&path)?;
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["1.123", "2.988"]);
        Ok(())
    }

    #[test]
    fn test_pretty_print_elapsed() {
        assert_eq!(pretty_print_elapsed(61.5), "1 minute 1.500 seconds (61.5s)");
    }
}
