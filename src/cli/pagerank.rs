/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{read_arcs, store_floats, store_labels, ArcsArgs, GlobalArgs, NumThreadsArg};
use crate::graphs::vec_graph::VecGraph;
use crate::rank::variant::{ArticleRank, Eigenvector, Standard, Variant, Weighted};
use crate::rank::{Config, Normalization, PageRank, PageRankResult};
use anyhow::{ensure, Context, Result};
use clap::Parser;
use dsi_progress_logger::{progress_logger, ProgressLog};
use std::path::PathBuf;

/// The centrality to compute.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
pub enum CliVariant {
    /// PageRank, splitting rank evenly among successors.
    #[default]
    Pagerank,
    /// PageRank, splitting rank proportionally to arc weights.
    Weighted,
    /// ArticleRank, splitting rank by outdegree plus average outdegree.
    ArticleRank,
    /// Eigenvector centrality.
    Eigenvector,
}

/// The normalization of the output vector.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default)]
pub enum CliNormalization {
    #[default]
    None,
    Max,
    L1,
    L2,
}

impl From<CliNormalization> for Normalization {
    fn from(n: CliNormalization) -> Self {
        match n {
            CliNormalization::None => Normalization::None,
            CliNormalization::Max => Normalization::Max,
            CliNormalization::L1 => Normalization::L1Norm,
            CliNormalization::L2 => Normalization::L2Norm,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pagerank",
    about = "Compute PageRank (or a related centrality) of a graph given as a list of arcs, using partition-based parallel iteration.",
    long_about = None
)]
pub struct CliArgs {
    /// The file containing the arcs, one per line; labels are assigned
    /// numerical identifiers in order of appearance.
    pub arcs: PathBuf,

    #[arg(short, long)]
    /// Where to store the rank vector; node labels are stored in the same
    /// order in a file with extension .nodes.
    pub output: PathBuf,

    #[arg(short, long, default_value_t = Config::DEFAULT_DAMPING_FACTOR)]
    /// The damping factor (must be in the interval [0 . . 1).
    pub damping_factor: f64,

    #[arg(short, long, default_value_t = Config::DEFAULT_TOLERANCE)]
    /// Stop when no rank changes by more than this value.
    pub tolerance: f64,

    #[arg(long, default_value_t = Config::DEFAULT_MAX_ITERATIONS)]
    /// Maximum number of iterations.
    pub max_iter: usize,

    #[arg(short, long)]
    /// The label of a source node for personalized computation (can be
    /// repeated).
    pub source: Vec<String>,

    #[arg(long, value_enum, default_value_t = CliVariant::Pagerank)]
    /// The centrality to compute.
    pub variant: CliVariant,

    #[arg(long)]
    /// The weight of arcs of unweighted graphs in the weighted variant.
    pub default_weight: Option<f64>,

    #[arg(long, value_enum, default_value_t = CliNormalization::None)]
    /// How to normalize the rank vector.
    pub normalization: CliNormalization,

    #[arg(long, default_value_t = 0)]
    /// The number of nodes of average outdegree in a partition before merging
    /// (0 for no bound).
    pub batch_size: usize,

    #[arg(long)]
    /// The number of bytes available for the computation (default: the
    /// memory available to the process).
    pub available_memory: Option<u64>,

    #[arg(long)]
    /// Decimal digits for the output.
    pub precision: Option<usize>,

    #[clap(flatten)]
    pub num_threads: NumThreadsArg,

    #[clap(flatten)]
    pub arcs_args: ArcsArgs,
}

pub fn main(global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    ensure!(
        // Note that 0.0..1.0 is [0.0..1.0) in mathematical notation
        (0.0..1.0).contains(&args.damping_factor),
        "The damping factor must be in [0 . . 1), got {}",
        args.damping_factor
    );
    ensure!(
        args.max_iter >= 1,
        "The maximum number of iterations must be at least one"
    );

    log::info!("Reading arcs from {}", args.arcs.display());
    let file = std::fs::File::open(&args.arcs)
        .with_context(|| format!("Could not open {}", args.arcs.display()))?;
    let labeled = read_arcs(&args.arcs_args, std::io::BufReader::new(file))?;

    let mut source_nodes = Vec::with_capacity(args.source.len());
    for label in &args.source {
        match labeled.original_id(label) {
            Some(id) => source_nodes.push(id),
            None => log::warn!("Unknown source node {label:?}"),
        }
    }

    let config = Config {
        damping_factor: args.damping_factor,
        tolerance: args.tolerance,
        max_iterations: args.max_iter,
        source_nodes,
        concurrency: args.num_threads.num_threads,
        batch_size: args.batch_size,
        available_memory: args.available_memory,
    };

    let result = match args.variant {
        CliVariant::Pagerank => rank(&labeled.graph, Standard, config, &global_args)?,
        CliVariant::Weighted => {
            let variant = match args.default_weight {
                Some(default_weight) => Weighted::new(default_weight),
                None => Weighted::default(),
            };
            rank(&labeled.graph, variant, config, &global_args)?
        }
        CliVariant::ArticleRank => {
            rank(&labeled.graph, ArticleRank::default(), config, &global_args)?
        }
        CliVariant::Eigenvector => {
            rank(&labeled.graph, Eigenvector::default(), config, &global_args)?
        }
    };

    let result = result.normalized(args.normalization.into());
    store_floats(&args.output, result.scores(), args.precision)?;
    store_labels(args.output.with_extension("nodes"), &labeled.labels)?;

    Ok(())
}

fn rank<V: Variant>(
    graph: &VecGraph,
    variant: V,
    config: Config,
    global_args: &GlobalArgs,
) -> Result<PageRankResult> {
    let mut pl = progress_logger![];
    pl.display_memory(true);
    if let Some(log_interval) = global_args.log_interval {
        pl.log_interval(log_interval);
    }

    let mut pr = PageRank::with_variant(graph, variant);
    pr.config(config);
    let result = pr.run_with_logging(&mut pl)?;

    log::info!(
        "Completed after {} iteration(s){}",
        result.iterations(),
        if result.did_converge() {
            ""
        } else {
            " without converging"
        }
    );
    Ok(result)
}
