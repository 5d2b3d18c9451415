/*
 * SPDX-FileCopyrightText: 2025 Inria
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![cfg(feature = "cli")]

use anyhow::Result;
use partition_rank::cli::main as cli_main;
use std::path::Path;

fn read_floats(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn test_pagerank_cli() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arcs = dir.path().join("arcs.tsv");
    std::fs::write(&arcs, "# a 3-cycle\na\tb\nb\tc\nc\ta\n")?;
    let output = dir.path().join("ranks.txt");

    cli_main([
        "prank",
        "pagerank",
        arcs.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-j",
        "2",
        "--tolerance",
        "1e-9",
        "--max-iter",
        "200",
        "--normalization",
        "l1",
    ])?;

    let ranks = read_floats(&output)?;
    assert_eq!(ranks.len(), 3);
    for rank in &ranks {
        assert!((rank - 1.0 / 3.0).abs() < 1E-6);
    }
    let labels = std::fs::read_to_string(dir.path().join("ranks.nodes"))?;
    assert_eq!(labels.lines().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn test_personalized_weighted_cli() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let arcs = dir.path().join("arcs.tsv");
    std::fs::write(&arcs, "x\ty\t1\nx\tz\t3\nw\tx\t1\n")?;
    let output = dir.path().join("out").join("ranks.txt");

    cli_main([
        "prank",
        "pr",
        arcs.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--variant",
        "weighted",
        "--weight-column",
        "2",
        "--source",
        "x",
        "--precision",
        "6",
    ])?;

    // Nodes are x, y, z, w in order of appearance
    let ranks = read_floats(&output)?;
    assert_eq!(ranks, vec![0.15, 0.031875, 0.095625, 0.0]);
    Ok(())
}
