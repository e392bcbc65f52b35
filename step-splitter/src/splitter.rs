//! Splitter orchestrator: selects a splitting strategy, drives the
//! dependency collector and geometry hasher, deduplicates bodies, writes
//! one STEP file per unique body, and accumulates the multiplicity report.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::dependency::collect_dependencies;
use crate::error::{Error, Result};
use crate::hash::fingerprint;
use crate::product::{self, NAUO};
use crate::step::{write_step_file, Graph, StepParser};

const BODY_TYPE: &str = "MANIFOLD_SOLID_BREP";

/// One row of the multiplicity report: a unique body's display name and
/// how many times it occurs in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub count: u64,
}

/// The outcome of splitting one input file.
#[derive(Debug, Default)]
pub struct SplitReport {
    pub rows: Vec<ReportRow>,
}

impl SplitReport {
    /// Renders the report as `name;count` lines, sorted lexicographically
    /// by name, joined with `\n`.
    pub fn render(&self) -> String {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows.iter()
            .map(|r| format!("{};{}", r.name, r.count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One group of bodies sharing a geometry fingerprint: the representative
/// body used for emission, and the total occurrence count.
struct Group {
    representative: u64,
    name: String,
    count: u64,
}

/// Parses `input_path` and writes per-body STEP files plus a report into
/// `output_dir`. Returns the report. `output_dir` is created if absent.
pub fn split_file(input_path: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<SplitReport> {
    let input_path = input_path.as_ref();
    let graph = StepParser::parse_file(input_path)?;
    info!("parsed {} entities from {:?}", graph.len(), input_path);

    let result = split_graph(&graph, &stem(input_path))?;
    info!("grouped into {} unique bodies", result.groups.len());

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)
        .map_err(|e| Error::OutputWrite(Arc::new(e), output_dir.display().to_string()))?;

    write_groups(&graph, &result, output_dir)?;

    let report_path = output_dir.join(format!("{}.txt", stem(input_path)));
    fs::write(&report_path, result.report.render())
        .map_err(|e| Error::OutputWrite(Arc::new(e), report_path.display().to_string()))?;

    Ok(result.report)
}

/// Computes the split strategy and report for `graph`, without touching
/// the filesystem. `source_stem` feeds the `"{stem}_{ordinal}"` fallback
/// name used when no other name resolves.
fn split_graph(graph: &Graph, source_stem: &str) -> Result<SplitReportWithGroups> {
    let bodies = graph.by_type(BODY_TYPE);
    if bodies.is_empty() {
        warn!("No {BODY_TYPE} entities found");
        return Ok(SplitReportWithGroups {
            report: SplitReport::default(),
            groups: Vec::new(),
        });
    }

    let is_assembly = !graph.by_type(NAUO).is_empty();

    let groups = if is_assembly {
        group_assembly(graph, bodies)
    } else {
        group_multi_volume(graph, bodies, source_stem)
    };

    let report = SplitReport {
        rows: groups
            .iter()
            .map(|g| ReportRow {
                name: g.name.clone(),
                count: g.count,
            })
            .collect(),
    };

    Ok(SplitReportWithGroups { report, groups })
}

struct SplitReportWithGroups {
    report: SplitReport,
    groups: Vec<Group>,
}

/// Assembly mode: name via the product-structure chain, multiplicity via
/// per-PD NAUO counts, deduplicated by geometry fingerprint.
fn group_assembly(graph: &Graph, bodies: &[u64]) -> Vec<Group> {
    let nauo_counts = product::nauo_multiplicities(graph);

    let mut by_hash: HashMap<String, (u64, String, u64)> = HashMap::new();
    let mut order = Vec::new();

    for &body in bodies {
        let hash = fingerprint(graph, body);
        let name = product::resolve_assembly_name(graph, body)
            .unwrap_or_else(|| format!("BODY_{body}"));
        let count = product::multiplicity_for_body(graph, body, &nauo_counts);

        by_hash
            .entry(hash.clone())
            .and_modify(|(_, _, c)| *c += count)
            .or_insert_with(|| {
                order.push(hash.clone());
                (body, name, count)
            });
    }

    order
        .into_iter()
        .map(|hash| {
            let (representative, name, count) = by_hash.remove(&hash).expect("hash was just inserted");
            Group {
                representative,
                name,
                count,
            }
        })
        .collect()
}

/// Multi-volume mode: name prefers the body's own embedded name, then the
/// product chain, then a synthesised fallback; counts are group sizes.
/// Sanitised-name collisions across distinct groups are broken by
/// appending `-{id}` before re-sanitising.
fn group_multi_volume(graph: &Graph, bodies: &[u64], source_stem: &str) -> Vec<Group> {
    let mut by_hash: HashMap<String, (u64, u64)> = HashMap::new();
    let mut order = Vec::new();

    for (ordinal, &body) in bodies.iter().enumerate() {
        let hash = fingerprint(graph, body);

        by_hash
            .entry(hash.clone())
            .and_modify(|(_, c)| *c += 1)
            .or_insert_with(|| {
                order.push((hash.clone(), ordinal));
                (body, 1)
            });
    }

    order
        .into_iter()
        .map(|(hash, ordinal)| {
            let (representative, count) = by_hash.remove(&hash).expect("hash was just inserted");
            let name = product::resolve_name(graph, representative)
                .unwrap_or_else(|| format!("{source_stem}_{ordinal}"));
            Group {
                representative,
                name,
                count,
            }
        })
        .collect()
}

// Single-body mode is just multi-volume mode with one body; the shared
// grouping logic above already produces the right single-group result.

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Sanitises a display name into a safe filename stem: any character
/// outside `[A-Za-z0-9_-]` becomes `_`.
fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn write_groups(graph: &Graph, report: &SplitReportWithGroups, output_dir: &Path) -> Result<()> {
    let mut used_names: HashMap<String, u64> = HashMap::new();

    for group in &report.groups {
        let mut sanitised = sanitise(&group.name);
        if let Some(&existing_id) = used_names.get(&sanitised) {
            if existing_id != group.representative {
                sanitised = sanitise(&format!("{}-{}", group.name, group.representative));
            }
        }
        used_names.insert(sanitised.clone(), group.representative);

        let deps = collect_dependencies(graph, group.representative);
        let ids: Vec<u64> = deps.into_iter().collect();

        let file_path = output_dir.join(format!("{sanitised}.stp"));
        info!("writing {:?} ({} entities, count {})", file_path, ids.len(), group.count);
        write_step_file(&file_path, graph, &ids, &group.name)?;
    }

    Ok(())
}
