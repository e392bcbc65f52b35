use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::step::{rewrite_references, Graph};

const SCHEMA_NAME: &str =
    "AP203_CONFIGURATION_CONTROLLED_3D_DESIGN_OF_MECHANICAL_PARTS_AND_ASSEMBLIES_MIM_LF { 1 0 10303 403 2 1 2 }";

/// Renders `ids` (a subset of `graph`'s entities) as a standalone STEP
/// physical file, with ids densely renumbered starting at 1 in ascending
/// order of their original id. `display_name` is used as the embedded
/// `FILE_NAME` and is upper-cased per STEP convention.
///
/// References to ids outside `ids` are left unchanged (dangling), mirroring
/// the source file's own tolerance of dangling references.
pub fn render_step_document(graph: &Graph, ids: &[u64], display_name: &str) -> String {
    let mut sorted: Vec<u64> = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let renumber: HashMap<u64, u64> = sorted
        .iter()
        .enumerate()
        .map(|(i, &old)| (old, i as u64 + 1))
        .collect();

    let mut out = String::new();
    out.push_str("ISO-10303-21;\n");
    out.push_str("HEADER;\n");
    out.push_str("FILE_DESCRIPTION((''),'2;1');\n");
    out.push_str(&format!(
        "FILE_NAME('{}','{}',(''),(''),'STEP SPLITTER','STEP SPLITTER','');\n",
        display_name.to_uppercase(),
        chrono::Local::now().to_rfc3339(),
    ));
    out.push_str("FILE_SCHEMA\n");
    out.push_str(&format!("(('{}'));\n", SCHEMA_NAME));
    out.push_str("ENDSEC;\n");

    out.push_str("DATA;\n");
    for &old_id in &sorted {
        if let Some(entity) = graph.lookup(old_id) {
            out.push_str(&rewrite_references(entity.source(), &renumber));
            out.push('\n');
        }
    }
    out.push_str("ENDSEC;\n");
    out.push_str("END-ISO-10303-21;\n");

    out
}

/// Renders and writes the document to `path`, creating parent directories
/// as needed.
pub fn write_step_file(
    path: impl AsRef<Path>,
    graph: &Graph,
    ids: &[u64],
    display_name: &str,
) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::OutputWrite(Arc::new(e), parent.display().to_string()))?;
    }

    let content = render_step_document(graph, ids, display_name);
    fs::write(path, content).map_err(|e| Error::OutputWrite(Arc::new(e), path.display().to_string()))
}
