//! Product-structure resolution: mapping a body to a human name and an
//! assembly occurrence count by following the STEP product-metadata chain.

use std::collections::HashMap;

use crate::step::Graph;

const ABSR: &str = "ADVANCED_BREP_SHAPE_REPRESENTATION";
const SDR: &str = "SHAPE_DEFINITION_REPRESENTATION";
const SRR: &str = "SHAPE_REPRESENTATION_RELATIONSHIP";
const SHAPE_REPRESENTATION: &str = "SHAPE_REPRESENTATION";
const PDS: &str = "PRODUCT_DEFINITION_SHAPE";
const PD: &str = "PRODUCT_DEFINITION";
const PDF: &str = "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE";
const PRODUCT: &str = "PRODUCT";
pub(crate) const NAUO: &str = "NEXT_ASSEMBLY_USAGE_OCCURRENCE";

/// The shape-definition wrapper found for one ABSR, including the
/// SHAPE_REPRESENTATION_RELATIONSHIP indirection when the SDR does not
/// reference the ABSR directly.
pub(crate) struct ShapeChain {
    pub sdr: u64,
    pub srr: Option<u64>,
    pub sr: Option<u64>,
}

/// The first entity among `entity`'s out-refs whose type is `type_name`.
pub(crate) fn find_ref_of_type(graph: &Graph, entity: u64, type_name: &str) -> Option<u64> {
    let entity = graph.lookup(entity)?;
    entity
        .out_refs()
        .iter()
        .copied()
        .find(|&r| graph.lookup(r).map(|e| e.type_name()) == Some(type_name))
}

/// The first ABSR whose out-refs include `body`.
pub(crate) fn find_absr_for_body(graph: &Graph, body: u64) -> Option<u64> {
    graph
        .by_type(ABSR)
        .iter()
        .copied()
        .find(|&id| graph.lookup(id).map(|e| e.out_refs().contains(&body)) == Some(true))
}

/// Resolves the SDR for an ABSR, directly or via an SRR indirection.
pub(crate) fn find_shape_chain(graph: &Graph, absr: u64) -> Option<ShapeChain> {
    if let Some(sdr) = graph
        .by_type(SDR)
        .iter()
        .copied()
        .find(|&id| graph.lookup(id).map(|e| e.out_refs().contains(&absr)) == Some(true))
    {
        return Some(ShapeChain {
            sdr,
            srr: None,
            sr: None,
        });
    }

    let srr = graph.by_type(SRR).iter().copied().find(|&id| {
        graph
            .lookup(id)
            .map(|e| e.out_refs().contains(&absr))
            .unwrap_or(false)
    })?;

    let sr = graph.lookup(srr)?.out_refs().iter().copied().find(|&r| {
        r != absr && graph.lookup(r).map(|e| e.type_name()) == Some(SHAPE_REPRESENTATION)
    })?;

    let sdr = graph
        .by_type(SDR)
        .iter()
        .copied()
        .find(|&id| graph.lookup(id).map(|e| e.out_refs().contains(&sr)) == Some(true))?;

    Some(ShapeChain {
        sdr,
        srr: Some(srr),
        sr: Some(sr),
    })
}

/// Follows ABSR -> (SDR | SRR+SR) -> PDS -> PD for a body, returning the
/// `PRODUCT_DEFINITION` id if the whole chain resolves.
pub(crate) fn product_definition_for_body(graph: &Graph, body: u64) -> Option<u64> {
    let absr = find_absr_for_body(graph, body)?;
    let chain = find_shape_chain(graph, absr)?;
    let pds = find_ref_of_type(graph, chain.sdr, PDS)?;
    find_ref_of_type(graph, pds, PD)
}

/// Resolves a body's display name: the body's own embedded name first,
/// then the product-structure chain's PRODUCT name.
pub fn resolve_name(graph: &Graph, body: u64) -> Option<String> {
    if let Some(name) = graph
        .lookup(body)
        .and_then(|e| e.first_quoted_string())
        .filter(|s| !s.is_empty())
    {
        return Some(name.to_string());
    }

    let pd = product_definition_for_body(graph, body)?;
    let pdf = find_ref_of_type(graph, pd, PDF)?;
    let product = find_ref_of_type(graph, pdf, PRODUCT)?;
    graph
        .lookup(product)
        .and_then(|e| e.first_quoted_string())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolves a body's display name preferring the product-structure chain
/// over its own embedded name, used in assembly mode where the product
/// structure is the authoritative naming source.
pub fn resolve_assembly_name(graph: &Graph, body: u64) -> Option<String> {
    let pd = product_definition_for_body(graph, body);
    if let Some(pd) = pd {
        if let Some(name) = find_ref_of_type(graph, pd, PDF)
            .and_then(|pdf| find_ref_of_type(graph, pdf, PRODUCT))
            .and_then(|product| graph.lookup(product))
            .and_then(|e| e.first_quoted_string())
            .filter(|s| !s.is_empty())
        {
            return Some(name.to_string());
        }
    }

    graph
        .lookup(body)
        .and_then(|e| e.first_quoted_string())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Counts, per `PRODUCT_DEFINITION` id, how many NAUO entities reference it.
pub fn nauo_multiplicities(graph: &Graph) -> HashMap<u64, u64> {
    let mut counts = HashMap::new();

    for &nauo_id in graph.by_type(NAUO) {
        let Some(nauo) = graph.lookup(nauo_id) else {
            continue;
        };
        for &r in nauo.out_refs() {
            if graph.lookup(r).map(|e| e.type_name()) == Some(PD) {
                *counts.entry(r).or_insert(0) += 1;
            }
        }
    }

    counts
}

/// The occurrence multiplicity for `body`, defaulting to 1 when its
/// product definition has no NAUO references (or cannot be resolved).
pub fn multiplicity_for_body(graph: &Graph, body: u64, counts: &HashMap<u64, u64>) -> u64 {
    product_definition_for_body(graph, body)
        .and_then(|pd| counts.get(&pd).copied())
        .unwrap_or(1)
}
