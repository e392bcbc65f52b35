//! Dependency collection: computing the minimal id set that, emitted on
//! its own, produces a loadable STEP file containing exactly one body.

use std::collections::HashSet;

use crate::product::{find_absr_for_body, find_ref_of_type, find_shape_chain};
use crate::step::Graph;

const PDS: &str = "PRODUCT_DEFINITION_SHAPE";
const PD: &str = "PRODUCT_DEFINITION";
const PROPERTY_DEFINITION: &str = "PROPERTY_DEFINITION";
const PROPERTY_DEFINITION_REPRESENTATION: &str = "PROPERTY_DEFINITION_REPRESENTATION";
const STYLED_ITEM: &str = "STYLED_ITEM";

/// Collects the minimal id set for `body`: its geometry, the enclosing
/// representation context, the product-structure wrapper, and the
/// styling scoped to this body.
pub fn collect_dependencies(graph: &Graph, body: u64) -> HashSet<u64> {
    let mut deps = graph.reachable(body);

    if let Some(absr) = find_absr_for_body(graph, body) {
        deps.insert(absr);
        if let Some(absr_entity) = graph.lookup(absr) {
            for &r in absr_entity.out_refs() {
                if r != body {
                    deps.extend(graph.reachable(r));
                }
            }
        }

        if let Some(chain) = find_shape_chain(graph, absr) {
            deps.insert(chain.sdr);
            if let Some(srr) = chain.srr {
                deps.insert(srr);
            }
            if let Some(sr) = chain.sr {
                deps.insert(sr);
                deps.extend(graph.reachable(sr));
            }

            if let Some(pds) = find_ref_of_type(graph, chain.sdr, PDS) {
                deps.insert(pds);
                deps.extend(graph.reachable(pds));

                if let Some(pd) = find_ref_of_type(graph, pds, PD) {
                    deps.insert(pd);
                    deps.extend(graph.reachable(pd));

                    collect_referencing(graph, pd, PROPERTY_DEFINITION, &mut deps);
                    collect_referencing(graph, pd, PROPERTY_DEFINITION_REPRESENTATION, &mut deps);
                }
            }
        }
    }

    for &styled_id in graph.by_type(STYLED_ITEM) {
        let Some(styled) = graph.lookup(styled_id) else {
            continue;
        };
        if !styled.out_refs().contains(&body) {
            continue;
        }
        deps.insert(styled_id);
        for &r in styled.out_refs() {
            if r != body {
                deps.extend(graph.reachable(r));
            }
        }
    }

    deps
}

/// Adds every entity of `type_name` that references `target`, along with
/// its reachable closure, to `deps`.
fn collect_referencing(graph: &Graph, target: u64, type_name: &str, deps: &mut HashSet<u64>) {
    for &id in graph.by_type(type_name) {
        let Some(entity) = graph.lookup(id) else {
            continue;
        };
        if entity.out_refs().contains(&target) {
            deps.extend(graph.reachable(id));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::step::StepParser;

    const FIXTURE: &str = "DATA;
#1=MANIFOLD_SOLID_BREP('',#2);
#2=CLOSED_SHELL('',(#3));
#3=ADVANCED_FACE('',(),#4,.T.);
#4=PLANE('',#5);
#5=AXIS2_PLACEMENT_3D('',#6,#7,#8);
#6=CARTESIAN_POINT('',(0.,0.,0.));
#7=DIRECTION('',(0.,0.,1.));
#8=DIRECTION('',(1.,0.,0.));
#10=ADVANCED_BREP_SHAPE_REPRESENTATION('',(#1),#11);
#11=GEOMETRIC_REPRESENTATION_CONTEXT(3);
#20=SHAPE_DEFINITION_REPRESENTATION(#21,#10);
#21=PRODUCT_DEFINITION_SHAPE('','',#22);
#22=PRODUCT_DEFINITION('','',#23,#24);
#23=PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE('','',#25,.MADE.);
#25=PRODUCT('BOLT','bolt','',(#26));
#26=PRODUCT_CONTEXT('',#27,'');
#40=PROPERTY_DEFINITION('','',#22);
#41=STYLED_ITEM('',(#50),#1);
#50=PRESENTATION_STYLE_ASSIGNMENT((#51));
#51=SURFACE_STYLE_USAGE(.BOTH.,#52);
#52=SURFACE_SIDE_STYLE('',(#53));
#53=SURFACE_STYLE_FILL_AREA(#54);
#54=FILL_AREA_STYLE('',(#55));
#55=FILL_AREA_STYLE_COLOUR('',#56);
#56=COLOUR_RGB('',1.,0.,0.);
#60=MANIFOLD_SOLID_BREP('other',#61);
#61=CLOSED_SHELL('',());
#62=STYLED_ITEM('',(#70),#60);
#70=PRESENTATION_STYLE_ASSIGNMENT(());
ENDSEC;
";

    #[test]
    fn collects_geometry_context_and_product_wrapper() {
        let graph = StepParser::parse_str(FIXTURE).unwrap();
        let deps = collect_dependencies(&graph, 1);

        for id in [1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 20, 21, 22, 23, 25, 26, 40] {
            assert!(deps.contains(&id), "missing dependency #{id}");
        }
    }

    #[test]
    fn includes_styling_scoped_to_the_body_only() {
        let graph = StepParser::parse_str(FIXTURE).unwrap();
        let deps = collect_dependencies(&graph, 1);

        assert!(deps.contains(&41));
        assert!(deps.contains(&50));
        assert!(deps.contains(&56));

        assert!(!deps.contains(&62));
        assert!(!deps.contains(&70));
    }

    #[test]
    fn does_not_pull_in_the_other_bodys_geometry() {
        let graph = StepParser::parse_str(FIXTURE).unwrap();
        let deps = collect_dependencies(&graph, 1);

        assert!(!deps.contains(&60));
        assert!(!deps.contains(&61));
    }
}
