use crate::*;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// Detects scan chains from netlist connectivity: an edge exists where one
/// FF's scan-out (or Q, for libraries without a dedicated SO) drives another
/// FF's scan-in net. Maximal paths walked from chain heads become
/// `ScanChain`s named `scan_chain_<N>`.
///
/// Runs only when the loader supplied no chains of its own.
#[time("detect scan chains")]
pub fn detect_scan_chains(ctx: &mut DesignContext) -> usize {
    if !ctx.scan_chains.is_empty() {
        return ctx.scan_chains.len();
    }

    let mut graph: DiGraph<String, (String, String)> = DiGraph::new();
    let mut node_of: Dict<String, NodeIndex> = Dict::default();

    for (name, instance) in &ctx.instances {
        if instance.is_flip_flop() {
            let idx = graph.add_node(name.clone());
            node_of.insert(name.clone(), idx);
        }
    }

    // Edge per (driver SO/Q pin, sink SI pin) sharing a net. Nets iterate in
    // registration order, so edge discovery is deterministic.
    for net in ctx.nets.values() {
        let mut drivers: Vec<(String, String)> = Vec::new();
        let mut sinks: Vec<(String, String)> = Vec::new();

        for (inst_name, pin_name) in &net.pins {
            let Some(instance) = ctx.instances.get(inst_name) else {
                continue;
            };
            if !instance.is_flip_flop() {
                continue;
            }
            let kind = instance
                .cell
                .find_pin(pin_name)
                .map_or_else(|| FfPinKind::classify(pin_name), |p| p.kind);
            match kind {
                FfPinKind::Si => sinks.push((inst_name.clone(), pin_name.clone())),
                FfPinKind::So | FfPinKind::Q => drivers.push((inst_name.clone(), pin_name.clone())),
                _ => {}
            }
        }

        for (driver_inst, driver_pin) in &drivers {
            for (sink_inst, sink_pin) in &sinks {
                if driver_inst == sink_inst {
                    continue;
                }
                graph.add_edge(
                    node_of[driver_inst],
                    node_of[sink_inst],
                    (driver_pin.clone(), sink_pin.clone()),
                );
            }
        }
    }

    // Chain heads are scan sinks or drivers with no scan predecessor.
    let mut visited: Set<NodeIndex> = Set::default();
    let mut chains = Vec::new();

    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let has_scan_edges = graph.neighbors_directed(start, Direction::Outgoing).count() > 0
            || graph.neighbors_directed(start, Direction::Incoming).count() > 0;
        let is_head = graph.neighbors_directed(start, Direction::Incoming).count() == 0;
        if !has_scan_edges || !is_head {
            continue;
        }

        let mut chain = ScanChain::new(format!("scan_chain_{}", chains.len() + 1));
        let mut current = start;
        loop {
            visited.insert(current);

            let in_pin = graph
                .edges_directed(current, Direction::Incoming)
                .map(|e| e.weight().1.clone())
                .next()
                .unwrap_or_default();
            let next_edge = graph
                .edges_directed(current, Direction::Outgoing)
                .filter(|e| !visited.contains(&e.target()))
                .min_by_key(|e| e.target().index());
            let (out_pin, next) = match next_edge {
                Some(edge) => (edge.weight().0.clone(), Some(edge.target())),
                None => (String::new(), None),
            };

            chain
                .elements
                .push(ScanElement::new(graph[current].clone(), in_pin, out_pin));

            match next {
                Some(next) => current = next,
                None => break,
            }
        }

        if chain.len() >= 2 {
            info!("detected {} with {} elements", chain.name, chain.len());
            chains.push(chain);
        }
    }

    let count = chains.len();
    ctx.scan_chains = chains;
    info!("scan-chain detection found {} chains", count);
    count
}

/// Two FFs can share a multi-bit cell only when their clock edges match
/// (and are known) and their active functional pin sets are identical.
fn scan_compatible(a: &Instance, b: &Instance) -> bool {
    let edge_a = instance_clock_edge(a);
    if edge_a == ClockEdge::Unknown || edge_a != instance_clock_edge(b) {
        return false;
    }
    a.active_pin_kinds() == b.active_pin_kinds()
}

/// Segments every scan chain into runs of mutually bankable neighbours.
/// Chain order is preserved so that banking inside a run keeps the shift
/// path contiguous; runs shorter than two FFs are dropped.
pub fn scan_chain_banking_groups(ctx: &DesignContext) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    for chain in &ctx.scan_chains {
        let mut current: Vec<String> = Vec::new();
        for element in &chain.elements {
            let Some(instance) = ctx.instances.get(&element.instance) else {
                continue;
            };
            let compatible = current
                .last()
                .and_then(|prev| ctx.instances.get(prev))
                .map_or(true, |prev| scan_compatible(prev, instance));
            if compatible {
                current.push(element.instance.clone());
            } else {
                if current.len() >= 2 {
                    groups.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(element.instance.clone());
            }
        }
        if current.len() >= 2 {
            groups.push(current);
        }
    }
    debug!("{} bankable scan-chain groups", groups.len());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_cell(ctx: &mut DesignContext) -> Shared<CellTemplate> {
        ctx.add_cell(
            CellTemplate::builder()
                .name("SCAN_FSDN")
                .kind(CellKind::FlipFlop)
                .pins(vec![
                    Pin::input("D"),
                    Pin::output("Q"),
                    Pin::clock("CK"),
                    Pin::input("SI"),
                    Pin::input("SE"),
                    Pin::output("SO"),
                ])
                .clocked_on("!CK")
                .build(),
        )
    }

    #[test]
    fn follows_so_to_si_links() {
        let mut ctx = DesignContext::new("t");
        let cell = scan_cell(&mut ctx);
        // f1 -SO-> f2 -SO-> f3
        let conns = |d: &str, si: &str, so: &str| {
            vec![
                Connection::new("D", d),
                Connection::new("CK", "clk"),
                Connection::new("SE", "se"),
                Connection::new("SI", si),
                Connection::new("SO", so),
            ]
        };
        for (name, si, so) in [
            ("f1", "scan_in", "s12"),
            ("f2", "s12", "s23"),
            ("f3", "s23", "scan_out"),
        ] {
            ctx.add_instance(
                Instance::builder()
                    .name(name)
                    .cell(cell.clone())
                    .connections(conns(&format!("d_{name}"), si, so))
                    .build(),
            );
        }

        let count = detect_scan_chains(&mut ctx);
        assert_eq!(count, 1);
        let chain = &ctx.scan_chains[0];
        assert_eq!(
            chain.elements.iter().map(|e| e.instance.as_str()).collect_vec(),
            vec!["f1", "f2", "f3"]
        );
        assert_eq!(chain.elements[1].scan_in_pin, "SI");
        assert_eq!(chain.elements[1].scan_out_pin, "SO");
    }

    #[test]
    fn unrelated_ffs_form_no_chain() {
        let mut ctx = DesignContext::new("t");
        let cell = scan_cell(&mut ctx);
        for name in ["a", "b"] {
            ctx.add_instance(
                Instance::builder()
                    .name(name)
                    .cell(cell.clone())
                    .connections(vec![
                        Connection::new("D", format!("d_{name}")),
                        Connection::new("CK", "clk"),
                    ])
                    .build(),
            );
        }
        assert_eq!(detect_scan_chains(&mut ctx), 0);
    }

    #[test]
    fn chain_groups_split_on_incompatible_neighbours() {
        let mut ctx = DesignContext::new("t");
        let falling = scan_cell(&mut ctx);
        let rising = ctx.add_cell(
            CellTemplate::builder()
                .name("SCAN_FDP")
                .kind(CellKind::FlipFlop)
                .pins(vec![
                    Pin::input("D"),
                    Pin::output("Q"),
                    Pin::clock("CK"),
                    Pin::input("SI"),
                    Pin::input("SE"),
                    Pin::output("SO"),
                ])
                .clocked_on("CK")
                .build(),
        );
        let conns = |d: &str, si: &str, so: &str| {
            vec![
                Connection::new("D", d),
                Connection::new("CK", "clk"),
                Connection::new("SE", "se"),
                Connection::new("SI", si),
                Connection::new("SO", so),
            ]
        };
        // f1, f2 falling; f3 rising breaks the run; f4 rising.
        for (name, cell, si, so) in [
            ("f1", falling.clone(), "scan_in", "s12"),
            ("f2", falling.clone(), "s12", "s23"),
            ("f3", rising.clone(), "s23", "s34"),
            ("f4", rising.clone(), "s34", "scan_out"),
        ] {
            ctx.add_instance(
                Instance::builder()
                    .name(name)
                    .cell(cell)
                    .connections(conns(&format!("d_{name}"), si, so))
                    .build(),
            );
        }
        detect_scan_chains(&mut ctx);
        let groups = scan_chain_banking_groups(&ctx);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec!["f1", "f2"]);
        assert_eq!(groups[1], vec!["f3", "f4"]);
    }

    #[test]
    fn loader_supplied_chains_win() {
        let mut ctx = DesignContext::new("t");
        ctx.scan_chains.push(ScanChain::new("external_chain"));
        assert_eq!(detect_scan_chains(&mut ctx), 1);
        assert_eq!(ctx.scan_chains[0].name, "external_chain");
    }
}
