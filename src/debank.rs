use crate::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct DebankStats {
    pub debanked: usize,
    pub fragments: usize,
    pub skipped: usize,
}

/// Splits every multi-bit flip-flop with a single-bit degenerate into
/// bit-width single-bit copies named `<orig>_BIT<i>`, remapping indexed data
/// pins and shared control pins, and appending one DEBANK record per
/// fragment. Multi-bit FFs without a resolvable degenerate are left as-is.
#[time("strategic debanking")]
pub fn perform_debanking(ctx: &mut DesignContext, tracker: &mut TransformationTracker) -> DebankStats {
    let mut stats = DebankStats::default();

    let candidates = ctx
        .instances
        .iter()
        .filter(|(_, inst)| inst.is_flip_flop() && inst.bit_width() > 1)
        .map(|(name, _)| name.clone())
        .collect_vec();

    for name in candidates {
        let instance = &ctx.instances[&name];
        let Some(parent_name) = instance.cell.single_bit_degenerate.clone() else {
            continue;
        };
        let Some(parent_cell) = ctx.get_cell(&parent_name).cloned() else {
            warn!(
                "parent cell {} not found for {}, leaving {} banked",
                parent_name, instance.cell.name, name
            );
            stats.skipped += 1;
            continue;
        };

        let bit_width = instance.bit_width().usize();
        info!(
            "debanking {} ({}, {}-bit) -> {}x {}",
            name, instance.cell.name, bit_width, bit_width, parent_name
        );

        let original = ctx.remove_instance(&name).unwrap();
        let mut fragment_names = Vec::with_capacity(bit_width);

        for bit in 0..bit_width {
            let fragment_name = format!("{name}_BIT{bit}");
            let connections = map_multibit_to_fragment(&original, &parent_cell, bit);

            let mut fragment = Instance::builder()
                .name(fragment_name.clone())
                .cell(parent_cell.clone())
                .module(original.module.clone())
                .position(original.position)
                .orientation(original.orientation)
                .status(original.status)
                .connections(connections)
                .build();
            fragment.cluster_id = Some(name.clone());
            fragment.banking_kind = original.banking_kind;

            ctx.add_instance(fragment);
            fragment_names.push(fragment_name);
            stats.fragments += 1;
        }

        for (bit, fragment_name) in fragment_names.iter().enumerate() {
            let mapping = debank_pin_mapping(&original, bit);
            for (original_pin, fragment_pin) in &mapping {
                tracker.note_debank_mapping(&name, original_pin, fragment_name, fragment_pin);
            }
            let related: SmallVec<[String; 4]> = fragment_names
                .iter()
                .filter(|f| *f != fragment_name)
                .cloned()
                .collect();
            let related_cells = related.iter().map(|_| parent_name.clone()).collect();
            tracker.push(TransformationRecord {
                operation: Operation::Debank,
                original_name: name.clone(),
                result_name: fragment_name.clone(),
                original_cell: original.cell.name.clone(),
                result_cell: parent_name.clone(),
                pin_mapping: mapping,
                related_instances: related,
                related_cells,
                result_x: original.position.x,
                result_y: original.position.y,
                result_orientation: original.orientation,
                cluster_id: name.clone(),
                stage: PipelineStage::Debank,
            });
        }

        tracker.remove_keep(&name);
        stats.debanked += 1;
    }

    info!(
        "debanked {} multi-bit FFs into {} single-bit FFs ({} skipped)",
        stats.debanked, stats.fragments, stats.skipped
    );
    stats
}

/// The only pins a multi-bit FF shares unindexed across its bits. Nothing
/// outside this list may be copied verbatim onto a fragment.
const SHARED_PINS: [&str; 10] = ["CK", "CLK", "CP", "R", "RB", "S", "SB", "SE", "RD", "SD"];

/// Connections for fragment `bit`: data pins resolve through their indexed
/// multi-bit counterpart; shared control pins resolve through the exact pin
/// name; every other pin stays unconnected even when the multi-bit instance
/// happens to carry a same-named connection (scan-out and retention pins are
/// per-cell, not per-bit).
fn map_multibit_to_fragment(
    original: &Instance,
    parent_cell: &CellTemplate,
    bit: usize,
) -> Vec<Connection> {
    let mut connections = Vec::new();
    for pin in &parent_cell.pins {
        if matches!(pin.name.as_str(), "D" | "Q" | "QN") {
            let indexed = format!("{}{}", pin.name, bit);
            if let Some(conn) = original.connection(&indexed) {
                connections.push(Connection::new(pin.name.clone(), conn.net.clone()));
            }
        } else if SHARED_PINS.contains(&pin.name.as_str()) {
            if let Some(conn) = original.connection(&pin.name) {
                connections.push(Connection::new(pin.name.clone(), conn.net.clone()));
            }
        }
    }
    connections
}

/// Reverse-direction mapping recorded on the fragment's DEBANK record:
/// `D<bit>` -> `D` for indexed data pins, `CK` -> `CK` for shared pins.
fn debank_pin_mapping(original: &Instance, bit: usize) -> IndexMap<String, String> {
    let mut mapping = IndexMap::default();
    for pin in ["D", "Q", "QN", "CK", "SI", "SE", "SO", "R", "S"] {
        let indexed = format!("{pin}{bit}");
        if original.connection(&indexed).is_some() {
            mapping.insert(indexed, pin.to_string());
        } else if original.connection(pin).is_some() {
            mapping.insert(pin.to_string(), pin.to_string());
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multibit_ctx() -> DesignContext {
        let mut ctx = DesignContext::new("t");
        ctx.add_cell(
            CellTemplate::builder()
                .name("FSDN_1")
                .kind(CellKind::FlipFlop)
                .pins(vec![
                    Pin::input("D"),
                    Pin::output("Q"),
                    Pin::output("QN"),
                    Pin::clock("CK"),
                    Pin::input("SI"),
                    Pin::input("SE"),
                    Pin::output("SO"),
                ])
                .clocked_on("!CK")
                .build(),
        );
        let mb = ctx.add_cell(
            CellTemplate::builder()
                .name("FSDN4_1")
                .kind(CellKind::FlipFlop)
                .bit_width(4)
                .pins(
                    (0..4)
                        .flat_map(|i| {
                            vec![
                                Pin::input(format!("D{i}")),
                                Pin::output(format!("Q{i}")),
                                Pin::output(format!("QN{i}")),
                            ]
                        })
                        .chain(vec![
                            Pin::clock("CK"),
                            Pin::input("SI"),
                            Pin::input("SE"),
                            Pin::output("SO"),
                        ])
                        .collect(),
                )
                .clocked_on("!CK")
                .single_bit_degenerate("FSDN_1".to_string())
                .build(),
        );
        let mut connections = Vec::new();
        for i in 0..4 {
            connections.push(Connection::new(format!("D{i}"), format!("d{i}")));
            connections.push(Connection::new(format!("Q{i}"), format!("q{i}")));
        }
        connections.push(Connection::new("CK", "clk"));
        connections.push(Connection::new("SE", "se"));
        connections.push(Connection::new("SO", "scan_tail"));
        ctx.add_instance(
            Instance::builder()
                .name("m")
                .cell(mb)
                .position(Point::new(1000.0, 1000.0))
                .connections(connections)
                .build(),
        );
        ctx.build_banking_relationships();
        ctx
    }

    #[test]
    fn four_bit_ff_splits_into_four_fragments() {
        let mut ctx = multibit_ctx();
        let mut tracker = TransformationTracker::new();
        tracker.initialize(&mut ctx);

        let stats = perform_debanking(&mut ctx, &mut tracker);
        assert_eq!(stats.debanked, 1);
        assert_eq!(stats.fragments, 4);

        assert!(!ctx.instances.contains_key("m"));
        for bit in 0..4 {
            let fragment = &ctx.instances[&format!("m_BIT{bit}")];
            assert_eq!(fragment.cell.name, "FSDN_1");
            assert_eq!(fragment.position, Point::new(1000.0, 1000.0));
            assert_eq!(fragment.cluster_id.as_deref(), Some("m"));
            assert_eq!(
                fragment.connection("D").unwrap().net,
                format!("d{bit}")
            );
            assert_eq!(fragment.connection("CK").unwrap().net, "clk");
            assert_eq!(fragment.connection("SE").unwrap().net, "se");
            assert!(fragment.connection("SI").is_none());
            // SO exists by the same name on the multi-bit instance but is
            // not a shared control pin, so no fragment inherits it.
            assert!(fragment.connection("SO").is_none());
        }

        // Original KEEP is gone; four DEBANK records remain.
        assert_eq!(tracker.records_of(Operation::Keep).count(), 0);
        let debanks = tracker.records_of(Operation::Debank).collect_vec();
        assert_eq!(debanks.len(), 4);
        assert_eq!(debanks[2].pin_mapping["D2"], "D");
        assert_eq!(debanks[2].pin_mapping["CK"], "CK");
        assert_eq!(debanks[0].related_instances.len(), 3);

        // Every flip-flop in the table is now single-bit.
        assert!(ctx
            .instances
            .values()
            .filter(|i| i.is_flip_flop())
            .all(|i| i.bit_width() == 1));
    }

    #[test]
    fn missing_degenerate_is_skipped_not_fatal() {
        let mut ctx = multibit_ctx();
        // Point the degenerate at a cell that does not exist.
        let broken = CellTemplate::builder()
            .name("FSDN2_BROKEN")
            .kind(CellKind::FlipFlop)
            .bit_width(2)
            .single_bit_degenerate("NO_SUCH_CELL".to_string())
            .build();
        let broken = ctx.add_cell(broken);
        ctx.add_instance(Instance::builder().name("b").cell(broken).build());

        let mut tracker = TransformationTracker::new();
        tracker.initialize(&mut ctx);
        let stats = perform_debanking(&mut ctx, &mut tracker);
        assert_eq!(stats.skipped, 1);
        assert!(ctx.instances.contains_key("b"));
    }
}
