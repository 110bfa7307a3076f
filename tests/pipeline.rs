use ffbank::*;

fn scan_pins() -> Vec<Pin> {
    vec![
        Pin::input("D"),
        Pin::output("Q"),
        Pin::output("QN"),
        Pin::clock("CK"),
        Pin::input("SI"),
        Pin::input("SE"),
    ]
}

fn multibit_pins(bits: usize) -> Vec<Pin> {
    (0..bits)
        .flat_map(|i| {
            vec![
                Pin::input(format!("D{i}")),
                Pin::output(format!("Q{i}")),
                Pin::output(format!("QN{i}")),
            ]
        })
        .chain(vec![Pin::clock("CK"), Pin::input("SI"), Pin::input("SE")])
        .collect()
}

fn add_rows(ctx: &mut DesignContext, count: usize) {
    for r in 0..count {
        ctx.add_row(PlacementRow::new(
            Point::new(0.0, r as f64 * 200.0),
            100,
            1,
            200.0,
            200.0,
        ));
    }
}

fn fsdn_library(ctx: &mut DesignContext) {
    ctx.weights = ObjectiveWeights::builder().beta(1.0).gamma(1.0).build();
    ctx.add_cell(
        CellTemplate::builder()
            .name("FSDN_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .leakage_power(12.0)
            .pins(scan_pins())
            .clocked_on("(!CK)")
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("FSDN2_X1")
            .kind(CellKind::FlipFlop)
            .bit_width(2)
            .width(600.0)
            .height(200.0)
            .area(6.0)
            .leakage_power(18.0)
            .pins(multibit_pins(2))
            .clocked_on("(!CK)")
            .single_bit_degenerate("FSDN_X1".to_string())
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("FSDN4_X1")
            .kind(CellKind::FlipFlop)
            .bit_width(4)
            .width(1000.0)
            .height(200.0)
            .area(9.0)
            .leakage_power(26.0)
            .pins(multibit_pins(4))
            .clocked_on("(!CK)")
            .single_bit_degenerate("FSDN_X1".to_string())
            .build(),
    );
    ctx.build_banking_relationships();
}

fn fsdn_single(ctx: &mut DesignContext, name: &str, x: f64, y: f64) {
    let cell = ctx.get_cell("FSDN_X1").cloned().unwrap();
    ctx.add_instance(
        Instance::builder()
            .name(name)
            .cell(cell)
            .position(Point::new(x, y))
            .connections(vec![
                Connection::new("D", format!("d_{name}")),
                Connection::new("Q", format!("q_{name}")),
                Connection::new("CK", "clk"),
                Connection::new("SI", format!("si_{name}")),
                Connection::new("SE", "se"),
            ])
            .build(),
    );
}

fn quiet_config() -> EngineConfig {
    EngineConfig::builder().quiet(true).build()
}

// --------------------------------------------------------------------------------
// Scenario 1: trivial pass-through
// --------------------------------------------------------------------------------

#[test]
fn pass_through_keeps_both_instances() {
    let mut ctx = DesignContext::new("s1");
    ctx.weights = ObjectiveWeights::builder().beta(1.0).gamma(1.0).build();
    // One cell in its equivalence group, non-bankable: nothing to gain.
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .pins(scan_pins())
            .clocked_on("CK")
            .build(),
    );
    add_rows(&mut ctx, 2);
    let cell = ctx.get_cell("SDFF_X1").cloned().unwrap();
    for (name, x) in [("u", 0.0), ("v", 1000.0)] {
        ctx.add_instance(
            Instance::builder()
                .name(name)
                .cell(cell.clone())
                .position(Point::new(x, 0.0))
                .connections(vec![
                    Connection::new("D", format!("d_{name}")),
                    Connection::new("Q", format!("q_{name}")),
                    Connection::new("CK", "clk"),
                ])
                .build(),
        );
    }

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert_eq!(summary.final_ffs, 2);
    assert_eq!(summary.substitution.recorded, 0);
    assert_eq!(summary.banking.operations_recorded, 0);
    let keeps = engine
        .transformation_history()
        .iter()
        .filter(|r| r.operation == Operation::Keep && r.stage == PipelineStage::Original)
        .count();
    assert_eq!(keeps, 2);
    assert_eq!(summary.trail_violations, 0);

    let mapping = engine.final_pin_mapping();
    assert_eq!(mapping["u/D"], "u/D");
    assert_eq!(mapping["v/Q"], "v/Q");
}

// --------------------------------------------------------------------------------
// Scenario 2: pure debank (no banking path back)
// --------------------------------------------------------------------------------

#[test]
fn pure_debank_splits_into_positioned_fragments() {
    let mut ctx = DesignContext::new("s2");
    ctx.weights = ObjectiveWeights::builder().beta(1.0).gamma(1.0).build();
    // Multi-bit cell whose name matches no banking family: fragments are
    // not regrouped afterwards.
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .pins(scan_pins())
            .clocked_on("CK")
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF4_X1")
            .kind(CellKind::FlipFlop)
            .bit_width(4)
            .width(1000.0)
            .height(200.0)
            .area(12.0)
            .pins(multibit_pins(4))
            .clocked_on("CK")
            .single_bit_degenerate("SDFF_X1".to_string())
            .build(),
    );
    ctx.build_banking_relationships();
    add_rows(&mut ctx, 8);

    let mb = ctx.get_cell("SDFF4_X1").cloned().unwrap();
    let mut conns = Vec::new();
    for i in 0..4 {
        conns.push(Connection::new(format!("D{i}"), format!("d{i}")));
        conns.push(Connection::new(format!("Q{i}"), format!("q{i}")));
    }
    conns.push(Connection::new("CK", "clk"));
    ctx.add_instance(
        Instance::builder()
            .name("m")
            .cell(mb)
            .position(Point::new(1000.0, 1000.0))
            .connections(conns)
            .build(),
    );

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert_eq!(summary.debank.debanked, 1);
    assert_eq!(summary.debank.fragments, 4);
    assert!(!engine.ctx.instances.contains_key("m"));

    let debanks = engine
        .transformation_history()
        .iter()
        .filter(|r| r.operation == Operation::Debank)
        .collect::<Vec<_>>();
    assert_eq!(debanks.len(), 4);

    // The Debank-stage snapshot shows four fragments at the parent position
    // carrying the parent's name as cluster id.
    let debank_stage = engine
        .complete_pipeline()
        .iter()
        .find(|s| s.stage == PipelineStage::Debank)
        .unwrap();
    assert_eq!(debank_stage.instances.len(), 4);
    for bit in 0..4 {
        let snapshot = debank_stage
            .instances
            .iter()
            .find(|i| i.name == format!("m_BIT{bit}"))
            .unwrap();
        assert_eq!((snapshot.x, snapshot.y), (1000.0, 1000.0));
        assert_eq!(snapshot.cluster_id, "m");
    }
    assert_eq!(summary.trail_violations, 0);
}

// --------------------------------------------------------------------------------
// Scenario 3: debank followed by cluster rebanking
// --------------------------------------------------------------------------------

#[test]
fn debank_then_rebank_reconstitutes_the_multibit() {
    let mut ctx = DesignContext::new("s3");
    fsdn_library(&mut ctx);
    add_rows(&mut ctx, 8);

    let mb = ctx.get_cell("FSDN4_X1").cloned().unwrap();
    let mut conns = Vec::new();
    for i in 0..4 {
        conns.push(Connection::new(format!("D{i}"), format!("d{i}")));
        conns.push(Connection::new(format!("Q{i}"), format!("q{i}")));
    }
    conns.push(Connection::new("CK", "clk"));
    conns.push(Connection::new("SE", "se"));
    ctx.add_instance(
        Instance::builder()
            .name("m")
            .cell(mb)
            .position(Point::new(1000.0, 1000.0))
            .connections(conns)
            .build(),
    );

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert_eq!(summary.debank.debanked, 1);
    assert_eq!(summary.banking.rebanked_clusters, 1);
    assert!(engine.ctx.instances.contains_key("m_REBANKED"));

    // The chain for every data pin of the original ends at the same pin of
    // the rebanked cell.
    let mapping = engine.final_pin_mapping();
    for i in 0..4 {
        assert_eq!(mapping[&format!("m/D{i}")], format!("m_REBANKED/D{i}"));
        assert_eq!(mapping[&format!("m/Q{i}")], format!("m_REBANKED/Q{i}"));
    }
    assert_eq!(mapping["m/CK"], "m_REBANKED/CK");
    assert_eq!(summary.trail_violations, 0);
}

// --------------------------------------------------------------------------------
// Scenario 4: FSDN two-phase banking through the whole pipeline
// --------------------------------------------------------------------------------

#[test]
fn fsdn_two_phase_records_arity_four_operations() {
    let mut ctx = DesignContext::new("s4");
    fsdn_library(&mut ctx);
    add_rows(&mut ctx, 4);
    for i in 0..8 {
        fsdn_single(&mut ctx, &format!("u{i}"), i as f64 * 1000.0, 0.0);
    }

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert_eq!(summary.banking.fsdn2_created, 4);
    assert_eq!(summary.banking.fsdn4_created, 2);
    assert_eq!(summary.final_ffs, 2);

    let banks = engine
        .transformation_history()
        .iter()
        .filter(|r| r.operation == Operation::Bank)
        .collect::<Vec<_>>();
    assert_eq!(banks.len(), 2);
    for bank in &banks {
        // Arity matches the 4-bit result; sources are the original
        // single-bit names, not 2-bit intermediates.
        assert_eq!(1 + bank.related_instances.len(), 4);
        assert_eq!(bank.result_cell, "FSDN4_X1");
        assert!(bank.original_name.starts_with("u"));
        for related in &bank.related_instances {
            assert!(related.starts_with("u"));
        }
    }

    // Net conservation held through banking and legalization.
    assert_eq!(summary.trail_violations, 0);
    let mapping = engine.final_pin_mapping();
    let d0_target = &mapping["u0/D"];
    assert!(d0_target.ends_with("/D0"), "u0/D mapped to {d0_target}");
}

// --------------------------------------------------------------------------------
// Scenarios 5 and 6: legalization against a blockage
// --------------------------------------------------------------------------------

#[test]
fn blockage_legalization_through_the_engine() {
    let mut ctx = DesignContext::new("s5");
    ctx.weights = ObjectiveWeights::builder().gamma(1.0).build();
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .pins(scan_pins())
            .clocked_on("CK")
            .build(),
    );
    ctx.add_row(PlacementRow::new(Point::new(0.0, 0.0), 50, 1, 200.0, 200.0));
    ctx.add_blockage(Rect::new(2000.0, 0.0, 4000.0, 200.0));
    let cell = ctx.get_cell("SDFF_X1").cloned().unwrap();
    for (name, x) in [("u", 3000.0), ("v", 3400.0)] {
        ctx.add_instance(
            Instance::builder()
                .name(name)
                .cell(cell.clone())
                .position(Point::new(x, 0.0))
                .connections(vec![
                    Connection::new("D", format!("d_{name}")),
                    Connection::new("Q", format!("q_{name}")),
                    Connection::new("CK", "clk"),
                ])
                .build(),
        );
    }

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();
    assert_eq!(summary.legalization.placed, 2);

    // Both FFs land right of the blockage, abutting and site-aligned; the
    // record trail carries the legalized positions.
    assert_eq!(engine.ctx.instances["u"].position, Point::new(4000.0, 0.0));
    assert_eq!(engine.ctx.instances["v"].position, Point::new(4400.0, 0.0));
    let legalize_keeps = engine
        .transformation_history()
        .iter()
        .filter(|r| r.stage == PipelineStage::Legalize)
        .count();
    assert_eq!(legalize_keeps, 2);
}

#[test]
fn tight_displacement_bound_rejects_placement() {
    let mut ctx = DesignContext::new("s6");
    ctx.weights = ObjectiveWeights::builder().gamma(1.0).build();
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .pins(scan_pins())
            .clocked_on("CK")
            .build(),
    );
    ctx.add_row(PlacementRow::new(Point::new(0.0, 0.0), 50, 1, 200.0, 200.0));
    ctx.add_blockage(Rect::new(2000.0, 0.0, 4000.0, 200.0));
    let cell = ctx.get_cell("SDFF_X1").cloned().unwrap();
    for (name, x) in [("u", 3000.0), ("v", 3400.0)] {
        ctx.add_instance(
            Instance::builder()
                .name(name)
                .cell(cell.clone())
                .position(Point::new(x, 0.0))
                .connections(vec![
                    Connection::new("D", format!("d_{name}")),
                    Connection::new("CK", "clk"),
                ])
                .build(),
        );
    }

    let config = EngineConfig::builder().quiet(true).max_displacement(500.0).build();
    let mut engine = BankingEngine::new(ctx, config);
    let summary = engine.run();

    assert_eq!(summary.legalization.failed, 2);
    // Instances stay at their original positions; the Legalize snapshot
    // still reports them there.
    assert_eq!(engine.ctx.instances["u"].position, Point::new(3000.0, 0.0));
    assert_eq!(engine.ctx.instances["v"].position, Point::new(3400.0, 0.0));
    let legalize_stage = engine
        .complete_pipeline()
        .iter()
        .find(|s| s.stage == PipelineStage::Legalize)
        .unwrap();
    let u = legalize_stage.instances.iter().find(|i| i.name == "u").unwrap();
    assert_eq!((u.x, u.y), (3000.0, 0.0));
}

// --------------------------------------------------------------------------------
// LSRDPQ single-phase banking through the whole pipeline
// --------------------------------------------------------------------------------

#[test]
fn rising_quadruple_banks_into_one_lsrdpq4() {
    let mut ctx = DesignContext::new("lsrdpq");
    ctx.weights = ObjectiveWeights::builder().beta(1.0).gamma(1.0).build();
    ctx.add_cell(
        CellTemplate::builder()
            .name("FDPQ_X1")
            .kind(CellKind::FlipFlop)
            .width(300.0)
            .height(200.0)
            .area(3.0)
            .leakage_power(9.0)
            .pins(vec![
                Pin::input("D"),
                Pin::output("Q"),
                Pin::output("QN"),
                Pin::clock("CK"),
            ])
            .clocked_on("CK")
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("LSRDPQ4_X1")
            .kind(CellKind::FlipFlop)
            .bit_width(4)
            .width(900.0)
            .height(200.0)
            .area(8.0)
            .leakage_power(22.0)
            .pins(
                (1..=4)
                    .flat_map(|i| {
                        vec![
                            Pin::input(format!("D{i}")),
                            Pin::output(format!("Q{i}")),
                            Pin::output(format!("QN{i}")),
                        ]
                    })
                    .chain(vec![Pin::clock("CK")])
                    .collect(),
            )
            .clocked_on("CK")
            .build(),
    );
    ctx.build_banking_relationships();
    add_rows(&mut ctx, 4);

    let cell = ctx.get_cell("FDPQ_X1").cloned().unwrap();
    for i in 0..4 {
        ctx.add_instance(
            Instance::builder()
                .name(format!("c{i}"))
                .cell(cell.clone())
                .position(Point::new(1000.0 + i as f64 * 800.0, 200.0))
                .connections(vec![
                    Connection::new("D", format!("cd{i}")),
                    Connection::new("Q", format!("cq{i}")),
                    Connection::new("CK", "clk2"),
                ])
                .build(),
        );
    }

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert_eq!(summary.banking.lsrdpq4_created, 1);
    assert_eq!(summary.final_ffs, 1);

    let bank = engine
        .transformation_history()
        .iter()
        .find(|r| r.operation == Operation::Bank)
        .unwrap();
    assert_eq!(bank.result_cell, "LSRDPQ4_X1");
    assert_eq!(1 + bank.related_instances.len(), 4);

    // LSRDPQ bit pins are 1-based.
    let result = engine.ctx.instances.get(&bank.result_name).unwrap();
    assert_eq!(result.connection("D1").unwrap().net, "cd0");
    assert_eq!(result.connection("D4").unwrap().net, "cd3");
    assert!(result.connection("D0").is_none());
    let mapping = engine.final_pin_mapping();
    assert_eq!(mapping["c0/D"], format!("{}/D1", bank.result_name));
    assert_eq!(mapping["c3/Q"], format!("{}/Q4", bank.result_name));
    assert_eq!(summary.trail_violations, 0);
}

// --------------------------------------------------------------------------------
// Idempotence
// --------------------------------------------------------------------------------

#[test]
fn fixed_point_design_produces_only_keeps() {
    let mut ctx = DesignContext::new("fixed");
    ctx.weights = ObjectiveWeights::builder().gamma(1.0).build();
    ctx.add_cell(
        CellTemplate::builder()
            .name("SDFF_X1")
            .kind(CellKind::FlipFlop)
            .width(400.0)
            .height(200.0)
            .area(4.0)
            .pins(scan_pins())
            .clocked_on("CK")
            .build(),
    );
    add_rows(&mut ctx, 2);
    let cell = ctx.get_cell("SDFF_X1").cloned().unwrap();
    // Already legal: site-aligned, non-overlapping, nothing to bank or swap.
    for (name, x) in [("u", 0.0), ("v", 600.0)] {
        ctx.add_instance(
            Instance::builder()
                .name(name)
                .cell(cell.clone())
                .position(Point::new(x, 0.0))
                .connections(vec![
                    Connection::new("D", format!("d_{name}")),
                    Connection::new("CK", "clk"),
                ])
                .build(),
        );
    }

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    assert!(engine
        .transformation_history()
        .iter()
        .all(|r| r.operation == Operation::Keep && r.stage == PipelineStage::Original));
    assert_eq!(engine.ctx.instances["u"].new_position, Some(Point::new(0.0, 0.0)));
    assert_eq!(engine.ctx.instances["v"].new_position, Some(Point::new(600.0, 0.0)));
    assert_eq!(summary.trail_violations, 0);

    // Applying the pipeline a second time to the already-converged design
    // produces nothing beyond the initial KEEPs and identical positions.
    let ctx = engine.ctx;
    let mut second = BankingEngine::new(ctx, quiet_config());
    second.run();
    assert!(second
        .transformation_history()
        .iter()
        .all(|r| r.operation == Operation::Keep && r.stage == PipelineStage::Original));
    assert_eq!(second.ctx.instances["u"].new_position, Some(Point::new(0.0, 0.0)));
    assert_eq!(second.ctx.instances["v"].new_position, Some(Point::new(600.0, 0.0)));
}

// --------------------------------------------------------------------------------
// Full-pipeline invariant sweep
// --------------------------------------------------------------------------------

#[test]
fn mixed_design_satisfies_the_contracts() {
    let mut ctx = DesignContext::new("mixed");
    fsdn_library(&mut ctx);
    add_rows(&mut ctx, 8);

    // Debankable multi-bit, bankable singles, an obstacle gate, a blockage.
    let mb = ctx.get_cell("FSDN4_X1").cloned().unwrap();
    let mut conns = Vec::new();
    for i in 0..4 {
        conns.push(Connection::new(format!("D{i}"), format!("md{i}")));
        conns.push(Connection::new(format!("Q{i}"), format!("mq{i}")));
    }
    conns.push(Connection::new("CK", "clk"));
    conns.push(Connection::new("SE", "se"));
    ctx.add_instance(
        Instance::builder()
            .name("m")
            .cell(mb)
            .position(Point::new(5000.0, 600.0))
            .connections(conns)
            .build(),
    );
    for i in 0..6 {
        fsdn_single(&mut ctx, &format!("u{i}"), i as f64 * 900.0, 200.0);
    }
    let gate = ctx.add_cell(
        CellTemplate::builder()
            .name("NAND2_1")
            .width(600.0)
            .height(200.0)
            .pins(vec![Pin::input("A"), Pin::output("Y")])
            .build(),
    );
    ctx.add_instance(
        Instance::builder()
            .name("g0")
            .cell(gate)
            .position(Point::new(2200.0, 400.0))
            .status(PlacementStatus::Fixed)
            .build(),
    );
    ctx.add_blockage(Rect::new(8000.0, 0.0, 9000.0, 800.0));

    let mut engine = BankingEngine::new(ctx, quiet_config());
    let summary = engine.run();

    // Monotone cost on every substitution record.
    for record in engine.transformation_history() {
        if matches!(record.operation, Operation::Substitute | Operation::PostSubstitute) {
            let before = ff_score(&engine.ctx, &record.original_cell, 1.0);
            let after = ff_score(&engine.ctx, &record.result_cell, 1.0);
            assert!(after <= before, "{}: {} -> {}", record.original_name, before, after);
        }
        if record.operation == Operation::Bank {
            let bits = engine.ctx.get_cell(&record.result_cell).unwrap().bit_width;
            let total_source_bits: u64 = std::iter::once(&record.original_cell)
                .chain(record.related_cells.iter())
                .map(|cell| engine.ctx.get_cell(cell).map_or(1, |c| c.bit_width))
                .sum();
            assert_eq!(bits, total_source_bits);
            assert_eq!(record.related_cells.len(), record.related_instances.len());
        }
    }

    assert_eq!(summary.trail_violations, 0);
    assert!(verify_site_alignment(&engine.ctx).is_empty());
    assert!(verify_no_overlap(&engine.ctx).is_empty());

    // One snapshot per stage, captured in pipeline order.
    let captured: Vec<_> = engine.complete_pipeline().iter().map(|s| s.stage).collect();
    assert_eq!(captured, PipelineStage::ALL.to_vec());

    // The operation log renders one line per trail operation.
    let debanks = engine
        .transformation_history()
        .iter()
        .filter(|r| r.operation == Operation::Debank)
        .count();
    let log = engine.operation_log();
    assert!(log.iter().any(|l| l.starts_with("CellInst ")));
    if debanks > 0 {
        assert!(log.iter().any(|l| l.starts_with("split_multibit ")));
    }

    // The stage report renders a block per captured stage.
    let report = engine.stage_report();
    for stage in PipelineStage::ALL {
        let header = format!("=== STAGE: {} ===", stage.as_str());
        assert!(report.contains(&header), "missing {header}");
    }
}
