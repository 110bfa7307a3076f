use ffbank::*;

fn display_progress_step(step: int) {
    match step {
        1 => println!(
            "{} {}",
            "[1/4]".bold().dimmed(),
            "Loading design...".bold().bright_yellow()
        ),
        2 => println!(
            "{} {}",
            "[2/4]".bold().dimmed(),
            "Transforming flip-flops...".bold().bright_yellow()
        ),
        3 => println!(
            "{} {}",
            "[3/4]".bold().dimmed(),
            "Legalizing placement...".bold().bright_yellow()
        ),
        4 => println!("{} {}", "[4/4]".bold().dimmed(), "Done".bold().bright_green()),
        _ => unreachable!(),
    }
}

/// Small built-in design exercising every pipeline stage: a 4-bit FF to
/// debank and rebank, a row of bankable FSDN singles, a rising-edge LSRDPQ
/// quadruple, fixed logic acting as blockages, and one explicit placement
/// blockage.
fn demo_design() -> DesignContext {
    let mut ctx = DesignContext::new("demo");
    ctx.weights = ObjectiveWeights::builder()
        .alpha(1.0)
        .beta(1.0)
        .gamma(1.0)
        .build();

    let scan_pins = || {
        vec![
            Pin::input("D"),
            Pin::output("Q"),
            Pin::output("QN"),
            Pin::clock("CK"),
            Pin::input("SI"),
            Pin::input("SE"),
        ]
    };
    let multibit_pins = |bits: usize| {
        (0..bits)
            .flat_map(|i| {
                vec![
                    Pin::input(format!("D{i}")),
                    Pin::output(format!("Q{i}")),
                    Pin::output(format!("QN{i}")),
                ]
            })
            .chain(vec![Pin::clock("CK"), Pin::input("SI"), Pin::input("SE")])
            .collect::<Vec<_>>()
    };

    ctx.add_cell(
        CellTemplate::builder()
            .name("SNPSHOPT25_FSDN_V2_1")
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
            .name("SNPSHOPT25_FSDN2_V2_1")
            .kind(CellKind::FlipFlop)
            .bit_width(2)
            .width(600.0)
            .height(200.0)
            .area(6.0)
            .leakage_power(18.0)
            .pins(multibit_pins(2))
            .clocked_on("(!CK)")
            .single_bit_degenerate("SNPSHOPT25_FSDN_V2_1".to_string())
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("SNPSHOPT25_FSDN4_V2_1")
            .kind(CellKind::FlipFlop)
            .bit_width(4)
            .width(1000.0)
            .height(200.0)
            .area(9.0)
            .leakage_power(26.0)
            .pins(multibit_pins(4))
            .clocked_on("(!CK)")
            .single_bit_degenerate("SNPSHOPT25_FSDN_V2_1".to_string())
            .build(),
    );
    ctx.add_cell(
        CellTemplate::builder()
            .name("SNPSHOPT25_FDPQ_V2_1")
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
            .name("SNPSHOPT25_LSRDPQ4_V2_1")
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
    let gate = ctx.add_cell(
        CellTemplate::builder()
            .name("NAND2_1")
            .width(400.0)
            .height(200.0)
            .area(1.0)
            .pins(vec![Pin::input("A"), Pin::input("B"), Pin::output("Y")])
            .build(),
    );
    ctx.build_banking_relationships();

    // Placement grid: 8 rows of 100 sites, one blockage band.
    ctx.die_area = Rect::new(0.0, 0.0, 20_000.0, 1_600.0);
    for r in 0..8 {
        ctx.add_row(PlacementRow::new(
            Point::new(0.0, r.float() * 200.0),
            100,
            1,
            200.0,
            200.0,
        ));
    }
    ctx.add_blockage(Rect::new(6000.0, 0.0, 8000.0, 400.0));

    // One multi-bit FF that debanks and rebanks.
    let mb = ctx.get_cell("SNPSHOPT25_FSDN4_V2_1").cloned().unwrap();
    let mut mb_conns = Vec::new();
    for i in 0..4 {
        mb_conns.push(Connection::new(format!("D{i}"), format!("mb_d{i}")));
        mb_conns.push(Connection::new(format!("Q{i}"), format!("mb_q{i}")));
    }
    mb_conns.push(Connection::new("CK", "clk"));
    mb_conns.push(Connection::new("SE", "scan_en"));
    ctx.add_instance(
        Instance::builder()
            .name("reg_bank_0")
            .cell(mb)
            .position(Point::new(2000.0, 600.0))
            .connections(mb_conns)
            .build(),
    );

    // Eight bankable FSDN singles along one row.
    let single = ctx.get_cell("SNPSHOPT25_FSDN_V2_1").cloned().unwrap();
    for i in 0..8 {
        ctx.add_instance(
            Instance::builder()
                .name(format!("ff_data_{i}"))
                .cell(single.clone())
                .position(Point::new(i.float() * 1000.0, 200.0))
                .connections(vec![
                    Connection::new("D", format!("d{i}")),
                    Connection::new("Q", format!("q{i}")),
                    Connection::new("CK", "clk"),
                    Connection::new("SI", "SYNOPSYS_UNCONNECTED_0"),
                    Connection::new("SE", "scan_en"),
                ])
                .build(),
        );
    }

    // Four rising-edge FFs that bank into one LSRDPQ4.
    let fdp = ctx.get_cell("SNPSHOPT25_FDPQ_V2_1").cloned().unwrap();
    for i in 0..4 {
        ctx.add_instance(
            Instance::builder()
                .name(format!("ff_ctrl_{i}"))
                .cell(fdp.clone())
                .position(Point::new(1000.0 + i.float() * 800.0, 1000.0))
                .connections(vec![
                    Connection::new("D", format!("cd{i}")),
                    Connection::new("Q", format!("cq{i}")),
                    Connection::new("CK", "clk2"),
                ])
                .build(),
        );
    }

    // Fixed logic cells acting as placement obstacles.
    for (i, x) in [(0, 1200.0), (1, 4400.0)] {
        ctx.add_instance(
            Instance::builder()
                .name(format!("gate_{i}"))
                .cell(gate.clone())
                .position(Point::new(x, 400.0))
                .status(PlacementStatus::Fixed)
                .connections(vec![
                    Connection::new("A", format!("q{i}")),
                    Connection::new("Y", format!("gy{i}")),
                ])
                .build(),
        );
    }

    ctx
}

fn main() {
    {
        use std::env;
        // enable info level logging
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "info");
        }
        pretty_env_logger::init();
    }

    let tmr = timer!(logging_timer::Level::Info; "Total Runtime");

    display_progress_step(1);
    let ctx = demo_design();

    display_progress_step(2);
    let config = EngineConfig::builder().max_displacement(100_000.0).build();
    let mut engine = BankingEngine::new(ctx, config);

    display_progress_step(3);
    engine.run();

    display_progress_step(4);
    finish!(tmr);

    engine.print_report();

    println!("{}", "\nOperation log:".bold().underline().bright_blue());
    for line in engine.operation_log() {
        println!("{line}");
    }
}
