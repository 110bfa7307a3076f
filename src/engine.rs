use crate::*;

/// Tuning knobs of the pipeline. The two timing scales calibrate the
/// scoring function: group ranking multiplies the timing surrogate by
/// `group_timing_scale`, the substituter's local comparisons by
/// `local_timing_scale`; the reference values are 1000 and 1.
#[derive(Debug, Clone, Builder)]
pub struct EngineConfig {
    /// Manhattan threshold for spatial clustering in all banking passes.
    #[builder(default = 10000.0)]
    pub banking_distance: float,
    /// Legalization displacement bound; anything above it does not fit.
    #[builder(default = float::INFINITY)]
    pub max_displacement: float,
    #[builder(default = 1000.0)]
    pub group_timing_scale: float,
    #[builder(default = 1.0)]
    pub local_timing_scale: float,
    /// Suppresses the legalization progress bar.
    #[builder(default = false)]
    pub quiet: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Counts reported back to the caller; the pipeline never aborts on data
/// anomalies, it skips and tallies them here.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineSummary {
    pub initial_ffs: usize,
    pub final_ffs: usize,
    pub scan_chains: usize,
    pub scan_groups: usize,
    pub pin_status: PinStatusStats,
    pub debank: DebankStats,
    pub substitution: SubstitutionStats,
    pub banking: BankingStats,
    pub post_substituted: usize,
    pub legalization: LegalizeStats,
    pub trail_violations: usize,
}

/// Weighted design metrics: the timing term is the sum of per-cell
/// surrogates, power and area are summed over the live FF population.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesignScore {
    pub timing_proxy: float,
    pub power: float,
    pub area: float,
    pub objective: float,
}

/// Top-level driver: owns the design, runs the staged pipeline
/// (DEBANK -> SUBSTITUTE -> BANK -> POST-SUBSTITUTE -> LEGALIZE), captures
/// a snapshot after every stage, and exposes the audit trail to the output
/// writers.
pub struct BankingEngine {
    pub ctx: DesignContext,
    pub config: EngineConfig,
    pub groups: CellGroups,
    pub tracker: TransformationTracker,
    pub summary: PipelineSummary,
}

impl BankingEngine {
    pub fn new(mut ctx: DesignContext, config: EngineConfig) -> Self {
        if ctx.banking_targets.is_empty() {
            ctx.build_banking_relationships();
        }
        let groups = CellGroups::build(&ctx, config.group_timing_scale);
        Self {
            ctx,
            config,
            groups,
            tracker: TransformationTracker::new(),
            summary: PipelineSummary::default(),
        }
    }

    #[time("banking pipeline")]
    pub fn run(&mut self) -> PipelineSummary {
        self.summary.initial_ffs = self.ctx.num_flip_flops();
        info!(
            "{} flip-flops ({} bankable), {} clock nets",
            self.summary.initial_ffs,
            self.ctx.bankable_flip_flops().len(),
            self.ctx.clock_nets().count()
        );
        self.summary.pin_status = analyze_ff_pin_connections(&mut self.ctx);
        self.summary.scan_chains = detect_scan_chains(&mut self.ctx);
        self.summary.scan_groups = scan_chain_banking_groups(&self.ctx).len();

        self.tracker.initialize(&mut self.ctx);

        self.summary.debank = perform_debanking(&mut self.ctx, &mut self.tracker);
        self.tracker.capture_stage(PipelineStage::Debank, &self.ctx);

        let instance_groups = group_ff_instances(&self.ctx, |i| substitution_group_key(i, &self.ctx));
        self.summary.substitution = execute_three_stage_substitution(
            &mut self.ctx,
            &self.groups,
            &self.config,
            &mut self.tracker,
            &instance_groups,
        );
        self.tracker.capture_stage(PipelineStage::Substitution, &self.ctx);

        assign_banking_kinds(&mut self.ctx);
        let mut banker = Banker::new(self.config.banking_distance);
        self.summary.banking = banker.run(&mut self.ctx, &self.groups, &mut self.tracker);
        self.tracker.capture_stage(PipelineStage::Bank, &self.ctx);

        self.summary.post_substituted =
            execute_post_banking_substitution(&mut self.ctx, &self.config, &mut self.tracker);
        self.tracker.capture_stage(PipelineStage::PostBanking, &self.ctx);

        let mut legalizer = Legalizer::new(self.config.max_displacement, self.config.quiet);
        self.summary.legalization = legalizer.run(&mut self.ctx);
        let displacement = displacement_stats(&self.ctx);
        info!(
            "displacement: total {:.0}, max {:.0}, {} moved",
            displacement.total, displacement.max, displacement.moved
        );
        self.tracker.record_legalization(&mut self.ctx);
        self.tracker.capture_stage(PipelineStage::Legalize, &self.ctx);

        let report = run_verification(&self.ctx, &self.groups, &self.config, &self.tracker);
        report.log_all();
        self.summary.trail_violations = report.total_violations();

        self.summary.final_ffs = self.ctx.num_flip_flops();
        info!(
            "pipeline done: {} -> {} flip-flops",
            self.summary.initial_ffs, self.summary.final_ffs
        );
        self.summary
    }

    /// Weighted metrics of the current FF population against the objective
    /// weights. Timing enters through the per-cell surrogate only.
    pub fn evaluate(&self) -> DesignScore {
        let mut score = DesignScore::default();
        for instance in self.ctx.instances.values() {
            if !instance.is_flip_flop() {
                continue;
            }
            score.timing_proxy += self.ctx.timing_surrogate(&instance.cell.name);
            score.power += instance.cell.leakage_power;
            score.area += instance.cell.area;
        }
        score.objective =
            self.ctx
                .weights
                .calculate_objective(score.timing_proxy, score.power, score.area);
        score
    }

    // ----------------------------------------------------------------------------
    // ### Outputs for the external writers
    // ----------------------------------------------------------------------------

    pub fn transformation_history(&self) -> &[TransformationRecord] {
        &self.tracker.history
    }

    pub fn complete_pipeline(&self) -> &[StageSnapshot] {
        &self.tracker.stages
    }

    pub fn final_pin_mapping(&self) -> IndexMap<String, String> {
        self.tracker.final_pin_mapping(&self.ctx)
    }

    pub fn cell_inst_listing(&self) -> Vec<String> {
        self.tracker.cell_inst_listing(&self.ctx)
    }

    pub fn operation_log(&mut self) -> Vec<String> {
        let mut lines = self.tracker.cell_inst_listing(&self.ctx);
        let operations = self.tracker.operation_log(&self.ctx);
        lines.push(String::new());
        lines.push(format!("OPERATION {}", operations.len()));
        lines.extend(operations);
        lines
    }

    pub fn stage_report(&self) -> Vec<String> {
        self.tracker.stage_report()
    }

    // ----------------------------------------------------------------------------
    // ### Reporting
    // ----------------------------------------------------------------------------

    pub fn stage_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["Stage", "FF count", "Records"]);
        for snapshot in &self.tracker.stages {
            table.add_row(row![
                snapshot.stage.as_str(),
                snapshot.instances.len(),
                snapshot.record_indices.len()
            ]);
        }
        table
    }

    pub fn summary_table(&self) -> Table {
        let s = &self.summary;
        let score = self.evaluate();
        let mut table = Table::new();
        table.add_row(row!["Flip-flops (initial -> final)", format!("{} -> {}", s.initial_ffs, s.final_ffs)]);
        table.add_row(row![
            "Scan chains / bankable groups",
            format!("{} / {}", s.scan_chains, s.scan_groups)
        ]);
        table.add_row(row![
            "Debanked / fragments",
            format!("{} / {}", s.debank.debanked, s.debank.fragments)
        ]);
        table.add_row(row!["SUBSTITUTE records", s.substitution.recorded]);
        table.add_row(row![
            "Banked (2b / 4b / LSRDPQ4 / rebanked)",
            format!(
                "{} / {} / {} / {}",
                s.banking.final_2bit,
                s.banking.fsdn4_created,
                s.banking.lsrdpq4_created,
                s.banking.rebanked_clusters
            )
        ]);
        table.add_row(row!["POST_SUBSTITUTE records", s.post_substituted]);
        table.add_row(row![
            "Legalized / failed",
            format!("{} / {}", s.legalization.placed, s.legalization.failed)
        ]);
        table.add_row(row!["Unknown groups", s.substitution.unknown_groups]);
        table.add_row(row!["Verification violations", s.trail_violations]);
        table.add_row(row![
            "Power / Area / Objective",
            format!(
                "{:.3} / {:.3} / {:.3}",
                score.power, score.area, score.objective
            )
        ]);
        table
    }

    pub fn print_report(&self) {
        println!("{}", "\nStage pipeline:".bold().bright_blue());
        self.stage_table().printstd();
        println!("{}", "\nSummary:".bold().bright_blue());
        self.summary_table().printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_design_runs_to_completion() {
        let mut ctx = DesignContext::new("empty");
        ctx.add_row(PlacementRow::new(Point::new(0.0, 0.0), 10, 1, 100.0, 100.0));
        let mut engine = BankingEngine::new(ctx, EngineConfig::builder().quiet(true).build());
        let summary = engine.run();
        assert_eq!(summary.initial_ffs, 0);
        assert_eq!(summary.final_ffs, 0);
        assert_eq!(summary.trail_violations, 0);
        assert_eq!(engine.complete_pipeline().len(), 6);
    }

    #[test]
    fn zero_weights_default_when_unconfigured() {
        // Missing weights degrade to zero scores, not to a crash.
        let mut ctx = DesignContext::new("t");
        let cell = ctx.add_cell(
            CellTemplate::builder()
                .name("F_FSDN")
                .kind(CellKind::FlipFlop)
                .pins(vec![Pin::input("D"), Pin::output("Q"), Pin::clock("CK")])
                .clocked_on("!CK")
                .build(),
        );
        ctx.add_instance(
            Instance::builder()
                .name("u")
                .cell(cell)
                .connections(vec![
                    Connection::new("D", "d"),
                    Connection::new("Q", "q"),
                    Connection::new("CK", "clk"),
                ])
                .build(),
        );
        ctx.add_row(PlacementRow::new(Point::new(0.0, 0.0), 100, 1, 100.0, 100.0));
        let mut engine = BankingEngine::new(ctx, EngineConfig::builder().quiet(true).build());
        let summary = engine.run();
        assert_eq!(summary.final_ffs, 1);
        assert_eq!(summary.trail_violations, 0);
    }
}
