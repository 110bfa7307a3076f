use crate::*;

/// Outcome of the post-pipeline verification suite. Each list holds
/// human-readable findings; an empty report means every check passed.
#[derive(Debug, Default)]
pub struct VerificationReport {
    pub completeness: Vec<String>,
    pub record_logic: Vec<String>,
    pub group_closure: Vec<String>,
    pub banking_arity: Vec<String>,
    pub monotone_cost: Vec<String>,
    pub pin_trail: Vec<String>,
    pub alignment: Vec<String>,
    pub overlap: Vec<String>,
}

impl VerificationReport {
    pub fn total_violations(&self) -> usize {
        self.completeness.len()
            + self.record_logic.len()
            + self.group_closure.len()
            + self.banking_arity.len()
            + self.monotone_cost.len()
            + self.pin_trail.len()
            + self.alignment.len()
            + self.overlap.len()
    }

    pub fn is_clean(&self) -> bool {
        self.total_violations() == 0
    }

    pub fn log_all(&self) {
        for (category, findings) in [
            ("completeness", &self.completeness),
            ("record-logic", &self.record_logic),
            ("group-closure", &self.group_closure),
            ("banking-arity", &self.banking_arity),
            ("monotone-cost", &self.monotone_cost),
            ("pin-trail", &self.pin_trail),
            ("alignment", &self.alignment),
            ("overlap", &self.overlap),
        ] {
            for finding in findings {
                warn!("{}: {}", category, finding);
            }
        }
    }
}

/// Runs every trail and placement check: record completeness and
/// well-formedness, group closure and monotone cost of substitutions,
/// banking arity, the end-to-end pin trail, and the geometric
/// post-legalization contracts.
#[time("verification suite")]
pub fn run_verification(
    ctx: &DesignContext,
    groups: &CellGroups,
    config: &EngineConfig,
    tracker: &TransformationTracker,
) -> VerificationReport {
    let report = VerificationReport {
        completeness: verify_record_completeness(ctx, tracker),
        record_logic: verify_record_logic(tracker),
        group_closure: verify_group_closure(ctx, groups, tracker),
        banking_arity: verify_banking_arity(ctx, tracker),
        monotone_cost: verify_monotone_cost(ctx, config, tracker),
        pin_trail: tracker.verify_trail(ctx),
        alignment: verify_site_alignment(ctx),
        overlap: verify_no_overlap(ctx),
    };
    if report.is_clean() {
        info!("verification suite passed");
    } else {
        warn!("verification suite found {} violations", report.total_violations());
    }
    report
}

/// Every FF alive at end-of-pipeline must appear as the result of some
/// record; results naming vanished instances are reported too (debank
/// fragments consumed by rebanking are expected to vanish).
fn verify_record_completeness(ctx: &DesignContext, tracker: &TransformationTracker) -> Vec<String> {
    let mut findings = Vec::new();

    let current: Set<&str> = ctx
        .instances
        .iter()
        .filter(|(_, inst)| inst.is_flip_flop())
        .map(|(name, _)| name.as_str())
        .collect();
    let results: Set<&str> = tracker
        .history
        .iter()
        .map(|r| r.result_name.as_str())
        .collect();
    let consumed: Set<&str> = tracker
        .records_of(Operation::Bank)
        .flat_map(|r| {
            std::iter::once(r.original_name.as_str())
                .chain(r.related_instances.iter().map(String::as_str))
        })
        .collect();

    for name in current.iter().sorted() {
        if !results.contains(name) {
            findings.push(format!("{name} is alive but untracked by any record"));
        }
    }
    for name in results.iter().sorted() {
        if !current.contains(name) && !consumed.contains(name) {
            // Fragments that were rebanked away are legitimate intermediate
            // results; anything else points at a stale record.
            let is_fragment = tracker
                .records_of(Operation::Debank)
                .any(|r| r.result_name == **name);
            if !is_fragment {
                findings.push(format!("record result {name} no longer exists"));
            }
        }
    }
    findings
}

/// Structural sanity of each record kind: KEEP changes nothing, substitute
/// operations keep the name and change the cell, DEBANK and BANK carry
/// their related instances.
fn verify_record_logic(tracker: &TransformationTracker) -> Vec<String> {
    let mut findings = Vec::new();
    for record in &tracker.history {
        match record.operation {
            Operation::Keep => {
                if record.original_name != record.result_name
                    || record.original_cell != record.result_cell
                {
                    findings.push(format!("KEEP mutates {}", record.original_name));
                }
            }
            Operation::Substitute | Operation::PostSubstitute => {
                if record.original_name != record.result_name {
                    findings.push(format!(
                        "{} renames {} to {}",
                        record.operation.as_str(),
                        record.original_name,
                        record.result_name
                    ));
                }
                if record.original_cell == record.result_cell {
                    findings.push(format!(
                        "{} on {} does not change the cell",
                        record.operation.as_str(),
                        record.original_name
                    ));
                }
            }
            Operation::Debank | Operation::Bank => {
                if record.related_instances.is_empty() {
                    findings.push(format!(
                        "{} on {} lists no related instances",
                        record.operation.as_str(),
                        record.original_name
                    ));
                }
            }
        }
    }
    findings
}

/// Every substitution stays inside one cell-equivalence group: same clock
/// edge, same nominal or effective pin set, same bit width.
fn verify_group_closure(
    ctx: &DesignContext,
    groups: &CellGroups,
    tracker: &TransformationTracker,
) -> Vec<String> {
    let mut findings = Vec::new();
    for record in tracker.history.iter().filter(|r| {
        matches!(r.operation, Operation::Substitute | Operation::PostSubstitute)
    }) {
        let (Some(original), Some(result)) = (
            ctx.get_cell(&record.original_cell),
            ctx.get_cell(&record.result_cell),
        ) else {
            findings.push(format!(
                "{}: cells {} / {} missing from the library",
                record.original_name, record.original_cell, record.result_cell
            ));
            continue;
        };

        if original.bit_width != result.bit_width {
            findings.push(format!(
                "{}: substitution changes bit width {} -> {}",
                record.original_name, original.bit_width, result.bit_width
            ));
            continue;
        }

        let same_nominal_group =
            groups.group_of_cell(&original.name) == groups.group_of_cell(&result.name);
        if same_nominal_group {
            continue;
        }
        // Effective-pin substitutions move between nominal groups; the
        // result's nominal set must then cover the instance's live pins.
        let edge_matches = original.clock_edge == result.clock_edge
            || original.clock_edge == ClockEdge::Unknown
            || result.clock_edge == ClockEdge::Unknown;
        let covered = ctx.instances.get(&record.result_name).map_or(true, |inst| {
            inst.active_pin_kinds()
                .into_iter()
                .all(|kind| result.pins.iter().any(|p| p.kind == kind))
        });
        if !edge_matches || !covered {
            findings.push(format!(
                "{}: {} -> {} leaves its equivalence group",
                record.original_name, record.original_cell, record.result_cell
            ));
        }
    }
    findings
}

/// A BANK record's summed source bit widths must equal the bit width of
/// the result cell. Source instances are gone from the design by the time
/// this runs, so each related source's width is resolved through the cell
/// recorded for it — a pre-existing 2-bit FF folded into a 4-bit result
/// legitimately contributes two bits through one name.
fn verify_banking_arity(ctx: &DesignContext, tracker: &TransformationTracker) -> Vec<String> {
    let mut findings = Vec::new();
    for record in tracker.records_of(Operation::Bank) {
        let Some(result_cell) = ctx.get_cell(&record.result_cell) else {
            findings.push(format!(
                "{}: result cell {} missing",
                record.result_name, record.result_cell
            ));
            continue;
        };
        if record.related_cells.len() != record.related_instances.len() {
            findings.push(format!(
                "{}: {} related instances but {} related cells",
                record.result_name,
                record.related_instances.len(),
                record.related_cells.len()
            ));
            continue;
        }
        let source_bits: uint = std::iter::once(&record.original_cell)
            .chain(record.related_cells.iter())
            .map(|cell| ctx.get_cell(cell).map_or(1, |c| c.bit_width))
            .sum();
        if source_bits != result_cell.bit_width {
            findings.push(format!(
                "{}: {} source bits banked into a {}-bit {}",
                record.result_name, source_bits, result_cell.bit_width, record.result_cell
            ));
        }
    }
    findings
}

/// `score(finalCell) <= score(originalCell)` for each substitute and
/// post-substitute record under the local comparison scale.
fn verify_monotone_cost(
    ctx: &DesignContext,
    config: &EngineConfig,
    tracker: &TransformationTracker,
) -> Vec<String> {
    let mut findings = Vec::new();
    for record in tracker.history.iter().filter(|r| {
        matches!(r.operation, Operation::Substitute | Operation::PostSubstitute)
    }) {
        let before = ff_score(ctx, &record.original_cell, config.local_timing_scale);
        let after = ff_score(ctx, &record.result_cell, config.local_timing_scale);
        if after > before {
            findings.push(format!(
                "{}: {} ({:.6}) -> {} ({:.6}) raises the score",
                record.original_name, record.original_cell, before, record.result_cell, after
            ));
        }
    }
    findings
}
