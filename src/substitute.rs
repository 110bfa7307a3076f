use crate::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct SubstitutionStats {
    pub stage1: usize,
    pub stage2: usize,
    pub stage3_falling: usize,
    pub stage3_rising: usize,
    pub recorded: usize,
    pub unknown_groups: usize,
}

fn update_best_alt(instance: &mut Instance, cell_name: &str, score: float) {
    if score < instance.best_alt_score {
        instance.best_alt_cell = Some(cell_name.to_string());
        instance.best_alt_score = score;
    }
}

/// Runs the three substitution passes over the grouped FF population and
/// emits one SUBSTITUTE record per instance whose cell differs from the
/// pass-start snapshot. Cell pointers are the only thing the passes mutate.
#[time("three-stage substitution")]
pub fn execute_three_stage_substitution(
    ctx: &mut DesignContext,
    groups: &CellGroups,
    config: &EngineConfig,
    tracker: &mut TransformationTracker,
    instance_groups: &IndexMap<String, Vec<String>>,
) -> SubstitutionStats {
    let mut stats = SubstitutionStats::default();

    let snapshot: Dict<String, String> = ctx
        .instances
        .iter()
        .filter(|(_, inst)| inst.is_flip_flop())
        .map(|(name, inst)| (name.clone(), inst.cell.name.clone()))
        .collect();

    stage1_nominal_substitution(ctx, groups, config, instance_groups, &mut stats);
    stage2_effective_substitution(ctx, groups, config, instance_groups, &mut stats);
    stage3_banking_preparation(ctx, groups, config, instance_groups, &mut stats);

    for name in ctx.flip_flop_names() {
        let instance = &ctx.instances[&name];
        let Some(original_cell) = snapshot.get(&name) else {
            continue;
        };
        if *original_cell != instance.cell.name {
            tracker.record_substitute(instance, original_cell, PipelineStage::Substitution);
            stats.recorded += 1;
        }
    }

    info!(
        "substitution: stage1 {}, stage2 {}, stage3 {}+{}, {} SUBSTITUTE records",
        stats.stage1, stats.stage2, stats.stage3_falling, stats.stage3_rising, stats.recorded
    );
    stats
}

/// Stage 1 — unconditional: every instance moves to the cached optimum of
/// the group its current cell template belongs to.
fn stage1_nominal_substitution(
    ctx: &mut DesignContext,
    groups: &CellGroups,
    config: &EngineConfig,
    instance_groups: &IndexMap<String, Vec<String>>,
    stats: &mut SubstitutionStats,
) {
    for (group_key, members) in instance_groups {
        let mut substituted = 0;
        for name in members {
            let Some(instance) = ctx.instances.get(name) else {
                continue;
            };
            let Some(cell_group) = groups.group_of_cell(&instance.cell.name) else {
                debug!("{}: no equivalence group for {}", name, instance.cell.name);
                stats.unknown_groups += 1;
                continue;
            };
            let Some(optimal) = groups.optimal_for(cell_group) else {
                stats.unknown_groups += 1;
                continue;
            };
            if *optimal == instance.cell.name {
                continue;
            }
            let Some(cell) = ctx.get_cell(optimal).cloned() else {
                warn!("optimal cell {} missing from the library", optimal);
                stats.unknown_groups += 1;
                continue;
            };
            let optimal_name = optimal.clone();
            let score = ff_score(ctx, &optimal_name, config.local_timing_scale);
            let instance = ctx.instances.get_mut(name).unwrap();
            instance.cell = cell;
            update_best_alt(instance, &optimal_name, score);
            substituted += 1;
        }
        if substituted > 0 {
            debug!("group [{}]: {} nominal substitutions", group_key, substituted);
            stats.stage1 += substituted;
        }
    }
}

/// Stage 2 — conditional: pins tied to ground need not exist on the
/// implementation cell, so the optimum of the *effective* pin group is
/// taken when it scores strictly lower.
fn stage2_effective_substitution(
    ctx: &mut DesignContext,
    groups: &CellGroups,
    config: &EngineConfig,
    instance_groups: &IndexMap<String, Vec<String>>,
    stats: &mut SubstitutionStats,
) {
    for members in instance_groups.values() {
        for name in members {
            let Some(instance) = ctx.instances.get(name) else {
                continue;
            };
            let current_score = ff_score(ctx, &instance.cell.name, config.local_timing_scale);
            let signature = effective_pin_signature(instance);
            let edge = instance_clock_edge(instance);
            let effective_key = group_key(edge, &signature, 1);

            let Some(optimal) = groups.optimal_for(&effective_key) else {
                continue;
            };
            let optimal_score = ff_score(ctx, optimal, config.local_timing_scale);
            if optimal_score >= current_score {
                continue;
            }
            let Some(cell) = ctx.get_cell(optimal).cloned() else {
                continue;
            };
            let optimal_name = optimal.clone();
            let instance = ctx.instances.get_mut(name).unwrap();
            instance.cell = cell;
            update_best_alt(instance, &optimal_name, optimal_score);
            stats.stage2 += 1;
        }
    }
}

/// Stage 3 — conditional: rewrite single-bit FFs into the 1-bit cells their
/// 4-bit banking targets are built from, whenever the 4-bit target's
/// per-bit score beats the instance. Falling edge prepares FSDN4 banking
/// (instances with active RD/SD are ineligible); rising-edge D_Q_CK and
/// D_QN_CK instances upgrade into the D_Q_QN_CK group for LSRDPQ4.
fn stage3_banking_preparation(
    ctx: &mut DesignContext,
    groups: &CellGroups,
    config: &EngineConfig,
    instance_groups: &IndexMap<String, Vec<String>>,
    stats: &mut SubstitutionStats,
) {
    let fsdn4_key = group_key(ClockEdge::Falling, "D_Q_QN_CK_SI_SE", 4);
    let fsdn1_key = group_key(ClockEdge::Falling, "D_Q_QN_CK_SI_SE", 1);
    let lsrdpq4_key = group_key(ClockEdge::Rising, "D_Q_QN_CK", 4);
    let lsrdpq1_key = group_key(ClockEdge::Rising, "D_Q_QN_CK", 1);

    let fsdn_target = groups
        .optimal_for(&fsdn4_key)
        .zip(groups.optimal_for(&fsdn1_key))
        .map(|(four, one)| {
            (
                ff_score(ctx, four, config.local_timing_scale),
                one.clone(),
            )
        });
    let lsrdpq_target = groups
        .optimal_for(&lsrdpq4_key)
        .zip(groups.optimal_for(&lsrdpq1_key))
        .map(|(four, one)| {
            (
                ff_score(ctx, four, config.local_timing_scale),
                one.clone(),
            )
        });

    if fsdn_target.is_none() && lsrdpq_target.is_none() {
        info!("no 4-bit banking targets in the library, skipping stage 3");
        return;
    }

    let rising_eligible_keys = [
        group_key(ClockEdge::Rising, "D_Q_CK", 1),
        group_key(ClockEdge::Rising, "D_QN_CK", 1),
    ];

    for members in instance_groups.values() {
        for name in members {
            let Some(instance) = ctx.instances.get(name) else {
                continue;
            };
            let edge = instance_clock_edge(instance);
            let current_score = ff_score(ctx, &instance.cell.name, config.local_timing_scale);

            match edge {
                ClockEdge::Falling => {
                    let Some((target_score, single)) = &fsdn_target else {
                        continue;
                    };
                    if instance.has_active_pin_of(FfPinKind::Rd)
                        || instance.has_active_pin_of(FfPinKind::Sd)
                    {
                        continue;
                    }
                    if *target_score >= current_score {
                        continue;
                    }
                    let Some(cell) = ctx.get_cell(single).cloned() else {
                        continue;
                    };
                    let single_name = single.clone();
                    let single_score = ff_score(ctx, &single_name, config.local_timing_scale);
                    let instance = ctx.instances.get_mut(name).unwrap();
                    instance.cell = cell;
                    update_best_alt(instance, &single_name, single_score);
                    stats.stage3_falling += 1;
                }
                ClockEdge::Rising => {
                    let Some((target_score, single)) = &lsrdpq_target else {
                        continue;
                    };
                    let effective_key =
                        group_key(edge, &effective_pin_signature(instance), 1);
                    if !rising_eligible_keys.contains(&effective_key) {
                        continue;
                    }
                    if *target_score >= current_score {
                        continue;
                    }
                    let Some(cell) = ctx.get_cell(single).cloned() else {
                        continue;
                    };
                    let single_name = single.clone();
                    let single_score = ff_score(ctx, &single_name, config.local_timing_scale);
                    let instance = ctx.instances.get_mut(name).unwrap();
                    instance.cell = cell;
                    update_best_alt(instance, &single_name, single_score);
                    stats.stage3_rising += 1;
                }
                ClockEdge::Unknown => {}
            }
        }
    }
}

/// Post-banking pass: surviving single-bit FFs revert to the best
/// alternative the substituter ever saw, when it still scores strictly
/// lower than the current cell.
#[time("post-banking substitution")]
pub fn execute_post_banking_substitution(
    ctx: &mut DesignContext,
    config: &EngineConfig,
    tracker: &mut TransformationTracker,
) -> usize {
    let mut reverted = 0;
    for name in ctx.flip_flop_names() {
        let instance = &ctx.instances[&name];
        if instance.bit_width() != 1 {
            continue;
        }
        let Some(best) = instance.best_alt_cell.clone() else {
            continue;
        };
        let current_score = ff_score(ctx, &instance.cell.name, config.local_timing_scale);
        if instance.best_alt_score >= current_score {
            continue;
        }
        let Some(cell) = ctx.get_cell(&best).cloned() else {
            warn!("best alternative {} vanished from the library", best);
            continue;
        };
        let instance = ctx.instances.get_mut(&name).unwrap();
        let old_cell = instance.cell.name.clone();
        if old_cell == best {
            continue;
        }
        instance.cell = cell;
        reverted += 1;
        debug!("{}: {} -> {}", name, old_cell, best);
        let instance = &ctx.instances[&name];
        tracker.record_substitute(instance, &old_cell, PipelineStage::PostBanking);
    }
    info!("post-banking substitution reverted {} instances", reverted);
    reverted
}
