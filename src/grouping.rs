use crate::*;

// --------------------------------------------------------------------------------
// ## FF scoring
// --------------------------------------------------------------------------------

/// Score of a candidate flip-flop cell, lower is better:
/// `(beta * power * 1e-3 + gamma * area) / bits + alpha * T(cell) * scale`.
///
/// `timing_scale` is 1000 when ranking cells inside an equivalence group and
/// 1 for the local comparisons of the substituter; the asymmetry is part of
/// the calibrated behavior and the two values live on `EngineConfig`.
pub fn ff_score(ctx: &DesignContext, cell_name: &str, timing_scale: float) -> float {
    let Some(cell) = ctx.get_cell(cell_name) else {
        return float::INFINITY;
    };
    if !cell.is_flip_flop() {
        return float::INFINITY;
    }
    let bits = cell.bit_width.max(1).float();
    let delta = ctx.weights.alpha * ctx.timing_surrogate(cell_name) * timing_scale;
    (ctx.weights.beta * cell.leakage_power * 1e-3 + ctx.weights.gamma * cell.area) / bits + delta
}

// --------------------------------------------------------------------------------
// ## Signatures and group keys
// --------------------------------------------------------------------------------

/// Signature string over a set of pin kinds in the canonical order
/// D, Q, QN, CK, SI, SE, R, RD, S, SD, RS, SR. Empty sets render as `BASIC`.
pub fn signature_of_kinds(kinds: impl IntoIterator<Item = FfPinKind>) -> String {
    let tokens = kinds
        .into_iter()
        .filter(|k| k.signature_token().is_some())
        .collect::<Set<_>>()
        .into_iter()
        .sorted_unstable()
        .map(|k| k.signature_token().unwrap())
        .join("_");
    if tokens.is_empty() {
        "BASIC".to_string()
    } else {
        tokens
    }
}

/// Nominal signature of a cell template, derived from its pin list.
pub fn cell_pin_signature(cell: &CellTemplate) -> String {
    signature_of_kinds(cell.pins.iter().map(|p| p.kind))
}

/// Effective signature of an instance: kinds whose connection is active.
pub fn effective_pin_signature(instance: &Instance) -> String {
    signature_of_kinds(instance.active_pin_kinds())
}

/// `EDGE|SIGNATURE|<bits>bit` cell-equivalence group key.
pub fn group_key(edge: ClockEdge, signature: &str, bits: uint) -> String {
    format!("{}|{}|{}bit", edge.as_str(), signature, bits)
}

/// Rewrites the bit-width component of a group key.
pub fn group_key_with_bits(key: &str, bits: uint) -> Option<String> {
    let last_pipe = key.rfind('|')?;
    Some(format!("{}|{}bit", &key[..last_pipe], bits))
}

/// Clock edge of an instance: the template's parsed edge wins, the cell-name
/// substring rule is the fallback.
pub fn instance_clock_edge(instance: &Instance) -> ClockEdge {
    match instance.cell.clock_edge {
        ClockEdge::Unknown => ClockEdge::from_cell_name(&instance.cell.name),
        edge => edge,
    }
}

/// Scan-chain tag for the substitution group key. Instances with an active
/// SI or SE connection belong to their detected chain, or to
/// `UNASSIGNED_SCAN` when detection found none; everything else is
/// `NON_SCAN`.
pub fn scan_chain_tag(instance: &Instance, ctx: &DesignContext) -> String {
    let in_scan = instance.has_active_pin_of(FfPinKind::Si)
        || instance.has_active_pin_of(FfPinKind::Se);
    if !in_scan {
        return "NON_SCAN".to_string();
    }
    for chain in &ctx.scan_chains {
        if chain.elements.iter().any(|e| e.instance == instance.name) {
            return chain.name.clone();
        }
    }
    "UNASSIGNED_SCAN".to_string()
}

fn clock_domain_tag(instance: &Instance) -> String {
    instance
        .clock_net()
        .map_or_else(|| "UNKNOWN_CLK".to_string(), ToString::to_string)
}

/// `scanChain|hierarchy|clockNet` — the pre-banking substitution
/// granularity.
pub fn substitution_group_key(instance: &Instance, ctx: &DesignContext) -> String {
    format!(
        "{}|{}|{}",
        scan_chain_tag(instance, ctx),
        instance.hierarchy(),
        clock_domain_tag(instance)
    )
}

/// `hierarchy|clockNet` — the banking granularity. Cross-hierarchy and
/// cross-clock banking are disallowed by construction.
pub fn banking_group_key(instance: &Instance) -> String {
    format!("{}|{}", instance.hierarchy(), clock_domain_tag(instance))
}

/// Groups FF instance names by a key function, preserving the deterministic
/// instance-table order within each group.
pub fn group_ff_instances<F>(ctx: &DesignContext, key_fn: F) -> IndexMap<String, Vec<String>>
where
    F: Fn(&Instance) -> String,
{
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::default();
    for (name, instance) in &ctx.instances {
        if !instance.is_flip_flop() {
            continue;
        }
        groups.entry(key_fn(instance)).or_default().push(name.clone());
    }
    groups
}

// --------------------------------------------------------------------------------
// ## Cell-equivalence groups and the optimal-cell cache
// --------------------------------------------------------------------------------

/// Library-wide equivalence groups `(edge, pin signature, bit width)` with
/// the single best cell per group cached up front.
#[derive(Debug, Default)]
pub struct CellGroups {
    pub groups: IndexMap<String, Vec<String>>,
    /// Cell name -> the group it belongs to.
    pub cell_to_group: Dict<String, String>,
    /// Group key -> lowest-scoring member.
    pub optimal: Dict<String, String>,
}

impl CellGroups {
    /// Builds the groups over the loaded library and caches the per-group
    /// optimum using the group timing scale.
    #[time("build cell groups")]
    pub fn build(ctx: &DesignContext, group_timing_scale: float) -> Self {
        let mut groups: IndexMap<String, Vec<String>> = IndexMap::default();
        let mut cell_to_group = Dict::default();

        for cell in ctx.cells.values() {
            if !cell.is_flip_flop() {
                continue;
            }
            let key = group_key(
                cell.clock_edge,
                &cell_pin_signature(cell),
                cell.bit_width.max(1),
            );
            cell_to_group.insert(cell.name.clone(), key.clone());
            groups.entry(key).or_default().push(cell.name.clone());
        }

        let mut optimal = Dict::default();
        for (key, members) in &groups {
            let best = members
                .iter()
                .min_by_key(|name| OrderedFloat(ff_score(ctx, name, group_timing_scale)));
            if let Some(best) = best {
                debug!(
                    "group [{}]: best {} (score {:.6})",
                    key,
                    best,
                    ff_score(ctx, best, group_timing_scale)
                );
                optimal.insert(key.clone(), best.clone());
            }
        }
        info!(
            "built {} cell-equivalence groups over {} FF cells",
            groups.len(),
            cell_to_group.len()
        );

        Self {
            groups,
            cell_to_group,
            optimal,
        }
    }

    pub fn group_of_cell(&self, cell_name: &str) -> Option<&String> {
        self.cell_to_group.get(cell_name)
    }

    pub fn optimal_for(&self, key: &str) -> Option<&String> {
        self.optimal.get(key)
    }
}

// --------------------------------------------------------------------------------
// ## Banking-type assignment
// --------------------------------------------------------------------------------

/// Falling-edge `FSDN` cells bank through the FSDN two-phase flow; rising
/// `FDP`/`LSRDPQ` cells bank through the LSRDPQ flow; everything else does
/// not bank.
pub fn assign_banking_kinds(ctx: &mut DesignContext) -> (usize, usize, usize) {
    let mut fsdn = 0;
    let mut lsrdpq = 0;
    let mut none = 0;

    for instance in ctx.instances.values_mut() {
        if !instance.is_flip_flop() {
            continue;
        }
        let edge = instance_clock_edge(instance);
        let cell_name = instance.cell.name.clone();

        instance.banking_kind = if edge == ClockEdge::Falling && cell_name.contains("FSDN") {
            fsdn += 1;
            BankingKind::Fsdn
        } else if edge == ClockEdge::Rising
            && (cell_name.contains("FDP") || cell_name.contains("LSRDPQ"))
        {
            lsrdpq += 1;
            BankingKind::RisingLsrdpq
        } else {
            none += 1;
            BankingKind::None
        };
    }
    info!(
        "banking types: {} FSDN, {} RISING_LSRDPQ, {} NONE",
        fsdn, lsrdpq, none
    );
    (fsdn, lsrdpq, none)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ff_cell(name: &str, pins: &[&str], bits: uint, clocked_on: &str) -> CellTemplate {
        CellTemplate::builder()
            .name(name)
            .kind(CellKind::FlipFlop)
            .bit_width(bits)
            .pins(
                pins.iter()
                    .map(|p| Pin::new(*p, PinDirection::In, PinUsage::Signal))
                    .collect(),
            )
            .clocked_on(clocked_on)
            .build()
    }

    #[test]
    fn signature_uses_canonical_order() {
        let cell = ff_cell("X_FSDN", &["SE", "SI", "CK", "QN", "Q", "D"], 1, "!CK");
        assert_eq!(cell_pin_signature(&cell), "D_Q_QN_CK_SI_SE");

        let with_sets = ff_cell("Y_FSDN", &["S", "RD", "R", "SD", "CK", "D", "Q"], 1, "!CK");
        assert_eq!(cell_pin_signature(&with_sets), "D_Q_CK_R_RD_S_SD");
    }

    #[test]
    fn duplicate_kinds_collapse() {
        let cell = ff_cell("M_FSDN4", &["D0", "D1", "D2", "D3", "Q0", "Q1", "Q2", "Q3", "CK"], 4, "!CK");
        assert_eq!(cell_pin_signature(&cell), "D_Q_CK");
    }

    #[test]
    fn optimal_cache_picks_the_argmin() {
        let mut ctx = DesignContext::new("t");
        ctx.weights = ObjectiveWeights::builder().beta(1.0).gamma(1.0).build();
        let mut expensive = ff_cell("A_FSDN", &["D", "Q", "CK"], 1, "!CK");
        expensive.area = 10.0;
        expensive.leakage_power = 10.0;
        let mut cheap = ff_cell("B_FSDN", &["D", "Q", "CK"], 1, "!CK");
        cheap.area = 1.0;
        cheap.leakage_power = 1.0;
        ctx.add_cell(expensive);
        ctx.add_cell(cheap);

        let groups = CellGroups::build(&ctx, 1000.0);
        let key = group_key(ClockEdge::Falling, "D_Q_CK", 1);
        assert_eq!(groups.optimal_for(&key).unwrap(), "B_FSDN");
        assert_eq!(groups.group_of_cell("A_FSDN").unwrap(), &key);
    }

    #[test]
    fn per_bit_normalization_favors_wide_cells() {
        let mut ctx = DesignContext::new("t");
        ctx.weights = ObjectiveWeights::builder().gamma(1.0).build();
        let mut one = ff_cell("ONE_FSDN", &["D", "Q", "CK"], 1, "!CK");
        one.area = 4.0;
        let mut four = ff_cell("FOUR_FSDN4", &["D0", "Q0", "CK"], 4, "!CK");
        four.area = 8.0;
        ctx.add_cell(one);
        ctx.add_cell(four);

        assert!(ff_score(&ctx, "FOUR_FSDN4", 1.0) < ff_score(&ctx, "ONE_FSDN", 1.0));
        assert!(ff_score(&ctx, "MISSING", 1.0).is_infinite());
    }

    #[test]
    fn banking_kind_assignment() {
        let mut ctx = DesignContext::new("t");
        let fsdn = ctx.add_cell(ff_cell("X_FSDN_V2", &["D", "Q", "CK"], 1, "!CK"));
        let fdp = ctx.add_cell(ff_cell("X_FDPQ_V2", &["D", "Q", "CK"], 1, "CK"));
        let other = ctx.add_cell(ff_cell("X_SDFF", &["D", "Q", "CK"], 1, "CK"));
        for (i, cell) in [fsdn, fdp, other].into_iter().enumerate() {
            ctx.add_instance(
                Instance::builder()
                    .name(format!("u{i}"))
                    .cell(cell)
                    .build(),
            );
        }
        let (fsdn_n, lsrdpq_n, none_n) = assign_banking_kinds(&mut ctx);
        assert_eq!((fsdn_n, lsrdpq_n, none_n), (1, 1, 1));
        assert_eq!(ctx.instances["u0"].banking_kind, BankingKind::Fsdn);
        assert_eq!(ctx.instances["u1"].banking_kind, BankingKind::RisingLsrdpq);
        assert_eq!(ctx.instances["u2"].banking_kind, BankingKind::None);
    }

    #[test]
    fn effective_signature_drops_grounded_pins() {
        let mut ctx = DesignContext::new("t");
        let cell = ctx.add_cell(ff_cell("Z_FSDN", &["D", "Q", "QN", "CK", "SI", "SE"], 1, "!CK"));
        ctx.add_instance(
            Instance::builder()
                .name("u1")
                .cell(cell)
                .connections(vec![
                    Connection::new("D", "n1"),
                    Connection::new("Q", "n2"),
                    Connection::new("QN", "VSS"),
                    Connection::new("CK", "clk"),
                    Connection::new("SI", "SYNOPSYS_UNCONNECTED_1"),
                    Connection::new("SE", "VDD"),
                ])
                .build(),
        );
        // QN tied to ground and SI unconnected are absent; SE tied high stays.
        assert_eq!(
            effective_pin_signature(&ctx.instances["u1"]),
            "D_Q_CK_SE"
        );
    }
}
