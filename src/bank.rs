use crate::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct BankingStats {
    pub rebanked_clusters: usize,
    pub fsdn2_created: usize,
    pub fsdn4_created: usize,
    pub lsrdpq4_created: usize,
    pub final_2bit: usize,
    pub operations_recorded: usize,
    pub skipped_groups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BankingOpKind {
    DebankClusterRebank,
    Fsdn2,
    Fsdn4,
    Lsrdpq4,
}

#[derive(Debug, Clone)]
struct BankingOp {
    sources: Vec<BankedSource>,
    result_name: String,
    result_cell: String,
    pin_mapping: IndexMap<String, String>,
    kind: BankingOpKind,
}

/// Re-clusters single-bit FFs into 2-bit and 4-bit MBFFs within each
/// `(module, clockNet)` group:
///
/// - Pass A gives fragments of one original multi-bit FF priority to
///   reconstitute as `<cluster>_REBANKED`;
/// - Pass B banks falling-edge FSDN instances 1 -> 2 -> 4 bits by greedy
///   spatial pairing;
/// - Pass C banks rising-edge LSRDPQ/FDP instances straight to 4 bits.
///
/// BANK records are emitted once, after all passes, with pin mappings that
/// reach from the original single-bit sources to the final cell so the
/// trail never names intermediate 2-bit results.
#[derive(Debug)]
pub struct Banker {
    distance_threshold: float,
    ops: Vec<BankingOp>,
    /// 2-bit result name -> the 1-bit sources it was built from.
    original_sources: IndexMap<String, Vec<BankedSource>>,
    consumed_2bit: Set<String>,
    fsdn2_counter: uint,
    fsdn4_counter: uint,
    lsrdpq_counter: uint,
    pub stats: BankingStats,
}

impl Banker {
    pub fn new(distance_threshold: float) -> Self {
        Self {
            distance_threshold,
            ops: Vec::new(),
            original_sources: IndexMap::default(),
            consumed_2bit: Set::default(),
            fsdn2_counter: 0,
            fsdn4_counter: 0,
            lsrdpq_counter: 0,
            stats: BankingStats::default(),
        }
    }

    #[time("banking")]
    pub fn run(
        &mut self,
        ctx: &mut DesignContext,
        groups: &CellGroups,
        tracker: &mut TransformationTracker,
    ) -> BankingStats {
        self.pass_a_rebank_clusters(ctx, groups);
        self.pass_b_fsdn_two_phase(ctx, groups);
        self.pass_c_lsrdpq(ctx, groups);
        self.finalize_two_bit_records(ctx);
        self.record_all(tracker);
        info!(
            "banking: {} rebanked clusters, {} FSDN2, {} FSDN4, {} LSRDPQ4, {} final 2-bit",
            self.stats.rebanked_clusters,
            self.stats.fsdn2_created,
            self.stats.fsdn4_created,
            self.stats.lsrdpq4_created,
            self.stats.final_2bit
        );
        self.stats
    }

    // ----------------------------------------------------------------------------
    // ### Pass A — debank-cluster rebanking
    // ----------------------------------------------------------------------------

    fn pass_a_rebank_clusters(&mut self, ctx: &mut DesignContext, groups: &CellGroups) {
        let mut clusters: IndexMap<String, Vec<String>> = IndexMap::default();
        for (name, instance) in &ctx.instances {
            if !instance.is_flip_flop() || instance.banking_kind == BankingKind::None {
                continue;
            }
            let Some(cluster_id) = &instance.cluster_id else {
                continue;
            };
            clusters.entry(cluster_id.clone()).or_default().push(name.clone());
        }

        for (cluster_id, mut members) in clusters {
            if members.len() < 2 {
                continue;
            }
            members.sort_unstable();

            let kind = ctx.instances[&members[0]].banking_kind;
            let (target_bits, target_key) = match kind {
                BankingKind::Fsdn if members.len() >= 4 => {
                    (4, group_key(ClockEdge::Falling, "D_Q_QN_CK_SI_SE", 4))
                }
                BankingKind::Fsdn => (2, group_key(ClockEdge::Falling, "D_Q_QN_CK_SI_SE", 2)),
                BankingKind::RisingLsrdpq if members.len() >= 4 => {
                    (4, group_key(ClockEdge::Rising, "D_Q_QN_CK", 4))
                }
                _ => continue,
            };
            let Some(optimal) = groups.optimal_for(&target_key) else {
                self.stats.skipped_groups += 1;
                continue;
            };
            let Some(result_cell) = ctx.get_cell(optimal).cloned() else {
                self.stats.skipped_groups += 1;
                continue;
            };

            let sources = members
                .iter()
                .take(target_bits)
                .map(|name| BankedSource::of(&ctx.instances[name]))
                .collect_vec();
            let result_name = format!("{cluster_id}_REBANKED");
            debug!(
                "rebanking cluster {} -> {} ({})",
                cluster_id, result_name, result_cell.name
            );

            let pin_mapping = complete_pin_mapping(&sources, &result_name, &result_cell.name);
            self.build_result(ctx, &sources, &result_name, result_cell.clone(), Some(cluster_id));
            self.ops.push(BankingOp {
                sources,
                result_name,
                result_cell: result_cell.name.clone(),
                pin_mapping,
                kind: BankingOpKind::DebankClusterRebank,
            });
            self.stats.rebanked_clusters += 1;
        }
    }

    // ----------------------------------------------------------------------------
    // ### Pass B — FSDN two-phase banking
    // ----------------------------------------------------------------------------

    fn pass_b_fsdn_two_phase(&mut self, ctx: &mut DesignContext, groups: &CellGroups) {
        let group_keys = group_ff_instances(ctx, banking_group_key)
            .into_keys()
            .collect_vec();

        for gkey in group_keys {
            // Phase 1: 1-bit -> 2-bit pairs.
            let singles = collect_group_members(ctx, &gkey, BankingKind::Fsdn, 1);
            for pair in self.greedy_clusters(ctx, &singles, 2) {
                let first_cell = ctx.instances[&pair[0]].cell.name.clone();
                let Some(target_key) = groups
                    .group_of_cell(&first_cell)
                    .and_then(|k| group_key_with_bits(k, 2))
                else {
                    continue;
                };
                let Some(optimal) = groups.optimal_for(&target_key) else {
                    self.stats.skipped_groups += 1;
                    continue;
                };
                let Some(result_cell) = ctx.get_cell(optimal).cloned() else {
                    continue;
                };

                self.fsdn2_counter += 1;
                let result_name =
                    prefixed_name(&pair[0], &format!("ff_fsdn2_{}", self.fsdn2_counter));
                let sources = pair
                    .iter()
                    .map(|name| BankedSource::of(&ctx.instances[name]))
                    .collect_vec();

                // The banking operation is deferred: the pair either folds
                // into a 4-bit result in phase 2 or is finalized as a 2-bit
                // operation after all passes.
                self.build_result(ctx, &sources, &result_name, result_cell, None);
                self.original_sources.insert(result_name, sources);
                self.stats.fsdn2_created += 1;
            }

            // Phase 2: 2-bit -> 4-bit pairs, including pre-existing 2-bit FFs
            // still in the group.
            let doubles = collect_group_members(ctx, &gkey, BankingKind::Fsdn, 2);
            for pair in self.greedy_clusters(ctx, &doubles, 2) {
                let first_cell = ctx.instances[&pair[0]].cell.name.clone();
                let Some(target_key) = groups
                    .group_of_cell(&first_cell)
                    .and_then(|k| group_key_with_bits(k, 4))
                else {
                    continue;
                };
                let Some(optimal) = groups.optimal_for(&target_key) else {
                    self.stats.skipped_groups += 1;
                    continue;
                };
                let Some(result_cell) = ctx.get_cell(optimal).cloned() else {
                    continue;
                };

                self.fsdn4_counter += 1;
                let result_name =
                    prefixed_name(&pair[0], &format!("ff_fsdn4_{}", self.fsdn4_counter));

                // The audit trail reaches back to the 1-bit originals. A
                // 2-bit FF the design started with has no constituents to
                // reach for: it enters as its own original, and its 2-bit
                // cell travels on the record so the source widths still sum
                // to the result width.
                let mut originals = Vec::new();
                for two_bit in &pair {
                    match self.original_sources.get(two_bit) {
                        Some(sources) => originals.extend(sources.iter().cloned()),
                        None => originals.push(BankedSource::of(&ctx.instances[two_bit])),
                    }
                    self.consumed_2bit.insert(two_bit.clone());
                }

                let two_bit_sources = pair
                    .iter()
                    .map(|name| BankedSource::of(&ctx.instances[name]))
                    .collect_vec();
                let connections = map_2bit_to_4bit(&two_bit_sources);
                let pin_mapping =
                    complete_pin_mapping(&originals, &result_name, &result_cell.name);

                for name in &pair {
                    ctx.remove_instance(name);
                }
                self.insert_result(ctx, &result_name, result_cell.clone(), connections, &two_bit_sources, None);
                self.ops.push(BankingOp {
                    sources: originals,
                    result_name,
                    result_cell: result_cell.name.clone(),
                    pin_mapping,
                    kind: BankingOpKind::Fsdn4,
                });
                self.stats.fsdn4_created += 1;
            }
        }
    }

    // ----------------------------------------------------------------------------
    // ### Pass C — LSRDPQ single-phase banking
    // ----------------------------------------------------------------------------

    fn pass_c_lsrdpq(&mut self, ctx: &mut DesignContext, groups: &CellGroups) {
        let target_key = group_key(ClockEdge::Rising, "D_Q_QN_CK", 4);
        let group_keys = group_ff_instances(ctx, banking_group_key)
            .into_keys()
            .collect_vec();

        for gkey in group_keys {
            let singles = collect_group_members(ctx, &gkey, BankingKind::RisingLsrdpq, 1);
            for quad in self.greedy_clusters(ctx, &singles, 4) {
                let Some(optimal) = groups.optimal_for(&target_key) else {
                    self.stats.skipped_groups += 1;
                    continue;
                };
                let Some(result_cell) = ctx.get_cell(optimal).cloned() else {
                    continue;
                };

                self.lsrdpq_counter += 1;
                let result_name =
                    prefixed_name(&quad[0], &format!("ff_lsrdpq4_{}", self.lsrdpq_counter));
                let sources = quad
                    .iter()
                    .map(|name| BankedSource::of(&ctx.instances[name]))
                    .collect_vec();

                let pin_mapping =
                    complete_pin_mapping(&sources, &result_name, &result_cell.name);
                self.build_result(ctx, &sources, &result_name, result_cell.clone(), None);
                self.ops.push(BankingOp {
                    sources,
                    result_name,
                    result_cell: result_cell.name.clone(),
                    pin_mapping,
                    kind: BankingOpKind::Lsrdpq4,
                });
                self.stats.lsrdpq4_created += 1;
            }
        }
    }

    // ----------------------------------------------------------------------------
    // ### Shared machinery
    // ----------------------------------------------------------------------------

    /// Greedy left-to-right sweep: instances sorted by x, a cluster grows
    /// from its seed until it reaches `target` members or the next instance
    /// is farther than the threshold from the seed. Only exact-size clusters
    /// are kept.
    fn greedy_clusters(
        &self,
        ctx: &DesignContext,
        names: &[String],
        target: usize,
    ) -> Vec<Vec<String>> {
        let sorted = names
            .iter()
            .sorted_by_key(|name| {
                (
                    OrderedFloat(ctx.instances[*name].position.x),
                    (*name).clone(),
                )
            })
            .collect_vec();

        let mut used = vec![false; sorted.len()];
        let mut clusters = Vec::new();
        for i in 0..sorted.len() {
            if used[i] {
                continue;
            }
            let seed_pos = ctx.instances[sorted[i]].position;
            let mut cluster = vec![i];
            for j in (i + 1)..sorted.len() {
                if used[j] {
                    continue;
                }
                let pos = ctx.instances[sorted[j]].position;
                if seed_pos.manhattan_to(&pos) > self.distance_threshold {
                    break;
                }
                cluster.push(j);
                if cluster.len() == target {
                    break;
                }
            }
            if cluster.len() == target {
                for &k in &cluster {
                    used[k] = true;
                }
                clusters.push(cluster.into_iter().map(|k| sorted[k].clone()).collect());
            }
        }
        clusters
    }

    /// Removes the single-bit sources from the design and inserts the
    /// synthesized multi-bit instance in their place.
    fn build_result(
        &mut self,
        ctx: &mut DesignContext,
        sources: &[BankedSource],
        result_name: &str,
        result_cell: Shared<CellTemplate>,
        cluster_id: Option<String>,
    ) {
        let connections = map_singlebit_to_multibit(sources, &result_cell);
        for source in sources {
            ctx.remove_instance(&source.name);
        }
        self.insert_result(ctx, result_name, result_cell, connections, sources, cluster_id);
    }

    fn insert_result(
        &mut self,
        ctx: &mut DesignContext,
        result_name: &str,
        result_cell: Shared<CellTemplate>,
        connections: Vec<Connection>,
        sources: &[BankedSource],
        cluster_id: Option<String>,
    ) {
        let center_x = sources.iter().map(|s| s.position.x).sum::<float>() / sources.len().float();
        let center_y = sources.iter().map(|s| s.position.y).sum::<float>() / sources.len().float();
        let banking_kind = if result_cell.name.contains("LSRDPQ") {
            BankingKind::RisingLsrdpq
        } else {
            BankingKind::Fsdn
        };
        let module = sources
            .first()
            .and_then(|s| s.name.rfind('/').map(|p| s.name[..p].to_string()))
            .unwrap_or_default();

        let mut result = Instance::builder()
            .name(result_name)
            .cell(result_cell)
            .module(module)
            .position(Point::new(center_x, center_y))
            .orientation(sources.first().map_or(Orientation::N, |s| s.orientation))
            .connections(connections)
            .build();
        result.banking_kind = banking_kind;
        result.cluster_id = cluster_id;
        ctx.add_instance(result);
    }

    /// 2-bit results not absorbed into a 4-bit cell become final 2-bit
    /// banking operations against their original single-bit sources.
    fn finalize_two_bit_records(&mut self, ctx: &DesignContext) {
        let pending = self
            .original_sources
            .iter()
            .filter(|(name, _)| !self.consumed_2bit.contains(*name))
            .map(|(name, sources)| (name.clone(), sources.clone()))
            .collect_vec();

        for (two_bit_name, sources) in pending {
            let Some(instance) = ctx.instances.get(&two_bit_name) else {
                continue;
            };
            let pin_mapping =
                complete_pin_mapping(&sources, &two_bit_name, &instance.cell.name);
            self.ops.push(BankingOp {
                sources,
                result_name: two_bit_name,
                result_cell: instance.cell.name.clone(),
                pin_mapping,
                kind: BankingOpKind::Fsdn2,
            });
            self.stats.final_2bit += 1;
        }
    }

    fn record_all(&mut self, tracker: &mut TransformationTracker) {
        for op in &self.ops {
            tracker.record_bank(&op.sources, &op.result_name, &op.result_cell, op.pin_mapping.clone());
            self.stats.operations_recorded += 1;
            debug!(
                "BANK {:?}: {} <- [{}]",
                op.kind,
                op.result_name,
                op.sources.iter().map(|s| s.name.as_str()).join(", ")
            );
        }
        self.ops.clear();
        self.original_sources.clear();
        self.consumed_2bit.clear();
    }
}

/// FF members of one banking group with the wanted kind and bit width, in
/// deterministic table order.
fn collect_group_members(
    ctx: &DesignContext,
    gkey: &str,
    kind: BankingKind,
    bits: uint,
) -> Vec<String> {
    ctx.instances
        .iter()
        .filter(|(_, inst)| {
            inst.is_flip_flop()
                && inst.banking_kind == kind
                && inst.bit_width() == bits
                && banking_group_key(inst) == gkey
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// New instances stay inside the hierarchy of their first source.
fn prefixed_name(source_name: &str, base: &str) -> String {
    match source_name.rfind('/') {
        Some(pos) => format!("{}/{}", &source_name[..pos], base),
        None => base.to_string(),
    }
}

fn split_data_pin(pin: &str) -> Option<(&'static str, Option<usize>)> {
    for base in ["QN", "D", "Q"] {
        if let Some(rest) = pin.strip_prefix(base) {
            if rest.is_empty() {
                return Some((base, None));
            }
            if let Ok(idx) = rest.parse::<usize>() {
                return Some((base, Some(idx)));
            }
        }
    }
    None
}

/// Connections of an N-bit result built from 1-bit sources: the i-th
/// source's data pins become `D<i>`/`Q<i>`/`QN<i>` (1-based for LSRDPQ
/// cells), shared control pins come from source 0.
fn map_singlebit_to_multibit(
    sources: &[BankedSource],
    result_cell: &CellTemplate,
) -> Vec<Connection> {
    let offset = usize::from(result_cell.name.contains("LSRDPQ"));
    let mut connections = Vec::new();
    for (i, source) in sources.iter().enumerate() {
        for conn in &source.connections {
            match split_data_pin(&conn.pin) {
                Some((base, _)) => {
                    connections.push(Connection::new(
                        format!("{}{}", base, i + offset),
                        conn.net.clone(),
                    ));
                }
                None if i == 0 => connections.push(conn.clone()),
                None => {}
            }
        }
    }
    connections
}

/// Connections of a 4-bit result from two 2-bit sources: source 0's
/// `D0,D1` feed `D0,D1`, source 1's feed `D2,D3`; shared pins from source 0.
fn map_2bit_to_4bit(sources: &[BankedSource]) -> Vec<Connection> {
    let mut connections = Vec::new();
    for (i, source) in sources.iter().enumerate().take(2) {
        for conn in &source.connections {
            match split_data_pin(&conn.pin) {
                Some((base, Some(idx))) if idx < 2 => {
                    connections.push(Connection::new(
                        format!("{}{}", base, i * 2 + idx),
                        conn.net.clone(),
                    ));
                }
                Some(_) => {}
                None if i == 0 => connections.push(conn.clone()),
                None => {}
            }
        }
    }
    connections
}

/// End-to-end pin mapping from original sources (1- or 2-bit) to the final
/// cell, keyed by full `instance/pin` paths. Data pins are bit-indexed by a
/// running cursor over the sources; shared pins of every source land on the
/// same unindexed result pin.
fn complete_pin_mapping(
    sources: &[BankedSource],
    result_name: &str,
    result_cell_name: &str,
) -> IndexMap<String, String> {
    let offset = usize::from(result_cell_name.contains("LSRDPQ"));
    let mut mapping = IndexMap::default();
    let mut cursor = 0usize;
    for source in sources {
        for conn in &source.connections {
            let target = match split_data_pin(&conn.pin) {
                Some((base, idx)) => {
                    format!("{}{}", base, cursor + idx.unwrap_or(0) + offset)
                }
                None => conn.pin.clone(),
            };
            mapping.insert(
                format!("{}/{}", source.name, conn.pin),
                format!("{result_name}/{target}"),
            );
        }
        cursor += source.bit_width.usize();
    }
    mapping
}
