use crate::*;
use serde::Serialize;

// --------------------------------------------------------------------------------
// ## Records
// --------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    Keep,
    Debank,
    Substitute,
    Bank,
    PostSubstitute,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Keep => "KEEP",
            Operation::Debank => "DEBANK",
            Operation::Substitute => "SUBSTITUTE",
            Operation::Bank => "BANK",
            Operation::PostSubstitute => "POST_SUBSTITUTE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStage {
    Original,
    Debank,
    Substitution,
    Bank,
    PostBanking,
    Legalize,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Original,
        PipelineStage::Debank,
        PipelineStage::Substitution,
        PipelineStage::Bank,
        PipelineStage::PostBanking,
        PipelineStage::Legalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Original => "ORIGINAL",
            PipelineStage::Debank => "DEBANK",
            PipelineStage::Substitution => "SUBSTITUTION",
            PipelineStage::Bank => "BANK",
            PipelineStage::PostBanking => "POST_BANKING",
            PipelineStage::Legalize => "LEGALIZE",
        }
    }

    /// The operation kind whose records belong to this stage.
    fn captured_operation(self) -> Option<Operation> {
        match self {
            PipelineStage::Original => None,
            PipelineStage::Debank => Some(Operation::Debank),
            PipelineStage::Substitution => Some(Operation::Substitute),
            PipelineStage::Bank => Some(Operation::Bank),
            PipelineStage::PostBanking => Some(Operation::PostSubstitute),
            PipelineStage::Legalize => Some(Operation::Keep),
        }
    }
}

/// One atomic operation of the transformation trail. Append-only.
#[derive(Debug, Clone)]
pub struct TransformationRecord {
    pub operation: Operation,
    pub original_name: String,
    pub result_name: String,
    pub original_cell: String,
    pub result_cell: String,
    /// original pin -> result pin. Banking records key by full
    /// `instance/pin` paths because they fold several sources into one
    /// result.
    pub pin_mapping: IndexMap<String, String>,
    pub related_instances: SmallVec<[String; 4]>,
    /// Cell of each related instance, parallel to `related_instances`.
    /// Related sources are removed from the design when banked, so their
    /// bit widths stay resolvable only through this list; a banking input
    /// may be wider than one bit when a pre-existing 2-bit FF folds into a
    /// 4-bit result.
    pub related_cells: SmallVec<[String; 4]>,
    pub result_x: float,
    pub result_y: float,
    pub result_orientation: Orientation,
    pub cluster_id: String,
    pub stage: PipelineStage,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub name: String,
    pub cell_type: String,
    pub x: float,
    pub y: float,
    pub orientation: String,
    pub pin_connections: Vec<(String, String)>,
    pub cluster_id: String,
    pub original_name: String,
    pub last_operation: Option<Operation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub stage: PipelineStage,
    pub instances: Vec<InstanceSnapshot>,
    pub record_indices: Vec<usize>,
}

// --------------------------------------------------------------------------------
// ## Tracker
// --------------------------------------------------------------------------------

/// Append-only audit trail of the pipeline plus the per-stage snapshots,
/// the debank side map used to collapse `_BIT` intermediates, and the
/// dummy-name minting for the operation log.
#[derive(Debug, Default)]
pub struct TransformationTracker {
    pub history: Vec<TransformationRecord>,
    pub stages: Vec<StageSnapshot>,
    /// Connections of every FF as they were before any transformation.
    initial_connections: Dict<String, Vec<Connection>>,
    /// `orig/D2` -> `orig_BIT2/D`, recorded at debank time.
    debank_pin_map: IndexMap<String, String>,
    /// fragment name -> original multi-bit name.
    fragment_birth: Dict<String, String>,
    /// fragment name -> its wired pin names at birth.
    fragment_pins: Dict<String, Vec<String>>,
    dummy_counter: uint,
    real_to_dummy: Dict<String, String>,
    pub dummy_to_real: IndexMap<String, String>,
}

impl TransformationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one KEEP record per FF instance (identity pin mapping) and
    /// captures the Original stage.
    #[time("initialize transformation tracking")]
    pub fn initialize(&mut self, ctx: &mut DesignContext) {
        self.history.clear();
        self.stages.clear();
        self.initial_connections.clear();

        let ff_names = ctx.flip_flop_names();
        for name in &ff_names {
            let instance = ctx.instances.get_mut(name).unwrap();
            instance.cluster_id = Some(name.clone());
        }
        for name in &ff_names {
            let instance = &ctx.instances[name];
            self.initial_connections
                .insert(name.clone(), instance.connections.clone());

            let pin_mapping = instance
                .connections
                .iter()
                .map(|c| (c.pin.clone(), c.pin.clone()))
                .collect();
            self.history.push(TransformationRecord {
                operation: Operation::Keep,
                original_name: name.clone(),
                result_name: name.clone(),
                original_cell: instance.cell.name.clone(),
                result_cell: instance.cell.name.clone(),
                pin_mapping,
                related_instances: SmallVec::new(),
                related_cells: SmallVec::new(),
                result_x: instance.position.x,
                result_y: instance.position.y,
                result_orientation: instance.orientation,
                cluster_id: name.clone(),
                stage: PipelineStage::Original,
            });
        }
        info!("initialized {} KEEP records", self.history.len());
        self.capture_stage(PipelineStage::Original, ctx);
    }

    pub fn push(&mut self, record: TransformationRecord) -> usize {
        self.history.push(record);
        self.history.len() - 1
    }

    /// Drops the fallback KEEP of an instance that was debanked or banked.
    pub fn remove_keep(&mut self, instance_name: &str) {
        self.history.retain(|r| {
            !(r.operation == Operation::Keep
                && r.stage == PipelineStage::Original
                && r.original_name == instance_name)
        });
    }

    /// Registers a debank side-map entry (`orig/D2` -> `orig_BIT2/D`).
    pub fn note_debank_mapping(
        &mut self,
        original: &str,
        original_pin: &str,
        fragment: &str,
        fragment_pin: &str,
    ) {
        self.debank_pin_map.insert(
            format!("{original}/{original_pin}"),
            format!("{fragment}/{fragment_pin}"),
        );
        self.fragment_birth
            .insert(fragment.to_string(), original.to_string());
        self.fragment_pins
            .entry(fragment.to_string())
            .or_default()
            .push(fragment_pin.to_string());
    }

    pub fn record_substitute(
        &mut self,
        instance: &Instance,
        original_cell: &str,
        stage: PipelineStage,
    ) {
        let operation = if stage == PipelineStage::PostBanking {
            Operation::PostSubstitute
        } else {
            Operation::Substitute
        };
        let pin_mapping = instance
            .connections
            .iter()
            .map(|c| (c.pin.clone(), c.pin.clone()))
            .collect();
        let cluster_id = self
            .inherited_cluster_id(&instance.name)
            .unwrap_or_else(|| instance.name.clone());
        self.history.push(TransformationRecord {
            operation,
            original_name: instance.name.clone(),
            result_name: instance.name.clone(),
            original_cell: original_cell.to_string(),
            result_cell: instance.cell.name.clone(),
            pin_mapping,
            related_instances: SmallVec::new(),
            related_cells: SmallVec::new(),
            result_x: instance.position.x,
            result_y: instance.position.y,
            result_orientation: instance.orientation,
            cluster_id,
            stage,
        });
    }

    fn inherited_cluster_id(&self, instance_name: &str) -> Option<String> {
        self.history
            .iter()
            .find(|r| {
                (r.original_name == instance_name || r.result_name == instance_name)
                    && !r.cluster_id.is_empty()
            })
            .map(|r| r.cluster_id.clone())
    }

    /// Records one BANK operation: the first source is the primary, the rest
    /// become related instances, and the KEEP fallbacks of all sources are
    /// dropped.
    pub fn record_bank(
        &mut self,
        sources: &[BankedSource],
        result_name: &str,
        result_cell: &str,
        pin_mapping: IndexMap<String, String>,
    ) {
        let Some(primary) = sources.first() else {
            return;
        };
        let cluster_id = self.inherited_cluster_id(&primary.name).unwrap_or_default();
        let record = TransformationRecord {
            operation: Operation::Bank,
            original_name: primary.name.clone(),
            result_name: result_name.to_string(),
            original_cell: primary.cell_name.clone(),
            result_cell: result_cell.to_string(),
            pin_mapping,
            related_instances: sources[1..].iter().map(|s| s.name.clone()).collect(),
            related_cells: sources[1..].iter().map(|s| s.cell_name.clone()).collect(),
            result_x: primary.position.x,
            result_y: primary.position.y,
            result_orientation: primary.orientation,
            cluster_id,
            stage: PipelineStage::Bank,
        };
        self.history.push(record);
        for source in sources {
            self.remove_keep(&source.name);
        }
    }

    /// KEEP records with the Legalize stage tag for every FF the legalizer
    /// moved; the instance position is advanced to the legal one.
    pub fn record_legalization(&mut self, ctx: &mut DesignContext) -> usize {
        let mut moved = 0;
        let ff_names = ctx.flip_flop_names();
        for name in ff_names {
            let instance = ctx.instances.get_mut(&name).unwrap();
            let Some(new_pos) = instance.new_position else {
                continue;
            };
            if instance.position.distance_to(&new_pos) <= 1e-6 {
                continue;
            }
            self.history.push(TransformationRecord {
                operation: Operation::Keep,
                original_name: name.clone(),
                result_name: name.clone(),
                original_cell: instance.cell.name.clone(),
                result_cell: instance.cell.name.clone(),
                pin_mapping: IndexMap::default(),
                related_instances: SmallVec::new(),
                related_cells: SmallVec::new(),
                result_x: new_pos.x,
                result_y: new_pos.y,
                result_orientation: instance.orientation,
                cluster_id: name.clone(),
                stage: PipelineStage::Legalize,
            });
            instance.position = new_pos;
            moved += 1;
        }
        info!("recorded {} legalization moves", moved);
        moved
    }

    /// Captures the FF population alive after a stage together with the
    /// indices of the records that stage generated.
    pub fn capture_stage(&mut self, stage: PipelineStage, ctx: &DesignContext) {
        let mut latest: Dict<&str, &TransformationRecord> = Dict::default();
        for record in &self.history {
            latest.insert(record.original_name.as_str(), record);
            latest.insert(record.result_name.as_str(), record);
        }

        let mut instances = Vec::new();
        for (name, instance) in &ctx.instances {
            if !instance.is_flip_flop() {
                continue;
            }
            let record = latest.get(name.as_str());
            instances.push(InstanceSnapshot {
                name: name.clone(),
                cell_type: instance.cell.name.clone(),
                x: instance.position.x,
                y: instance.position.y,
                orientation: instance.orientation.as_str().to_string(),
                pin_connections: instance
                    .connections
                    .iter()
                    .map(|c| (c.pin.clone(), c.net.clone()))
                    .collect(),
                cluster_id: record.map_or_else(String::new, |r| r.cluster_id.clone()),
                original_name: record.map_or_else(|| name.clone(), |r| r.original_name.clone()),
                last_operation: record.map(|r| r.operation),
            });
        }

        let record_indices = match stage.captured_operation() {
            None => Vec::new(),
            Some(op) => self
                .history
                .iter()
                .enumerate()
                .filter(|(_, r)| r.operation == op && (op != Operation::Keep || r.stage == stage))
                .map(|(i, _)| i)
                .collect(),
        };

        info!(
            "captured stage {} with {} FF instances, {} records",
            stage.as_str(),
            instances.len(),
            record_indices.len()
        );
        self.stages.push(StageSnapshot {
            stage,
            instances,
            record_indices,
        });
    }

    pub fn stage(&self, stage: PipelineStage) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn records_of(&self, operation: Operation) -> impl Iterator<Item = &TransformationRecord> {
        self.history.iter().filter(move |r| r.operation == operation)
    }

    /// Stage-by-stage textual listing of the captured pipeline, one block
    /// per stage with every FF's position, cluster and last operation.
    /// Handed to the external report writer.
    pub fn stage_report(&self) -> Vec<String> {
        let mut lines = vec![
            "=== STAGE-BY-STAGE PIPELINE REPORT ===".to_string(),
            String::new(),
        ];
        for snapshot in &self.stages {
            lines.push(format!("=== STAGE: {} ===", snapshot.stage.as_str()));
            lines.push(format!("Total FF instances: {}", snapshot.instances.len()));
            lines.push(format!(
                "Associated records: {}",
                snapshot.record_indices.len()
            ));
            lines.push(String::new());
            for (i, instance) in snapshot.instances.iter().enumerate() {
                lines.push(format!(
                    "{:4}. {} ({})",
                    i + 1,
                    instance.name,
                    instance.cell_type
                ));
                lines.push(format!(
                    "      Position: ({:.0}, {:.0}) {}",
                    instance.x, instance.y, instance.orientation
                ));
                lines.push(format!(
                    "      Cluster: {}  Original: {}  Last op: {}",
                    if instance.cluster_id.is_empty() {
                        "N/A"
                    } else {
                        &instance.cluster_id
                    },
                    instance.original_name,
                    instance
                        .last_operation
                        .map_or("N/A", Operation::as_str)
                ));
                for (pin, net) in &instance.pin_connections {
                    lines.push(format!("        {pin} -> {net}"));
                }
            }
            lines.push(String::new());
        }
        lines
    }

    fn mint_dummy(&mut self, real_name: &str) -> String {
        if let Some(existing) = self.real_to_dummy.get(real_name) {
            return existing.clone();
        }
        self.dummy_counter += 1;
        let dummy = format!("dummy_{}", self.dummy_counter);
        self.real_to_dummy
            .insert(real_name.to_string(), dummy.clone());
        self.dummy_to_real.insert(dummy.clone(), real_name.to_string());
        dummy
    }

    fn dummy_or_real(&self, name: &str) -> String {
        self.real_to_dummy
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    // ----------------------------------------------------------------------------
    // ### Operation-log rendering
    // ----------------------------------------------------------------------------

    /// Renders the trail as operation lines in DEBANK -> SUBSTITUTE -> BANK
    /// -> POST_SUBSTITUTE order, minting `dummy_<N>` names for debank
    /// fragments. Bit widths come from the library so banking inputs wider
    /// than one bit render with their true width.
    pub fn operation_log(&mut self, ctx: &DesignContext) -> Vec<String> {
        let mut operations = Vec::new();

        // split_multibit, one line per debanked original.
        let mut debank_groups: IndexMap<String, Vec<usize>> = IndexMap::default();
        for (i, record) in self.history.iter().enumerate() {
            if record.operation == Operation::Debank {
                debank_groups
                    .entry(record.original_name.clone())
                    .or_default()
                    .push(i);
            }
        }
        for (original, indices) in &debank_groups {
            let first = &self.history[indices[0]];
            let bit_width = indices.len();
            let original_lib = first.original_cell.clone();
            let result_lib = first.result_cell.clone();
            let fragments = indices
                .iter()
                .map(|&i| self.history[i].result_name.clone())
                .collect_vec();

            let mut op = format!("split_multibit {{ {{{original} {original_lib} {bit_width}}} ");
            for fragment in &fragments {
                let dummy = self.mint_dummy(fragment);
                op.push_str(&format!("{{{dummy} {result_lib} 1}} "));
            }
            op.push('}');
            operations.push(op);
        }

        for record in self.records_of(Operation::Substitute) {
            let name = self.dummy_or_real(&record.original_name);
            operations.push(format!(
                "size_cell {{{} {} {}}}",
                name, record.original_cell, record.result_cell
            ));
        }

        for record in self.records_of(Operation::Bank) {
            let cell_bits =
                |cell: &str| ctx.get_cell(cell).map_or(1, |c| c.bit_width);
            let mut op = String::from("create_multibit { ");
            op.push_str(&format!(
                "{{{} {} {}}} ",
                self.dummy_or_real(&record.original_name),
                record.original_cell,
                cell_bits(&record.original_cell)
            ));
            for (i, related) in record.related_instances.iter().enumerate() {
                let cell = record
                    .related_cells
                    .get(i)
                    .unwrap_or(&record.original_cell);
                op.push_str(&format!(
                    "{{{} {} {}}} ",
                    self.dummy_or_real(related),
                    cell,
                    cell_bits(cell)
                ));
            }
            op.push_str(&format!(
                "{{{} {} {}}} }}",
                record.result_name,
                record.result_cell,
                cell_bits(&record.result_cell)
            ));
            operations.push(op);
        }

        for record in self.records_of(Operation::PostSubstitute) {
            operations.push(format!(
                "size_cell {{{} {} {}}}",
                record.original_name, record.original_cell, record.result_cell
            ));
        }

        operations
    }

    // ----------------------------------------------------------------------------
    // ### Final pin mapping
    // ----------------------------------------------------------------------------

    /// One entry per original pin: `originalInstance/originalPin ->
    /// finalInstance/finalPin`, with debank fragments collapsed back to the
    /// original multi-bit names through the side map.
    pub fn final_pin_mapping(&self, ctx: &DesignContext) -> IndexMap<String, String> {
        #[derive(Default, Clone)]
        struct Chain {
            final_name: String,
            banked: bool,
        }

        let debanked: Set<&str> = self
            .records_of(Operation::Debank)
            .map(|r| r.original_name.as_str())
            .collect();
        let bank_results: Set<&str> = self
            .records_of(Operation::Bank)
            .map(|r| r.result_name.as_str())
            .collect();

        // Chain roots: every original name the trail touches. Debanked
        // multi-bit originals are excluded (their fragments are the roots
        // and collapse later), and so are synthesized banking results
        // (their pins are reached through their sources).
        let mut chains: IndexMap<String, Chain> = IndexMap::default();
        let mut root = |chains: &mut IndexMap<String, Chain>, name: &str| {
            if !debanked.contains(name) && !bank_results.contains(name) && !chains.contains_key(name)
            {
                chains.insert(
                    name.to_string(),
                    Chain {
                        final_name: name.to_string(),
                        banked: false,
                    },
                );
            }
        };
        for record in &self.history {
            match record.operation {
                Operation::Debank => root(&mut chains, &record.result_name),
                Operation::Bank => {
                    root(&mut chains, &record.original_name);
                    for related in &record.related_instances {
                        root(&mut chains, related);
                    }
                }
                _ => root(&mut chains, &record.original_name),
            }
        }

        for record in &self.history {
            match record.operation {
                Operation::Keep | Operation::Substitute | Operation::PostSubstitute => {
                    if let Some(chain) = chains.get_mut(&record.original_name) {
                        chain.final_name = record.result_name.clone();
                    }
                }
                Operation::Bank => {
                    for source in std::iter::once(&record.original_name)
                        .chain(record.related_instances.iter())
                    {
                        if let Some(chain) = chains.get_mut(source) {
                            chain.final_name = record.result_name.clone();
                            chain.banked = true;
                        }
                    }
                }
                Operation::Debank => {}
            }
        }

        // Full-path bank mapping: `source/pin` -> `result/pin`.
        let mut bank_pin_map: Dict<&str, &str> = Dict::default();
        for record in self.records_of(Operation::Bank) {
            for (from, to) in &record.pin_mapping {
                bank_pin_map.insert(from.as_str(), to.as_str());
            }
        }

        // Reverse debank side map: `fragment/pin` -> `original/pin`.
        let mut reverse_debank: Dict<&str, &str> = Dict::default();
        for (original_path, fragment_path) in &self.debank_pin_map {
            reverse_debank.insert(fragment_path.as_str(), original_path.as_str());
        }

        let mut mapping: IndexMap<String, String> = IndexMap::default();
        for (root_name, chain) in &chains {
            let Some(final_inst) = ctx.instances.get(&chain.final_name) else {
                warn!("final instance {} not found", chain.final_name);
                continue;
            };

            let pins: Vec<String> = if let Some(pins) = self.fragment_pins.get(root_name) {
                pins.clone()
            } else if let Some(conns) = self.initial_connections.get(root_name) {
                conns.iter().map(|c| c.pin.clone()).collect()
            } else {
                final_inst.cell.pins.iter().map(|p| p.name.clone()).collect()
            };

            for pin in pins {
                let root_path = format!("{root_name}/{pin}");
                let final_path = if chain.banked {
                    match bank_pin_map.get(root_path.as_str()) {
                        Some(path) => (*path).to_string(),
                        None => continue,
                    }
                } else {
                    if !final_inst.cell.has_pin(&pin) {
                        continue;
                    }
                    format!("{}/{}", chain.final_name, pin)
                };

                // Collapse `_BIT<i>` fragment roots to the multi-bit
                // original; shared pins missing from the side map keep their
                // name on the base instance.
                let original_path = if self.fragment_birth.contains_key(root_name) {
                    match reverse_debank.get(root_path.as_str()) {
                        Some(path) => (*path).to_string(),
                        None => {
                            let base = &self.fragment_birth[root_name];
                            format!("{base}/{pin}")
                        }
                    }
                } else {
                    root_path
                };

                mapping.insert(original_path, final_path);
            }
        }
        mapping
    }

    /// `CellInst <N>` header plus one `orig/pin map final/pin` line per
    /// entry, the listing the external writer serializes.
    pub fn cell_inst_listing(&self, ctx: &DesignContext) -> Vec<String> {
        let mapping = self.final_pin_mapping(ctx);
        let final_instances: Set<&str> = mapping
            .values()
            .filter_map(|path| path.rsplit_once('/').map(|(inst, _)| inst))
            .collect();
        let mut lines = vec![format!("CellInst {}", final_instances.len())];
        for (from, to) in &mapping {
            lines.push(format!("{from} map {to}"));
        }
        lines
    }

    // ----------------------------------------------------------------------------
    // ### Trail verification
    // ----------------------------------------------------------------------------

    /// Checks pin-mapping completeness and net conservation over the final
    /// mapping; returns human-readable violations (empty when clean).
    pub fn verify_trail(&self, ctx: &DesignContext) -> Vec<String> {
        let mut violations = Vec::new();
        let mapping = self.final_pin_mapping(ctx);

        for (original_path, final_path) in &mapping {
            let Some((final_inst_name, final_pin)) = final_path.rsplit_once('/') else {
                violations.push(format!("malformed final path {final_path}"));
                continue;
            };
            let Some(final_inst) = ctx.instances.get(final_inst_name) else {
                violations.push(format!("{original_path}: final instance {final_inst_name} missing"));
                continue;
            };
            if !final_inst.cell.has_pin(final_pin) {
                violations.push(format!(
                    "{original_path}: {} has no pin {final_pin}",
                    final_inst.cell.name
                ));
                continue;
            }

            // Net conservation on active pins.
            let Some((orig_inst_name, orig_pin)) = original_path.rsplit_once('/') else {
                continue;
            };
            let Some(initial) = self.initial_connections.get(orig_inst_name) else {
                continue;
            };
            let Some(original_net) = initial.iter().find(|c| c.pin == orig_pin).map(|c| &c.net)
            else {
                continue;
            };
            if !is_active_net_name(original_net) {
                continue;
            }
            // Shared control pins inherit the primary source's net when
            // several FFs bank together, so only data pins demand strict
            // conservation for every source.
            let strict = matches!(
                FfPinKind::classify(orig_pin),
                FfPinKind::D | FfPinKind::Q | FfPinKind::Qn
            );
            match final_inst.connection(final_pin) {
                Some(conn) if &conn.net == original_net => {}
                Some(conn) if strict => violations.push(format!(
                    "{original_path} -> {final_path}: net changed from {original_net} to {}",
                    conn.net
                )),
                Some(_) => {}
                None if strict => violations.push(format!(
                    "{original_path} -> {final_path}: active net {original_net} dropped"
                )),
                None => {}
            }
        }

        // Completeness: every initially-active pin must reach exactly one
        // destination.
        for (name, connections) in self
            .initial_connections
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
        {
            for conn in connections {
                if !is_active_net_name(&conn.net) {
                    continue;
                }
                let path = format!("{name}/{}", conn.pin);
                if !mapping.contains_key(&path) {
                    violations.push(format!("no final destination for active pin {path}"));
                }
            }
        }

        violations
    }
}

/// Frozen view of a banking source captured before the source instance is
/// removed from the design.
#[derive(Debug, Clone)]
pub struct BankedSource {
    pub name: String,
    pub cell_name: String,
    pub bit_width: uint,
    pub position: Point,
    pub orientation: Orientation,
    pub connections: Vec<Connection>,
}

impl BankedSource {
    pub fn of(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            cell_name: instance.cell.name.clone(),
            bit_width: instance.bit_width(),
            position: instance.position,
            orientation: instance.orientation,
            connections: instance.connections.clone(),
        }
    }
}
