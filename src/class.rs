use crate::*;

// --------------------------------------------------------------------------------
// ## Cell library
// --------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinUsage {
    Signal,
    Clock,
    Power,
    Ground,
}

/// Functional pin kinds of a flip-flop. The discriminant order is the
/// canonical signature order (D, Q, QN, CK, SI, SE, R, RD, S, SD, RS, SR);
/// kinds after `Sr` never appear in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FfPinKind {
    D,
    Q,
    Qn,
    Ck,
    Si,
    Se,
    R,
    Rd,
    S,
    Sd,
    Rs,
    Sr,
    So,
    Vddr,
    Other,
    NotFfPin,
}

impl FfPinKind {
    /// Classifies a pin by exact, case-insensitive name match. Trailing bit
    /// indices (`D3`) and bracketed indices (`D[3]`) map to the unindexed
    /// kind.
    pub fn classify(pin_name: &str) -> Self {
        let upper = pin_name.to_ascii_uppercase();
        let base = strip_bit_index(&upper);

        match base {
            "D" => FfPinKind::D,
            "QN" => FfPinKind::Qn,
            "Q" => FfPinKind::Q,
            "CLK" | "CK" | "CLOCK" | "CP" => FfPinKind::Ck,
            "SI" | "SCAN_IN" | "SCIN" | "TI" => FfPinKind::Si,
            "SO" | "SCAN_OUT" | "SCOUT" | "TO" => FfPinKind::So,
            "SE" | "SCAN_EN" | "SCAN_ENABLE" | "TE" => FfPinKind::Se,
            "RD" => FfPinKind::Rd,
            "SD" => FfPinKind::Sd,
            "SR" => FfPinKind::Sr,
            "RS" => FfPinKind::Rs,
            "VDDR" => FfPinKind::Vddr,
            "R" | "RST" | "RESET" | "RN" | "RESETN" | "RSTB" | "CDN" | "RSTN" | "CLR" | "CLRN" => {
                FfPinKind::R
            }
            "S" | "SET" | "SN" | "SETN" | "SETB" | "SDN" | "PRE" | "PREN" | "PRESET" => {
                FfPinKind::S
            }
            "VDD" | "VSS" | "VDDPE" | "VSSE" | "VNW" | "VPW" | "VSDR" | "AVDD" | "AVSS"
            | "DVDD" | "DVSS" => FfPinKind::NotFfPin,
            _ => FfPinKind::Other,
        }
    }

    /// Token used in group signatures; `None` for kinds that never appear in
    /// a signature.
    pub fn signature_token(self) -> Option<&'static str> {
        match self {
            FfPinKind::D => Some("D"),
            FfPinKind::Q => Some("Q"),
            FfPinKind::Qn => Some("QN"),
            FfPinKind::Ck => Some("CK"),
            FfPinKind::Si => Some("SI"),
            FfPinKind::Se => Some("SE"),
            FfPinKind::R => Some("R"),
            FfPinKind::Rd => Some("RD"),
            FfPinKind::S => Some("S"),
            FfPinKind::Sd => Some("SD"),
            FfPinKind::Rs => Some("RS"),
            FfPinKind::Sr => Some("SR"),
            _ => None,
        }
    }
}

/// `D3` -> `D`, `QN[2]` -> `QN`; names without a trailing index are returned
/// unchanged.
fn strip_bit_index(upper: &str) -> &str {
    if let Some(open) = upper.find('[') {
        return &upper[..open];
    }
    let trimmed = upper.trim_end_matches(|c: char| c.is_ascii_digit());
    // Names that are pure digits or end in digits that are part of the base
    // name (e.g. power rails) are rare; data/output pins are the only indexed
    // kinds we care about.
    if trimmed.is_empty() {
        upper
    } else {
        trimmed
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    pub name: String,
    pub direction: PinDirection,
    pub usage: PinUsage,
    /// Derived once per (cell, pin) at construction and never recomputed.
    pub kind: FfPinKind,
    pub offset: Point,
}

impl Pin {
    pub fn new(name: impl Into<String>, direction: PinDirection, usage: PinUsage) -> Self {
        let name = name.into();
        let kind = FfPinKind::classify(&name);
        Self {
            name,
            direction,
            usage,
            kind,
            offset: Point::default(),
        }
    }

    pub fn with_offset(mut self, x: float, y: float) -> Self {
        self.offset = Point::new(x, y);
        self
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, PinDirection::In, PinUsage::Signal)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, PinDirection::Out, PinUsage::Signal)
    }

    pub fn clock(name: impl Into<String>) -> Self {
        Self::new(name, PinDirection::In, PinUsage::Clock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockEdge {
    Rising,
    Falling,
    Unknown,
}

impl ClockEdge {
    /// Edge from a Liberty `clocked_on` expression: a leading `!` or `~` on
    /// the clock identifier means falling; composite expressions are
    /// unparseable and yield `Unknown`.
    pub fn from_clocked_on(expr: &str) -> Self {
        let expr = expr.trim();
        if expr.is_empty() {
            return ClockEdge::Unknown;
        }
        if expr.starts_with('!') || expr.starts_with('~') || expr.contains("(!") {
            return ClockEdge::Falling;
        }
        if expr.contains('&') || expr.contains('|') {
            return ClockEdge::Unknown;
        }
        let upper = expr.to_ascii_uppercase();
        if upper.contains("CK") || upper.contains("CLK") {
            return ClockEdge::Rising;
        }
        ClockEdge::Unknown
    }

    /// Name-substring fallback, applied only when the `clocked_on`
    /// expression is absent or unparseable.
    pub fn from_cell_name(cell_name: &str) -> Self {
        if cell_name.contains("FDN") || cell_name.contains("FSDN") {
            ClockEdge::Falling
        } else if cell_name.contains("FDP") || cell_name.contains("FSDP") {
            ClockEdge::Rising
        } else {
            ClockEdge::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClockEdge::Rising => "RISING",
            ClockEdge::Falling => "FALLING",
            ClockEdge::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    FlipFlop,
    Other,
}

#[derive(Debug, Clone)]
pub struct CellTemplate {
    pub name: String,
    pub library: String,
    pub width: float,
    pub height: float,
    pub pins: Vec<Pin>,
    pub area: float,
    pub leakage_power: float,
    pub bit_width: uint,
    pub kind: CellKind,
    pub clock_edge: ClockEdge,
    /// For a multi-bit FF, the corresponding 1-bit cell.
    pub single_bit_degenerate: Option<String>,
}

#[bon]
impl CellTemplate {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into, default = "hopt".to_string())] library: String,
        #[builder(default = 1.0)] width: float,
        #[builder(default = 1.0)] height: float,
        #[builder(default)] pins: Vec<Pin>,
        #[builder(default)] area: float,
        #[builder(default)] leakage_power: float,
        #[builder(default = 1)] bit_width: uint,
        #[builder(default = CellKind::Other)] kind: CellKind,
        clocked_on: Option<&str>,
        single_bit_degenerate: Option<String>,
    ) -> Self {
        let clock_edge = if kind == CellKind::FlipFlop {
            match clocked_on.map(ClockEdge::from_clocked_on) {
                Some(edge) if edge != ClockEdge::Unknown => edge,
                _ => ClockEdge::from_cell_name(&name),
            }
        } else {
            ClockEdge::Unknown
        };

        Self {
            name,
            library,
            width,
            height,
            pins,
            area,
            leakage_power,
            bit_width,
            kind,
            clock_edge,
            single_bit_degenerate,
        }
    }

    pub fn is_flip_flop(&self) -> bool {
        self.kind == CellKind::FlipFlop
    }

    pub fn is_multibit(&self) -> bool {
        self.bit_width > 1
    }

    pub fn find_pin(&self, pin_name: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.name == pin_name)
    }

    pub fn has_pin(&self, pin_name: &str) -> bool {
        self.find_pin(pin_name).is_some()
    }
}

// --------------------------------------------------------------------------------
// ## Netlist
// --------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Connection {
    #[new(into)]
    pub pin: String,
    #[new(into)]
    pub net: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    N,
    S,
    E,
    W,
    FN,
    FS,
    FE,
    FW,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::N => "N",
            Orientation::S => "S",
            Orientation::E => "E",
            Orientation::W => "W",
            Orientation::FN => "FN",
            Orientation::FS => "FS",
            Orientation::FE => "FE",
            Orientation::FW => "FW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStatus {
    Unplaced,
    Placed,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankingKind {
    Fsdn,
    RisingLsrdpq,
    None,
}

/// How a template pin is wired on a concrete instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connected,
    Unconnected,
    TiedToGround,
    TiedToPower,
    Missing,
}

#[derive(Debug, Clone, new)]
pub struct PinConnectionStatus {
    #[new(into)]
    pub pin: String,
    pub status: ConnectionStatus,
    #[new(into)]
    pub net: String,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub cell: Shared<CellTemplate>,
    pub module: String,
    /// Groups the fragments of one original multi-bit FF.
    pub cluster_id: Option<String>,
    pub banking_kind: BankingKind,
    pub position: Point,
    /// Written exactly once by the legalizer.
    pub new_position: Option<Point>,
    pub orientation: Orientation,
    pub status: PlacementStatus,
    pub connections: Vec<Connection>,
    /// Per-pin wiring analysis, filled by `analyze_ff_pin_connections`.
    pub pin_status: Vec<PinConnectionStatus>,
    /// Best cheaper cell ever observed by the substituter, for the
    /// post-banking pass.
    pub best_alt_cell: Option<String>,
    pub best_alt_score: float,
}

#[bon]
impl Instance {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        cell: Shared<CellTemplate>,
        #[builder(into, default = String::new())] module: String,
        #[builder(default = Point::default())] position: Point,
        #[builder(default = Orientation::N)] orientation: Orientation,
        #[builder(default = PlacementStatus::Placed)] status: PlacementStatus,
        #[builder(default)] connections: Vec<Connection>,
    ) -> Self {
        Self {
            name,
            cell,
            module,
            cluster_id: None,
            banking_kind: BankingKind::None,
            position,
            new_position: None,
            orientation,
            status,
            connections,
            pin_status: Vec::new(),
            best_alt_cell: None,
            best_alt_score: float::INFINITY,
        }
    }

    pub fn is_flip_flop(&self) -> bool {
        self.cell.is_flip_flop()
    }

    pub fn bit_width(&self) -> uint {
        self.cell.bit_width
    }

    pub fn width(&self) -> float {
        self.cell.width
    }

    pub fn height(&self) -> float {
        self.cell.height
    }

    pub fn footprint(&self) -> Rect {
        Rect::from_size(self.position.x, self.position.y, self.width(), self.height())
    }

    pub fn connection(&self, pin_name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.pin == pin_name)
    }

    /// Module tag, falling back to the name prefix before the last `/`.
    pub fn hierarchy(&self) -> String {
        if !self.module.is_empty() {
            return self.module.clone();
        }
        match self.name.rfind('/') {
            Some(pos) => self.name[..pos].to_string(),
            None => "TOP_LEVEL".to_string(),
        }
    }

    /// Net driving the clock pin, skipping canonical tie-offs.
    pub fn clock_net(&self) -> Option<&str> {
        self.connections.iter().find_map(|conn| {
            let kind = self
                .cell
                .find_pin(&conn.pin)
                .map_or_else(|| FfPinKind::classify(&conn.pin), |p| p.kind);
            if kind == FfPinKind::Ck
                && conn.net != UNCONNECTED_NET
                && conn.net != GROUND_NET
                && conn.net != POWER_NET
            {
                Some(conn.net.as_str())
            } else {
                None
            }
        })
    }

    /// The set of functional kinds whose connection is active (not tied to
    /// ground, not unconnected).
    pub fn active_pin_kinds(&self) -> Set<FfPinKind> {
        self.connections
            .iter()
            .filter(|conn| is_active_net_name(&conn.net))
            .filter_map(|conn| self.cell.find_pin(&conn.pin).map(|p| p.kind))
            .filter(|kind| kind.signature_token().is_some())
            .collect()
    }

    pub fn has_active_pin_of(&self, kind: FfPinKind) -> bool {
        self.connections.iter().any(|conn| {
            is_active_net_name(&conn.net)
                && self.cell.find_pin(&conn.pin).is_some_and(|p| p.kind == kind)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetKind {
    Signal,
    Clock,
    Power,
    Ground,
}

#[derive(Debug, Clone)]
pub struct Net {
    pub name: String,
    pub kind: NetKind,
    pub is_clock: bool,
    /// Unordered multiset of (instance name, pin name).
    pub pins: Vec<(String, String)>,
}

impl Net {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NetKind::Signal,
            is_clock: false,
            pins: Vec::new(),
        }
    }

    pub fn fanout(&self) -> usize {
        self.pins.len()
    }
}

// --------------------------------------------------------------------------------
// ## Net-name canonicalization
// --------------------------------------------------------------------------------

pub const UNCONNECTED_NET: &str = "UNCONNECTED";
pub const POWER_NET: &str = "VDD";
pub const GROUND_NET: &str = "VSS";

pub fn is_power_net(net_name: &str) -> bool {
    matches!(
        net_name.to_ascii_uppercase().as_str(),
        "VDD" | "VCC" | "VDDPE" | "VDDR" | "AVDD" | "DVDD"
    )
}

pub fn is_ground_net(net_name: &str) -> bool {
    matches!(
        net_name.to_ascii_uppercase().as_str(),
        "VSS" | "GND" | "VSSE" | "AVSS" | "DVSS"
    )
}

pub fn is_unconnected_net(net_name: &str) -> bool {
    net_name.contains("SYNOPSYS_UNCONNECTED")
}

/// Canonical form used everywhere past the loader boundary.
pub fn canonicalize_net_name(net_name: &str) -> String {
    if is_unconnected_net(net_name) {
        UNCONNECTED_NET.to_string()
    } else if is_power_net(net_name) {
        POWER_NET.to_string()
    } else if is_ground_net(net_name) {
        GROUND_NET.to_string()
    } else {
        net_name.to_string()
    }
}

/// A connection is functionally present iff its net is neither unconnected
/// nor tied to ground. VDD ties stay active (control pins may be tied high
/// on purpose).
pub fn is_active_net_name(net_name: &str) -> bool {
    !net_name.is_empty() && net_name != UNCONNECTED_NET && net_name != GROUND_NET
}

// --------------------------------------------------------------------------------
// ## Layout
// --------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SubRow {
    pub x_min: float,
    pub x_max: float,
    pub usable_width: float,
    /// Rightmost cluster currently placed in this sub-row; an index into the
    /// legalizer's cluster arena.
    pub last_cluster: Option<usize>,
}

impl SubRow {
    pub fn new(x_min: float, x_max: float) -> Self {
        Self {
            x_min,
            x_max,
            usable_width: x_max - x_min,
            last_cluster: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlacementRow {
    pub origin: Point,
    pub num_x: uint,
    pub num_y: uint,
    pub step_x: float,
    pub step_y: float,
    /// Y-delta to the next row; equal for the last row. Filled by the
    /// legalizer before sub-row construction.
    pub height: float,
    pub site_width: float,
    pub id: usize,
    pub subrows: Vec<SubRow>,
}

impl PlacementRow {
    pub fn new(origin: Point, num_x: uint, num_y: uint, step_x: float, step_y: float) -> Self {
        Self {
            origin,
            num_x,
            num_y,
            step_x,
            step_y,
            height: step_y,
            site_width: step_x,
            id: 0,
            subrows: Vec::new(),
        }
    }

    pub fn x_end(&self) -> float {
        self.origin.x + self.step_x * self.num_x.float()
    }
}

// --------------------------------------------------------------------------------
// ## Scan chains
// --------------------------------------------------------------------------------

#[derive(Debug, Clone, new)]
pub struct ScanElement {
    #[new(into)]
    pub instance: String,
    #[new(into)]
    pub scan_in_pin: String,
    #[new(into)]
    pub scan_out_pin: String,
}

#[derive(Debug, Clone)]
pub struct ScanChain {
    pub name: String,
    pub elements: Vec<ScanElement>,
}

impl ScanChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// --------------------------------------------------------------------------------
// ## Objective weights
// --------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, Builder)]
pub struct ObjectiveWeights {
    #[builder(default)]
    pub alpha: float,
    #[builder(default)]
    pub beta: float,
    #[builder(default)]
    pub gamma: float,
    #[builder(default)]
    pub initial_tns: float,
    #[builder(default)]
    pub initial_power: float,
    #[builder(default)]
    pub initial_area: float,
}

impl ObjectiveWeights {
    pub fn calculate_objective(&self, tns: float, power: float, area: float) -> float {
        self.alpha * tns + self.beta * power + self.gamma * area
    }
}

// --------------------------------------------------------------------------------
// ## Design context
// --------------------------------------------------------------------------------

/// Fully-populated design handed to the engine by the external parsers:
/// cell library, netlist, placement grid, scan chains, objective weights
/// and the per-cell timing surrogate table.
#[derive(Debug, Default)]
pub struct DesignContext {
    pub design_name: String,
    pub cells: IndexMap<String, Shared<CellTemplate>>,
    /// Reverse of `single_bit_degenerate`: 1-bit cell name -> multi-bit
    /// cells that bank into it. Built by `build_banking_relationships`.
    pub banking_targets: Dict<String, Vec<String>>,
    pub instances: IndexMap<String, Instance>,
    pub nets: IndexMap<String, Net>,
    pub placement_rows: Vec<PlacementRow>,
    pub placement_blockages: Vec<Rect>,
    pub scan_chains: Vec<ScanChain>,
    pub weights: ObjectiveWeights,
    pub timing_table: Dict<String, float>,
    pub die_area: Rect,
}

impl DesignContext {
    pub fn new(design_name: impl Into<String>) -> Self {
        Self {
            design_name: design_name.into(),
            timing_table: default_timing_table(),
            ..Default::default()
        }
    }

    pub fn add_cell(&mut self, cell: CellTemplate) -> Shared<CellTemplate> {
        let shared = Shared::new(cell);
        self.cells.insert(shared.name.clone(), shared.clone());
        shared
    }

    pub fn get_cell(&self, name: &str) -> Option<&Shared<CellTemplate>> {
        self.cells.get(name)
    }

    /// Canonicalizes connection nets, registers signal nets, and inserts the
    /// instance into the table.
    pub fn add_instance(&mut self, mut instance: Instance) {
        for conn in &mut instance.connections {
            conn.net = canonicalize_net_name(&conn.net);
        }
        self.register_nets(&instance);
        self.instances.insert(instance.name.clone(), instance);
    }

    fn register_nets(&mut self, instance: &Instance) {
        for conn in &instance.connections {
            if conn.net == UNCONNECTED_NET || conn.net == POWER_NET || conn.net == GROUND_NET {
                continue;
            }
            let net = self
                .nets
                .entry(conn.net.clone())
                .or_insert_with(|| Net::new(conn.net.clone()));
            net.pins.push((instance.name.clone(), conn.pin.clone()));

            let kind = instance
                .cell
                .find_pin(&conn.pin)
                .map_or_else(|| FfPinKind::classify(&conn.pin), |p| p.kind);
            if kind == FfPinKind::Ck {
                net.is_clock = true;
                net.kind = NetKind::Clock;
            }
        }
    }

    /// Detaches an instance's pins from the net table.
    pub fn unregister_nets(&mut self, instance_name: &str) {
        for net in self.nets.values_mut() {
            net.pins.retain(|(inst, _)| inst != instance_name);
        }
    }

    pub fn remove_instance(&mut self, name: &str) -> Option<Instance> {
        self.unregister_nets(name);
        self.instances.shift_remove(name)
    }

    pub fn add_row(&mut self, row: PlacementRow) {
        self.placement_rows.push(row);
    }

    pub fn add_blockage(&mut self, rect: Rect) {
        self.placement_blockages.push(rect);
    }

    /// Flip-flop instance names in deterministic table order.
    pub fn flip_flop_names(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, inst)| inst.is_flip_flop())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn num_flip_flops(&self) -> usize {
        self.instances.values().filter(|i| i.is_flip_flop()).count()
    }

    /// A flip-flop cell is bankable iff it has at least one banking target
    /// or a non-null degenerate.
    pub fn cell_can_be_banked(&self, cell: &CellTemplate) -> bool {
        cell.is_flip_flop()
            && (cell.single_bit_degenerate.is_some()
                || self
                    .banking_targets
                    .get(&cell.name)
                    .is_some_and(|t| !t.is_empty()))
    }

    /// Builds the reverse banking relation (1-bit cell -> multi-bit cells
    /// naming it as degenerate). Run once after the library is loaded.
    pub fn build_banking_relationships(&mut self) {
        self.banking_targets.clear();
        for cell in self.cells.values() {
            if !cell.is_flip_flop() {
                continue;
            }
            if let Some(degenerate) = &cell.single_bit_degenerate {
                if self.cells.contains_key(degenerate) {
                    let targets = self.banking_targets.entry(degenerate.clone()).or_default();
                    if !targets.contains(&cell.name) {
                        targets.push(cell.name.clone());
                    }
                } else {
                    warn!(
                        "{} references unknown single-bit cell {}",
                        cell.name, degenerate
                    );
                }
            }
        }
        for targets in self.banking_targets.values_mut() {
            targets.sort_unstable();
        }
    }

    /// Timing surrogate for a cell; unknown cells map to 0.
    pub fn timing_surrogate(&self, cell_name: &str) -> float {
        self.timing_table.get(cell_name).copied().unwrap_or(0.0)
    }

    /// FF instances whose cell can participate in banking (degenerate
    /// present or banking targets registered).
    pub fn bankable_flip_flops(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, inst)| inst.is_flip_flop() && self.cell_can_be_banked(&inst.cell))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clock_nets(&self) -> impl Iterator<Item = &Net> {
        self.nets.values().filter(|net| net.is_clock)
    }

    /// Captures the mutable state of every instance (cell binding and
    /// positions) for later restoration.
    pub fn create_snapshot(&self) -> DesignSnapshot {
        DesignSnapshot {
            instances: self
                .instances
                .values()
                .map(|inst| InstanceState {
                    name: inst.name.clone(),
                    cell: inst.cell.name.clone(),
                    x: inst.position.x,
                    y: inst.position.y,
                    new_position: inst.new_position.map(|p| (p.x, p.y)),
                })
                .collect(),
        }
    }

    /// Restores a snapshot taken on the same design. Instances or cells
    /// that no longer resolve are skipped with a warning.
    pub fn load_snapshot(&mut self, snapshot: &DesignSnapshot) {
        for state in &snapshot.instances {
            let Some(cell) = self.cells.get(&state.cell).cloned() else {
                warn!("snapshot cell {} no longer in the library", state.cell);
                continue;
            };
            let Some(instance) = self.instances.get_mut(&state.name) else {
                warn!("snapshot instance {} no longer in the design", state.name);
                continue;
            };
            instance.cell = cell;
            instance.position = Point::new(state.x, state.y);
            instance.new_position = state.new_position.map(|(x, y)| Point::new(x, y));
        }
    }
}

/// Serializable capture of the per-instance mutable state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DesignSnapshot {
    pub instances: Vec<InstanceState>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstanceState {
    pub name: String,
    pub cell: String,
    pub x: float,
    pub y: float,
    pub new_position: Option<(float, float)>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PinStatusStats {
    pub analyzed_ffs: usize,
    pub connected: usize,
    pub unconnected: usize,
    pub tied_to_ground: usize,
    pub tied_to_power: usize,
    pub missing: usize,
}

/// Classifies how every functional pin of every FF is wired and stores the
/// result on the instance. Power pins are not part of the analysis; a
/// template pin with no connection entry counts as missing.
pub fn analyze_ff_pin_connections(ctx: &mut DesignContext) -> PinStatusStats {
    let mut stats = PinStatusStats::default();

    let ff_names = ctx.flip_flop_names();
    for name in ff_names {
        let instance = ctx.instances.get_mut(&name).unwrap();
        let cell = instance.cell.clone();
        instance.pin_status.clear();

        for pin in &cell.pins {
            if pin.kind == FfPinKind::NotFfPin {
                continue;
            }
            let (status, net) = match instance.connection(&pin.name) {
                None => (ConnectionStatus::Missing, String::new()),
                Some(conn) if conn.net == UNCONNECTED_NET => {
                    (ConnectionStatus::Unconnected, conn.net.clone())
                }
                Some(conn) if conn.net == GROUND_NET => {
                    (ConnectionStatus::TiedToGround, conn.net.clone())
                }
                Some(conn) if conn.net == POWER_NET => {
                    (ConnectionStatus::TiedToPower, conn.net.clone())
                }
                Some(conn) => (ConnectionStatus::Connected, conn.net.clone()),
            };
            match status {
                ConnectionStatus::Connected => stats.connected += 1,
                ConnectionStatus::Unconnected => stats.unconnected += 1,
                ConnectionStatus::TiedToGround => stats.tied_to_ground += 1,
                ConnectionStatus::TiedToPower => stats.tied_to_power += 1,
                ConnectionStatus::Missing => stats.missing += 1,
            }
            instance
                .pin_status
                .push(PinConnectionStatus::new(pin.name.clone(), status, net));
        }
        stats.analyzed_ffs += 1;
    }

    info!(
        "pin analysis over {} FFs: {} connected, {} unconnected, {} tied low, {} tied high, {} missing",
        stats.analyzed_ffs,
        stats.connected,
        stats.unconnected,
        stats.tied_to_ground,
        stats.tied_to_power,
        stats.missing
    );
    stats
}
