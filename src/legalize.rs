use crate::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct LegalizeStats {
    pub placed: usize,
    pub failed: usize,
}

/// A cell committed to a cluster: its site-rounded width and the position it
/// came from.
#[derive(Debug, Clone)]
struct ClusterCell {
    name: String,
    origin: Point,
    width: float,
}

/// Arena-allocated cluster node. Clusters chain right-to-left through
/// `left`; a sub-row points only at its rightmost cluster.
#[derive(Debug, Clone)]
struct ClusterNode {
    x: float,
    width: float,
    weight: float,
    /// Weighted position sum: `q = sum(w_i * (t_i - W_i))` where `W_i` is
    /// the width accumulated before cell i.
    q: float,
    left: Option<usize>,
    cells: Vec<ClusterCell>,
}

const SNAP_EPS: float = 1e-6;

/// Row-based Abacus legalizer. Flip-flops are assigned to sub-rows (carved
/// around blockages and fixed-cell footprints) in ascending-x order; abutting
/// clusters merge to the position minimizing the sum of squared
/// displacements. Instances that fit nowhere within the displacement bound
/// stay at their original position.
#[derive(Debug)]
pub struct Legalizer {
    max_displacement: float,
    quiet: bool,
    arena: Vec<ClusterNode>,
    pub stats: LegalizeStats,
}

impl Legalizer {
    pub fn new(max_displacement: float, quiet: bool) -> Self {
        Self {
            max_displacement,
            quiet,
            arena: Vec::new(),
            stats: LegalizeStats::default(),
        }
    }

    #[time("abacus legalization")]
    pub fn run(&mut self, ctx: &mut DesignContext) -> LegalizeStats {
        self.prepare_rows(ctx);

        // Non-FF instances keep their position and act as obstacles.
        let mut obstacles = Vec::new();
        for instance in ctx.instances.values_mut() {
            if !instance.is_flip_flop() {
                instance.new_position = Some(instance.position);
                obstacles.push(instance.footprint());
            }
        }
        obstacles.extend(ctx.placement_blockages.iter().copied());
        obstacles.sort_by_key(|r| OrderedFloat(r.xmin));

        build_subrows(&mut ctx.placement_rows, &obstacles);

        let mut ff_names = ctx.flip_flop_names();
        ff_names.sort_by_key(|name| {
            (
                OrderedFloat(ctx.instances[name].position.x),
                name.clone(),
            )
        });
        info!(
            "legalizing {} flip-flops over {} rows ({} obstacles)",
            ff_names.len(),
            ctx.placement_rows.len(),
            obstacles.len()
        );

        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(ff_names.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").unwrap(),
            );
            bar
        };

        for name in &ff_names {
            self.place_one(ctx, name);
            bar.inc(1);
        }
        bar.finish_and_clear();

        self.assign_final_positions(ctx);
        info!(
            "legalization placed {} flip-flops, {} failed",
            self.stats.placed, self.stats.failed
        );
        self.stats
    }

    /// Sorts rows bottom-up, assigns ids, derives row heights from the
    /// Y-delta to the next row, and seeds each row with one full-width
    /// sub-row.
    fn prepare_rows(&self, ctx: &mut DesignContext) {
        let rows = &mut ctx.placement_rows;
        rows.sort_by_key(|r| OrderedFloat(r.origin.y));
        let deltas = rows
            .iter()
            .tuple_windows()
            .map(|(a, b)| b.origin.y - a.origin.y)
            .collect_vec();
        for (i, row) in rows.iter_mut().enumerate() {
            row.id = i;
            row.height = deltas
                .get(i)
                .or_else(|| deltas.last())
                .copied()
                .unwrap_or(row.step_y);
            row.site_width = row.step_x;
            if row.subrows.is_empty() {
                row.subrows.push(SubRow::new(row.origin.x, row.x_end()));
            }
            row.subrows.iter_mut().for_each(|s| s.last_cluster = None);
        }
    }

    fn place_one(&mut self, ctx: &mut DesignContext, name: &str) {
        let instance = &ctx.instances[name];
        let target = instance.position;
        let cell_width = instance.width();

        let Some(origin_row) = closest_row_index(&ctx.placement_rows, target.y) else {
            warn!("{} cannot fit any row, leaving it in place", name);
            ctx.instances.get_mut(name).unwrap().new_position = Some(target);
            self.stats.failed += 1;
            return;
        };

        let num_rows = ctx.placement_rows.len();
        let mut best: Option<(usize, usize)> = None;
        let mut best_cost = float::INFINITY;

        for i in 0..num_rows {
            let up_idx = origin_row + i;
            let down_idx = origin_row.int() - i.int();

            let up = up_idx < num_rows
                && (target.y - ctx.placement_rows[up_idx].origin.y).abs() < best_cost;
            let down = i > 0
                && down_idx >= 0
                && (target.y - ctx.placement_rows[down_idx.usize()].origin.y).abs() < best_cost;
            if !up && !down {
                break;
            }

            let mut candidates: SmallVec<[usize; 2]> = SmallVec::new();
            if up {
                candidates.push(up_idx);
            }
            if down {
                candidates.push(down_idx.usize());
            }
            for row_idx in candidates {
                let row = &ctx.placement_rows[row_idx];
                let Some(sub_idx) = find_subrow_pos(row, cell_width, target.x) else {
                    continue;
                };
                let cost = self.trial_insert(row, &row.subrows[sub_idx], target, cell_width);
                if let Some(cost) = cost {
                    if cost < best_cost {
                        best_cost = cost;
                        best = Some((row_idx, sub_idx));
                    }
                }
            }
        }

        match best {
            Some((row_idx, sub_idx)) => {
                self.commit_insert(ctx, row_idx, sub_idx, name, target, cell_width);
                ctx.instances.get_mut(name).unwrap().status = PlacementStatus::Placed;
                self.stats.placed += 1;
            }
            None => {
                warn!("could not place {}, leaving it at ({}, {})", name, target.x, target.y);
                ctx.instances.get_mut(name).unwrap().new_position = Some(target);
                self.stats.failed += 1;
            }
        }
    }

    /// Nominal site-snapped entry position inside a sub-row.
    fn entry_position(subrow: &SubRow, site: float, target_x: float, cell_width: float) -> float {
        if target_x <= subrow.x_min {
            subrow.x_min
        } else if target_x + cell_width >= subrow.x_max {
            let x = subrow.x_max - cell_width;
            ((x - subrow.x_min) / site).floor() * site + subrow.x_min
        } else {
            ((target_x - subrow.x_min) / site).floor() * site + subrow.x_min
        }
    }

    /// Simulates the insertion without mutating anything and returns the
    /// displacement the instance would get, or `None` when the displacement
    /// bound is violated (for the instance or any already-placed cluster
    /// member).
    fn trial_insert(
        &self,
        row: &PlacementRow,
        subrow: &SubRow,
        target: Point,
        cell_width: float,
    ) -> Option<float> {
        let site = row.site_width;
        let place_width = (cell_width / site).ceil() * site;
        let temp_x = Self::entry_position(subrow, site, target.x, cell_width);

        let trial_x = match subrow.last_cluster {
            None => temp_x,
            Some(last) if self.arena[last].x + self.arena[last].width <= temp_x => temp_x,
            Some(last) => {
                let node = &self.arena[last];
                let mut weight = node.weight + 1.0;
                let mut q = node.q + (temp_x - node.width);
                let mut total_width = node.width + place_width;
                let mut chain = vec![last];
                let mut current = last;
                let mut x;
                loop {
                    x = subrow.x_min + ((q / weight - subrow.x_min) / site).floor() * site;
                    if x < subrow.x_min {
                        x = subrow.x_min;
                    }
                    if x + total_width > subrow.x_max {
                        x = subrow.x_max - total_width;
                    }
                    match self.arena[current].left {
                        Some(pred) if self.arena[pred].x + self.arena[pred].width > x => {
                            q += self.arena[pred].q - weight * self.arena[pred].width;
                            weight += self.arena[pred].weight;
                            total_width += self.arena[pred].width;
                            chain.push(pred);
                            current = pred;
                        }
                        _ => break,
                    }
                }

                // Existing members of the merged chain must also stay within
                // the displacement bound.
                let mut cursor = x;
                for &idx in chain.iter().rev() {
                    for cell in &self.arena[idx].cells {
                        let displacement =
                            norm2((cell.origin.x, cell.origin.y), (cursor, row.origin.y));
                        if displacement > self.max_displacement {
                            return None;
                        }
                        cursor += cell.width;
                    }
                }

                x + total_width - place_width
            }
        };

        let displacement = norm2((target.x, target.y), (trial_x, row.origin.y));
        if displacement > self.max_displacement {
            return None;
        }
        Some(displacement)
    }

    /// Committing variant: shrinks the sub-row's usable width and either
    /// opens a fresh cluster or appends to the last one and collapses.
    fn commit_insert(
        &mut self,
        ctx: &mut DesignContext,
        row_idx: usize,
        sub_idx: usize,
        name: &str,
        target: Point,
        cell_width: float,
    ) {
        let row = &mut ctx.placement_rows[row_idx];
        let site = row.site_width;
        let (x_min, x_max);
        let place_width = (cell_width / site).ceil() * site;

        let subrow = &mut row.subrows[sub_idx];
        subrow.usable_width -= place_width;
        x_min = subrow.x_min;
        x_max = subrow.x_max;
        let temp_x = Self::entry_position(subrow, site, target.x, cell_width);

        let cell = ClusterCell {
            name: name.to_string(),
            origin: target,
            width: place_width,
        };

        let open_new = match subrow.last_cluster {
            None => true,
            Some(last) => self.arena[last].x + self.arena[last].width <= temp_x,
        };

        if open_new {
            let idx = self.arena.len();
            self.arena.push(ClusterNode {
                x: temp_x,
                width: 0.0,
                weight: 0.0,
                q: 0.0,
                left: subrow.last_cluster,
                cells: Vec::new(),
            });
            subrow.last_cluster = Some(idx);
            self.add_cell(idx, cell, temp_x);
        } else {
            let last = subrow.last_cluster.unwrap();
            self.add_cell(last, cell, temp_x);
            let merged = self.collapse(last, x_min, x_max, site);
            subrow.last_cluster = Some(merged);
        }
    }

    fn add_cell(&mut self, idx: usize, cell: ClusterCell, target_x: float) {
        let node = &mut self.arena[idx];
        node.weight += 1.0;
        node.q += target_x - node.width;
        node.width += cell.width;
        node.cells.push(cell);
    }

    /// Re-optimizes a cluster's anchor and folds it into its left neighbour
    /// while they overlap.
    fn collapse(&mut self, start: usize, x_min: float, x_max: float, site: float) -> usize {
        let mut idx = start;
        loop {
            let node = &self.arena[idx];
            let mut x = ((node.q / node.weight - x_min) / site).floor() * site + x_min;
            if x < x_min {
                x = x_min;
            }
            if x + node.width > x_max {
                x = x_max - node.width;
            }
            self.arena[idx].x = x;

            match self.arena[idx].left {
                Some(pred) if self.arena[pred].x + self.arena[pred].width > x => {
                    let right_cells = std::mem::take(&mut self.arena[idx].cells);
                    let (right_q, right_weight, right_width) = {
                        let right = &self.arena[idx];
                        (right.q, right.weight, right.width)
                    };
                    let pred_node = &mut self.arena[pred];
                    let old_width = pred_node.width;
                    pred_node.cells.extend(right_cells);
                    pred_node.weight += right_weight;
                    pred_node.q += right_q - right_weight * old_width;
                    pred_node.width += right_width;
                    idx = pred;
                }
                _ => return idx,
            }
        }
    }

    /// Final pass: walk every sub-row's cluster chain and lay members out at
    /// consecutive site-aligned positions from the cluster anchor.
    fn assign_final_positions(&self, ctx: &mut DesignContext) {
        let DesignContext {
            placement_rows,
            instances,
            ..
        } = ctx;
        for row in placement_rows.iter() {
            for subrow in &row.subrows {
                let mut current = subrow.last_cluster;
                while let Some(idx) = current {
                    let node = &self.arena[idx];
                    let mut x =
                        subrow.x_min + ((node.x - subrow.x_min) / row.site_width).floor() * row.site_width;
                    for cell in &node.cells {
                        if let Some(instance) = instances.get_mut(&cell.name) {
                            instance.new_position = Some(Point::new(x, row.origin.y));
                        }
                        x += cell.width;
                    }
                    current = node.left;
                }
            }
        }
    }
}

/// Carves each row's sub-rows around the obstacle rectangles. Obstacle edges
/// snap outward to the site grid with a small epsilon absorbing boundaries
/// that land exactly on a site.
pub fn build_subrows(rows: &mut [PlacementRow], obstacles: &[Rect]) {
    for rect in obstacles {
        for row in rows.iter_mut() {
            if !(row.origin.y + row.height > rect.ymin && row.origin.y < rect.ymax) {
                continue;
            }
            let site = row.site_width;
            let front =
                row.origin.x + ((rect.xmin - row.origin.x) / site + SNAP_EPS).floor() * site;
            let back =
                row.origin.x + ((rect.xmax - row.origin.x) / site - SNAP_EPS).ceil() * site;

            let mut carved = Vec::with_capacity(row.subrows.len() + 1);
            for subrow in row.subrows.drain(..) {
                if subrow.x_max <= front || back <= subrow.x_min {
                    carved.push(subrow);
                } else if front <= subrow.x_min && back >= subrow.x_max {
                    // fully covered
                } else if front <= subrow.x_min {
                    carved.push(SubRow::new(back, subrow.x_max));
                } else if back >= subrow.x_max {
                    carved.push(SubRow::new(subrow.x_min, front));
                } else {
                    carved.push(SubRow::new(subrow.x_min, front));
                    carved.push(SubRow::new(back, subrow.x_max));
                }
            }
            row.subrows = carved;
        }
    }
}

/// Index of the row whose origin is closest in Y; an exact midpoint tie
/// picks the lower row. Rows must be sorted bottom-up.
fn closest_row_index(rows: &[PlacementRow], y: float) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    let upper = rows.partition_point(|r| r.origin.y < y);
    if upper == 0 {
        return Some(0);
    }
    if upper == rows.len() {
        return Some(rows.len() - 1);
    }
    let below = upper - 1;
    if (y - rows[below].origin.y) <= (rows[upper].origin.y - y) {
        Some(below)
    } else {
        Some(upper)
    }
}

/// The sub-row needing the minimum horizontal move to host the cell. The
/// scan exploits the x-ordering of sub-rows and stops as soon as the move
/// starts growing.
fn find_subrow_pos(row: &PlacementRow, cell_width: float, x: float) -> Option<usize> {
    let mut best = None;
    let mut min_move = float::INFINITY;
    for (idx, subrow) in row.subrows.iter().enumerate() {
        if cell_width > subrow.usable_width {
            continue;
        }
        let mut movement = 0.0;
        if x < subrow.x_min {
            movement = subrow.x_min - x;
        } else if x + cell_width > subrow.x_max {
            movement = x + cell_width - subrow.x_max;
        }
        if movement < min_move {
            min_move = movement;
            best = Some(idx);
        } else {
            break;
        }
    }
    best
}

// --------------------------------------------------------------------------------
// ## Post-legalization statistics and checks
// --------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct DisplacementStats {
    pub total: float,
    pub max: float,
    pub moved: usize,
}

/// Total and maximum Euclidean displacement over every FF the legalizer
/// positioned.
pub fn displacement_stats(ctx: &DesignContext) -> DisplacementStats {
    let mut stats = DisplacementStats::default();
    for instance in ctx.instances.values() {
        if !instance.is_flip_flop() {
            continue;
        }
        let Some(new_pos) = instance.new_position else {
            continue;
        };
        let displacement = instance.position.distance_to(&new_pos);
        stats.total += displacement;
        if displacement > stats.max {
            stats.max = displacement;
        }
        if displacement > 1e-6 {
            stats.moved += 1;
        }
    }
    stats
}

/// Row and sub-row layout listing for debugging carve results.
pub fn subrow_report(ctx: &DesignContext) -> Vec<String> {
    let mut lines = vec![format!("Rows: {}", ctx.placement_rows.len())];
    for row in &ctx.placement_rows {
        lines.push(format!(
            "Row {} @ ({}, {}) sites {} step {} height {}",
            row.id, row.origin.x, row.origin.y, row.num_x, row.step_x, row.height
        ));
        for (i, subrow) in row.subrows.iter().enumerate() {
            lines.push(format!(
                "  SubRow[{i}]: [{}, {}) usable {}",
                subrow.x_min, subrow.x_max, subrow.usable_width
            ));
        }
    }
    lines
}

/// Every placed FF must sit on a site of its row.
pub fn verify_site_alignment(ctx: &DesignContext) -> Vec<String> {
    let mut violations = Vec::new();
    for (name, instance) in &ctx.instances {
        if !instance.is_flip_flop() {
            continue;
        }
        let Some(pos) = instance.new_position else {
            continue;
        };
        let Some(row) = ctx
            .placement_rows
            .iter()
            .find(|r| (r.origin.y - pos.y).abs() < 1e-3)
        else {
            violations.push(format!("{name}: y={} matches no row", pos.y));
            continue;
        };
        let offset = (pos.x - row.origin.x) / row.site_width;
        if (offset - offset.round()).abs() >= 1e-9 {
            violations.push(format!("{name}: x={} off-site in row {}", pos.x, row.id));
        }
    }
    violations
}

/// No two placed FF footprints may intersect.
pub fn verify_no_overlap(ctx: &DesignContext) -> Vec<String> {
    let mut violations = Vec::new();
    let mut tree = Rtree::new();
    for (name, instance) in &ctx.instances {
        if !instance.is_flip_flop() || instance.status != PlacementStatus::Placed {
            continue;
        }
        let Some(pos) = instance.new_position else {
            continue;
        };
        let footprint = Rect::from_size(pos.x, pos.y, instance.width(), instance.height());
        let bbox = footprint.erosion(0.1).bbox();
        if tree.count_bbox(bbox) > 0 {
            let other = tree.intersection_bbox(bbox)[0];
            let other = Rect::new(other[0][0], other[0][1], other[1][0], other[1][1]);
            violations.push(format!(
                "{name}: overlaps a placed cell by {:.1} units^2",
                footprint.intersection_area(&other)
            ));
        }
        tree.insert_bbox(bbox);
    }
    violations
}
