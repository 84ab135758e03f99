use std::sync::Arc;

use tracing::debug;

use crate::cache::DetectionFailureCache;
use crate::consts::SECS_PER_HOUR;
use crate::core_types::{ObjectKind, Ordinal, ParticleId};
use crate::geometry::{GeoPoint, LocalFrame};
use crate::oracle::FailureKind;
use crate::placement::{Extent, Placement, SearchShape};
use crate::scenario::Scenario;
use crate::variable::{PatternKind, PatternVariable};
use crate::workers::CancelToken;

/// Axis-aligned box in a heading-aligned local frame, nm.
#[derive(Debug, Clone, Copy)]
struct Rect {
    a0: f64,
    a1: f64,
    c0: f64,
    c1: f64,
}

impl Rect {
    fn along(&self) -> f64 {
        self.a1 - self.a0
    }

    fn across(&self) -> f64 {
        self.c1 - self.c0
    }

    fn area(&self) -> f64 {
        self.along() * self.across()
    }

    fn center(&self) -> (f64, f64) {
        ((self.a0 + self.a1) / 2.0, (self.c0 + self.c1) / 2.0)
    }

    /// Grows each side symmetrically up to at least `min` nm.
    fn expanded_to(mut self, min: f64) -> Rect {
        if self.along() < min {
            let pad = (min - self.along()) / 2.0;
            self.a0 -= pad;
            self.a1 += pad;
        }
        if self.across() < min {
            let pad = (min - self.across()) / 2.0;
            self.c0 -= pad;
            self.c1 += pad;
        }
        self
    }
}

struct Cloud {
    ids: Vec<ParticleId>,
    weights: Vec<f64>,
    total: f64,
    object_kind: ObjectKind,
}

/// Single-variable placement oracle: given fixed placements for everyone
/// else, finds a good placement for one variable by grid/lattice search.
/// Reads only, apart from detection-failure cache fills.
pub struct Placer {
    scenario: Arc<Scenario>,
    cache: Arc<DetectionFailureCache>,
}

impl Placer {
    pub fn new(scenario: Arc<Scenario>, cache: Arc<DetectionFailureCache>) -> Self {
        Self { scenario, cache }
    }

    /// Best placement found across the tried headings, or `Unplaced` when
    /// the particle sample is empty or every candidate scores zero.
    pub fn place(&self, ordinal: Ordinal, fixed: &[Placement], cancel: &CancelToken) -> Placement {
        let var = self.scenario.variable(ordinal);
        let cloud = self.weighted_cloud(ordinal, fixed, cancel);
        if cloud.ids.is_empty() || !(cloud.total > 0.0) {
            debug!(ordinal, "no particle mass to place against");
            return Placement::Unplaced;
        }

        let commence = self.scenario.config.search.plan_epoch_sec;
        let duration = var.default_duration_sec();
        let t_mid = commence + duration / 2.0;
        let track_nm = var.speed_kn * duration / SECS_PER_HOUR;

        let headings = self.scenario.config.placer.headings.max(1);
        let mut best: Option<(f64, SearchShape)> = None;

        for i in 0..headings {
            if cancel.is_cancelled() {
                break;
            }
            let heading = 180.0 * i as f64 / headings as f64;
            let scored = match var.kind {
                PatternKind::ParallelSweep => {
                    self.best_box(var, &cloud, heading, commence, duration, t_mid, track_nm)
                }
                PatternKind::ExpandingSquare | PatternKind::SectorSearch => {
                    self.best_rattle(var, &cloud, heading, commence, duration, t_mid, track_nm)
                }
            };
            if let Some((score, shape)) = scored {
                if best.as_ref().map_or(true, |(b, _)| score > *b) {
                    best = Some((score, shape));
                }
            }
        }

        match best {
            Some((score, shape)) if score > 0.0 && var.legal(&shape) => Placement::Search(shape),
            _ => Placement::Unplaced,
        }
    }

    /// Particle weights: prior mass times the probability every already-fixed
    /// competitor placement fails to detect the particle.
    fn weighted_cloud(&self, ordinal: Ordinal, fixed: &[Placement], cancel: &CancelToken) -> Cloud {
        let particles = &self.scenario.particles;
        let ids = particles.ids();
        let mut weights: Vec<f64> = ids.iter().map(|&id| particles.prior(id)).collect();

        for (other, placement) in fixed.iter().enumerate() {
            if other == ordinal {
                continue;
            }
            let Some(shape) = placement.shape() else {
                continue;
            };
            let samples = self
                .cache
                .get(shape, &ids, FailureKind::PerSortie, cancel);
            for (w, s) in weights.iter_mut().zip(&samples) {
                *w *= s.net_fail;
            }
        }

        let total: f64 = weights.iter().sum();
        let object_kind = ids
            .iter()
            .zip(&weights)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&id, _)| particles.object_kind(id))
            .unwrap_or(0);

        Cloud {
            ids,
            weights,
            total,
            object_kind,
        }
    }

    fn local_points(&self, cloud: &Cloud, frame: &LocalFrame, t_mid: f64) -> Vec<(f64, f64, f64)> {
        cloud
            .ids
            .iter()
            .zip(&cloud.weights)
            .map(|(&id, &w)| {
                let p = self.scenario.particles.position_at(id, t_mid);
                let (along, across) = frame.to_local(&p);
                (along, across, w)
            })
            .collect()
    }

    fn weighted_centroid(&self, cloud: &Cloud, t_mid: f64) -> GeoPoint {
        let mut lat = 0.0;
        let mut lon = 0.0;
        for (&id, &w) in cloud.ids.iter().zip(&cloud.weights) {
            let p = self.scenario.particles.position_at(id, t_mid);
            lat += p.lat_deg * w;
            lon += p.lon_deg * w;
        }
        GeoPoint::new(lat / cloud.total, lon / cloud.total)
    }

    fn box_score(
        &self,
        mass: f64,
        total: f64,
        area_nm2: f64,
        track_nm: f64,
        object_kind: ObjectKind,
        speed_kn: f64,
    ) -> f64 {
        if !(area_nm2 > 0.0) || !(total > 0.0) {
            return 0.0;
        }
        let sweep = self.scenario.sweep.sweep_width_nm(object_kind, speed_kn);
        let coverage = sweep * track_nm / area_nm2;
        let score = (mass / total) * self.scenario.sweep.pod(coverage);
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }

    /// Adaptive box search: one cell covering the particle extent, split into
    /// a near-square grid each round; every sub-rectangle of at least half
    /// the incumbent's area is scored, the best becomes the next cell.
    #[allow(clippy::too_many_arguments)]
    fn best_box(
        &self,
        var: &PatternVariable,
        cloud: &Cloud,
        heading: f64,
        commence: f64,
        duration: f64,
        t_mid: f64,
        track_nm: f64,
    ) -> Option<(f64, SearchShape)> {
        let cfg = &self.scenario.config.placer;
        let frame = LocalFrame::new(self.weighted_centroid(cloud, t_mid), heading);
        let pts = self.local_points(cloud, &frame, t_mid);

        let mut cell = covering_rect(&pts)?.expanded_to(var.min_extent_nm());

        let score_rect = |r: &Rect| {
            let mass: f64 = pts
                .iter()
                .filter(|(a, c, _)| *a >= r.a0 && *a <= r.a1 && *c >= r.c0 && *c <= r.c1)
                .map(|(_, _, w)| w)
                .sum();
            self.box_score(
                mass,
                cloud.total,
                r.area(),
                track_nm,
                cloud.object_kind,
                var.speed_kn,
            )
        };

        let mut best_rect = cell;
        let mut best_score = score_rect(&cell);

        for _ in 0..cfg.split_rounds {
            let (na, nc) = grid_dims(cell.along(), cell.across(), cfg.grid_cells, cfg.min_cells_small);

            // Mass histogram with 2-D prefix sums over the cell.
            let da = cell.along() / na as f64;
            let dc = cell.across() / nc as f64;
            let mut prefix = vec![0.0f64; (na + 1) * (nc + 1)];
            {
                let mut bins = vec![0.0f64; na * nc];
                for (a, c, w) in &pts {
                    if *a < cell.a0 || *a > cell.a1 || *c < cell.c0 || *c > cell.c1 {
                        continue;
                    }
                    let ia = (((a - cell.a0) / da) as usize).min(na - 1);
                    let ic = (((c - cell.c0) / dc) as usize).min(nc - 1);
                    bins[ia * nc + ic] += w;
                }
                for i in 0..na {
                    for j in 0..nc {
                        prefix[(i + 1) * (nc + 1) + (j + 1)] = bins[i * nc + j]
                            + prefix[i * (nc + 1) + (j + 1)]
                            + prefix[(i + 1) * (nc + 1) + j]
                            - prefix[i * (nc + 1) + j];
                    }
                }
            }
            let mass_of = |i0: usize, i1: usize, j0: usize, j1: usize| {
                prefix[i1 * (nc + 1) + j1] - prefix[i0 * (nc + 1) + j1]
                    - prefix[i1 * (nc + 1) + j0]
                    + prefix[i0 * (nc + 1) + j0]
            };

            let floor_area = best_rect.area() / 2.0;
            let mut round_best: Option<(f64, Rect)> = None;

            for i0 in 0..na {
                for i1 in (i0 + 1)..=na {
                    for j0 in 0..nc {
                        for j1 in (j0 + 1)..=nc {
                            let r = Rect {
                                a0: cell.a0 + i0 as f64 * da,
                                a1: cell.a0 + i1 as f64 * da,
                                c0: cell.c0 + j0 as f64 * dc,
                                c1: cell.c0 + j1 as f64 * dc,
                            };
                            if r.area() < floor_area {
                                continue;
                            }
                            let score = self.box_score(
                                mass_of(i0, i1, j0, j1),
                                cloud.total,
                                r.area(),
                                track_nm,
                                cloud.object_kind,
                                var.speed_kn,
                            );
                            if round_best.as_ref().map_or(true, |(b, _)| score > *b) {
                                round_best = Some((score, r));
                            }
                        }
                    }
                }
            }

            let Some((score, rect)) = round_best else {
                break;
            };
            if score > best_score {
                best_score = score;
                best_rect = rect.expanded_to(var.min_extent_nm());
            }
            cell = best_rect;
        }

        let (ca, cc) = best_rect.center();
        let mut shape = SearchShape {
            commence_sec: commence,
            duration_sec: duration,
            center: frame.to_geo(ca, cc),
            heading_deg: heading,
            extent: Extent::Box {
                along_nm: best_rect.along(),
                across_nm: best_rect.across(),
            },
        };
        shrink_until_legal(var, &mut shape);
        Some((best_score, shape))
    }

    /// Lattice/sector placement: rattle a fixed-size pattern over a coarse
    /// position lattice and keep the best capture.
    #[allow(clippy::too_many_arguments)]
    fn best_rattle(
        &self,
        var: &PatternVariable,
        cloud: &Cloud,
        heading: f64,
        commence: f64,
        duration: f64,
        t_mid: f64,
        track_nm: f64,
    ) -> Option<(f64, SearchShape)> {
        let cfg = &self.scenario.config.placer;
        let frame = LocalFrame::new(self.weighted_centroid(cloud, t_mid), heading);
        let pts = self.local_points(cloud, &frame, t_mid);
        let extent_rect = covering_rect(&pts)?;

        // Pattern footprint is fixed by the duration budget.
        let side = match var.kind {
            PatternKind::ExpandingSquare => (track_nm * var.min_spacing_nm).sqrt() * 0.9,
            _ => var.sector_radius_nm() * 2.0,
        }
        .max(var.min_spacing_nm);
        let half = side / 2.0;

        let n = cfg.rattle_cells.max(1);
        let mut best: Option<(f64, f64, f64)> = None;
        for i in 0..n {
            for j in 0..n {
                let a = extent_rect.a0
                    + extent_rect.along() * (i as f64 + 0.5) / n as f64;
                let c = extent_rect.c0
                    + extent_rect.across() * (j as f64 + 0.5) / n as f64;
                let mass: f64 = pts
                    .iter()
                    .filter(|(pa, pc, _)| {
                        (pa - a).abs() <= half && (pc - c).abs() <= half
                    })
                    .map(|(_, _, w)| w)
                    .sum();
                let score = self.box_score(
                    mass,
                    cloud.total,
                    side * side,
                    track_nm,
                    cloud.object_kind,
                    var.speed_kn,
                );
                if best.as_ref().map_or(true, |(b, _, _)| score > *b) {
                    best = Some((score, a, c));
                }
            }
        }

        let (score, a, c) = best?;
        let extent = match var.kind {
            PatternKind::ExpandingSquare => Extent::Lattice { across_nm: side },
            _ => Extent::Sector { clockwise: true },
        };
        let shape = SearchShape {
            commence_sec: commence,
            duration_sec: duration,
            center: frame.to_geo(a, c),
            heading_deg: heading,
            extent,
        };
        Some((score, shape))
    }
}

fn covering_rect(pts: &[(f64, f64, f64)]) -> Option<Rect> {
    let mut it = pts.iter().filter(|(_, _, w)| *w > 0.0);
    let first = it.next()?;
    let mut r = Rect {
        a0: first.0,
        a1: first.0,
        c0: first.1,
        c1: first.1,
    };
    for (a, c, _) in it {
        r.a0 = r.a0.min(*a);
        r.a1 = r.a1.max(*a);
        r.c0 = r.c0.min(*c);
        r.c1 = r.c1.max(*c);
    }
    Some(r)
}

/// Near-square grid: fixed cell count on the large side, proportional (but
/// at least `min_small`) on the small side.
fn grid_dims(along: f64, across: f64, large_cells: usize, min_small: usize) -> (usize, usize) {
    let large_cells = large_cells.max(2);
    let min_small = min_small.max(1);
    if along >= across {
        let nc = ((large_cells as f64 * across / along.max(1e-9)).round() as usize)
            .clamp(min_small, large_cells);
        (large_cells, nc)
    } else {
        let na = ((large_cells as f64 * along / across.max(1e-9)).round() as usize)
            .clamp(min_small, large_cells);
        (na, large_cells)
    }
}

/// Walks an oversized box back inside the variable's endurance limits.
fn shrink_until_legal(var: &PatternVariable, shape: &mut SearchShape) {
    for _ in 0..48 {
        if var.legal(shape) {
            return;
        }
        match &mut shape.extent {
            Extent::Box {
                along_nm,
                across_nm,
            } => {
                *along_nm *= 0.85;
                *across_nm *= 0.85;
                if *along_nm < var.min_spacing_nm || *across_nm < var.min_spacing_nm {
                    *along_nm = var.min_spacing_nm;
                    *across_nm = var.min_spacing_nm;
                    return;
                }
            }
            Extent::Lattice { across_nm } => {
                *across_nm *= 0.85;
                if across_nm.abs() < var.min_spacing_nm {
                    return;
                }
            }
            Extent::Sector { .. } => return,
        }
    }
}
