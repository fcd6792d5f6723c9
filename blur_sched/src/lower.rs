//! Lowering of a [`BlurSchedule`] into the loop nest the executor runs.
//!
//! Directives are replayed in order against the stage's loop list (innermost
//! first, starting from `[x, y]`), exactly like a split/reorder chain would
//! rewrite the loop nest. The resulting shape is then matched against what the
//! tiled executor supports.

use log::debug;

use crate::pipeline::Stage;
use crate::schedule::{BlurSchedule, Directive, StageSchedule, Var};
use crate::{Error, Result};

/// Where values of the producer stage (`blur_x`) live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Recomputed at every use; no storage.
    Inline,
    /// Computed per tile of the consumer, into a tile-sized scratch buffer.
    PerTile,
    /// Computed once over the consumer's whole footprint before it runs.
    Root,
}

/// Lowered form of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopNest {
    /// Output tile width; `None` means the whole extent.
    pub tile_width: Option<usize>,
    /// Output tile height; `None` means the whole extent.
    pub tile_height: Option<usize>,
    /// Lane width of the output's innermost x loop.
    pub lanes: usize,
    /// Rows of tiles run on threads.
    pub parallel_rows: bool,
    /// Tiles within a row of tiles run on threads.
    pub parallel_tiles: bool,
    pub producer: Storage,
    /// Lane width of the producer's x loop.
    pub producer_lanes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Full,
    Outer(usize),
    Inner(usize),
    /// Outer half of a lane split; carries the tile factor of its parent.
    LaneOuter(usize),
    Lane(usize),
}

#[derive(Debug, Clone, Copy)]
struct Loop {
    var: Var,
    axis: Axis,
    kind: Kind,
    vectorized: bool,
    parallel: bool,
}

/// Loop list of one stage, innermost first.
struct Nest {
    stage: Stage,
    loops: Vec<Loop>,
}

impl Nest {
    fn new(stage: Stage) -> Self {
        let full = |var, axis| Loop {
            var,
            axis,
            kind: Kind::Full,
            vectorized: false,
            parallel: false,
        };
        Self {
            stage,
            loops: vec![full(Var::X, Axis::X), full(Var::Y, Axis::Y)],
        }
    }

    fn err(&self, reason: impl Into<String>) -> Error {
        Error::compilation(self.stage, reason)
    }

    fn position(&self, var: Var) -> Result<usize> {
        self.loops
            .iter()
            .position(|l| l.var == var)
            .ok_or_else(|| self.err(format!("no loop named `{var}`")))
    }

    fn split(&mut self, var: Var, outer: Var, inner: Var, factor: u32) -> Result<()> {
        if factor == 0 {
            return Err(self.err(format!("split of `{var}` by zero")));
        }
        if outer == inner {
            return Err(self.err(format!("split of `{var}` names both halves `{outer}`")));
        }
        let pos = self.position(var)?;
        for name in [outer, inner] {
            if name != var && self.loops.iter().any(|l| l.var == name) {
                return Err(self.err(format!("loop `{name}` already exists")));
            }
        }
        let parent = self.loops[pos];
        if parent.vectorized || parent.parallel {
            return Err(self.err(format!("`{var}` is split after being marked")));
        }
        let factor = factor as usize;
        let (outer_kind, inner_kind) = match (parent.kind, parent.axis) {
            (Kind::Full, _) => (Kind::Outer(factor), Kind::Inner(factor)),
            (Kind::Inner(tile), Axis::X) => (Kind::LaneOuter(tile), Kind::Lane(factor)),
            _ => {
                return Err(self.err(format!(
                    "nested split of `{var}` is not supported"
                )))
            }
        };
        let make = |var, kind| Loop {
            var,
            axis: parent.axis,
            kind,
            vectorized: false,
            parallel: false,
        };
        self.loops.splice(
            pos..=pos,
            [make(inner, inner_kind), make(outer, outer_kind)],
        );
        Ok(())
    }

    fn reorder(&mut self, vars: &[Var]) -> Result<()> {
        let mut slots = Vec::with_capacity(vars.len());
        for &var in vars {
            let pos = self.position(var)?;
            if slots.contains(&pos) {
                return Err(self.err(format!("`{var}` listed twice in reorder")));
            }
            slots.push(pos);
        }
        let picked: Vec<Loop> = slots.iter().map(|&p| self.loops[p]).collect();
        slots.sort_unstable();
        for (slot, l) in slots.into_iter().zip(picked) {
            self.loops[slot] = l;
        }
        Ok(())
    }

    fn vectorize(&mut self, var: Var) -> Result<()> {
        let pos = self.position(var)?;
        let Loop { kind, axis, .. } = self.loops[pos];
        match (kind, axis) {
            (Kind::Inner(_) | Kind::Lane(_), Axis::X) => {
                self.loops[pos].vectorized = true;
                Ok(())
            }
            (_, Axis::Y) => Err(self.err(format!(
                "cannot vectorize `{var}`: only x loops run in lanes"
            ))),
            _ => Err(self.err(format!(
                "cannot vectorize `{var}`: not the inner half of a split"
            ))),
        }
    }

    fn parallel(&mut self, var: Var) -> Result<()> {
        let pos = self.position(var)?;
        match self.loops[pos].kind {
            Kind::Full | Kind::Outer(_) => {
                self.loops[pos].parallel = true;
                Ok(())
            }
            _ => Err(self.err(format!("cannot parallelize inner loop `{var}`"))),
        }
    }

    fn apply(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::Split {
                var,
                outer,
                inner,
                factor,
            } => self.split(*var, *outer, *inner, *factor),
            Directive::Reorder(vars) => self.reorder(vars),
            Directive::Vectorize(var) => self.vectorize(*var),
            Directive::Parallel(var) => self.parallel(*var),
            Directive::ComputeRoot | Directive::ComputeAt { .. } => Ok(()),
        }
    }

    fn lanes(&self) -> Result<usize> {
        let mut lanes = 1;
        for (i, l) in self.loops.iter().enumerate().filter(|(_, l)| l.vectorized) {
            if i != 0 {
                return Err(self.err(format!("vectorized loop `{}` is not innermost", l.var)));
            }
            lanes = match l.kind {
                Kind::Inner(f) | Kind::Lane(f) => f,
                _ => 1,
            };
        }
        Ok(lanes)
    }

    /// Tile factor of `axis`, unless its only split is the lane split.
    fn tile(&self, axis: Axis) -> Option<usize> {
        self.loops.iter().find_map(|l| match l.kind {
            Kind::Inner(f) if l.axis == axis && !l.vectorized => Some(f),
            Kind::LaneOuter(f) if l.axis == axis => Some(f),
            _ => None,
        })
    }

    /// Whole-axis `x` split whose inner half is the lane loop.
    fn has_lane_chunks(&self) -> bool {
        self.loops
            .iter()
            .any(|l| l.axis == Axis::X && matches!(l.kind, Kind::Inner(_)) && l.vectorized)
    }

    fn is_tile_loop(&self, l: &Loop) -> bool {
        matches!(l.kind, Kind::Outer(_)) && !(l.axis == Axis::X && self.has_lane_chunks())
    }

    /// Every loop inside a tile must be nested below every tile loop.
    fn check_tile_major(&self) -> Result<()> {
        let Some(first) = self.loops.iter().position(|l| self.is_tile_loop(l)) else {
            return Ok(());
        };
        let stray = self.loops[first..]
            .iter()
            .find(|l| l.kind != Kind::Full && !self.is_tile_loop(l));
        match stray {
            Some(l) => Err(self.err(format!(
                "inner loop `{}` is outside a tile loop; only tile-major order is supported",
                l.var
            ))),
            None => Ok(()),
        }
    }

    /// The tile loop directly around the tile body.
    fn innermost_tile_var(&self) -> Option<Var> {
        self.loops
            .iter()
            .find(|l| self.is_tile_loop(l))
            .map(|l| l.var)
    }

    fn parallel_on(&self, axis: Axis) -> bool {
        self.loops.iter().any(|l| l.axis == axis && l.parallel)
    }
}

fn check_stage(schedule: &StageSchedule, expected: Stage) -> Result<()> {
    if schedule.stage() != expected {
        return Err(Error::compilation(
            expected,
            format!("got directives for {}", schedule.stage()),
        ));
    }
    Ok(())
}

fn lower_consumer(schedule: &StageSchedule) -> Result<Nest> {
    check_stage(schedule, Stage::BlurY)?;
    let mut nest = Nest::new(Stage::BlurY);
    for directive in schedule.directives() {
        if let Directive::ComputeAt { .. } = directive {
            return Err(nest.err("the output stage cannot be computed inside another stage"));
        }
        nest.apply(directive)?;
    }
    nest.check_tile_major()?;
    Ok(nest)
}

fn lower_producer(schedule: &StageSchedule, consumer: &Nest) -> Result<(Storage, usize)> {
    check_stage(schedule, Stage::BlurX)?;
    let mut nest = Nest::new(Stage::BlurX);
    let mut storage = Storage::Inline;

    for directive in schedule.directives() {
        match directive {
            Directive::ComputeRoot => storage = Storage::Root,
            Directive::ComputeAt { consumer: stage, at } => {
                if *stage != Stage::BlurY {
                    return Err(nest.err(format!("cannot compute {} inside {stage}", nest.stage)));
                }
                consumer.position(*at)?;
                match consumer.innermost_tile_var() {
                    Some(var) if var == *at => storage = Storage::PerTile,
                    Some(var) => {
                        return Err(nest.err(format!(
                            "compute_at `{at}` is not supported, only the innermost tile loop `{var}`"
                        )))
                    }
                    None => {
                        return Err(nest.err(format!("`{at}` of blur_y is not a tile loop")));
                    }
                }
            }
            Directive::Reorder(_) => {
                return Err(nest.err("reordering the producer's loops is not supported"))
            }
            Directive::Parallel(var) => {
                return Err(nest.err(format!(
                    "cannot parallelize producer loop `{var}`; parallelize the consumer's tiles"
                )))
            }
            Directive::Split { var, .. } if *var != Var::X => {
                return Err(nest.err(format!("only `x` of the producer may be split, not `{var}`")))
            }
            other => nest.apply(other)?,
        }
    }

    let lanes = nest.lanes()?;
    if storage == Storage::Inline && !schedule.directives().is_empty() {
        return Err(nest.err("an inlined stage has no loops to schedule"));
    }
    Ok((storage, lanes))
}

/// Lower both stage schedules into a [`LoopNest`].
pub fn lower(schedule: &BlurSchedule) -> Result<LoopNest> {
    let consumer = lower_consumer(&schedule.blur_y)?;
    let (producer, producer_lanes) = lower_producer(&schedule.blur_x, &consumer)?;

    let nest = LoopNest {
        tile_width: consumer.tile(Axis::X),
        tile_height: consumer.tile(Axis::Y),
        lanes: consumer.lanes()?,
        parallel_rows: consumer.parallel_on(Axis::Y),
        parallel_tiles: consumer.parallel_on(Axis::X),
        producer,
        producer_lanes,
    };
    debug!("lowered schedule: {:?}", nest);
    Ok(nest)
}
