use std::{
    collections::HashSet,
    fmt, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use metrohash::MetroBuildHasher;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, trace};

use crate::{utils::lock, BlendPolicy, Cell, CellId, Color, Config, Grid};

/// cells a worker has touched during its current traversal.
pub type Trail = HashSet<CellId, MetroBuildHasher>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// what workers tell the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CellChanged {
        cell: CellId,
        color: Color,
        worker: WorkerId,
    },
    WorkerFinished {
        worker: WorkerId,
    },
}

/// sends `WorkerFinished` when dropped, so the pool hears about panics too.
struct FinishNotice {
    worker: WorkerId,
    events: mpsc::Sender<Event>,
}

impl Drop for FinishNotice {
    fn drop(&mut self) {
        // nobody to tell if the pool is already gone
        let _ = self.events.send(Event::WorkerFinished {
            worker: self.worker,
        });
    }
}

/// reasons for leaving the state machine before it reaches `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Stopped,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Seeding,
    Walking { from: CellId },
    Spreading { at: CellId },
    Finalizing { at: CellId },
    Done,
}

/// random walker coloring the grid one cell per step. done once its trail
/// has no edge left.
pub struct Worker {
    id: WorkerId,
    grid: Arc<Grid>,
    config: Config,
    trail: Arc<Mutex<Trail>>,
    start: Option<CellId>,
    events: mpsc::Sender<Event>,
    stop: Arc<AtomicBool>,
    rng: StdRng,
    depth: usize,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        grid: Arc<Grid>,
        config: Config,
        events: mpsc::Sender<Event>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            grid,
            config,
            trail: Arc::default(),
            start: None,
            events,
            stop,
            rng: StdRng::from_entropy(),
            depth: 0,
        }
    }

    /// starts from `cell` instead of a random one.
    pub fn with_start(mut self, cell: CellId) -> Self {
        self.start = Some(cell);
        self
    }

    /// continues from a trail left by another worker.
    pub fn with_trail(mut self, trail: Trail) -> Self {
        self.trail = Arc::new(Mutex::new(trail));
        self
    }

    /// the worker's trail, readable while it runs.
    pub fn trail(&self) -> Arc<Mutex<Trail>> {
        Arc::clone(&self.trail)
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("bleed-worker-{}", self.id.0))
            .spawn(move || self.run())
    }

    /// runs to completion on the current thread.
    pub fn run(mut self) {
        let _finished = FinishNotice {
            worker: self.id,
            events: self.events.clone(),
        };
        match self.drive() {
            Ok(()) => debug!(worker = %self.id, "worker done"),
            Err(Halt::Stopped) => debug!(worker = %self.id, "worker stopped"),
            Err(Halt::Disconnected) => debug!(worker = %self.id, "pool is gone, worker exits"),
        }
    }

    fn drive(&mut self) -> Result<(), Halt> {
        let mut phase = Phase::Seeding;
        loop {
            trace!(worker = %self.id, ?phase);
            phase = match phase {
                Phase::Seeding => Phase::Walking { from: self.seed()? },
                Phase::Walking { from } => self.walk(from)?,
                Phase::Spreading { at } => self.spread_from(at)?,
                Phase::Finalizing { at } => self.finalize(at)?,
                Phase::Done => return Ok(()),
            };
        }
    }

    fn seed(&mut self) -> Result<CellId, Halt> {
        let grid = Arc::clone(&self.grid);
        let cell = match self.start {
            Some(id) => &grid[id],
            None => grid.random_cell(&mut self.rng),
        };
        if !cell.is_set() {
            cell.assign(Color::random(&mut self.rng));
        }
        debug!(worker = %self.id, location = ?cell.location(), "seeded");
        self.visit(cell.id());
        self.notify(cell.id(), cell.color())?;
        Ok(cell.id())
    }

    fn walk(&mut self, from: CellId) -> Result<Phase, Halt> {
        let grid = Arc::clone(&self.grid);
        let mut current = from;
        loop {
            if self.depth >= self.config.depth_limit {
                return Ok(Phase::Finalizing { at: current });
            }
            self.depth += 1;

            let candidates = self.candidates(current);
            let Some(&next) = candidates.choose(&mut self.rng) else {
                return Ok(Phase::Spreading { at: current });
            };

            let color = self.step_color(current, next);
            grid[next].assign(color);
            self.visit(next);
            self.notify(next, color)?;

            let interval = self.config.spread_interval;
            if interval > 0 && self.depth % interval == 0 {
                self.spread()?;
            }
            current = next;
        }
    }

    /// neighbors of `current` that are not settled and not on the trail yet.
    fn candidates(&self, current: CellId) -> Vec<CellId> {
        let trail = lock(&self.trail);
        self.grid
            .neighbors(current)
            .filter(|n| !n.is_settled(self.config.saturation) && !trail.contains(&n.id()))
            .map(Cell::id)
            .collect()
    }

    fn step_color(&mut self, current: CellId, next: CellId) -> Color {
        let grid = &self.grid;
        let target = &grid[next];
        let base = match (target.is_set(), self.config.policy) {
            (false, _) | (true, BlendPolicy::Overwrite) => target.bleed(grid, true),
            (true, BlendPolicy::Blend) => Color::average(&[grid[current].color(), target.color()]),
        };
        base.nudge(&mut self.rng)
    }

    fn spread_from(&mut self, at: CellId) -> Result<Phase, Halt> {
        let expanded = self.spread()?;
        Ok(match expanded.choose(&mut self.rng) {
            Some(&next) => Phase::Walking { from: next },
            None => Phase::Finalizing { at },
        })
    }

    /// colors one unset neighbor of a sample of the trail's edge cells.
    /// returns the cells it colored.
    fn spread(&mut self) -> Result<Vec<CellId>, Halt> {
        let grid = Arc::clone(&self.grid);
        let mut edges = self.edges();
        edges.shuffle(&mut self.rng);
        edges.truncate(self.config.spread_sample(edges.len()));

        let mut expanded = Vec::new();
        for edge in edges {
            let fringe: Vec<_> = grid
                .neighbors(edge)
                .filter(|n| !n.is_set())
                .map(Cell::id)
                .collect();
            let Some(&bleeder) = fringe.choose(&mut self.rng) else {
                continue;
            };

            let stranger = {
                let trail = lock(&self.trail);
                grid.neighbors(bleeder)
                    .any(|n| n.is_set() && !trail.contains(&n.id()))
            };
            let color = if stranger {
                Color::average(&grid[bleeder].surrounding_colors(&grid))
            } else {
                grid[edge].color().nudge(&mut self.rng)
            };

            grid[bleeder].assign(color);
            self.visit(bleeder);
            self.notify(bleeder, color)?;
            expanded.push(bleeder);
        }
        Ok(expanded)
    }

    fn finalize(&mut self, at: CellId) -> Result<Phase, Halt> {
        let grid = Arc::clone(&self.grid);
        let cell = &grid[at];
        let surrounding = cell.surrounding_colors(&grid);
        if !surrounding.is_empty() {
            let color = Color::average(&surrounding);
            cell.set_color(color);
            self.notify(at, color)?;
        }

        self.depth = 0;
        let edges = self.edges();
        Ok(match edges.choose(&mut self.rng) {
            Some(&edge) => Phase::Walking { from: edge },
            None => Phase::Done,
        })
    }

    /// trail cells that still border an unset cell. the trail is pruned down
    /// to them, the rest can never become edges again.
    fn edges(&self) -> Vec<CellId> {
        let mut trail = lock(&self.trail);
        trail.retain(|&id| self.grid[id].is_edge(&self.grid));
        trail.iter().copied().collect()
    }

    fn visit(&self, cell: CellId) {
        lock(&self.trail).insert(cell);
    }

    fn notify(&self, cell: CellId, color: Color) -> Result<(), Halt> {
        let event = Event::CellChanged {
            cell,
            color,
            worker: self.id,
        };
        self.events.send(event).map_err(|_| Halt::Disconnected)?;

        if !self.config.step_delay.is_zero() {
            thread::sleep(self.config.step_delay);
        }
        if self.stop.load(Ordering::Relaxed) {
            return Err(Halt::Stopped);
        }
        Ok(())
    }
}
