use std::{
    collections::{HashSet, VecDeque},
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use metrohash::MetroBuildHasher;
use rand::{rngs::StdRng, seq::IteratorRandom, Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    utils::lock,
    worker::{Event, Trail},
    CellId, Color, Config, ConfigError, Grid, GridError, Pos, Worker, WorkerId,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("could not start a thread")]
    Spawn(#[source] io::Error),
    #[error("the pool controller panicked")]
    Panicked,
}

/// one repaint request. `worker` is `None` for the final sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub cell: CellId,
    pub location: Pos,
    pub color: Color,
    pub worker: Option<WorkerId>,
}

/// whatever shows the grid. only called from the controller thread, and the
/// same cell may be reported any number of times.
pub trait Presenter: Send + 'static {
    fn cell_changed(&mut self, change: CellChange);

    fn worker_finished(&mut self, _worker: WorkerId, _running: usize) {}

    /// every worker is done and the final sweep went through.
    fn settled(&mut self) {}
}

#[derive(Debug)]
pub struct Report {
    pub grid: Arc<Grid>,
    pub spawned: usize,
    pub notifications: usize,
    pub stopped: bool,
}

#[derive(Debug, Clone)]
pub struct PoolHandle {
    stop: Arc<AtomicBool>,
}

impl PoolHandle {
    pub(crate) fn new(stop: Arc<AtomicBool>) -> Self {
        Self { stop }
    }

    /// makes every worker quit at its next step. no sweep happens afterwards.
    pub fn stop(&self) {
        info!("stopping workers");
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Pool {
    thread: JoinHandle<Result<Report, PoolError>>,
    stop: Arc<AtomicBool>,
}

impl Pool {
    /// validates `config`, builds the grid and starts the controller thread,
    /// which starts the initial workers.
    pub fn spawn<P>(config: Config, presenter: P) -> Result<Self, PoolError>
    where
        P: Presenter,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let mut controller = Controller::new(config, presenter, Arc::clone(&stop))?;
        let thread = thread::Builder::new()
            .name("bleed-pool".into())
            .spawn(move || {
                controller.start(controller.config.initial_workers)?;
                controller.run()
            })
            .map_err(PoolError::Spawn)?;

        Ok(Self { thread, stop })
    }

    pub fn handle(&self) -> PoolHandle {
        PoolHandle::new(Arc::clone(&self.stop))
    }

    pub fn join(self) -> Result<Report, PoolError> {
        self.thread.join().map_err(|_| PoolError::Panicked)?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seed {
    /// an edge of the notifying worker's trail.
    Trail,
    /// a cell nobody reported yet.
    Untouched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpawnRequest {
    parent: WorkerId,
    seed: Seed,
}

struct Running {
    id: WorkerId,
    trail: Arc<Mutex<Trail>>,
    thread: JoinHandle<()>,
}

struct Controller<P> {
    config: Config,
    grid: Arc<Grid>,
    presenter: P,
    workers: Vec<Running>,
    untouched: HashSet<CellId, MetroBuildHasher>,
    sender: mpsc::Sender<Event>,
    receiver: mpsc::Receiver<Event>,
    stop: Arc<AtomicBool>,
    rng: StdRng,
    next_id: u64,
    spawned: usize,
    notifications: usize,
}

impl<P> Controller<P>
where
    P: Presenter,
{
    fn new(config: Config, presenter: P, stop: Arc<AtomicBool>) -> Result<Self, PoolError> {
        config.validate()?;
        let mut grid = Grid::build(config.width, config.height)?;
        grid.wire_neighbors()?;
        let untouched = grid.cells().map(|cell| cell.id()).collect();
        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            config,
            grid: Arc::new(grid),
            presenter,
            workers: Vec::new(),
            untouched,
            sender,
            receiver,
            stop,
            rng: StdRng::from_entropy(),
            next_id: 0,
            spawned: 0,
            notifications: 0,
        })
    }

    fn start(&mut self, count: usize) -> Result<(), PoolError> {
        for _ in 0..count {
            self.launch(None, None)?;
        }
        info!(
            workers = count,
            width = self.grid.width(),
            height = self.grid.height(),
            "pool started"
        );
        Ok(())
    }

    fn run(mut self) -> Result<Report, PoolError> {
        let mut pending = VecDeque::new();
        while !self.workers.is_empty() {
            // the controller holds a sender itself, so this never disconnects
            let Ok(event) = self.receiver.recv() else {
                break;
            };
            match event {
                Event::CellChanged {
                    cell,
                    color,
                    worker,
                } => pending.extend(self.on_cell_changed(cell, color, worker)),
                Event::WorkerFinished { worker } => self.on_worker_finished(worker),
            }
            while let Some(request) = pending.pop_front() {
                self.serve(request);
            }
        }

        Ok(Report {
            grid: self.grid,
            spawned: self.spawned,
            notifications: self.notifications,
            stopped: self.stop.load(Ordering::Relaxed),
        })
    }

    fn on_cell_changed(
        &mut self,
        cell: CellId,
        color: Color,
        worker: WorkerId,
    ) -> Option<SpawnRequest> {
        self.notifications += 1;
        self.untouched.remove(&cell);
        self.presenter.cell_changed(CellChange {
            cell,
            location: self.grid[cell].location(),
            color,
            worker: Some(worker),
        });

        if self.stop.load(Ordering::Relaxed) || self.workers.len() >= self.config.max_workers {
            return None;
        }
        let draw = self.rng.gen_range(0..self.config.spawn_range);
        (draw < self.config.spawn_band).then_some(SpawnRequest {
            parent: worker,
            seed: if draw % 2 == 0 {
                Seed::Trail
            } else {
                Seed::Untouched
            },
        })
    }

    fn serve(&mut self, request: SpawnRequest) {
        if self.stop.load(Ordering::Relaxed) || self.workers.len() >= self.config.max_workers {
            return;
        }
        let Some(parent) = self.workers.iter().find(|w| w.id == request.parent) else {
            debug!(parent = %request.parent, "spawn parent already retired");
            return;
        };

        let trail = lock(&parent.trail).clone();
        let start = match request.seed {
            Seed::Trail => trail
                .iter()
                .copied()
                .filter(|&id| self.grid[id].is_edge(&self.grid))
                .choose(&mut self.rng),
            Seed::Untouched => self.untouched.iter().copied().choose(&mut self.rng),
        };
        let Some(start) = start else {
            debug!(parent = %request.parent, seed = ?request.seed, "nothing left to seed from");
            return;
        };

        match self.launch(Some(start), Some(trail)) {
            Ok(id) => debug!(worker = %id, parent = %request.parent, seed = ?request.seed, "spawned"),
            Err(err) => warn!(%err, "could not spawn worker"),
        }
    }

    fn launch(&mut self, start: Option<CellId>, trail: Option<Trail>) -> Result<WorkerId, PoolError> {
        let id = WorkerId(self.next_id);
        self.next_id += 1;

        let mut worker = Worker::new(
            id,
            Arc::clone(&self.grid),
            self.config.clone(),
            self.sender.clone(),
            Arc::clone(&self.stop),
        );
        if let Some(start) = start {
            worker = worker.with_start(start);
        }
        if let Some(trail) = trail {
            worker = worker.with_trail(trail);
        }

        let trail = worker.trail();
        let thread = worker.spawn().map_err(PoolError::Spawn)?;
        self.workers.push(Running { id, trail, thread });
        self.spawned += 1;
        info!(worker = %id, running = self.workers.len(), "worker started");
        Ok(id)
    }

    fn on_worker_finished(&mut self, worker: WorkerId) {
        if let Some(index) = self.workers.iter().position(|w| w.id == worker) {
            let running = self.workers.remove(index);
            if running.thread.join().is_err() {
                error!(worker = %worker, "worker panicked");
            }
        }
        info!(worker = %worker, running = self.workers.len(), "worker finished");
        self.presenter.worker_finished(worker, self.workers.len());

        if self.workers.is_empty() && !self.stop.load(Ordering::Relaxed) {
            self.sweep();
        }
    }

    /// fills whatever no worker reached from its colored neighbors.
    fn sweep(&mut self) {
        info!(untouched = self.untouched.len(), "all workers finished, sweeping");
        let grid = Arc::clone(&self.grid);
        for cell in grid.cells() {
            let color = cell.bleed(&grid, false);
            self.presenter.cell_changed(CellChange {
                cell: cell.id(),
                location: cell.location(),
                color,
                worker: None,
            });
        }
        self.presenter.settled();
    }
}
