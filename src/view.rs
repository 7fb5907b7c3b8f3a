use std::{
    io::{self, stdin, stdout, Write},
    sync::mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use termion::{event::Key, input::TermRead, raw::IntoRawMode};
use tracing::info;

use crate::{pos, CellChange, PoolHandle, Pos, Presenter, WorkerId};

use canvas::{Canvas, Pixel};
mod canvas;

/// what the pool hands over to the view thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Paint(CellChange),
    Workers(usize),
    Settled,
}

/// presenter side of the view: forwards everything to the view thread.
pub struct Painter {
    sender: mpsc::Sender<Frame>,
}

impl Painter {
    fn send(&self, frame: Frame) {
        // a closed view only means nobody is watching anymore
        let _ = self.sender.send(frame);
    }
}

impl Presenter for Painter {
    fn cell_changed(&mut self, change: CellChange) {
        self.send(Frame::Paint(change));
    }

    fn worker_finished(&mut self, _worker: WorkerId, running: usize) {
        self.send(Frame::Workers(running));
    }

    fn settled(&mut self) {
        self.send(Frame::Settled);
    }
}

pub fn channel() -> (Painter, mpsc::Receiver<Frame>) {
    let (sender, receiver) = mpsc::channel();
    (Painter { sender }, receiver)
}

/// presenter for runs without a terminal: only logs progress.
#[derive(Debug, Default)]
pub struct Headless {
    changes: usize,
}

impl Presenter for Headless {
    fn cell_changed(&mut self, _change: CellChange) {
        self.changes += 1;
    }

    fn worker_finished(&mut self, worker: WorkerId, running: usize) {
        info!(%worker, running, changes = self.changes, "worker retired");
    }

    fn settled(&mut self) {
        info!(changes = self.changes, "field settled");
    }
}

/// the view's copy of the grid colors.
struct Picture {
    width: usize,
    height: usize,
    pixels: Vec<Option<Pixel>>,
    workers: Option<usize>,
    settled: bool,
}

impl Picture {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![None; width * height],
            workers: None,
            settled: false,
        }
    }

    fn apply(&mut self, frame: Frame) {
        match frame {
            Frame::Paint(change) => {
                let Pos { x, y } = change.location;
                if change.location.within(self.width, self.height) {
                    let pixel = change.color.is_set().then(|| change.color.to_rgb());
                    self.pixels[y as usize * self.width + x as usize] = pixel;
                }
            }
            Frame::Workers(running) => self.workers = Some(running),
            Frame::Settled => self.settled = true,
        }
    }

    fn get(&self, pos: Pos) -> Option<Pixel> {
        pos.within(self.width, self.height)
            .then(|| self.pixels[pos.y as usize * self.width + pos.x as usize])
            .flatten()
    }

    fn status(&self, origin: Pos) -> String {
        let workers = match (self.settled, self.workers) {
            (true, _) => "settled".to_string(),
            (false, Some(running)) => format!("workers: {running}"),
            (false, None) => "workers: starting".to_string(),
        };
        format!("{workers} | at {},{} | arrows pan, q quits", origin.x, origin.y)
    }
}

pub struct View {
    thread: JoinHandle<io::Result<()>>,
}

impl View {
    pub fn spawn(pool: PoolHandle, frames: mpsc::Receiver<Frame>, width: usize, height: usize) -> Self {
        let thread = thread::spawn(move || {
            let picture = Picture::new(width, height);
            view_loop(pool, frames, picture, || stdout().into_raw_mode())
        });
        Self { thread }
    }

    pub fn join(self) -> io::Result<()> {
        self.thread
            .join()
            .map_err(|_| io::Error::other("view thread panicked"))?
    }
}

#[derive(Debug)]
pub enum Dir {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug)]
pub enum InputCmd {
    Exit,
    Move(Dir),
}

fn input_loop(sender: mpsc::Sender<InputCmd>) {
    for key in stdin().keys() {
        let Ok(key) = key else {
            break;
        };
        let command = match key {
            Key::Char('q') | Key::Ctrl('c') => InputCmd::Exit,
            Key::Up => InputCmd::Move(Dir::Up),
            Key::Down => InputCmd::Move(Dir::Down),
            Key::Left => InputCmd::Move(Dir::Left),
            Key::Right => InputCmd::Move(Dir::Right),
            _ => continue,
        };

        if sender.send(command).is_err() {
            break;
        }
    }
}

const VIEW_REFRESH_INTERVAL: Duration = Duration::from_millis(100);
const PAN_STEP: i32 = 8;

/// stops the pool whenever the view goes away, errors and panics included.
struct StopOnDrop(PoolHandle);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

fn view_loop<W: Write>(
    pool: PoolHandle,
    frames: mpsc::Receiver<Frame>,
    mut picture: Picture,
    terminal: impl FnOnce() -> io::Result<W>,
) -> io::Result<()> {
    let _stop = StopOnDrop(pool);
    let mut stdout = terminal()?;

    let (sender, receiver) = mpsc::channel();
    let _input_handle = thread::spawn(|| input_loop(sender));
    write!(stdout, "{}", termion::cursor::Hide)?;

    let mut view_origin = pos!(0, 0);
    let result = loop {
        if !handle_inputs(&receiver, &mut view_origin) {
            break Ok(());
        }
        for frame in frames.try_iter() {
            picture.apply(frame);
        }
        if let Err(err) = display_picture(&mut stdout, view_origin, &picture) {
            break Err(err);
        }
        thread::sleep(VIEW_REFRESH_INTERVAL);
    };

    write!(stdout, "{}{}", termion::clear::All, termion::cursor::Show)?;
    stdout.flush()?;
    result
}

/// applies pending key presses, returns false once the user asked to quit.
fn handle_inputs(receiver: &mpsc::Receiver<InputCmd>, view_origin: &mut Pos) -> bool {
    for cmd in receiver.try_iter() {
        match cmd {
            InputCmd::Exit => return false,
            InputCmd::Move(direction) => {
                let moved = *view_origin
                    + match direction {
                        Dir::Up => pos!(0, -PAN_STEP),
                        Dir::Down => pos!(0, PAN_STEP),
                        Dir::Left => pos!(-PAN_STEP, 0),
                        Dir::Right => pos!(PAN_STEP, 0),
                    };
                *view_origin = pos!(moved.x.max(0), moved.y.max(0));
            }
        }
    }
    true
}

fn display_picture(out: &mut impl Write, view_origin: Pos, picture: &Picture) -> io::Result<()> {
    let mut canvas = Canvas::from_screen()?;
    canvas.layer(|pos| picture.get(view_origin + pos));
    canvas.display(out, &picture.status(view_origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use crate::{CellId, Color};

    fn paint(x: i32, y: i32, color: Color) -> Frame {
        Frame::Paint(CellChange {
            cell: CellId(0),
            location: pos!(x, y),
            color,
            worker: None,
        })
    }

    #[test]
    fn picture_tracks_paints() {
        let mut picture = Picture::new(4, 3);
        picture.apply(paint(2, 1, Color([10.0, 20.0, 30.0])));
        picture.apply(paint(9, 9, Color([10.0, 20.0, 30.0])));
        assert_eq!(picture.get(pos!(2, 1)), Some((10, 20, 30)));
        assert_eq!(picture.get(pos!(0, 0)), None);
        assert_eq!(picture.get(pos!(9, 9)), None);

        picture.apply(paint(2, 1, Color::UNSET));
        assert_eq!(picture.get(pos!(2, 1)), None);
    }

    #[test]
    fn status_follows_the_pool() {
        let mut picture = Picture::new(1, 1);
        assert!(picture.status(pos!(0, 0)).starts_with("workers: starting"));
        picture.apply(Frame::Workers(2));
        assert!(picture.status(pos!(0, 0)).starts_with("workers: 2"));
        picture.apply(Frame::Settled);
        assert!(picture.status(pos!(8, 0)).starts_with("settled | at 8,0"));
    }

    #[test]
    fn panning_stays_on_the_grid() {
        let (sender, receiver) = mpsc::channel();
        let mut origin = pos!(0, 0);
        sender.send(InputCmd::Move(Dir::Right)).unwrap();
        sender.send(InputCmd::Move(Dir::Up)).unwrap();
        assert!(handle_inputs(&receiver, &mut origin));
        assert_eq!(origin, pos!(PAN_STEP, 0));

        sender.send(InputCmd::Exit).unwrap();
        assert!(!handle_inputs(&receiver, &mut origin));
    }

    #[test]
    fn failing_terminal_stops_the_pool() {
        let stop = Arc::new(AtomicBool::new(false));
        let pool = PoolHandle::new(Arc::clone(&stop));
        let (_painter, frames) = channel();

        let result = view_loop(pool.clone(), frames, Picture::new(2, 2), || {
            Err::<io::Sink, _>(io::Error::other("not a terminal"))
        });

        assert!(result.is_err());
        assert!(pool.is_stopped());
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn painter_forwards_to_the_view() {
        let (mut painter, frames) = channel();
        painter.worker_finished(WorkerId(3), 1);
        painter.settled();
        assert_eq!(
            frames.try_iter().collect::<Vec<_>>(),
            vec![Frame::Workers(1), Frame::Settled]
        );
    }
}
