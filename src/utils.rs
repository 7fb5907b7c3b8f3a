use std::{
    ops::{Add, Sub},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// a (column, row) location on the grid.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

#[macro_export]
macro_rules! pos {
    ($x:expr, $y:expr) => {
        Pos { x: $x, y: $y }
    };
}

/// moore neighborhood offsets in wiring order: west side, east side, north, south.
pub const MOORE: [Pos; 8] = [
    pos!(-1, 0),
    pos!(-1, -1),
    pos!(-1, 1),
    pos!(1, 0),
    pos!(1, -1),
    pos!(1, 1),
    pos!(0, -1),
    pos!(0, 1),
];

impl Pos {
    pub fn within(self, width: usize, height: usize) -> bool {
        self.x >= 0 && self.y >= 0 && (self.x as usize) < width && (self.y as usize) < height
    }
}

impl Add for Pos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        pos!(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Pos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        pos!(self.x - rhs.x, self.y - rhs.y)
    }
}

/// locks `mutex`, shrugging off poisoning: every value guarded in this crate
/// is valid after any single write.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[test]
fn test_within() {
    assert!(pos!(0, 0).within(3, 3));
    assert!(pos!(2, 2).within(3, 3));
    assert!(!pos!(3, 0).within(3, 3));
    assert!(!pos!(-1, 1).within(3, 3));
    assert!(!pos!(1, 2).within(3, 2));
}

#[test]
fn test_moore_offsets_are_distinct() {
    for (i, a) in MOORE.iter().enumerate() {
        assert_ne!(*a, pos!(0, 0));
        for b in &MOORE[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
