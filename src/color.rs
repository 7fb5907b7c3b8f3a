use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

pub const CHANNEL_MAX: f64 = 255.0;

/// upper bound for freshly drawn colors, leaves some headroom for nudging.
pub const RANDOM_CHANNEL_MAX: f64 = 245.0;

pub const NUDGE_STD_DEV: f64 = 2.0;
pub const SUM_MAX: f64 = 600.0;
pub const SUM_MIN: f64 = 150.0;

/// an rgb triple with channels in `[0, 255]`. the zero vector means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color(pub [f64; 3]);

impl Color {
    pub const UNSET: Color = Color([0.0; 3]);

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self([(); 3].map(|_| rng.gen_range(0.0..RANDOM_CHANNEL_MAX)))
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_set(&self) -> bool {
        self.sum() != 0.0
    }

    /// arithmetic mean of `colors`, or [`Color::UNSET`] when there is nothing to average.
    pub fn average(colors: &[Color]) -> Self {
        if colors.is_empty() {
            return Self::UNSET;
        }
        let mut total = [0.0; 3];
        for color in colors {
            for (acc, channel) in total.iter_mut().zip(color.0) {
                *acc += channel;
            }
        }
        let count = colors.len() as f64;
        Self(total.map(|channel| channel / count))
    }

    /// gaussian jitter around `self`. a channel sum outside `[SUM_MIN, SUM_MAX]`
    /// is shifted back by the whole overshoot on every channel, then clamped.
    pub fn nudge<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let mut nudged = self.0.map(|channel| {
            let noise: f64 = StandardNormal.sample(&mut *rng);
            channel + noise * NUDGE_STD_DEV
        });

        let total: f64 = nudged.iter().sum();
        let shift = if total > SUM_MAX {
            SUM_MAX - total
        } else if total < SUM_MIN {
            SUM_MIN - total
        } else {
            0.0
        };

        for channel in &mut nudged {
            *channel = (*channel + shift).clamp(0.0, CHANNEL_MAX);
        }
        Self(nudged)
    }

    pub fn to_rgb(self) -> (u8, u8, u8) {
        let [r, g, b] = self.0.map(|channel| channel.round().clamp(0.0, CHANNEL_MAX) as u8);
        (r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    const EPSILON: f64 = 1e-9;

    fn in_bounds(color: Color) -> bool {
        color.0.iter().all(|c| (0.0..=CHANNEL_MAX).contains(c))
    }

    #[test]
    fn average_of_two() {
        let colors = [Color([10.0, 20.0, 30.0]), Color([30.0, 40.0, 50.0])];
        assert_eq!(Color::average(&colors), Color([20.0, 30.0, 40.0]));
    }

    #[test]
    fn average_of_one_is_identity() {
        let color = Color([12.5, 200.0, 3.0]);
        assert_eq!(Color::average(&[color]), color);
    }

    #[test]
    fn average_of_nothing_is_unset() {
        assert_eq!(Color::average(&[]), Color::UNSET);
        assert!(!Color::average(&[]).is_set());
    }

    #[test]
    fn random_stays_below_headroom() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let color = Color::random(&mut rng);
            assert!(color.0.iter().all(|c| (0.0..RANDOM_CHANNEL_MAX).contains(c)));
        }
    }

    #[test]
    fn nudging_black_stays_colorful() {
        let mut rng = StdRng::seed_from_u64(0xb1ee);
        let mut color = Color::UNSET;
        for _ in 0..1000 {
            color = color.nudge(&mut rng);
            let sum = color.sum();
            assert!(sum >= SUM_MIN - EPSILON, "sum fell to {sum}");
            assert!(sum <= SUM_MAX + EPSILON, "sum rose to {sum}");
            assert!(in_bounds(color), "{color:?} out of bounds");
        }
    }

    #[test]
    fn nudging_white_is_pulled_down() {
        let mut rng = StdRng::seed_from_u64(42);
        let nudged = Color([255.0; 3]).nudge(&mut rng);
        assert!(nudged.sum() <= SUM_MAX + EPSILON);
        assert!(in_bounds(nudged));
    }

    #[test]
    fn to_rgb_rounds() {
        assert_eq!(Color([0.4, 127.5, 254.6]).to_rgb(), (0, 128, 255));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn nudge_keeps_band(
            r in 0.0..=CHANNEL_MAX,
            g in 0.0..=CHANNEL_MAX,
            b in 0.0..=CHANNEL_MAX,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut color = Color([r, g, b]);
            for _ in 0..50 {
                color = color.nudge(&mut rng);
                prop_assert!(in_bounds(color));
                prop_assert!(color.sum() >= SUM_MIN - EPSILON);
                prop_assert!(color.sum() <= SUM_MAX + EPSILON);
            }
        }
    }
}
