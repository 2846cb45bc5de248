use std::collections::HashMap;
use std::f32::consts::PI;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use crate::environments::env::{GridEnv, StepOutcome};
use crate::error::SacError;

pub const GRID_HOURS: usize = 24;
pub const GRID_NUM_ACTIONS: usize = 4;
pub const GRID_NUM_STATE_FEATURES: usize = GRID_HOURS + 7;

// battery state-of-charge change per action: idle, charge, discharge, trickle charge
const SOC_DELTA: [f32; GRID_NUM_ACTIONS] = [0.0, 0.25, -0.25, 0.1];
const BATTERY_CAPACITY: f32 = 1.0;
const SELL_RATIO: f32 = 0.5;
const NOISE_STD: f32 = 0.05;

/// Small stand-in microgrid used when no external simulator is wired in.
///
/// One episode is one day of hourly steps. The profile block is the day's
/// price forecast; the context block is
/// `[soc, hour, load, generation, price, net_load, day]`.
/// The dynamics are deliberately crude: a battery, a load curve, a solar
/// curve and a price curve, nothing more.
pub struct SyntheticGrid {
    seed: u64,
    day: usize,
    hour: usize,
    soc: f32,
    prices: [f32; GRID_HOURS],
    load: [f32; GRID_HOURS],
    generation: [f32; GRID_HOURS],
    rng: Xoshiro256PlusPlus,
    action_rng: Xoshiro256PlusPlus,
}

impl Default for SyntheticGrid {
    fn default() -> Self {
        let mut env = Self {
            seed: 0,
            day: 0,
            hour: 0,
            soc: 0.5,
            prices: [0.0; GRID_HOURS],
            load: [0.0; GRID_HOURS],
            generation: [0.0; GRID_HOURS],
            rng: Xoshiro256PlusPlus::seed_from_u64(0),
            action_rng: Xoshiro256PlusPlus::seed_from_u64(0),
        };
        env.build_profiles();
        env
    }
}

impl SyntheticGrid {
    fn build_profiles(&mut self) {
        let mut day_rng = Xoshiro256PlusPlus::seed_from_u64(
            self.seed ^ (self.day as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        let cloudiness: f32 = day_rng.gen_range(0.3..1.0);

        for h in 0..GRID_HOURS {
            let t = h as f32;
            self.prices[h] = (0.5 + 0.3 * (2.0 * PI * (t - 7.0) / 24.0).sin()
                + NOISE_STD * day_rng.sample::<f32, _>(StandardNormal))
            .max(0.05);
            self.load[h] = (0.5 + 0.25 * (2.0 * PI * (t - 9.0) / 24.0).sin()
                + NOISE_STD * day_rng.sample::<f32, _>(StandardNormal))
            .max(0.0);
            self.generation[h] = (PI * (t - 6.0) / 12.0).sin().max(0.0) * cloudiness;
        }
    }

    fn observation(&self) -> Vec<f32> {
        let h = self.hour.min(GRID_HOURS - 1);
        let mut obs = Vec::with_capacity(GRID_NUM_STATE_FEATURES);
        obs.extend_from_slice(&self.prices);
        obs.extend_from_slice(&[
            self.soc,
            self.hour as f32 / GRID_HOURS as f32,
            self.load[h],
            self.generation[h],
            self.prices[h],
            self.load[h] - self.generation[h],
            self.day as f32 / 365.0,
        ]);
        obs
    }
}

impl GridEnv for SyntheticGrid {
    fn observation_size(&self) -> usize {
        GRID_NUM_STATE_FEATURES
    }

    fn num_actions(&self) -> usize {
        GRID_NUM_ACTIONS
    }

    fn reset(&mut self, day: Option<usize>) -> Result<Vec<f32>, SacError> {
        self.day = match day {
            Some(d) => d,
            None => self.rng.gen_range(0..365),
        };
        self.hour = 0;
        self.soc = 0.5;
        self.build_profiles();
        Ok(self.observation())
    }

    fn step(&mut self, action: usize) -> Result<StepOutcome, SacError> {
        if action >= GRID_NUM_ACTIONS {
            return Err(SacError::Environment(format!(
                "action {action} outside 0..{GRID_NUM_ACTIONS}"
            )));
        }
        if self.hour >= GRID_HOURS {
            return Err(SacError::Environment("step called after episode end".into()));
        }

        let h = self.hour;
        let new_soc = (self.soc + SOC_DELTA[action]).clamp(0.0, 1.0);
        let battery_flow = (new_soc - self.soc) * BATTERY_CAPACITY;
        self.soc = new_soc;

        let grid_import = self.load[h] - self.generation[h] + battery_flow;
        let cost = if grid_import > 0.0 {
            grid_import * self.prices[h]
        } else {
            grid_import * self.prices[h] * SELL_RATIO
        };

        self.hour += 1;
        let done = self.hour >= GRID_HOURS;

        let mut info = HashMap::new();
        info.insert("grid_import".to_string(), grid_import);
        info.insert("soc".to_string(), self.soc);

        Ok(StepOutcome { observation: self.observation(), reward: -cost, done, info })
    }

    fn sample_action(&mut self) -> usize {
        self.action_rng.gen_range(0..GRID_NUM_ACTIONS)
    }

    fn seedy(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        self.action_rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(1));
        self.build_profiles();
    }
}
