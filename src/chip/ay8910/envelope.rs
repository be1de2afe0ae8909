//! AY-3-8910 / YM2149 envelope generator.
//!
//! Register R13 holds four control bits (continue, attack, alternate, hold).
//! The generator counts down through 16 (AY) or 32 (YM) steps per cycle and
//! XORs the step with the attack mask to produce ramps in either direction.

use std::fmt;

const SHAPE_HOLD: u8 = 0x01;
const SHAPE_ALTERNATE: u8 = 0x02;
const SHAPE_ATTACK: u8 = 0x04;
const SHAPE_CONTINUE: u8 = 0x08;

/// Envelope state machine.
#[derive(Clone)]
pub struct Envelope {
    step_mask: u8,
    prescale: u32,
    period: u32,
    counter: u32,
    step: i8,
    attack: u8,
    hold: bool,
    alternate: bool,
    holding: bool,
    shape: u8,
}

impl Envelope {
    /// Create a generator with `steps` levels per cycle (16 or 32).
    pub fn new(steps: u8) -> Self {
        let step_mask = if steps >= 32 { 0x1F } else { 0x0F };
        let mut env = Self {
            step_mask,
            // 16-step parts run their step counter at half rate.
            prescale: if step_mask == 0x1F { 1 } else { 2 },
            period: 0,
            counter: 0,
            step: 0,
            attack: 0,
            hold: true,
            alternate: false,
            holding: true,
            shape: 0,
        };
        env.set_shape(0);
        env
    }

    /// Number of levels per cycle.
    pub fn steps(&self) -> u8 {
        self.step_mask + 1
    }

    /// Set the 16-bit period from R11/R12.
    pub fn set_period(&mut self, period: u16) {
        self.period = period as u32;
    }

    /// Write R13; restarts the cycle.
    pub fn set_shape(&mut self, shape: u8) {
        self.shape = shape & 0x0F;
        self.attack = if shape & SHAPE_ATTACK != 0 {
            self.step_mask
        } else {
            0
        };
        if shape & SHAPE_CONTINUE == 0 {
            // Without "continue" every shape behaves as hold, alternating when attacking.
            self.hold = true;
            self.alternate = self.attack != 0;
        } else {
            self.hold = shape & SHAPE_HOLD != 0;
            self.alternate = shape & SHAPE_ALTERNATE != 0;
        }
        self.step = self.step_mask as i8;
        self.holding = false;
        self.counter = 0;
    }

    /// Advance by one internal clock (master clock / 8).
    pub fn tick(&mut self) {
        if self.holding {
            return;
        }
        self.counter += 1;
        if self.counter < self.period.max(1) * self.prescale {
            return;
        }
        self.counter = 0;
        self.step -= 1;
        if self.step < 0 {
            if self.hold {
                if self.alternate {
                    self.attack ^= self.step_mask;
                }
                self.holding = true;
                self.step = 0;
            } else {
                if self.alternate {
                    self.attack ^= self.step_mask;
                }
                self.step &= self.step_mask as i8;
            }
        }
    }

    /// Current level, `0..steps()`.
    pub fn level(&self) -> u8 {
        (self.step as u8 & self.step_mask) ^ self.attack
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("shape", &self.shape)
            .field("period", &self.period)
            .field("level", &self.level())
            .field("holding", &self.holding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_steps(env: &mut Envelope, steps: usize) -> Vec<u8> {
        let mut levels = Vec::with_capacity(steps);
        for _ in 0..steps {
            env.tick();
            levels.push(env.level());
        }
        levels
    }

    #[test]
    fn decay_then_silence() {
        let mut env = Envelope::new(32);
        env.set_period(1);
        env.set_shape(0x00);
        assert_eq!(env.level(), 31);
        let levels = run_steps(&mut env, 40);
        assert_eq!(levels[0], 30);
        assert_eq!(levels[30], 0);
        assert!(levels[31..].iter().all(|&l| l == 0));
    }

    #[test]
    fn attack_then_hold_high() {
        let mut env = Envelope::new(32);
        env.set_period(1);
        env.set_shape(0x0D);
        assert_eq!(env.level(), 0);
        let levels = run_steps(&mut env, 40);
        assert_eq!(levels[30], 31);
        assert!(levels[31..].iter().all(|&l| l == 31));
    }

    #[test]
    fn sawtooth_repeats() {
        let mut env = Envelope::new(32);
        env.set_period(1);
        env.set_shape(0x08);
        let levels = run_steps(&mut env, 64);
        assert_eq!(levels[30], 0);
        assert_eq!(levels[31], 31);
        assert_eq!(levels[62], 0);
    }

    #[test]
    fn triangle_alternates_direction() {
        let mut env = Envelope::new(32);
        env.set_period(1);
        env.set_shape(0x0E);
        assert_eq!(env.level(), 0);
        let levels = run_steps(&mut env, 64);
        assert_eq!(levels[30], 31);
        // Direction flips after the top of the ramp.
        assert_eq!(levels[31], 31);
        assert_eq!(levels[32], 30);
        assert_eq!(levels[62], 0);
    }

    #[test]
    fn sixteen_step_parts_run_at_half_rate() {
        let mut env = Envelope::new(16);
        env.set_period(1);
        env.set_shape(0x00);
        assert_eq!(env.steps(), 16);
        assert_eq!(env.level(), 15);
        env.tick();
        assert_eq!(env.level(), 15);
        env.tick();
        assert_eq!(env.level(), 14);
    }
}
