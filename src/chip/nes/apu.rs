//! 2A03 audio processing unit.
//!
//! Two pulse channels, triangle, noise and DMC, clocked once per CPU cycle,
//! with the 4/5-step frame sequencer and the non-linear mixer. The DMC does
//! not read memory itself; the owning bus polls [`Apu::dmc_fetch_address`] and
//! feeds bytes back through [`Apu::dmc_feed_byte`].

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const NOISE_PERIOD_TABLE: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const DMC_RATE_TABLE: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

const PULSE_DUTY: [u8; 4] = [0b0000_0001, 0b0000_0011, 0b0000_1111, 0b1111_1100];

const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15,
];

const FRAME_4STEP_RESET: u32 = 29830;
const FRAME_5STEP_RESET: u32 = 37282;

/// Pulse group output for `n = pulse1 + pulse2` (0..=30).
pub fn pulse_level(n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    95.52 / (8128.0 / n as f32 + 100.0)
}

/// Triangle/noise/DMC group output for `n = 3 * triangle + 2 * noise + dmc` (0..=202).
pub fn tnd_level(n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    163.67 / (24329.0 / n as f32 + 100.0)
}

#[derive(Debug, Clone, Default)]
struct LengthCounter {
    halt: bool,
    value: u8,
}

impl LengthCounter {
    fn load(&mut self, enabled: bool, index: u8) {
        if enabled {
            self.value = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    fn clock(&mut self) {
        if !self.halt && self.value > 0 {
            self.value -= 1;
        }
    }

    fn active(&self) -> bool {
        self.value > 0
    }
}

/// Volume envelope shared by the pulse and noise channels.
#[derive(Debug, Clone, Default)]
struct VolumeEnvelope {
    constant: bool,
    looping: bool,
    volume: u8,
    start: bool,
    divider: u8,
    decay: u8,
}

impl VolumeEnvelope {
    fn write(&mut self, data: u8) {
        self.looping = data & 0x20 != 0;
        self.constant = data & 0x10 != 0;
        self.volume = data & 0x0F;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.volume;
        } else if self.divider > 0 {
            self.divider -= 1;
        } else {
            self.divider = self.volume;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        }
    }

    fn level(&self) -> u8 {
        if self.constant {
            self.volume
        } else {
            self.decay
        }
    }
}

#[derive(Debug, Clone)]
struct Pulse {
    /// Pulse 1 negates with one's complement, pulse 2 with two's complement.
    ones_complement: bool,
    enabled: bool,
    duty: u8,
    envelope: VolumeEnvelope,
    length: LengthCounter,
    sweep_enable: bool,
    sweep_period: u8,
    sweep_negate: bool,
    sweep_shift: u8,
    sweep_divider: u8,
    sweep_reload: bool,
    timer_period: u16,
    timer: u16,
    step: u8,
}

impl Pulse {
    fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            enabled: false,
            duty: 0,
            envelope: VolumeEnvelope::default(),
            length: LengthCounter::default(),
            sweep_enable: false,
            sweep_period: 0,
            sweep_negate: false,
            sweep_shift: 0,
            sweep_divider: 0,
            sweep_reload: false,
            timer_period: 0,
            timer: 0,
            step: 0,
        }
    }

    fn write(&mut self, reg: u16, data: u8) {
        match reg & 3 {
            0 => {
                self.duty = data >> 6;
                self.length.halt = data & 0x20 != 0;
                self.envelope.write(data);
            }
            1 => {
                self.sweep_enable = data & 0x80 != 0;
                self.sweep_period = (data >> 4) & 7;
                self.sweep_negate = data & 0x08 != 0;
                self.sweep_shift = data & 7;
                self.sweep_reload = true;
            }
            2 => self.timer_period = (self.timer_period & 0x0700) | data as u16,
            _ => {
                self.timer_period = (self.timer_period & 0x00FF) | ((data & 7) as u16) << 8;
                self.length.load(self.enabled, data >> 3);
                self.envelope.start = true;
                self.step = 0;
            }
        }
    }

    fn sweep_target(&self) -> u16 {
        let delta = self.timer_period >> self.sweep_shift;
        if self.sweep_negate {
            let extra = self.ones_complement as u16;
            self.timer_period.saturating_sub(delta + extra)
        } else {
            self.timer_period + delta
        }
    }

    fn muted(&self) -> bool {
        self.timer_period < 8 || self.sweep_target() > 0x7FF
    }

    fn clock_sweep(&mut self) {
        if self.sweep_divider == 0 && self.sweep_enable && self.sweep_shift > 0 && !self.muted() {
            self.timer_period = self.sweep_target();
        }
        if self.sweep_divider == 0 || self.sweep_reload {
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else {
            self.sweep_divider -= 1;
        }
    }

    /// Clocked every other CPU cycle.
    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.step = self.step.wrapping_sub(1) & 7;
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        let high = PULSE_DUTY[self.duty as usize] >> (7 - self.step) & 1 != 0;
        if !self.length.active() || self.muted() || !high {
            return 0;
        }
        self.envelope.level()
    }
}

#[derive(Debug, Clone, Default)]
struct Triangle {
    enabled: bool,
    length: LengthCounter,
    linear_load: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer_period: u16,
    timer: u16,
    step: u8,
}

impl Triangle {
    fn write(&mut self, reg: u16, data: u8) {
        match reg & 3 {
            0 => {
                self.length.halt = data & 0x80 != 0;
                self.linear_load = data & 0x7F;
            }
            2 => self.timer_period = (self.timer_period & 0xFF00) | data as u16,
            3 => {
                self.timer_period = (self.timer_period & 0x00FF) | ((data & 7) as u16) << 8;
                self.length.load(self.enabled, data >> 3);
                self.linear_reload = true;
            }
            _ => {}
        }
    }

    fn clock_linear(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_load;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        // The control flag doubles as the length halt flag.
        if !self.length.halt {
            self.linear_reload = false;
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.step = (self.step + 1) & 31;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        // Ultrasonic periods are silenced rather than aliased.
        if self.timer_period < 2 {
            return 0;
        }
        TRIANGLE_SEQUENCE[self.step as usize]
    }
}

#[derive(Debug, Clone)]
struct Noise {
    enabled: bool,
    envelope: VolumeEnvelope,
    length: LengthCounter,
    short_mode: bool,
    period: u16,
    timer: u16,
    shift: u16,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            enabled: false,
            envelope: VolumeEnvelope::default(),
            length: LengthCounter::default(),
            short_mode: false,
            period: NOISE_PERIOD_TABLE[0],
            timer: 0,
            shift: 1,
        }
    }
}

impl Noise {
    fn write(&mut self, reg: u16, data: u8) {
        match reg & 3 {
            0 => {
                self.length.halt = data & 0x20 != 0;
                self.envelope.write(data);
            }
            2 => {
                self.short_mode = data & 0x80 != 0;
                self.period = NOISE_PERIOD_TABLE[(data & 0x0F) as usize];
            }
            3 => {
                self.length.load(self.enabled, data >> 3);
                self.envelope.start = true;
            }
            _ => {}
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.period;
            let tap = if self.short_mode { 6 } else { 1 };
            let feedback = (self.shift ^ (self.shift >> tap)) & 1;
            self.shift = (self.shift >> 1) | (feedback << 14);
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.length.active() || self.shift & 1 != 0 {
            return 0;
        }
        self.envelope.level()
    }
}

#[derive(Debug, Clone)]
struct Dmc {
    irq_enable: bool,
    irq_pending: bool,
    looping: bool,
    rate: u16,
    timer: u16,
    level: u8,
    start_address: u16,
    sample_length: u16,
    address: u16,
    remaining: u16,
    buffer: Option<u8>,
    shift: u8,
    bits: u8,
    silence: bool,
}

impl Default for Dmc {
    fn default() -> Self {
        Self {
            irq_enable: false,
            irq_pending: false,
            looping: false,
            rate: DMC_RATE_TABLE[0],
            timer: 0,
            level: 0,
            start_address: 0xC000,
            sample_length: 1,
            address: 0xC000,
            remaining: 0,
            buffer: None,
            shift: 0,
            bits: 8,
            silence: true,
        }
    }
}

impl Dmc {
    fn write(&mut self, reg: u16, data: u8) {
        match reg & 3 {
            0 => {
                self.irq_enable = data & 0x80 != 0;
                if !self.irq_enable {
                    self.irq_pending = false;
                }
                self.looping = data & 0x40 != 0;
                self.rate = DMC_RATE_TABLE[(data & 0x0F) as usize];
            }
            1 => self.level = data & 0x7F,
            2 => self.start_address = 0xC000 | (data as u16) << 6,
            _ => self.sample_length = ((data as u16) << 4) + 1,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.irq_pending = false;
        if !enabled {
            self.remaining = 0;
        } else if self.remaining == 0 {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.address = self.start_address;
        self.remaining = self.sample_length;
    }

    fn fetch_address(&self) -> Option<u16> {
        (self.buffer.is_none() && self.remaining > 0).then_some(self.address)
    }

    fn feed(&mut self, byte: u8) {
        self.buffer = Some(byte);
        // Address wraps from $FFFF to $8000.
        self.address = self.address.checked_add(1).unwrap_or(0x8000);
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enable {
                self.irq_pending = true;
            }
        }
    }

    fn clock_timer(&mut self) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.rate - 1;

        if !self.silence {
            if self.shift & 1 != 0 {
                if self.level <= 125 {
                    self.level += 2;
                }
            } else if self.level >= 2 {
                self.level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits -= 1;
        if self.bits == 0 {
            self.bits = 8;
            match self.buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }
}

/// Audio processing unit state.
#[derive(Debug, Clone)]
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_irq: bool,
    frame_irq_inhibit: bool,
    five_step: bool,
    frame_cycle: u32,
    odd_cycle: bool,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    /// APU in power-on state.
    pub fn new() -> Self {
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            frame_irq: false,
            frame_irq_inhibit: false,
            five_step: false,
            frame_cycle: 0,
            odd_cycle: false,
        }
    }

    /// Register write for $4000-$4017. Other addresses are ignored.
    pub fn write(&mut self, address: u16, data: u8) {
        match address {
            0x4000..=0x4003 => self.pulse1.write(address, data),
            0x4004..=0x4007 => self.pulse2.write(address, data),
            0x4008..=0x400B => self.triangle.write(address, data),
            0x400C..=0x400F => self.noise.write(address, data),
            0x4010..=0x4013 => self.dmc.write(address, data),
            0x4015 => {
                self.pulse1.enabled = data & 0x01 != 0;
                self.pulse2.enabled = data & 0x02 != 0;
                self.triangle.enabled = data & 0x04 != 0;
                self.noise.enabled = data & 0x08 != 0;
                if !self.pulse1.enabled {
                    self.pulse1.length.value = 0;
                }
                if !self.pulse2.enabled {
                    self.pulse2.length.value = 0;
                }
                if !self.triangle.enabled {
                    self.triangle.length.value = 0;
                }
                if !self.noise.enabled {
                    self.noise.length.value = 0;
                }
                self.dmc.set_enabled(data & 0x10 != 0);
            }
            0x4017 => {
                self.five_step = data & 0x80 != 0;
                self.frame_irq_inhibit = data & 0x40 != 0;
                if self.frame_irq_inhibit {
                    self.frame_irq = false;
                }
                self.frame_cycle = 0;
                if self.five_step {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
            }
            _ => {}
        }
    }

    /// $4015 read. Clears the frame interrupt flag.
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0;
        if self.pulse1.length.active() {
            status |= 0x01;
        }
        if self.pulse2.length.active() {
            status |= 0x02;
        }
        if self.triangle.length.active() {
            status |= 0x04;
        }
        if self.noise.length.active() {
            status |= 0x08;
        }
        if self.dmc.remaining > 0 {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq_pending {
            status |= 0x80;
        }
        self.frame_irq = false;
        status
    }

    /// Address the DMC wants to read next, if its sample buffer is empty.
    pub fn dmc_fetch_address(&self) -> Option<u16> {
        self.dmc.fetch_address()
    }

    /// Deliver the byte read from [`dmc_fetch_address`](Self::dmc_fetch_address).
    pub fn dmc_feed_byte(&mut self, byte: u8) {
        self.dmc.feed(byte);
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.noise.envelope.clock();
        self.triangle.clock_linear();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.length.clock();
        self.pulse2.length.clock();
        self.triangle.length.clock();
        self.noise.length.clock();
        self.pulse1.clock_sweep();
        self.pulse2.clock_sweep();
    }

    fn clock_frame_sequencer(&mut self) {
        self.frame_cycle += 1;
        match self.frame_cycle {
            7457 | 22371 => self.clock_quarter_frame(),
            14913 => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            29829 if !self.five_step => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                if !self.frame_irq_inhibit {
                    self.frame_irq = true;
                }
            }
            37281 if self.five_step => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            _ => {}
        }
        let reset = if self.five_step {
            FRAME_5STEP_RESET
        } else {
            FRAME_4STEP_RESET
        };
        if self.frame_cycle >= reset {
            self.frame_cycle = 0;
        }
    }

    /// Advance one CPU cycle.
    pub fn clock(&mut self) {
        self.clock_frame_sequencer();
        self.odd_cycle = !self.odd_cycle;
        if !self.odd_cycle {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
        }
        self.triangle.clock_timer();
        self.noise.clock_timer();
        self.dmc.clock_timer();
    }

    /// Mixer output in `0.0..=1.0`.
    pub fn mix(&self) -> f32 {
        let pulse = self.pulse1.output() as usize + self.pulse2.output() as usize;
        let tnd = 3 * self.triangle.output() as usize
            + 2 * self.noise.output() as usize
            + self.dmc.level as usize;
        (pulse_level(pulse) + tnd_level(tnd)).min(1.0)
    }

    /// Mixer output scaled to a 16-bit level; `volume` 64 maps full scale to 16383.
    pub fn output(&self, volume: u16) -> u16 {
        let scaled = self.mix() * 16383.0 * volume as f32 / 64.0;
        scaled.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(apu: &mut Apu, cycles: u32) {
        for _ in 0..cycles {
            apu.clock();
        }
    }

    #[test]
    fn mixer_tables_match_reference_curve() {
        assert_eq!(pulse_level(0), 0.0);
        assert_relative_eq!(pulse_level(15), 0.1488, epsilon = 1e-3);
        assert_relative_eq!(pulse_level(30), 0.2575, epsilon = 1e-3);
        assert_relative_eq!(tnd_level(202), 0.7425, epsilon = 1e-3);
    }

    #[test]
    fn silent_after_power_on() {
        let mut apu = Apu::new();
        run(&mut apu, 1000);
        assert_eq!(apu.mix(), 0.0);
        assert_eq!(apu.output(64), 0);
    }

    #[test]
    fn pulse_plays_constant_volume() {
        let mut apu = Apu::new();
        apu.write(0x4015, 0x01);
        // 50% duty, halt, constant volume 15
        apu.write(0x4000, 0xBF);
        apu.write(0x4002, 0xFD);
        apu.write(0x4003, 0x00);
        let mut peak: f32 = 0.0;
        for _ in 0..4000 {
            apu.clock();
            peak = peak.max(apu.mix());
        }
        assert_relative_eq!(peak, pulse_level(15), epsilon = 1e-6);
        assert_eq!(apu.read_status() & 0x01, 0x01);
    }

    #[test]
    fn disabling_channel_clears_length() {
        let mut apu = Apu::new();
        apu.write(0x4015, 0x0F);
        apu.write(0x4003, 0x08);
        apu.write(0x400B, 0x08);
        assert_eq!(apu.read_status() & 0x05, 0x05);
        apu.write(0x4015, 0x00);
        assert_eq!(apu.read_status() & 0x0F, 0);
    }

    #[test]
    fn length_counter_runs_out() {
        let mut apu = Apu::new();
        apu.write(0x4015, 0x01);
        apu.write(0x4000, 0x1F);
        // Length index 3 -> 2 half frames.
        apu.write(0x4003, 0x18);
        assert_eq!(apu.read_status() & 0x01, 0x01);
        run(&mut apu, FRAME_4STEP_RESET);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn frame_irq_unless_inhibited() {
        let mut apu = Apu::new();
        run(&mut apu, FRAME_4STEP_RESET);
        assert_eq!(apu.read_status() & 0x40, 0x40);
        assert_eq!(apu.read_status() & 0x40, 0);

        apu.write(0x4017, 0x40);
        run(&mut apu, FRAME_4STEP_RESET);
        assert_eq!(apu.read_status() & 0x40, 0);
    }

    #[test]
    fn dmc_requests_sample_bytes() {
        let mut apu = Apu::new();
        apu.write(0x4012, 0x01);
        apu.write(0x4013, 0x00);
        assert_eq!(apu.dmc_fetch_address(), None);
        apu.write(0x4015, 0x10);
        assert_eq!(apu.dmc_fetch_address(), Some(0xC040));
        apu.dmc_feed_byte(0xFF);
        assert_eq!(apu.dmc_fetch_address(), None);
        assert_eq!(apu.read_status() & 0x10, 0);
    }

    #[test]
    fn direct_load_sets_dmc_level() {
        let mut apu = Apu::new();
        apu.write(0x4011, 0x7F);
        assert_relative_eq!(apu.mix(), tnd_level(127), epsilon = 1e-6);
        let full = apu.output(64);
        assert!((apu.output(128) as i32 - 2 * full as i32).abs() <= 1);
    }
}
