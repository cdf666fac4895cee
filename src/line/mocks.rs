//! Simulated lines for testing without hardware
//!
//! Both simulations run on a virtual nanosecond clock: sleeping advances the
//! clock instantly and every sample of the line costs a small, configurable
//! amount of virtual time, so polling loops terminate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Level, LineIo};
use crate::protocol::checksum::verify_frame;
use crate::protocol::encoder::encode_read_response;
use crate::protocol::protocol::*;
use crate::protocol::registers as reg;

/// Default virtual cost of one `read_level()` call
const DEFAULT_POLL_COST_NS: u64 = 250;

/// Servo response latency, measured from the end of the read request
pub const RESPONSE_LATENCY_NS: u64 = 15_200_000;

/// How long the servo holds the line low after a reboot
pub const BOOT_NS: u64 = 1_000_000_000;

/// Physical end stops of the simulated servo, in APV units
pub const PHYSICAL_MIN_APV: u16 = 731;
pub const PHYSICAL_MAX_APV: u16 = APV_MAX - PHYSICAL_MIN_APV;

/// Level of a sorted edge list at time `t`; LOW before the first edge
fn level_at(edges: &[(u64, Level)], t: u64) -> Level {
    let idx = edges.partition_point(|&(time, _)| time <= t);
    if idx == 0 {
        Level::Low
    } else {
        edges[idx - 1].1
    }
}

/// Build the waveform of one inverted-polarity byte starting at `start`
///
/// With `stop_ok = false` the stop cell is HIGH, which is a framing error.
pub fn byte_waveform(start: u64, period: u64, value: u8, stop_ok: bool) -> Vec<(u64, Level)> {
    let mut wave = vec![(start, Level::High)];
    for bit in 0..8u64 {
        let level = if value & (1 << bit) != 0 { Level::Low } else { Level::High };
        wave.push((start + (bit + 1) * period, level));
    }
    let stop = if stop_ok { Level::Low } else { Level::High };
    wave.push((start + 9 * period, stop));
    wave.push((start + 10 * period, Level::Low));
    wave
}

/// Line that replays a scripted waveform and records what the host drives
pub struct WaveformLine {
    now: u64,
    waveform: Vec<(u64, Level)>,
    driving: Option<Level>,
    driven: Vec<(u64, Level)>,
    poll_cost_ns: u64,
    drive_cost_ns: u64,
}

impl WaveformLine {
    pub fn new(waveform: Vec<(u64, Level)>) -> Self {
        Self {
            now: 0,
            waveform,
            driving: None,
            driven: Vec::new(),
            poll_cost_ns: DEFAULT_POLL_COST_NS,
            drive_cost_ns: 0,
        }
    }

    /// Virtual time consumed by each `read_level()`
    pub fn with_poll_cost(mut self, ns: u64) -> Self {
        self.poll_cost_ns = ns;
        self
    }

    /// Virtual time consumed by each `drive_high()` / `drive_low()`
    pub fn with_drive_cost(mut self, ns: u64) -> Self {
        self.drive_cost_ns = ns;
        self
    }

    /// Level changes driven by the host, in order
    pub fn driven_edges(&self) -> &[(u64, Level)] {
        &self.driven
    }

    pub fn driven_level_at(&self, t: u64) -> Level {
        level_at(&self.driven, t)
    }

    fn drive(&mut self, level: Level) {
        self.now += self.drive_cost_ns;
        self.driving = Some(level);
        let last = self.driven.last().map(|&(_, l)| l).unwrap_or(Level::Low);
        if last != level {
            self.driven.push((self.now, level));
        }
    }
}

impl LineIo for WaveformLine {
    fn drive_high(&mut self) {
        self.drive(Level::High);
    }

    fn drive_low(&mut self) {
        self.drive(Level::Low);
    }

    fn release(&mut self) {
        self.driving = None;
    }

    fn read_level(&mut self) -> Level {
        let level = match self.driving {
            Some(level) => level,
            None => level_at(&self.waveform, self.now),
        };
        self.now += self.poll_cost_ns;
        level
    }

    fn now_ns(&mut self) -> u64 {
        self.now
    }

    fn delay_ns(&mut self, ns: u32) {
        self.now += ns as u64;
    }
}

/// One complete frame the simulated servo received from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Read(u8),
    Write(u8, u16),
}

/// Scheduled read response
struct Response {
    hold_from: u64,
    start: u64,
    bytes: [u8; HD_READ_RESPONSE_SIZE],
}

/// Registers that ignore writes
const READ_ONLY: &[u8] = &[
    reg::MODEL_NUMBER,
    reg::CURRENT_APV,
    reg::MYSTERY_DB,
    reg::SS_DISABLE_1,
    reg::SS_DISABLE_2,
    reg::SS_ENABLE_1,
    reg::SS_ENABLE_2,
    0x04,
    0x06,
    0xC4,
];

/// Factory register contents, as read from a fresh D485HW
pub fn factory_registers(model_number: u16) -> HashMap<u8, u16> {
    HashMap::from([
        (reg::MODEL_NUMBER, model_number),
        (0x04, 36),
        (0x06, 19135),
        (0xC4, 1300),
        (reg::CURRENT_APV, 8192),
        (reg::ID, 0),
        (reg::DIRECTION, reg::DIRECTION_CLOCKWISE),
        (reg::SPEED, reg::SPEED_MAX),
        (reg::DEADBAND_1, 1),
        (reg::DEADBAND_2, 5),
        (reg::DEADBAND_3, 11),
        (reg::SOFT_START, reg::SOFT_START_20),
        (reg::RANGE_LEFT_APV, 3381),
        (reg::RANGE_CENTER_APV, 8192),
        (reg::RANGE_RIGHT_APV, 13002),
        (reg::FAIL_SAFE, reg::FAIL_SAFE_OFF),
        (reg::POWER_LIMIT, reg::POWER_LIMIT_MAX),
        (reg::OVERLOAD_PROTECTION, 100),
        (reg::SMART_SENSE_1, 14000),
        (reg::SMART_SENSE_2, 2000),
        (reg::SS_ENABLE_1, 14000),
        (reg::SS_ENABLE_2, 2000),
        (reg::SS_DISABLE_1, 28000),
        (reg::SS_DISABLE_2, 4000),
        (reg::SENSITIVITY_RATIO, reg::SENSITIVITY_RATIO_MAX),
        (0x50, 0x3FFF),
        (0x52, 0x0000),
        (reg::MYSTERY_OP1, reg::MYSTERY_OP1_CONST),
        (reg::MYSTERY_OP2, reg::MYSTERY_OP2_CONST),
    ])
}

/// Arduino-style integer `map()`
fn map_range(x: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max == in_min {
        return out_min;
    }
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

struct DeviceState {
    ram: HashMap<u8, u16>,
    eeprom: HashMap<u8, u16>,
    factory: HashMap<u8, u16>,
    busy_until: u64,
    response: Option<Response>,
    mystery: u8,
    corruption: Option<(usize, u8)>,
    position: u16,
}

impl DeviceState {
    fn new(model_number: u16) -> Self {
        let factory = factory_registers(model_number);
        Self {
            ram: factory.clone(),
            eeprom: factory.clone(),
            factory,
            busy_until: 0,
            response: None,
            mystery: 0x00,
            corruption: None,
            position: 8192,
        }
    }

    fn value(&self, addr: u8) -> u16 {
        let stored = |a: u8| self.ram.get(&a).copied().unwrap_or(0);
        match addr {
            reg::CURRENT_APV => self.position,
            reg::MYSTERY_DB => 0,
            0xFF => 0,
            // Odd addresses straddle two registers
            a if a % 2 == 1 => ((stored(a + 1) & 0x00FF) << 8) | (stored(a - 1) >> 8),
            a => stored(a),
        }
    }

    fn apply_write(&mut self, addr: u8, value: u16, at: u64) {
        match addr {
            reg::FACTORY_RESET if value == reg::FACTORY_RESET_CONST => {
                self.ram = self.factory.clone();
            }
            reg::SAVE if value == reg::SAVE_CONST => {
                self.eeprom = self.ram.clone();
            }
            reg::REBOOT if value == reg::REBOOT_CONST => {
                self.ram = self.eeprom.clone();
                self.busy_until = at + BOOT_NS;
                self.response = None;
            }
            reg::TARGET => {
                self.move_to_target(value);
            }
            a if READ_ONLY.contains(&a) => {}
            a => {
                self.ram.insert(a, value);
            }
        }
    }

    fn move_to_target(&mut self, raw: u16) {
        let quarter_micros = raw as i16 as i32 + TARGET_QUARTER_MICROS_OFFSET;
        let left = self.value(reg::RANGE_LEFT_APV) as i32;
        let center = self.value(reg::RANGE_CENTER_APV) as i32;
        let right = self.value(reg::RANGE_RIGHT_APV) as i32;

        let apv = if quarter_micros < 4 * PULSE_CENTER_US {
            map_range(quarter_micros, 4 * PULSE_LEFT_US, 4 * PULSE_CENTER_US, left, center)
        } else {
            map_range(quarter_micros, 4 * PULSE_CENTER_US, 4 * PULSE_RIGHT_US, center, right)
        };

        let apv = apv.clamp(PHYSICAL_MIN_APV as i32, PHYSICAL_MAX_APV as i32) as u16;
        self.position = apv;
        self.ram.insert(reg::TARGET, apv);
    }
}

struct SimState {
    now: u64,
    period: u64,
    poll_cost_ns: u64,
    host: Option<Level>,
    edges: Vec<(u64, Level)>,
    cursor: u64,
    rx: Vec<u8>,
    device: Option<DeviceState>,
    external_pullup: bool,
    exchanges: Vec<Exchange>,
}

impl SimState {
    fn new(device: Option<DeviceState>) -> Self {
        Self {
            // Start away from zero so no edge lands on the initial cursor
            now: 1_000_000,
            period: 8680,
            poll_cost_ns: DEFAULT_POLL_COST_NS,
            host: Some(Level::Low),
            edges: Vec::new(),
            cursor: 0,
            rx: Vec::new(),
            device,
            external_pullup: true,
            exchanges: Vec::new(),
        }
    }

    /// Decode every host byte whose ten cells have fully elapsed
    fn sync(&mut self) {
        loop {
            let from = self.edges.partition_point(|&(time, _)| time <= self.cursor);
            let start = match self.edges[from..].iter().find(|&&(_, l)| l == Level::High) {
                Some(&(time, _)) => time,
                None => break,
            };
            if start + 10 * self.period > self.now {
                break;
            }

            let mut value = 0u8;
            for bit in 0..8u64 {
                let sample = start + (2 * bit + 3) * self.period / 2;
                if level_at(&self.edges, sample) == Level::Low {
                    value |= 1 << bit;
                }
            }
            let stop = start + 19 * self.period / 2;
            let stop_ok = level_at(&self.edges, stop) == Level::Low;
            self.cursor = stop;

            let keep_from = self
                .edges
                .partition_point(|&(time, _)| time <= self.cursor)
                .saturating_sub(1);
            self.edges.drain(..keep_from);

            if stop_ok {
                self.receive_byte(value, start + 10 * self.period);
            } else {
                self.rx.clear();
            }
        }
    }

    fn receive_byte(&mut self, value: u8, end: u64) {
        self.rx.push(value);
        loop {
            if self.rx.is_empty() {
                break;
            }
            if self.rx[0] != HD_REQUEST_MARKER {
                self.rx.remove(0);
                continue;
            }
            if self.rx.len() < 4 {
                break;
            }
            let needed = match self.rx[3] {
                HD_LENGTH_READ => HD_READ_REQUEST_SIZE,
                HD_LENGTH_VALUE => HD_WRITE_REQUEST_SIZE,
                _ => {
                    self.rx.remove(0);
                    continue;
                }
            };
            if self.rx.len() < needed {
                break;
            }
            let frame: Vec<u8> = self.rx.drain(..needed).collect();
            self.handle_frame(&frame, end);
        }
    }

    fn handle_frame(&mut self, frame: &[u8], end: u64) {
        if !verify_frame(frame) {
            return;
        }
        let addr = frame[2];
        let exchange = if frame[3] == HD_LENGTH_READ {
            Exchange::Read(addr)
        } else {
            Exchange::Write(addr, RegisterBytes { low: frame[4], high: frame[5] }.value())
        };
        self.exchanges.push(exchange);

        let device = match self.device.as_mut() {
            Some(device) if end >= device.busy_until => device,
            _ => return,
        };

        match exchange {
            Exchange::Read(addr) => {
                let mut bytes = encode_read_response(addr, device.mystery, device.value(addr));
                if let Some((index, mask)) = device.corruption.take() {
                    bytes[index] ^= mask;
                }
                device.response = Some(Response {
                    hold_from: end,
                    start: end + RESPONSE_LATENCY_NS,
                    bytes,
                });
            }
            Exchange::Write(addr, value) => device.apply_write(addr, value, end),
        }
    }

    fn device_pulls_low(&self, t: u64) -> bool {
        let device = match &self.device {
            Some(device) => device,
            None => return false,
        };
        if t < device.busy_until {
            return true;
        }
        if let Some(response) = &device.response {
            let byte_ns = 10 * self.period;
            if t >= response.hold_from && t < response.start {
                return true;
            }
            if t >= response.start && t < response.start + HD_READ_RESPONSE_SIZE as u64 * byte_ns {
                let offset = t - response.start;
                let byte = response.bytes[(offset / byte_ns) as usize];
                let cell = (offset % byte_ns) / self.period;
                return match cell {
                    0 => false,
                    9 => true,
                    c => byte & (1 << (c - 1)) != 0,
                };
            }
        }
        false
    }

    fn level(&self) -> Level {
        if let Some(level) = self.host {
            return level;
        }
        match &self.device {
            // Only the weak internal pull-up is on the line
            None => Level::High,
            // The servo's pulldown beats the internal pull-up on its own
            Some(_) if !self.external_pullup || self.device_pulls_low(self.now) => Level::Low,
            Some(_) => Level::High,
        }
    }

    fn drive(&mut self, level: Level) {
        self.sync();
        self.host = Some(level);
        let last = self.edges.last().map(|&(_, l)| l).unwrap_or(Level::Low);
        if last != level {
            self.edges.push((self.now, level));
        }
    }
}

/// A D-series servo simulated at the bit level
///
/// Decodes the host's frames from the levels it drives, applies writes to a
/// RAM/EEPROM register store, and answers reads with a real response
/// waveform after the servo's 15.2ms latency. Cloning gives another handle to
/// the same servo, so tests can inspect it while a session owns the line.
#[derive(Clone)]
pub struct SimulatedServo {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedServo {
    /// A responsive servo with the given model number and factory settings
    pub fn new(model_number: u16) -> Self {
        Self::with_device(Some(DeviceState::new(model_number)))
    }

    /// A line with nothing connected to it
    pub fn disconnected() -> Self {
        Self::with_device(None)
    }

    fn with_device(device: Option<DeviceState>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(device))),
        }
    }

    /// Remove the external pull-up resistor
    pub fn without_pullup(self) -> Self {
        self.state.lock().unwrap().external_pullup = false;
        self
    }

    /// Start the servo in its post-power-on boot period
    pub fn booting(self) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let now = state.now;
            if let Some(device) = state.device.as_mut() {
                device.busy_until = now + BOOT_NS;
            }
        }
        self
    }

    /// Set a register in both RAM and EEPROM
    pub fn set_register(&self, addr: u8, value: u16) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.device.as_mut() {
            device.ram.insert(addr, value);
            device.eeprom.insert(addr, value);
        }
    }

    /// Current RAM value of a register
    pub fn register(&self, addr: u8) -> Option<u16> {
        let state = self.state.lock().unwrap();
        state.device.as_ref().and_then(|d| d.ram.get(&addr).copied())
    }

    /// Value of a register as saved in EEPROM
    pub fn saved_register(&self, addr: u8) -> Option<u16> {
        let state = self.state.lock().unwrap();
        state.device.as_ref().and_then(|d| d.eeprom.get(&addr).copied())
    }

    /// Current physical position in APV units
    pub fn position(&self) -> u16 {
        let state = self.state.lock().unwrap();
        state.device.as_ref().map(|d| d.position).unwrap_or(0)
    }

    pub fn set_position(&self, apv: u16) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.device.as_mut() {
            device.position = apv;
        }
    }

    /// Mystery byte sent in every response
    pub fn set_mystery(&self, mystery: u8) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.device.as_mut() {
            device.mystery = mystery;
        }
    }

    /// XOR one byte of the next response with `mask`
    pub fn corrupt_next_response(&self, index: usize, mask: u8) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.device.as_mut() {
            device.corruption = Some((index, mask));
        }
    }

    /// Whether the servo is still in its boot period
    pub fn is_booting(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.device.as_ref().map(|d| state.now < d.busy_until).unwrap_or(false)
    }

    /// Frames received so far
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.state.lock().unwrap().exchanges.clone()
    }

    /// Only the writes received so far
    pub fn writes(&self) -> Vec<(u8, u16)> {
        self.exchanges()
            .into_iter()
            .filter_map(|e| match e {
                Exchange::Write(addr, value) => Some((addr, value)),
                Exchange::Read(_) => None,
            })
            .collect()
    }

    pub fn clear_exchanges(&self) {
        self.state.lock().unwrap().exchanges.clear();
    }

    /// Virtual time
    pub fn now(&self) -> u64 {
        self.state.lock().unwrap().now
    }

    pub fn advance_ms(&self, ms: u64) {
        let mut state = self.state.lock().unwrap();
        state.sync();
        state.now += ms * 1_000_000;
    }
}

impl LineIo for SimulatedServo {
    fn drive_high(&mut self) {
        self.state.lock().unwrap().drive(Level::High);
    }

    fn drive_low(&mut self) {
        self.state.lock().unwrap().drive(Level::Low);
    }

    fn release(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.sync();
        state.host = None;
    }

    fn read_level(&mut self) -> Level {
        let mut state = self.state.lock().unwrap();
        state.sync();
        let level = state.level();
        state.now += state.poll_cost_ns;
        level
    }

    fn now_ns(&mut self) -> u64 {
        self.state.lock().unwrap().now
    }

    fn delay_ns(&mut self, ns: u32) {
        let mut state = self.state.lock().unwrap();
        state.sync();
        state.now += ns as u64;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_ms(ms as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_waveform_shape() {
        let wave = byte_waveform(100, 10, 0x01, true);
        assert_eq!(level_at(&wave, 105), Level::High); // start
        assert_eq!(level_at(&wave, 115), Level::Low); // bit 0 = 1
        assert_eq!(level_at(&wave, 125), Level::High); // bit 1 = 0
        assert_eq!(level_at(&wave, 195), Level::Low); // stop
        assert_eq!(level_at(&wave, 50), Level::Low); // idle before
    }

    #[test]
    fn test_odd_register_straddles_neighbours() {
        let device = DeviceState::new(485);
        // 0x31 sits between 0x30 (unset) and ID (0x32 = 0)
        assert_eq!(device.value(0x31), 0);
        // 0x4F: high byte of DEADBAND_1 (1 -> 0x00), low byte of 0x50 (0x3FFF -> 0xFF)
        assert_eq!(device.value(0x4F), 0xFF00);
        assert_eq!(device.value(0xFF), 0);
    }

    #[test]
    fn test_target_maps_through_range() {
        let mut device = DeviceState::new(485);
        device.move_to_target((4 * 1500 - 3000) as u16);
        assert_eq!(device.position, 8192);
        device.move_to_target((4 * 850 - 3000) as u16);
        assert_eq!(device.position, 3381);
        device.move_to_target((4 * 2150 - 3000) as u16);
        assert_eq!(device.position, 13002);
    }

    #[test]
    fn test_physical_stops_clamp_position() {
        let mut device = DeviceState::new(485);
        device.ram.insert(reg::RANGE_LEFT_APV, 50);
        device.ram.insert(reg::RANGE_RIGHT_APV, 16333);
        device.move_to_target((4 * 850 - 3000) as u16);
        assert_eq!(device.position, PHYSICAL_MIN_APV);
        device.move_to_target((4 * 2150 - 3000) as u16);
        assert_eq!(device.position, PHYSICAL_MAX_APV);
    }

    #[test]
    fn test_reboot_reloads_eeprom_and_goes_busy() {
        let mut device = DeviceState::new(485);
        device.apply_write(reg::ID, 9, 0);
        device.apply_write(reg::REBOOT, reg::REBOOT_CONST, 10);
        assert_eq!(device.value(reg::ID), 0);
        assert_eq!(device.busy_until, 10 + BOOT_NS);

        device.apply_write(reg::ID, 9, 0);
        device.apply_write(reg::SAVE, reg::SAVE_CONST, 0);
        device.apply_write(reg::REBOOT, reg::REBOOT_CONST, 0);
        assert_eq!(device.value(reg::ID), 9);
    }

    #[test]
    fn test_read_only_registers_ignore_writes() {
        let mut device = DeviceState::new(485);
        device.apply_write(reg::MODEL_NUMBER, 1, 0);
        device.apply_write(reg::SS_DISABLE_1, 1, 0);
        assert_eq!(device.value(reg::MODEL_NUMBER), 485);
        assert_eq!(device.value(reg::SS_DISABLE_1), 28000);
    }
}
