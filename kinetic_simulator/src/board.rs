use kinetic_shared::protocol::{DEFAULT_ACCUMULATOR_SIZE, FRAME_TERMINATOR, PWM_DUTY_MAX};
use kinetic_shared::{command_table, Action, CommandEntry, DistanceSensorConfig, Level, Pin, PinAssignment, VoltageDivider};
use std::collections::{BTreeMap, HashMap};

/// Per-motor sub-state of the two-phase speed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedState {
    Idle,
    AwaitingParam,
}

#[derive(Debug, Clone)]
struct SpeedSlot {
    motor: String,
    pwm: Pin,
    state: SpeedState,
}

#[derive(Debug, Clone)]
struct Route {
    component: String,
    entry: CommandEntry,
}

/// Simulated serial endpoint.
#[derive(Debug, Clone)]
pub struct VirtualBoard {
    routes: Vec<Route>,
    speed_slots: Vec<SpeedSlot>,
    accumulator: Vec<u8>,
    capacity: usize,
    voltage: VoltageDivider,
    distance: DistanceSensorConfig,
    digital: BTreeMap<u8, Level>,
    pwm: BTreeMap<u8, u8>,
    analog_inputs: BTreeMap<u8, u16>,
    ranges: HashMap<String, Option<u16>>,
    output: Vec<u8>,
    dispatched: u64,
    unmatched: u64,
}

impl VirtualBoard {
    pub fn new(assignments: &[PinAssignment]) -> Self {
        Self::with_settings(
            assignments,
            DEFAULT_ACCUMULATOR_SIZE,
            VoltageDivider::default(),
            DistanceSensorConfig::default(),
        )
    }

    pub fn with_settings(
        assignments: &[PinAssignment],
        capacity: usize,
        voltage: VoltageDivider,
        distance: DistanceSensorConfig,
    ) -> Self {
        let mut routes = Vec::new();
        let mut speed_slots = Vec::new();
        for assignment in assignments {
            for entry in command_table(assignment) {
                if let Action::AwaitSpeed { pwm } = entry.action {
                    speed_slots.push(SpeedSlot {
                        motor: assignment.name().to_string(),
                        pwm,
                        state: SpeedState::Idle,
                    });
                }
                routes.push(Route {
                    component: assignment.name().to_string(),
                    entry,
                });
            }
        }
        tracing::debug!(
            "Virtual board ready with {} commands, {} speed-controlled motors",
            routes.len(),
            speed_slots.len()
        );
        Self {
            routes,
            speed_slots,
            accumulator: Vec::with_capacity(capacity),
            capacity,
            voltage,
            distance,
            digital: BTreeMap::new(),
            pwm: BTreeMap::new(),
            analog_inputs: BTreeMap::new(),
            ranges: HashMap::new(),
            output: Vec::new(),
            dispatched: 0,
            unmatched: 0,
        }
    }

    /// Feed one byte from the serial line.
    pub fn feed(&mut self, byte: u8) {
        if byte == FRAME_TERMINATOR {
            let line = std::mem::take(&mut self.accumulator);
            // strcmp and atoi stop at the first NUL
            let end = line.iter().position(|&b| b == 0).unwrap_or(line.len());
            self.dispatch(&line[..end]);
        } else if self.accumulator.len() < self.capacity {
            self.accumulator.push(byte);
        }
    }

    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed(byte);
        }
    }

    /// Drain everything the board has written back to the serial line.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    fn dispatch(&mut self, line: &[u8]) {
        if let Some(slot) = self
            .speed_slots
            .iter_mut()
            .find(|slot| slot.state == SpeedState::AwaitingParam)
        {
            let duty = atoi(line).clamp(0, PWM_DUTY_MAX as i64) as u8;
            tracing::trace!("{} speed parameter -> duty {}", slot.motor, duty);
            self.pwm.insert(slot.pwm.number, duty);
            slot.state = SpeedState::Idle;
            self.dispatched += 1;
            return;
        }

        let Some(route) = self
            .routes
            .iter()
            .find(|route| route.entry.command.as_bytes() == line)
            .cloned()
        else {
            tracing::trace!("Discarding unmatched line {:?}", String::from_utf8_lossy(line));
            self.unmatched += 1;
            return;
        };
        self.dispatched += 1;

        match route.entry.action {
            Action::DigitalWrite { pin, level } => {
                self.digital.insert(pin.number, level);
            }
            Action::AwaitSpeed { pwm } => {
                if let Some(slot) = self.speed_slots.iter_mut().find(|slot| slot.pwm == pwm) {
                    slot.state = SpeedState::AwaitingParam;
                }
            }
            Action::ReadVoltage { pin } => {
                let raw = self.analog_inputs.get(&pin.number).copied().unwrap_or(0);
                let reply = self.voltage.format_reply(raw);
                self.reply(&reply);
            }
            Action::ReadDistance => {
                let reply = match self.ranges.get(&route.component).copied().flatten() {
                    Some(mm) => mm.to_string(),
                    None => self.distance.timeout_token.clone(),
                };
                self.reply(&reply);
            }
            Action::Placeholder => {}
        }
    }

    fn reply(&mut self, text: &str) {
        self.output.extend_from_slice(text.as_bytes());
        self.output.push(FRAME_TERMINATOR);
    }

    pub fn digital_level(&self, pin: u8) -> Option<Level> {
        self.digital.get(&pin).copied()
    }

    pub fn pwm_duty(&self, pin: u8) -> Option<u8> {
        self.pwm.get(&pin).copied()
    }

    pub fn speed_state(&self, motor: &str) -> Option<SpeedState> {
        self.speed_slots
            .iter()
            .find(|slot| slot.motor == motor)
            .map(|slot| slot.state)
    }

    /// Set the raw ADC reading of an analog input.
    pub fn set_analog_input(&mut self, pin: u8, raw: u16) {
        self.analog_inputs.insert(pin, raw);
    }

    /// Set the next reading of a distance sensor, `None` simulating a timeout.
    pub fn set_range(&mut self, sensor: &str, millimeters: Option<u16>) {
        self.ranges.insert(sensor.to_string(), millimeters);
    }

    pub fn pending_bytes(&self) -> usize {
        self.accumulator.len()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched
    }

    pub fn unmatched_count(&self) -> u64 {
        self.unmatched
    }
}

/// C `atoi`: optional leading whitespace and sign, then digits; anything else yields 0.
fn atoi(bytes: &[u8]) -> i64 {
    let mut rest = bytes
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .peekable();
    let negative = match rest.peek() {
        Some(b'-') => {
            rest.next();
            true
        }
        Some(b'+') => {
            rest.next();
            false
        }
        _ => false,
    };
    let mut value: i64 = 0;
    for b in rest.take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }
    if negative { -value } else { value }
}
