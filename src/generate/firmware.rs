//! Arduino serial endpoint emitter.
//!
//! The emitted sketch accumulates bytes into a fixed buffer until a newline,
//! then hands the line to `dispatchCommand()`, which first feeds any motor
//! waiting for a speed parameter and otherwise compares the line against
//! every command string of the allocation. Unmatched lines are dropped.

use crate::config::FirmwareConfig;
use kinetic_shared::{command_table, Action, CommandEntry, ComponentKind, PinAssignment, PinRole};

pub const FIRMWARE_FILE_NAME: &str = "kinetic_serial_endpoint.cpp";

/// In-memory source text with indentation tracking.
#[derive(Debug, Default)]
pub struct SourceBuffer {
    text: String,
    depth: usize,
}

impl SourceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, content: impl AsRef<str>) {
        let content = content.as_ref();
        if !content.is_empty() {
            for _ in 0..self.depth {
                self.text.push_str("    ");
            }
            self.text.push_str(content);
        }
        self.text.push('\n');
    }

    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    /// Write `header {` and indent until the matching [`close`](Self::close).
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Close the current block and open an `else` branch.
    pub fn reopen(&mut self, header: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format!("}} {} {{", header.as_ref()));
        self.depth += 1;
    }

    pub fn finish(self) -> String {
        self.text
    }
}

pub struct FirmwareEmitter {
    config: FirmwareConfig,
}

impl FirmwareEmitter {
    pub fn new(config: FirmwareConfig) -> Self {
        Self { config }
    }

    /// Render the complete sketch for one allocation.
    pub fn emit(&self, assignments: &[PinAssignment]) -> String {
        let mut out = SourceBuffer::new();
        let distance_sensors: Vec<&PinAssignment> = assignments
            .iter()
            .filter(|a| a.component.kind == ComponentKind::DistanceSensor)
            .collect();
        let has_voltage = assignments
            .iter()
            .any(|a| a.component.kind == ComponentKind::VoltageSensor);

        self.emit_preamble(&mut out, !distance_sensors.is_empty());
        self.emit_globals(&mut out, assignments, &distance_sensors);
        if has_voltage {
            self.emit_voltage_helper(&mut out);
        }
        if !distance_sensors.is_empty() {
            self.emit_distance_helper(&mut out);
        }
        self.emit_setup(&mut out, assignments, &distance_sensors);
        self.emit_dispatch(&mut out, assignments);
        self.emit_loop(&mut out);
        out.finish()
    }

    fn emit_preamble(&self, out: &mut SourceBuffer, needs_wire: bool) {
        out.line("// KINETIC serial endpoint");
        out.line("// Generated file, regenerate from the agent definition instead of editing.");
        out.blank();
        out.line("#include <Arduino.h>");
        if needs_wire {
            out.line("#include <Wire.h>");
            out.line("#include <VL53L0X.h>");
        }
        out.blank();
        out.line(format!("#define ACCUMULATOR_SIZE {}", self.config.accumulator_size));
        out.blank();
    }

    fn emit_globals(&self, out: &mut SourceBuffer, assignments: &[PinAssignment], distance_sensors: &[&PinAssignment]) {
        out.line("char accumulator[ACCUMULATOR_SIZE + 1];");
        out.line("int accumulatorIndex = 0;");
        let speed_motors: Vec<&PinAssignment> = assignments
            .iter()
            .filter(|a| a.pin(PinRole::Pwm).is_some())
            .collect();
        if !speed_motors.is_empty() {
            out.blank();
            out.line("enum SpeedState { SPEED_IDLE, SPEED_AWAITING_PARAM };");
            for motor in speed_motors {
                out.line(format!("SpeedState {} = SPEED_IDLE;", speed_state_var(motor.name())));
            }
        }
        if !distance_sensors.is_empty() {
            out.blank();
            for sensor in distance_sensors {
                out.line(format!("VL53L0X {};", sensor_var(sensor.name())));
            }
        }
        out.blank();
    }

    fn emit_voltage_helper(&self, out: &mut SourceBuffer) {
        let voltage = &self.config.voltage;
        out.open("static float readVoltage(uint8_t pin)");
        out.line("float raw = analogRead(pin);");
        out.line(format!(
            "return ((raw * {:.6}) / {:.6}) / {:.6};",
            voltage.reference_voltage, voltage.adc_steps as f64, voltage.divider_ratio
        ));
        out.close();
        out.blank();
    }

    fn emit_distance_helper(&self, out: &mut SourceBuffer) {
        out.open("static void dumpDistance(VL53L0X &sensor)");
        out.line("uint16_t range = sensor.readRangeSingleMillimeters();");
        out.open("if (sensor.timeoutOccurred())");
        out.line(format!(
            "Serial.print(\"{}\");",
            self.config.distance.timeout_token
        ));
        out.reopen("else");
        out.line("Serial.print(range);");
        out.close();
        out.line("Serial.write('\\n');");
        out.close();
        out.blank();
    }

    fn emit_setup(&self, out: &mut SourceBuffer, assignments: &[PinAssignment], distance_sensors: &[&PinAssignment]) {
        out.open("void setup()");
        out.line(format!("Serial.begin({});", self.config.baud));
        for assignment in assignments {
            for (role, pin) in assignment.pins.roles() {
                if role == PinRole::Collect {
                    continue;
                }
                out.line(format!(
                    "pinMode({}, OUTPUT); // {} {}",
                    pin.firmware_name(),
                    assignment.name(),
                    role
                ));
            }
        }
        if !distance_sensors.is_empty() {
            out.line("Wire.begin();");
            for sensor in distance_sensors {
                let var = sensor_var(sensor.name());
                out.line(format!("{}.setTimeout({});", var, self.config.distance.timeout_ms));
                out.line(format!("{}.init();", var));
            }
        }
        out.close();
        out.blank();
    }

    fn emit_dispatch(&self, out: &mut SourceBuffer, assignments: &[PinAssignment]) {
        out.open("void dispatchCommand(const char *command)");
        for assignment in assignments {
            if let Some(pwm) = assignment.pin(PinRole::Pwm) {
                let state = speed_state_var(assignment.name());
                out.open(format!("if ({} == SPEED_AWAITING_PARAM)", state));
                out.line(format!(
                    "analogWrite({}, constrain(atoi(command), 0, 255));",
                    pwm.firmware_name()
                ));
                out.line(format!("{} = SPEED_IDLE;", state));
                out.line("return;");
                out.close();
            }
        }
        for assignment in assignments {
            self.emit_component_dispatch(out, assignment);
        }
        out.line("// unmatched lines are discarded");
        out.close();
        out.blank();
    }

    /// Dispatch branches for one component, one per command table entry.
    pub fn emit_component_dispatch(&self, out: &mut SourceBuffer, assignment: &PinAssignment) {
        for entry in command_table(assignment) {
            out.open(format!("if (strcmp(command, \"{}\") == 0)", entry.command));
            self.emit_action(out, assignment, &entry);
            out.line("return;");
            out.close();
        }
    }

    fn emit_action(&self, out: &mut SourceBuffer, assignment: &PinAssignment, entry: &CommandEntry) {
        match entry.action {
            Action::DigitalWrite { pin, level } => {
                out.line(format!("digitalWrite({}, {});", pin.firmware_name(), level.as_str()));
            }
            Action::AwaitSpeed { .. } => {
                out.line(format!(
                    "{} = SPEED_AWAITING_PARAM;",
                    speed_state_var(assignment.name())
                ));
            }
            Action::ReadVoltage { pin } => {
                out.line(format!("char reply[{}];", self.config.voltage.reply_capacity()));
                out.line(format!(
                    "dtostrf(readVoltage({}), 1, {}, reply);",
                    pin.firmware_name(),
                    self.config.voltage.precision
                ));
                out.line("Serial.write(reply);");
                out.line("Serial.write('\\n');");
            }
            Action::ReadDistance => {
                out.line(format!("dumpDistance({});", sensor_var(assignment.name())));
            }
            Action::Placeholder => {
                out.line(format!("// insert command logic for {} here", assignment.name()));
            }
        }
    }

    fn emit_loop(&self, out: &mut SourceBuffer) {
        out.open("void loop()");
        out.open("while (Serial.available() > 0)");
        out.line("int incoming = Serial.read();");
        out.open("if (incoming == 0x0A)");
        out.line("accumulator[accumulatorIndex] = '\\0';");
        out.line("dispatchCommand(accumulator);");
        out.line("accumulatorIndex = 0;");
        out.line("memset(accumulator, 0, sizeof(accumulator));");
        out.reopen("else if (accumulatorIndex < ACCUMULATOR_SIZE)");
        out.line("accumulator[accumulatorIndex] = (char) incoming;");
        out.line("accumulatorIndex += 1;");
        out.close();
        out.close();
        out.close();
    }
}

fn speed_state_var(component: &str) -> String {
    format!("speedState{}", component)
}

fn sensor_var(component: &str) -> String {
    format!("sensor{}", component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetic_shared::{AssignedPins, ComponentDeclaration, Pin, PinCategory};

    fn emitter() -> FirmwareEmitter {
        FirmwareEmitter::new(FirmwareConfig::default())
    }

    fn dispatch_of(assignment: &PinAssignment) -> String {
        let mut out = SourceBuffer::new();
        emitter().emit_component_dispatch(&mut out, assignment);
        out.finish()
    }

    fn motor() -> PinAssignment {
        PinAssignment {
            component: ComponentDeclaration::new(
                "M1",
                ComponentKind::Motor {
                    pwm_enabled: true,
                    direction_enabled: true,
                },
            ),
            pins: AssignedPins::Motor {
                pwm: Some(Pin::new(PinCategory::Pwm, 3)),
                direction: Some(Pin::new(PinCategory::Digital, 4)),
                brake: Pin::new(PinCategory::Digital, 5),
            },
        }
    }

    #[test]
    fn source_buffer_indents_blocks() {
        let mut out = SourceBuffer::new();
        out.open("void f()");
        out.open("if (x)");
        out.line("y();");
        out.reopen("else");
        out.line("z();");
        out.close();
        out.close();
        assert_eq!(
            out.finish(),
            "void f() {\n    if (x) {\n        y();\n    } else {\n        z();\n    }\n}\n"
        );
    }

    #[test]
    fn motor_branches_drive_their_pins() {
        let text = dispatch_of(&motor());
        assert!(text.contains("if (strcmp(command, \"MOTOR_FORWARD M1\") == 0) {\n    digitalWrite(4, HIGH);"));
        assert!(text.contains("if (strcmp(command, \"MOTOR_BACKWARD M1\") == 0) {\n    digitalWrite(4, LOW);"));
        assert!(text.contains("if (strcmp(command, \"MOTOR_BRAKE_HOLD M1\") == 0) {\n    digitalWrite(5, HIGH);"));
        assert!(text.contains("if (strcmp(command, \"MOTOR_BRAKE_RELEASE M1\") == 0) {\n    digitalWrite(5, LOW);"));
        assert!(text.contains("speedStateM1 = SPEED_AWAITING_PARAM;"));
        assert_eq!(text.matches("return;").count(), 5);
    }

    #[test]
    fn speed_parameter_branch_precedes_command_matching() {
        let text = emitter().emit(&[motor()]);
        let param = text.find("if (speedStateM1 == SPEED_AWAITING_PARAM)").unwrap();
        let first_match = text.find("strcmp(command").unwrap();
        assert!(param < first_match);
        assert!(text.contains("analogWrite(3, constrain(atoi(command), 0, 255));"));
        assert!(text.contains("SpeedState speedStateM1 = SPEED_IDLE;"));
    }

    #[test]
    fn voltage_sensor_reads_analog_alias() {
        let sensor = PinAssignment {
            component: ComponentDeclaration::new("Battery", ComponentKind::VoltageSensor),
            pins: AssignedPins::VoltageSensor {
                collect: Pin::new(PinCategory::Analog, 0),
            },
        };
        let text = emitter().emit(&[sensor]);
        assert!(text.contains("char reply[8];"));
        assert!(text.contains("dtostrf(readVoltage(A0), 1, 3, reply);"));
        assert!(text.contains("return ((raw * 5.000000) / 1024.000000) / 0.200000;"));
        assert!(!text.contains("pinMode(A0"));
        assert!(!text.contains("VL53L0X.h"));
    }

    #[test]
    fn reply_buffer_grows_with_precision() {
        let sensor = PinAssignment {
            component: ComponentDeclaration::new("Battery", ComponentKind::VoltageSensor),
            pins: AssignedPins::VoltageSensor {
                collect: Pin::new(PinCategory::Analog, 0),
            },
        };
        let mut config = FirmwareConfig::default();
        config.voltage.precision = 6;
        config.voltage.divider_ratio = 0.01;
        // full scale is 499.51171875 V
        let text = FirmwareEmitter::new(config).emit(&[sensor]);
        assert!(text.contains("char reply[12];"));
        assert!(text.contains("dtostrf(readVoltage(A0), 1, 6, reply);"));
    }

    #[test]
    fn distance_sensor_uses_configured_timeout() {
        let sensor = PinAssignment {
            component: ComponentDeclaration::new("Front", ComponentKind::DistanceSensor),
            pins: AssignedPins::Unassigned,
        };
        let mut config = FirmwareConfig::default();
        config.distance.timeout_ms = 250;
        let text = FirmwareEmitter::new(config).emit(&[sensor]);
        assert!(text.contains("#include <VL53L0X.h>"));
        assert!(text.contains("VL53L0X sensorFront;"));
        assert!(text.contains("sensorFront.setTimeout(250);"));
        assert!(text.contains("Serial.print(\"TIMEOUT\");"));
        assert!(text.contains("dumpDistance(sensorFront);"));
    }

    #[test]
    fn generic_gets_a_placeholder_hook() {
        let generic = PinAssignment {
            component: ComponentDeclaration::new("Arm", ComponentKind::Generic { generate_ignore: false }),
            pins: AssignedPins::Unassigned,
        };
        let text = dispatch_of(&generic);
        assert!(text.contains("strcmp(command, \"GENERIC_COMMAND Arm\")"));
        assert!(text.contains("// insert command logic for Arm here"));
    }

    #[test]
    fn loop_bounds_the_accumulator() {
        let mut config = FirmwareConfig::default();
        config.accumulator_size = 32;
        let text = FirmwareEmitter::new(config).emit(&[motor()]);
        assert!(text.contains("#define ACCUMULATOR_SIZE 32"));
        assert!(text.contains("char accumulator[ACCUMULATOR_SIZE + 1];"));
        assert!(text.contains("} else if (accumulatorIndex < ACCUMULATOR_SIZE) {"));
        assert!(text.contains("if (incoming == 0x0A) {"));
    }
}
