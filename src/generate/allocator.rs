//! Deterministic pin allocation.
//!
//! Components are visited once, in discovery order; each pool has a cursor
//! that only moves forward. Running out of any pool aborts the whole run.

use super::GenerateError;
use kinetic_shared::{AssignedPins, ComponentDeclaration, ComponentKind, Pin, PinAssignment, PinCategory, PinPools};

/// Cursor position into each pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinAllocatorState {
    pwm: usize,
    digital: usize,
    analog: usize,
}

impl PinAllocatorState {
    pub fn cursor(&self, category: PinCategory) -> usize {
        match category {
            PinCategory::Pwm => self.pwm,
            PinCategory::Digital => self.digital,
            PinCategory::Analog => self.analog,
        }
    }

    fn cursor_mut(&mut self, category: PinCategory) -> &mut usize {
        match category {
            PinCategory::Pwm => &mut self.pwm,
            PinCategory::Digital => &mut self.digital,
            PinCategory::Analog => &mut self.analog,
        }
    }

    /// Take the next free pin of `category`.
    pub fn take(&mut self, pools: &PinPools, category: PinCategory) -> Result<Pin, GenerateError> {
        let cursor = self.cursor_mut(category);
        let number = *pools
            .pool(category)
            .get(*cursor)
            .ok_or(GenerateError::PinPoolExhausted(category))?;
        *cursor += 1;
        Ok(Pin::new(category, number))
    }

    /// Grant the pins one component needs.
    pub fn assign(
        &mut self,
        pools: &PinPools,
        component: &ComponentDeclaration,
    ) -> Result<PinAssignment, GenerateError> {
        let pins = match component.kind {
            ComponentKind::Motor {
                pwm_enabled,
                direction_enabled,
            } => {
                let pwm = if pwm_enabled {
                    Some(self.take(pools, PinCategory::Pwm)?)
                } else {
                    None
                };
                let direction = if direction_enabled {
                    Some(self.take(pools, PinCategory::Digital)?)
                } else {
                    None
                };
                let brake = self.take(pools, PinCategory::Digital)?;
                AssignedPins::Motor { pwm, direction, brake }
            }
            ComponentKind::VoltageSensor => AssignedPins::VoltageSensor {
                collect: self.take(pools, PinCategory::Analog)?,
            },
            ComponentKind::Switch => AssignedPins::Switch {
                control: self.take(pools, PinCategory::Digital)?,
            },
            ComponentKind::DistanceSensor | ComponentKind::Generic { .. } => AssignedPins::Unassigned,
        };
        for (role, pin) in pins.roles() {
            tracing::debug!("{} {} -> {}", component.name, role, pin);
        }
        Ok(PinAssignment {
            component: component.clone(),
            pins,
        })
    }
}

/// Outcome of one allocation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub assignments: Vec<PinAssignment>,
    pub state: PinAllocatorState,
}

/// Allocate pins for every component, in order, starting from fresh pools.
pub fn allocate(pools: &PinPools, components: &[ComponentDeclaration]) -> Result<Allocation, GenerateError> {
    let mut state = PinAllocatorState::default();
    let assignments = components
        .iter()
        .map(|component| state.assign(pools, component))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        "Allocated pins for {} components (PWM {}/{}, DIGITAL {}/{}, ANALOG {}/{})",
        assignments.len(),
        state.pwm,
        pools.pool(PinCategory::Pwm).len(),
        state.digital,
        pools.pool(PinCategory::Digital).len(),
        state.analog,
        pools.pool(PinCategory::Analog).len(),
    );
    Ok(Allocation { assignments, state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetic_shared::{PhysicalPin, PinRole};
    use std::collections::HashSet;

    fn motor(name: &str, pwm: bool, direction: bool) -> ComponentDeclaration {
        ComponentDeclaration::new(
            name,
            ComponentKind::Motor {
                pwm_enabled: pwm,
                direction_enabled: direction,
            },
        )
    }

    #[test]
    fn motor_and_switch_draw_from_pool_heads() {
        let pools = PinPools::new(vec![3, 9], vec![4, 5, 6, 7], vec![0, 1]).unwrap();
        let allocation = allocate(
            &pools,
            &[motor("M1", true, true), ComponentDeclaration::new("S1", ComponentKind::Switch)],
        )
        .unwrap();

        let m1 = &allocation.assignments[0];
        assert_eq!(m1.pin(PinRole::Pwm), Some(Pin::new(PinCategory::Pwm, 3)));
        assert_eq!(m1.pin(PinRole::Dir), Some(Pin::new(PinCategory::Digital, 4)));
        assert_eq!(m1.pin(PinRole::Brake), Some(Pin::new(PinCategory::Digital, 5)));
        let s1 = &allocation.assignments[1];
        assert_eq!(s1.pin(PinRole::Control), Some(Pin::new(PinCategory::Digital, 6)));

        assert_eq!(allocation.state.cursor(PinCategory::Pwm), 1);
        assert_eq!(allocation.state.cursor(PinCategory::Digital), 3);
        assert_eq!(allocation.state.cursor(PinCategory::Analog), 0);
    }

    #[test]
    fn disabled_motor_features_leave_roles_unassigned() {
        let pools = PinPools::arduino_mega();
        let allocation = allocate(&pools, &[motor("M", false, false)]).unwrap();
        let m = &allocation.assignments[0];
        assert_eq!(m.pin(PinRole::Pwm), None);
        assert_eq!(m.pin(PinRole::Dir), None);
        assert_eq!(m.pin(PinRole::Brake), Some(Pin::new(PinCategory::Digital, 4)));
    }

    #[test]
    fn voltage_sensors_take_analog_pins() {
        let pools = PinPools::arduino_mega();
        let components = [
            ComponentDeclaration::new("Battery", ComponentKind::VoltageSensor),
            ComponentDeclaration::new("Solar", ComponentKind::VoltageSensor),
        ];
        let allocation = allocate(&pools, &components).unwrap();
        assert_eq!(
            allocation.assignments[1].pin(PinRole::Collect),
            Some(Pin::new(PinCategory::Analog, 1))
        );
    }

    #[test]
    fn sensors_without_pins_do_not_move_cursors() {
        let pools = PinPools::arduino_uno();
        let components = [
            ComponentDeclaration::new("Front", ComponentKind::DistanceSensor),
            ComponentDeclaration::new("Thing", ComponentKind::Generic { generate_ignore: false }),
        ];
        let allocation = allocate(&pools, &components).unwrap();
        assert_eq!(allocation.state, PinAllocatorState::default());
        assert!(allocation.assignments.iter().all(|a| a.pins == AssignedPins::Unassigned));
    }

    #[test]
    fn exhausting_a_pool_is_fatal() {
        let pools = PinPools::arduino_uno();
        let motors: Vec<_> = (0..5).map(|i| motor(&format!("M{}", i), true, false)).collect();
        assert!(matches!(
            allocate(&pools, &motors),
            Err(GenerateError::PinPoolExhausted(PinCategory::Pwm))
        ));

        // a motor needs a brake pin even with everything else disabled
        let motors: Vec<_> = (0..9).map(|i| motor(&format!("M{}", i), false, false)).collect();
        assert!(matches!(
            allocate(&pools, &motors),
            Err(GenerateError::PinPoolExhausted(PinCategory::Digital))
        ));
    }

    #[test]
    fn no_pin_is_granted_twice() {
        let pools = PinPools::arduino_mega();
        let mut components = Vec::new();
        for i in 0..8 {
            components.push(motor(&format!("M{}", i), i % 2 == 0, i % 3 != 0));
            components.push(ComponentDeclaration::new(format!("S{}", i), ComponentKind::Switch));
            components.push(ComponentDeclaration::new(format!("V{}", i), ComponentKind::VoltageSensor));
        }
        let allocation = allocate(&pools, &components).unwrap();
        let mut seen: HashSet<PhysicalPin> = HashSet::new();
        for assignment in &allocation.assignments {
            for (_, pin) in assignment.pins.roles() {
                assert!(seen.insert(pin.physical()), "{} granted twice", pin);
            }
        }
    }
}
