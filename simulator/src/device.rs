use coldchain_common::reading::Reading;
use rand::Rng;

/// Distance the regulator moves the temperature toward the setpoint per tick.
pub const TEMPERATURE_STEP: f64 = 0.1;
/// Temperature rise per tick once the cooling unit has failed.
pub const FAULT_DRIFT: f64 = 0.2;
pub const INITIAL_TEMPERATURE: f64 = 0.0;
pub const FULL_BATTERY: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Battery percentage lost per tick.
    pub battery_drain: f64,
    /// Chance per tick that a nominal device fails for good.
    pub fault_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Nominal,
    /// Terminal: there is no transition back to `Nominal`.
    Faulty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub temperature: f64,
    pub setpoint: f64,
    pub battery: f64,
    pub state: DeviceState,
}

impl Device {
    pub fn new(id: impl Into<String>, setpoint: f64) -> Self {
        Self {
            id: id.into(),
            temperature: INITIAL_TEMPERATURE,
            setpoint,
            battery: FULL_BATTERY,
            state: DeviceState::Nominal,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading::new(self.temperature, self.battery)
    }

    pub fn is_faulty(&self) -> bool {
        self.state == DeviceState::Faulty
    }

    /// Advances the physical state by one simulation tick.
    pub fn advance(&mut self, params: &SimulationParams, rng: &mut impl Rng) {
        self.battery = (self.battery - params.battery_drain).max(0.0);

        match self.state {
            DeviceState::Nominal => {
                let gap = self.setpoint - self.temperature;
                if gap.abs() <= TEMPERATURE_STEP {
                    self.temperature = self.setpoint;
                } else {
                    self.temperature += TEMPERATURE_STEP.copysign(gap);
                }

                if rng.gen::<f64>() < params.fault_probability {
                    self.state = DeviceState::Faulty;
                }
            }
            DeviceState::Faulty => {
                self.temperature += FAULT_DRIFT;
            }
        }
    }
}
