use crate::device::{Device, SimulationParams};
use coldchain_common::modules::{EnabledModule, ModuleRepository};
use coldchain_common::reading::Reading;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

struct FleetState {
    devices: BTreeMap<String, Device>,
    rng: StdRng,
}

/// The simulated device table.
///
/// Emission ticks and directory refreshes both take the same lock, so a
/// refresh never interleaves with a tick.
pub struct Fleet {
    state: Mutex<FleetState>,
    params: SimulationParams,
}

impl Fleet {
    pub fn new(params: SimulationParams, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(FleetState {
                devices: BTreeMap::new(),
                rng,
            }),
            params,
        }
    }

    /// Adds `count` synthetic devices named `{prefix}{i}`.
    pub async fn seed(&self, prefix: &str, count: usize, setpoint: f64) {
        let mut state = self.state.lock().await;
        for i in 0..count {
            let id = format!("{}{}", prefix, i);
            state
                .devices
                .entry(id.clone())
                .or_insert_with(|| Device::new(id, setpoint));
        }
    }

    /// Adds devices that are enabled in the directory and not simulated yet.
    ///
    /// Membership only grows: devices missing from `modules` keep running, and
    /// known devices keep their current setpoint.
    pub async fn refresh(&self, modules: &[EnabledModule]) -> usize {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for module in modules {
            if state.devices.contains_key(&module.device_id) {
                continue;
            }
            state.devices.insert(
                module.device_id.clone(),
                Device::new(module.device_id.clone(), module.setpoint),
            );
            info!("Added device {} (setpoint {})", module.device_id, module.setpoint);
            added += 1;
        }
        added
    }

    /// Takes one reading per device, then advances every device one tick.
    pub async fn tick(&self) -> Vec<(String, Reading)> {
        let mut guard = self.state.lock().await;
        let FleetState { devices, rng } = &mut *guard;

        let mut readings = Vec::with_capacity(devices.len());
        for device in devices.values_mut() {
            readings.push((device.id.clone(), device.reading()));
            let was_faulty = device.is_faulty();
            device.advance(&self.params, rng);
            if !was_faulty && device.is_faulty() {
                warn!("Device {} has failed, temperature will keep rising", device.id);
            }
        }
        readings
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.devices.len()
    }

    #[cfg(test)]
    async fn device(&self, id: &str) -> Option<Device> {
        self.state.lock().await.devices.get(id).cloned()
    }
}

/// Polls the directory for enabled modules until the process exits.
pub async fn run_refresh(fleet: Arc<Fleet>, repo: ModuleRepository, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match repo.list_enabled().await {
            Ok(modules) => {
                let added = fleet.refresh(&modules).await;
                if added > 0 {
                    info!("Fleet refreshed: {} new devices, {} total", added, fleet.len().await);
                }
            }
            Err(e) => error!("Failed to list enabled modules: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fleet() -> Fleet {
        Fleet::new(
            SimulationParams {
                battery_drain: 0.5,
                fault_probability: 0.0,
            },
            StdRng::seed_from_u64(42),
        )
    }

    fn module(id: &str, setpoint: f64) -> EnabledModule {
        EnabledModule {
            device_id: id.to_string(),
            setpoint,
        }
    }

    #[test]
    fn test_refresh_only_appends() {
        tokio_test::block_on(async {
            let fleet = fleet();

            assert_eq!(fleet.refresh(&[module("a", 4.0), module("b", 2.0)]).await, 2);
            assert_eq!(fleet.refresh(&[module("b", 9.0), module("c", 5.0)]).await, 1);
            assert_eq!(fleet.refresh(&[]).await, 0);

            assert_eq!(fleet.len().await, 3);
            assert_eq!(fleet.device("a").await.unwrap().setpoint, 4.0);
            assert_eq!(fleet.device("b").await.unwrap().setpoint, 2.0);
        });
    }

    #[test]
    fn test_seed_names_devices_with_prefix() {
        tokio_test::block_on(async {
            let fleet = fleet();
            fleet.seed("device_", 3, 4.0).await;
            fleet.seed("device_", 3, 8.0).await;

            assert_eq!(fleet.len().await, 3);
            assert_eq!(fleet.device("device_2").await.unwrap().setpoint, 4.0);
        });
    }

    #[test]
    fn test_tick_emits_one_reading_per_device_before_advancing() {
        tokio_test::block_on(async {
            let fleet = fleet();
            fleet.refresh(&[module("a", 4.0), module("b", -2.0)]).await;

            let first = fleet.tick().await;
            assert_eq!(first.len(), 2);
            assert_eq!(first[0].0, "a");
            assert_eq!(first[0].1.encode(), "0.00 100.00");
            assert_eq!(first[1].0, "b");

            let second = fleet.tick().await;
            assert_eq!(second[0].1.encode(), "0.10 99.50");
            assert_eq!(second[1].1.encode(), "-0.10 99.50");
        });
    }
}
