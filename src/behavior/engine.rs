// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Behavior task runner
//!
//! Each behavior descriptor becomes one long-running async task that sleeps
//! for its configured period and applies its variance function to the shared
//! datastore. Tasks run until shutdown is requested or their first datastore
//! error; a failed task stays down for the process lifetime (a deliberately
//! simple failure model: one frozen register group degrades the simulation
//! without taking the rest of it down).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use log::{error, info};
use rand::{rngs::StdRng, SeedableRng};
use tokio::time;

use crate::config::{BehaviorConfig, BehaviorKind};
use crate::datastore::{RegisterStore, StoreError};

use super::variance;

/// Terminal state of a behavior task.
#[derive(Debug)]
pub enum BehaviorExit {
    /// Shutdown was requested and the task left its loop cleanly
    StopRequested,
    /// A datastore access failed; the task is permanently stopped
    Failed(StoreError),
}

impl BehaviorExit {
    /// Log the terminal state once, at the level it deserves.
    pub fn log(&self, name: &str, address: u16) {
        match self {
            BehaviorExit::StopRequested => {
                info!("Behavior `{}` at address {} stopped", name, address);
            }
            BehaviorExit::Failed(err) => {
                error!(
                    "Behavior `{}` at address {} stopped permanently: {}",
                    name, address, err
                );
            }
        }
    }
}

/// Run one behavior descriptor to its terminal state.
///
/// The shutdown flag is observed at every sleep boundary, so a stop request
/// takes effect within one period (or one second inside a fuel-tank phase).
pub async fn run_behavior(
    descriptor: BehaviorConfig,
    store: Arc<RegisterStore>,
    running: Arc<AtomicBool>,
) -> BehaviorExit {
    if let BehaviorKind::FuelTank {
        min,
        max,
        coil_address,
        drain_steps,
        refill_steps,
        drain_idle_secs,
        refill_idle_secs,
    } = &descriptor.kind
    {
        return run_fuel_tank(
            &store,
            &running,
            descriptor.address,
            descriptor.count,
            *min,
            *max,
            *coil_address,
            *drain_steps,
            *refill_steps,
            *drain_idle_secs,
            *refill_idle_secs,
        )
        .await;
    }

    let period = Duration::from_secs(descriptor.period_secs);
    let mut rng = StdRng::from_os_rng();
    let mut at_max = false;

    loop {
        time::sleep(period).await;
        if !running.load(Ordering::SeqCst) {
            return BehaviorExit::StopRequested;
        }

        let result = match &descriptor.kind {
            BehaviorKind::Linear { variance } => variance::linear_tick(
                &store,
                descriptor.address,
                descriptor.count,
                *variance,
            ),
            BehaviorKind::LinearCoilDependent {
                variance,
                max,
                coil_address,
                default_coil_value,
            } => variance::linear_coil_dependent_tick(
                &store,
                descriptor.address,
                descriptor.count,
                *variance,
                *max,
                *coil_address,
                *default_coil_value,
            ),
            BehaviorKind::Random { min, max } => variance::random_tick(
                &store,
                descriptor.address,
                descriptor.count,
                *min,
                *max,
                &mut rng,
            ),
            BehaviorKind::RandomCoilDependent {
                variance,
                max,
                rand_min,
                rand_max,
                coil_address,
                default_coil_value,
            } => variance::random_coil_dependent_tick(
                &store,
                descriptor.address,
                descriptor.count,
                *variance,
                *max,
                *rand_min,
                *rand_max,
                *coil_address,
                *default_coil_value,
                &mut at_max,
                &mut rng,
            ),
            BehaviorKind::Constant { num } => {
                variance::constant_tick(&store, descriptor.address, descriptor.count, *num)
            }
            BehaviorKind::FuelTank { .. } => unreachable!("handled above"),
        };

        if let Err(err) = result {
            return BehaviorExit::Failed(err);
        }
    }
}

/// The fuel-tank cycle: drain → idle, and on every other cycle additionally
/// refill → idle. The paired coil is asserted during exactly the drain and
/// refill phases.
#[allow(clippy::too_many_arguments)]
async fn run_fuel_tank(
    store: &RegisterStore,
    running: &AtomicBool,
    address: u16,
    count: u16,
    min: u16,
    max: u16,
    coil_address: u16,
    drain_steps: u32,
    refill_steps: u32,
    drain_idle_secs: u64,
    refill_idle_secs: u64,
) -> BehaviorExit {
    let mut refill_cycle = false;
    loop {
        // Drain phase
        if let Err(err) = variance::set_coil(store, coil_address, true) {
            return BehaviorExit::Failed(err);
        }
        for _ in 0..drain_steps {
            if !running.load(Ordering::SeqCst) {
                return BehaviorExit::StopRequested;
            }
            if let Err(err) = variance::fuel_tank_drain_step(store, address, count, min) {
                return BehaviorExit::Failed(err);
            }
            time::sleep(Duration::from_secs(1)).await;
        }
        if let Err(err) = variance::set_coil(store, coil_address, false) {
            return BehaviorExit::Failed(err);
        }
        if !idle(drain_idle_secs, running).await {
            return BehaviorExit::StopRequested;
        }

        if refill_cycle {
            // Refill phase
            if let Err(err) = variance::set_coil(store, coil_address, true) {
                return BehaviorExit::Failed(err);
            }
            for _ in 0..refill_steps {
                if !running.load(Ordering::SeqCst) {
                    return BehaviorExit::StopRequested;
                }
                if let Err(err) = variance::fuel_tank_refill_step(store, address, count, max) {
                    return BehaviorExit::Failed(err);
                }
                time::sleep(Duration::from_secs(1)).await;
            }
            if let Err(err) = variance::set_coil(store, coil_address, false) {
                return BehaviorExit::Failed(err);
            }
            if !idle(refill_idle_secs, running).await {
                return BehaviorExit::StopRequested;
            }
        }

        refill_cycle = !refill_cycle;
    }
}

/// Sleep for `secs`, one second at a time, watching the shutdown flag.
/// Returns `false` if shutdown was requested mid-idle.
async fn idle(secs: u64, running: &AtomicBool) -> bool {
    for _ in 0..secs {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        time::sleep(Duration::from_secs(1)).await;
    }
    running.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{Bank, BankImage, DatastoreImage};

    fn store() -> Arc<RegisterStore> {
        Arc::new(RegisterStore::from_image(DatastoreImage {
            di: BankImage {
                start_addr: 1,
                values: vec![0; 4],
            },
            co: BankImage {
                start_addr: 1,
                values: vec![0; 4],
            },
            hr: BankImage {
                start_addr: 1,
                values: vec![50, 0, 0, 0],
            },
            ir: BankImage {
                start_addr: 1,
                values: vec![0; 4],
            },
        }))
    }

    fn descriptor(kind: BehaviorKind, period_secs: u64) -> BehaviorConfig {
        BehaviorConfig {
            address: 1,
            count: 1,
            period_secs,
            kind,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn linear_task_ticks_on_its_period() {
        let store = store();
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_behavior(
            descriptor(BehaviorKind::Linear { variance: 2 }, 5),
            store.clone(),
            running.clone(),
        ));

        // Three periods plus slack: exactly three ticks must have landed.
        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(store.read(Bank::HoldingRegister, 1, 1).unwrap(), vec![56]);

        running.store(false, Ordering::SeqCst);
        let exit = handle.await.unwrap();
        assert!(matches!(exit, BehaviorExit::StopRequested));
    }

    #[tokio::test(start_paused = true)]
    async fn task_with_bad_window_fails_permanently() {
        let store = store();
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_behavior(
            BehaviorConfig {
                address: 3,
                count: 4, // extends past the 4-register bank
                period_secs: 1,
                kind: BehaviorKind::Linear { variance: 1 },
            },
            store.clone(),
            running.clone(),
        ));
        let exit = handle.await.unwrap();
        assert!(matches!(exit, BehaviorExit::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn fuel_tank_phase_ordering_and_coil_windows() {
        let store = store();
        let running = Arc::new(AtomicBool::new(true));
        let coil = |s: &RegisterStore| s.read(Bank::Coil, 2, 1).unwrap()[0];
        let level = |s: &RegisterStore| s.read(Bank::HoldingRegister, 1, 1).unwrap()[0];

        store.write(Bank::HoldingRegister, 1, &[12]).unwrap();
        let handle = tokio::spawn(run_behavior(
            BehaviorConfig {
                address: 1,
                count: 1,
                period_secs: 1,
                kind: BehaviorKind::FuelTank {
                    min: 10,
                    max: 15,
                    coil_address: 2,
                    drain_steps: 2,
                    refill_steps: 3,
                    drain_idle_secs: 2,
                    refill_idle_secs: 2,
                },
            },
            store.clone(),
            running.clone(),
        ));

        // Timeline (seconds): drain [0,2) coil=1, idle [2,4) coil=0,
        // drain [4,6) coil=1, idle [6,8) coil=0, refill [8,11) coil=1,
        // idle [11,13) coil=0.
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(coil(&store), 1, "coil asserted during first drain");
        time::sleep(Duration::from_secs(2)).await; // t = 2.5
        assert_eq!(coil(&store), 0, "coil deasserted during idle");
        assert_eq!(level(&store), 10, "drained to min and clamped");
        time::sleep(Duration::from_secs(2)).await; // t = 4.5
        assert_eq!(coil(&store), 1, "coil asserted during second drain");
        time::sleep(Duration::from_secs(2)).await; // t = 6.5
        assert_eq!(coil(&store), 0);
        time::sleep(Duration::from_secs(2)).await; // t = 8.5, refill running
        assert_eq!(coil(&store), 1, "coil asserted during refill");
        time::sleep(Duration::from_secs(3)).await; // t = 11.5, post-refill idle
        assert_eq!(coil(&store), 0);
        assert_eq!(level(&store), 13, "three refill steps from min");
        assert!(level(&store) <= 15 && level(&store) >= 10);

        running.store(false, Ordering::SeqCst);
        let exit = handle.await.unwrap();
        assert!(matches!(exit, BehaviorExit::StopRequested));
    }
}
