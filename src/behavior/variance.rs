// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-scadasim project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Variance tick functions
//!
//! One function per behavior kind, each performing a single
//! read-modify-write pass over its register window. The functions are
//! synchronous and free of scheduling concerns so tests can drive them
//! tick by tick with a seeded RNG; the engine wraps them in periodic tasks.
//!
//! The asymmetries of the coil-dependent kinds are deliberate and mirror the
//! documented behavior of the simulated devices: the ramp path clamps at
//! `max`, while the decrement path has no upper clamp and skips the write
//! entirely when any register in the window would go non-positive.

use rand::Rng;

use crate::datastore::{Bank, RegisterStore, StoreError};

/// `values[i] += variance`, unconditionally, wrapping on 16-bit overflow.
pub fn linear_tick(
    store: &RegisterStore,
    address: u16,
    count: u16,
    variance: i16,
) -> Result<(), StoreError> {
    let values = store.read(Bank::HoldingRegister, address, count)?;
    let values: Vec<u16> = values
        .iter()
        .map(|v| v.wrapping_add_signed(variance))
        .collect();
    store.write(Bank::HoldingRegister, address, &values)
}

/// Ramp toward `max` while the coil holds its default value, decrement
/// otherwise.
///
/// The decrement is all-or-nothing: if any register in the window would go
/// `<= 0` after negating the variance, nothing is written that tick.
pub fn linear_coil_dependent_tick(
    store: &RegisterStore,
    address: u16,
    count: u16,
    variance: i16,
    max: u16,
    coil_address: u16,
    default_coil_value: u16,
) -> Result<(), StoreError> {
    let mut values = store.read(Bank::HoldingRegister, address, count)?;
    if coil_at_default(store, coil_address, default_coil_value)? {
        if values[0] >= max {
            values[0] = max;
        } else {
            values[0] = values[0].wrapping_add_signed(variance);
        }
        store.write(Bank::HoldingRegister, address, &values)
    } else {
        match negate_window(&values, variance) {
            Some(values) => store.write(Bank::HoldingRegister, address, &values),
            None => Ok(()),
        }
    }
}

/// Replace the whole window with one random value in `[min, max]`.
pub fn random_tick<R: Rng>(
    store: &RegisterStore,
    address: u16,
    count: u16,
    min: u16,
    max: u16,
    rng: &mut R,
) -> Result<(), StoreError> {
    // The read both validates the window and discards the prior contents,
    // matching the read-modify-write contract of the other kinds.
    let values = store.read(Bank::HoldingRegister, address, count)?;
    let variance = rng.random_range(min..=max);
    let values = vec![variance; values.len()];
    store.write(Bank::HoldingRegister, address, &values)
}

/// Ramp like [`linear_coil_dependent_tick`] until the window head reaches
/// `max`, then emit random values in `[rand_min, rand_max]` while latched.
///
/// `at_max` is the latch; it is set as soon as the head reaches `max` and
/// cleared only on a successful decrement while the coil is away from its
/// default value. A decrement that would take any register non-positive is
/// skipped and leaves the latch in place.
#[allow(clippy::too_many_arguments)]
pub fn random_coil_dependent_tick<R: Rng>(
    store: &RegisterStore,
    address: u16,
    count: u16,
    variance: i16,
    max: u16,
    rand_min: u16,
    rand_max: u16,
    coil_address: u16,
    default_coil_value: u16,
    at_max: &mut bool,
    rng: &mut R,
) -> Result<(), StoreError> {
    let mut values = store.read(Bank::HoldingRegister, address, count)?;
    if values[0] >= max {
        *at_max = true;
    }
    if coil_at_default(store, coil_address, default_coil_value)? {
        if *at_max {
            values[0] = rng.random_range(rand_min..=rand_max);
        } else if values[0] >= max {
            values[0] = max;
        } else {
            values[0] = values[0].wrapping_add_signed(variance);
        }
        store.write(Bank::HoldingRegister, address, &values)
    } else {
        match negate_window(&values, variance) {
            Some(values) => {
                // The all-positive guard doubles as the documented floor:
                // nothing below zero can ever be committed here.
                *at_max = false;
                store.write(Bank::HoldingRegister, address, &values)
            }
            None => Ok(()),
        }
    }
}

/// Broadcast a constant value to a coil window.
pub fn constant_tick(
    store: &RegisterStore,
    address: u16,
    count: u16,
    num: u16,
) -> Result<(), StoreError> {
    let values = store.read(Bank::Coil, address, count)?;
    let values = vec![num; values.len()];
    store.write(Bank::Coil, address, &values)
}

/// One drain step: every register moves one unit toward `min`.
pub fn fuel_tank_drain_step(
    store: &RegisterStore,
    address: u16,
    count: u16,
    min: u16,
) -> Result<(), StoreError> {
    let values = store.read(Bank::HoldingRegister, address, count)?;
    let values: Vec<u16> = values.iter().map(|v| (*v).max(min + 1) - 1).collect();
    store.write(Bank::HoldingRegister, address, &values)
}

/// One refill step: every register moves one unit toward `max`.
pub fn fuel_tank_refill_step(
    store: &RegisterStore,
    address: u16,
    count: u16,
    max: u16,
) -> Result<(), StoreError> {
    let values = store.read(Bank::HoldingRegister, address, count)?;
    let values: Vec<u16> = values.iter().map(|v| v.saturating_add(1).min(max)).collect();
    store.write(Bank::HoldingRegister, address, &values)
}

/// Assert or deassert a paired coil.
pub fn set_coil(store: &RegisterStore, coil_address: u16, asserted: bool) -> Result<(), StoreError> {
    store.write(Bank::Coil, coil_address, &[u16::from(asserted)])
}

/// Does the gating coil currently hold its configured default value?
fn coil_at_default(
    store: &RegisterStore,
    coil_address: u16,
    default_coil_value: u16,
) -> Result<bool, StoreError> {
    let coil = store.read(Bank::Coil, coil_address, 1)?[0];
    Ok(u16::from(coil != 0) == default_coil_value)
}

/// Negate the variance against every register in the window.
///
/// Returns `None` when any result would be `<= 0`, in which case the caller
/// must skip the write for this tick.
fn negate_window(values: &[u16], variance: i16) -> Option<Vec<u16>> {
    let negated: Vec<i32> = values
        .iter()
        .map(|v| *v as i32 - variance as i32)
        .collect();
    if negated.iter().all(|v| *v > 0) {
        Some(negated.iter().map(|v| *v as u16).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{BankImage, DatastoreImage};
    use rand::{rngs::StdRng, SeedableRng};

    fn store_with(hr: Vec<u16>, co: Vec<u16>) -> RegisterStore {
        RegisterStore::from_image(DatastoreImage {
            di: BankImage {
                start_addr: 1,
                values: vec![0; 4],
            },
            co: BankImage {
                start_addr: 1,
                values: co,
            },
            hr: BankImage {
                start_addr: 1,
                values: hr,
            },
            ir: BankImage {
                start_addr: 1,
                values: vec![0; 4],
            },
        })
    }

    fn hr(store: &RegisterStore, address: u16, count: u16) -> Vec<u16> {
        store.read(Bank::HoldingRegister, address, count).unwrap()
    }

    #[test]
    fn linear_trajectory_matches_formula() {
        let store = store_with(vec![10, 20, 0, 0], vec![0; 4]);
        for _ in 0..8 {
            linear_tick(&store, 1, 2, 3).unwrap();
        }
        // v_n = v_0 + n * variance
        assert_eq!(hr(&store, 1, 2), vec![10 + 8 * 3, 20 + 8 * 3]);
    }

    #[test]
    fn linear_negative_variance_wraps_through_zero() {
        let store = store_with(vec![1, 0, 0, 0], vec![0; 4]);
        linear_tick(&store, 1, 1, -2).unwrap();
        assert_eq!(hr(&store, 1, 1), vec![0xFFFF]);
    }

    #[test]
    fn linear_coil_ramp_clamps_at_max() {
        let store = store_with(vec![98, 0, 0, 0], vec![1, 0, 0, 0]);
        for _ in 0..5 {
            linear_coil_dependent_tick(&store, 1, 1, 5, 100, 1, 1).unwrap();
        }
        assert_eq!(hr(&store, 1, 1), vec![100]);
    }

    #[test]
    fn linear_coil_decrement_skips_when_any_value_would_go_nonpositive() {
        // Coil (0) away from default (1) selects the decrement path.
        let store = store_with(vec![12, 4, 0, 0], vec![0; 4]);
        linear_coil_dependent_tick(&store, 1, 2, 5, 100, 1, 1).unwrap();
        // 4 - 5 <= 0, so the whole window stays untouched.
        assert_eq!(hr(&store, 1, 2), vec![12, 4]);

        // With room to spare the whole window decrements.
        store.write(Bank::HoldingRegister, 1, &[12, 9]).unwrap();
        linear_coil_dependent_tick(&store, 1, 2, 5, 100, 1, 1).unwrap();
        assert_eq!(hr(&store, 1, 2), vec![7, 4]);
    }

    #[test]
    fn random_broadcasts_one_value_in_range() {
        let store = store_with(vec![7, 8, 9, 0], vec![0; 4]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            random_tick(&store, 1, 3, 30, 60, &mut rng).unwrap();
            let values = hr(&store, 1, 3);
            assert!(values.iter().all(|v| (30..=60).contains(v)));
            assert!(values.windows(2).all(|w| w[0] == w[1]));
        }
    }

    #[test]
    fn random_coil_latches_at_max_then_emits_random_band() {
        let store = store_with(vec![95, 0, 0, 0], vec![1, 0, 0, 0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut at_max = false;

        // Below max the ramp is a plain add (it may overshoot; the clamp only
        // applies once the head is already at or past max on a later tick).
        random_coil_dependent_tick(&store, 1, 1, 10, 100, 200, 220, 1, 1, &mut at_max, &mut rng)
            .unwrap();
        assert_eq!(hr(&store, 1, 1), vec![105]);
        for _ in 0..10 {
            random_coil_dependent_tick(
                &store, 1, 1, 10, 100, 200, 220, 1, 1, &mut at_max, &mut rng,
            )
            .unwrap();
            assert!(at_max);
            let head = hr(&store, 1, 1)[0];
            assert!((200..=220).contains(&head), "latched value {}", head);
        }
    }

    #[test]
    fn random_coil_unlatches_when_coil_flips_and_window_stays_positive() {
        let store = store_with(vec![210, 0, 0, 0], vec![1, 0, 0, 0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut at_max = true;

        // Coil away from default: decrement path, all values stay positive.
        store.write(Bank::Coil, 1, &[0]).unwrap();
        random_coil_dependent_tick(&store, 1, 1, 10, 100, 200, 220, 1, 1, &mut at_max, &mut rng)
            .unwrap();
        assert!(!at_max);
        assert_eq!(hr(&store, 1, 1), vec![200]);

        // Once below max with the coil back at default, the ramp resumes.
        store.write(Bank::HoldingRegister, 1, &[50]).unwrap();
        store.write(Bank::Coil, 1, &[1]).unwrap();
        random_coil_dependent_tick(&store, 1, 1, 10, 100, 200, 220, 1, 1, &mut at_max, &mut rng)
            .unwrap();
        assert_eq!(hr(&store, 1, 1), vec![60]);
    }

    #[test]
    fn random_coil_stays_latched_when_decrement_would_go_nonpositive() {
        let store = store_with(vec![5, 0, 0, 0], vec![0; 4]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut at_max = true;
        random_coil_dependent_tick(&store, 1, 1, 10, 100, 200, 220, 1, 1, &mut at_max, &mut rng)
            .unwrap();
        assert!(at_max, "failed decrement must not un-latch");
        assert_eq!(hr(&store, 1, 1), vec![5]);
    }

    #[test]
    fn constant_broadcasts_to_coil_window() {
        let store = store_with(vec![0; 4], vec![0, 0, 7, 0]);
        constant_tick(&store, 2, 2, 1).unwrap();
        assert_eq!(store.read(Bank::Coil, 1, 4).unwrap(), vec![0, 1, 1, 0]);
    }

    #[test]
    fn fuel_tank_steps_clamp_at_bounds() {
        let store = store_with(vec![11, 0, 0, 0], vec![0; 4]);
        for _ in 0..15 {
            fuel_tank_drain_step(&store, 1, 1, 10).unwrap();
        }
        assert_eq!(hr(&store, 1, 1), vec![10]);
        for _ in 0..100 {
            fuel_tank_refill_step(&store, 1, 1, 13).unwrap();
        }
        assert_eq!(hr(&store, 1, 1), vec![13]);
    }
}
