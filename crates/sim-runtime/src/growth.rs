//! Rating growth and decay.
//!
//! Every tick each active person drifts along an age curve, nudged by recent
//! race form and a bounded noise term. Cars drift with their engineers'
//! development work against a steady obsolescence.

use rand::Rng;
use sim_core::config::GrowthConfig;
use sim_core::{Capabilities, Entity, EntityId, Role};

/// Position on the age curve in [-1, 1]: positive before the role's peak age.
pub fn age_factor(age: u32, role: Role, cfg: &GrowthConfig) -> f32 {
    let ramp = cfg.age_ramp_years.max(f32::EPSILON);
    let peak = cfg.peak_age.for_role(role) as f32;
    ((peak - age as f32) / ramp).clamp(-1.0, 1.0)
}

/// Race form in [-0.5, 0.5] from a finishing position; retirements score the floor.
pub fn race_form(finish_position: u32, field_size: u32, finished: bool) -> f32 {
    if !finished || field_size == 0 {
        return -0.5;
    }
    if field_size == 1 {
        return 0.5;
    }
    let p = (finish_position.clamp(1, field_size) - 1) as f32 / (field_size - 1) as f32;
    0.5 - p
}

/// Per-dimension step for one tick, clamped to `max_step`.
pub fn step(age_factor: f32, form: f32, u: f32, cfg: &GrowthConfig) -> f32 {
    let raw = cfg.base_step * (age_factor + cfg.performance_weight * form + cfg.noise * u);
    raw.clamp(-cfg.max_step, cfg.max_step)
}

/// Deltas for every dimension of a person's table, drawing one noise value
/// per dimension in table order.
pub fn person_deltas<R: Rng>(
    entity: &Entity,
    form: f32,
    cfg: &GrowthConfig,
    rng: &mut R,
) -> Vec<(&'static str, f32)> {
    let a = age_factor(entity.age, entity.role, cfg);
    entity
        .role
        .dimensions()
        .iter()
        .map(|dim| {
            let u: f32 = rng.gen_range(-1.0..=1.0);
            (*dim, step(a, form, u, cfg))
        })
        .collect()
}

/// Uniform drift applied to a car, from its best engineer's development rate.
pub fn car_drift(engineer: Option<Capabilities>, cfg: &GrowthConfig) -> f32 {
    let development = match engineer {
        Some(Capabilities::Engineer {
            development_rate, ..
        }) => development_rate,
        _ => 0.0,
    };
    cfg.car_development_rate * (development - 50.0) - cfg.car_obsolescence
}

/// Whether an entity has passed its role's retirement age.
pub fn due_to_retire(entity: &Entity, cfg: &GrowthConfig) -> bool {
    entity.role.ages()
        && entity.role != Role::Principal
        && entity.age > cfg.retirement_age.for_role(entity.role)
}

/// Entities in the order growth visits them.
pub fn visit_order<'a>(entities: impl Iterator<Item = &'a Entity>) -> Vec<EntityId> {
    entities
        .filter(|e| e.is_active() && e.role.ages())
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sim_core::{EntityStore, RATING_MAX, RATING_MIN};

    #[test]
    fn young_improve_and_veterans_decline_without_noise() {
        let cfg = GrowthConfig {
            noise: 0.0,
            ..GrowthConfig::default()
        };
        let peak = cfg.peak_age.for_role(Role::Driver);
        assert!(step(age_factor(peak - 8, Role::Driver, &cfg), 0.0, 0.0, &cfg) > 0.0);
        assert!(step(age_factor(peak + 8, Role::Driver, &cfg), 0.0, 0.0, &cfg) < 0.0);
        assert_eq!(age_factor(peak, Role::Driver, &cfg), 0.0);
    }

    #[test]
    fn form_spans_the_field() {
        assert_eq!(race_form(1, 5, true), 0.5);
        assert_eq!(race_form(5, 5, true), -0.5);
        assert_eq!(race_form(3, 5, true), 0.0);
        assert_eq!(race_form(1, 5, false), -0.5);
    }

    #[test]
    fn good_engineers_outpace_obsolescence() {
        let cfg = GrowthConfig::default();
        let strong = Capabilities::Engineer {
            development_rate: 90.0,
            setup_bonus: 50.0,
        };
        assert!(car_drift(Some(strong), &cfg) > 0.0);
        assert!(car_drift(None, &cfg) < 0.0);
    }

    proptest! {
        #[test]
        fn growth_keeps_ratings_bounded(age in 16u32..70, form in -0.5f32..0.5, seed in any::<u64>()) {
            let cfg = GrowthConfig { max_step: 50.0, base_step: 40.0, ..GrowthConfig::default() };
            let mut store = EntityStore::new();
            let id = store.create(Role::Driver, "D", age, &[], 99.0).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..20 {
                let deltas = person_deltas(store.get(id).unwrap(), form, &cfg, &mut rng);
                for (_, d) in &deltas {
                    prop_assert!(d.abs() <= cfg.max_step);
                }
                let snap = store.apply_delta(id, &deltas).unwrap();
                for (_, v) in snap.ratings.iter() {
                    prop_assert!((RATING_MIN..=RATING_MAX).contains(&v));
                }
            }
        }
    }
}
