//! Income and wage helpers: sponsorship, asking salaries, per-tick proration.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::EconError;

/// Sponsorship for one tick, scaled by the team's standing metric.
///
/// `income = base * (0.5 + standing/100) * (1 + u)` with `u` uniform in
/// `[-noise_frac, noise_frac]`, rounded to whole currency units. Noise is
/// seeded for reproducibility. `standing` is clamped to [0, 100].
///
/// Example:
/// let v = sponsorship_income(Decimal::new(1000, 0), 50.0, 0.0, 7).unwrap();
/// assert_eq!(v, Decimal::new(1000, 0));
pub fn sponsorship_income(
    base: Decimal,
    standing: f32,
    noise_frac: f32,
    seed: u64,
) -> Result<Decimal, EconError> {
    if base < Decimal::ZERO {
        return Err(EconError::InvalidAmount(base));
    }
    if !standing.is_finite() || !noise_frac.is_finite() || !(0.0..1.0).contains(&noise_frac) {
        return Err(EconError::NonFinite);
    }
    let scale = 0.5 + standing.clamp(0.0, 100.0) as f64 / 100.0;
    let noise = if noise_frac == 0.0 {
        0.0
    } else {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.gen_range(-noise_frac..=noise_frac) as f64
    };
    let factor = Decimal::from_f64(scale * (1.0 + noise)).ok_or(EconError::NonFinite)?;
    Ok((base * factor).round_dp(0).max(Decimal::ZERO))
}

/// Rating tier index (0 = overall below 20) capped at `tiers - 1`.
pub fn rating_tier(overall: f32, tiers: usize) -> usize {
    if tiers == 0 || !overall.is_finite() {
        return 0;
    }
    ((overall.max(0.0) / 20.0).floor() as usize).min(tiers - 1)
}

/// Asking season salary, interpolated linearly between tier salaries.
///
/// Example:
/// let tiers = [Decimal::new(100, 0), Decimal::new(200, 0)];
/// assert_eq!(asking_salary(10.0, &tiers), Decimal::new(150, 0));
pub fn asking_salary(overall: f32, salary_per_tier: &[Decimal]) -> Decimal {
    if salary_per_tier.is_empty() {
        return Decimal::ZERO;
    }
    let tier = rating_tier(overall, salary_per_tier.len());
    let base = salary_per_tier[tier];
    let Some(next) = salary_per_tier.get(tier + 1) else {
        return base;
    };
    let within = ((overall.max(0.0) - tier as f32 * 20.0) / 20.0).clamp(0.0, 1.0);
    let frac = Decimal::from_f32(within).unwrap_or(Decimal::ZERO);
    (base + (*next - base) * frac).round_dp(0)
}

/// Share of a season amount due in one tick, rounded to cents.
pub fn per_tick(season_amount: Decimal, ticks_per_season: u64) -> Decimal {
    if ticks_per_season == 0 {
        return Decimal::ZERO;
    }
    (season_amount / Decimal::from(ticks_per_season)).round_dp(2)
}

/// Apply a fractional multiplier to an amount, rounded to whole units.
pub fn fraction_of(amount: Decimal, fraction: Decimal) -> Decimal {
    (amount * fraction).round_dp(0)
}

/// Ratio `part / whole` as f32 in [0, 1]; zero when `whole` is not positive.
pub fn share(part: Decimal, whole: Decimal) -> f32 {
    if whole <= Decimal::ZERO {
        return if part <= Decimal::ZERO { 0.0 } else { 1.0 };
    }
    (part / whole).to_f32().unwrap_or(1.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn sponsorship_is_identity_at_mid_standing_without_noise() {
        assert_eq!(sponsorship_income(d(1000), 50.0, 0.0, 7).unwrap(), d(1000));
        assert_eq!(sponsorship_income(d(1000), 100.0, 0.0, 7).unwrap(), d(1500));
        assert_eq!(sponsorship_income(d(1000), -20.0, 0.0, 7).unwrap(), d(500));
    }

    #[test]
    fn sponsorship_noise_is_seeded() {
        let a = sponsorship_income(d(100_000), 70.0, 0.1, 42).unwrap();
        let b = sponsorship_income(d(100_000), 70.0, 0.1, 42).unwrap();
        assert_eq!(a, b);
        assert!(a >= d(108_000) && a <= d(132_000));
        assert!(sponsorship_income(d(1), 50.0, 1.5, 1).is_err());
    }

    #[test]
    fn asking_salary_interpolates_and_caps() {
        let tiers = [d(100), d(200), d(400)];
        assert_eq!(asking_salary(0.0, &tiers), d(100));
        assert_eq!(asking_salary(10.0, &tiers), d(150));
        assert_eq!(asking_salary(30.0, &tiers), d(300));
        assert_eq!(asking_salary(99.0, &tiers), d(400));
        assert_eq!(asking_salary(50.0, &[]), Decimal::ZERO);
    }

    #[test]
    fn per_tick_prorates() {
        assert_eq!(per_tick(d(2400), 24), d(100));
        assert_eq!(per_tick(d(100), 0), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn asking_salary_is_monotonic(a in 0.0f32..100.0, b in 0.0f32..100.0) {
            let tiers = [d(150_000), d(400_000), d(900_000), d(2_000_000), d(4_500_000)];
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(asking_salary(lo, &tiers) <= asking_salary(hi, &tiers));
        }
    }
}
