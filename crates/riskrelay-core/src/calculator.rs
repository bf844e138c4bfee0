//! Point-risk calculator seam
//!
//! The engine only needs two numbers from the underlying "how risky is one
//! hour in one setting" model: a severity multiplier for an activity's
//! categorical attributes, and a base risk for a person given district
//! incidence. Both are behind the [`PointCalculator`] trait so the bundled
//! baseline model can be swapped for a full calculator without touching the
//! propagation code.

use crate::incidence::IncidenceSnapshot;
use crate::types::{Distance, Mask, RiskProfile, Setting, Voice};

/// Interaction category, selecting between duration-based and weekly rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// A single activity, weighted by its duration.
    OneTime,
    /// Living together, weighted by week-fraction.
    Repeated,
    /// Living together with a shared sleeping arrangement.
    Partner,
}

/// Categorical inputs for one activity or cohabitation contribution.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub interaction: Interaction,
    pub duration_minutes: f64,
    pub setting: Setting,
    pub distance: Distance,
    pub your_mask: Mask,
    pub their_mask: Mask,
    pub voice: Voice,
}

impl ActivityContext {
    /// Context for a cohabitation: weekly interaction, household defaults
    /// for the categorical attributes.
    pub fn household(interaction: Interaction) -> Self {
        Self {
            interaction,
            duration_minutes: 0.0,
            setting: Setting::Indoor,
            distance: Distance::Normal,
            your_mask: Mask::None,
            their_mask: Mask::None,
            voice: Voice::Normal,
        }
    }
}

/// External point-risk model consumed by the propagation engine.
///
/// `None` means the model rejects the inputs; the engine turns that into an
/// unresolved day rather than an error.
pub trait PointCalculator {
    /// Severity multiplier for an activity's attributes and duration.
    fn activity_multiplier(&self, ctx: &ActivityContext) -> Option<f64>;

    /// Base risk of a person with `profile` given the district incidence.
    fn person_risk(&self, profile: RiskProfile, snapshot: &IncidenceSnapshot) -> Option<f64>;
}

/// Bundled stand-in model with microCOVID-style factor tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineCalculator;

/// Transmission probability per hour for the reference activity
/// (indoor, normal distance, no masks, normal voice, one person).
const HOURLY_BASE_RATE: f64 = 0.14;

/// Cap for a single one-time activity, matching the weekly partner rate.
const ONE_TIME_CAP: f64 = 0.48;

impl BaselineCalculator {
    fn setting_factor(setting: Setting) -> f64 {
        match setting {
            Setting::Indoor => 1.0,
            Setting::PartiallyEnclosed => 0.25,
            Setting::Outdoor => 0.05,
        }
    }

    fn distance_factor(distance: Distance) -> f64 {
        match distance {
            Distance::Close => 2.0,
            Distance::Normal => 1.0,
            Distance::SixFeet => 0.5,
            Distance::TenFeet => 0.25,
        }
    }

    fn mask_factor(mask: Mask) -> f64 {
        match mask {
            Mask::None => 1.0,
            Mask::Cotton => 2.0 / 3.0,
            Mask::Surgical => 0.5,
            Mask::Ffp2 => 1.0 / 6.0,
        }
    }

    fn voice_factor(voice: Voice) -> f64 {
        match voice {
            Voice::Silent => 0.2,
            Voice::Normal => 1.0,
            Voice::Loud => 5.0,
        }
    }

    fn profile_factor(profile: RiskProfile) -> f64 {
        match profile {
            RiskProfile::Average => 1.0,
            RiskProfile::Cautious => 0.3,
            RiskProfile::Isolated => 0.1,
            RiskProfile::Frontline => 3.0,
            RiskProfile::Symptomatic => 10.0,
        }
    }

    /// Underreporting factor derived from test positivity.
    fn underreporting_factor(positive_case_percentage: f64) -> f64 {
        if positive_case_percentage < 5.0 {
            4.0
        } else if positive_case_percentage < 15.0 {
            5.0
        } else {
            7.0
        }
    }
}

impl PointCalculator for BaselineCalculator {
    fn activity_multiplier(&self, ctx: &ActivityContext) -> Option<f64> {
        let modifiers = Self::setting_factor(ctx.setting)
            * Self::distance_factor(ctx.distance)
            * Self::mask_factor(ctx.your_mask)
            * Self::mask_factor(ctx.their_mask)
            * Self::voice_factor(ctx.voice);

        match ctx.interaction {
            Interaction::OneTime => {
                if ctx.duration_minutes <= 0.0 {
                    return None;
                }
                let risk = HOURLY_BASE_RATE * ctx.duration_minutes / 60.0 * modifiers;
                Some(risk.min(ONE_TIME_CAP))
            }
            // Weekly rates already average over household behavior, the
            // categorical modifiers do not apply.
            Interaction::Repeated => Some(0.3),
            Interaction::Partner => Some(0.48),
        }
    }

    fn person_risk(&self, profile: RiskProfile, snapshot: &IncidenceSnapshot) -> Option<f64> {
        if snapshot.cases_past_week < 0.0 {
            return None;
        }
        let trend = 1.0 + (snapshot.cases_increasing_percentage.max(0.0) / 100.0).min(1.0);
        let underreporting = Self::underreporting_factor(snapshot.positive_case_percentage);

        Some(snapshot.cases_past_week * underreporting * trend * Self::profile_factor(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cases: f64, increase: f64) -> IncidenceSnapshot {
        IncidenceSnapshot {
            cases_past_week: cases,
            cases_increasing_percentage: increase,
            positive_case_percentage: 7.0,
        }
    }

    fn one_hour_reference() -> ActivityContext {
        ActivityContext {
            interaction: Interaction::OneTime,
            duration_minutes: 60.0,
            setting: Setting::Indoor,
            distance: Distance::Normal,
            your_mask: Mask::None,
            their_mask: Mask::None,
            voice: Voice::Normal,
        }
    }

    #[test]
    fn test_reference_activity_is_base_rate() {
        let calc = BaselineCalculator;
        let risk = calc.activity_multiplier(&one_hour_reference()).unwrap();
        assert!((risk - HOURLY_BASE_RATE).abs() < 1e-12);
    }

    #[test]
    fn test_modifiers_reduce_risk() {
        let calc = BaselineCalculator;
        let mut ctx = one_hour_reference();
        ctx.setting = Setting::Outdoor;
        ctx.your_mask = Mask::Ffp2;
        let masked = calc.activity_multiplier(&ctx).unwrap();
        assert!(masked < HOURLY_BASE_RATE / 100.0);
    }

    #[test]
    fn test_one_time_risk_is_capped() {
        let calc = BaselineCalculator;
        let mut ctx = one_hour_reference();
        ctx.duration_minutes = 60.0 * 24.0 * 7.0;
        ctx.voice = Voice::Loud;
        assert_eq!(calc.activity_multiplier(&ctx), Some(ONE_TIME_CAP));
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let calc = BaselineCalculator;
        let mut ctx = one_hour_reference();
        ctx.duration_minutes = 0.0;
        assert_eq!(calc.activity_multiplier(&ctx), None);
    }

    #[test]
    fn test_household_rates_ignore_duration() {
        let calc = BaselineCalculator;
        assert_eq!(
            calc.activity_multiplier(&ActivityContext::household(Interaction::Repeated)),
            Some(0.3)
        );
        assert_eq!(
            calc.activity_multiplier(&ActivityContext::household(Interaction::Partner)),
            Some(0.48)
        );
    }

    #[test]
    fn test_person_risk_scales_with_profile() {
        let calc = BaselineCalculator;
        let average = calc
            .person_risk(RiskProfile::Average, &snapshot(100.0, 0.0))
            .unwrap();
        let frontline = calc
            .person_risk(RiskProfile::Frontline, &snapshot(100.0, 0.0))
            .unwrap();
        assert!((frontline / average - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_falling_trend_does_not_discount() {
        let calc = BaselineCalculator;
        let flat = calc
            .person_risk(RiskProfile::Average, &snapshot(100.0, 0.0))
            .unwrap();
        let falling = calc
            .person_risk(RiskProfile::Average, &snapshot(100.0, -50.0))
            .unwrap();
        assert_eq!(flat, falling);
    }
}
