//! Risk propagation engine
//!
//! Aggregates all activities and cohabitations into a 43-day incoming-risk
//! series, then convolves it with a fixed transmission-probability kernel to
//! produce the 29-day outgoing-risk series that gets exported to peers.
//!
//! The 43/29/14 windowing is a wire-level constant: peers must agree on the
//! same windows for exchanged certificates to line up, so it is deliberately
//! not configurable.

use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use tracing::warn;

use crate::calculator::{ActivityContext, Interaction, PointCalculator};
use crate::certificate::RiskCertificate;
use crate::incidence::IncidenceTable;
use crate::overlap::{overlap_minutes, overlap_weeks};
use crate::resolver::PersonRiskResolver;
use crate::types::{Activity, AnalysisDay, Cohabitation, ProfileData};

/// Transmission probability by days since an infection-risk event.
/// From Ferretti et al., "Quantifying SARS-CoV-2 transmission suggests
/// epidemic control with digital contact tracing", Fig. 2. First entry is
/// the day of the event itself.
pub const TRANSMISSION_PROB: [f64; 14] = [
    0.0, 0.045, 0.13, 0.245, 0.35, 0.375, 0.34, 0.25, 0.15, 0.075, 0.025, 0.01, 0.001, 0.0,
];

/// Days of incoming risk sampled before today (offsets 42..=0).
pub const INCOMING_WINDOW_DAYS: usize = 43;

/// Days of outgoing risk produced (offsets 28..=0).
pub const OUTGOING_WINDOW_DAYS: usize = 29;

/// One propagation pass over a profile's activities and cohabitations.
pub struct RiskPropagationEngine<'a, C: PointCalculator> {
    data: &'a ProfileData,
    calculator: &'a C,
    resolver: PersonRiskResolver<'a, C>,
}

impl<'a, C: PointCalculator> RiskPropagationEngine<'a, C> {
    pub fn new(
        data: &'a ProfileData,
        incidence: &'a IncidenceTable,
        certificates: &'a HashMap<String, RiskCertificate>,
        calculator: &'a C,
    ) -> Self {
        let resolver =
            PersonRiskResolver::new(&data.persons, incidence, certificates, calculator);
        Self {
            data,
            calculator,
            resolver,
        }
    }

    /// Compute the 29-day analysis series, ordered newest first: index 0 is
    /// `today`, index i is i days before today.
    ///
    /// With `exclude` set, every contribution where that person participates
    /// is skipped. This produces the "external risk without this person"
    /// series used when exporting a certificate to that very person, so
    /// their own contribution is not leaked back to them.
    pub fn compute_series(&mut self, today: NaiveDate, exclude: Option<&str>) -> Vec<AnalysisDay> {
        let mut incoming = [0.0f64; INCOMING_WINDOW_DAYS];
        let mut has_error = [false; INCOMING_WINDOW_DAYS];

        // The entity maps outlive `self`; binding them here keeps the
        // iteration borrows independent of the `&mut self` resolver calls.
        let data = self.data;

        for offset in 0..INCOMING_WINDOW_DAYS {
            let date = today - Days::new(offset as u64);

            for activity in data.activities.values() {
                let minutes = overlap_minutes(activity.begin, activity.end, date);
                if minutes <= 0.0 {
                    continue;
                }
                match self.activity_risk(activity, minutes, exclude) {
                    Some(risk) => incoming[offset] += risk,
                    None => has_error[offset] = true,
                }
            }

            for cohabitation in data.cohabitations.values() {
                if Some(cohabitation.person_id.as_str()) == exclude {
                    continue;
                }
                let weeks = overlap_weeks(cohabitation.begin, cohabitation.end, date);
                if weeks <= 0.0 {
                    continue;
                }
                match self.cohabitation_risk(cohabitation, weeks, date) {
                    Some(risk) => incoming[offset] += risk,
                    None => has_error[offset] = true,
                }
            }
        }

        (0..OUTGOING_WINDOW_DAYS)
            .map(|offset| {
                let mut outgoing = 0.0;
                for (incoming_offset, &risk) in incoming.iter().enumerate() {
                    let days_since_infection = incoming_offset as i64 - offset as i64;
                    if (0..TRANSMISSION_PROB.len() as i64).contains(&days_since_infection) {
                        outgoing += risk * TRANSMISSION_PROB[days_since_infection as usize];
                    }
                }
                AnalysisDay {
                    date: today - Days::new(offset as u64),
                    incoming_risk: incoming[offset],
                    outgoing_risk: outgoing,
                    has_error: has_error[offset],
                }
            })
            .collect()
    }

    /// Risk contributed by one activity over its overlap with a day.
    /// `None` if any required person risk or the severity multiplier is
    /// unresolved; the whole activity is then unresolved for that day.
    fn activity_risk(
        &mut self,
        activity: &Activity,
        duration_minutes: f64,
        exclude: Option<&str>,
    ) -> Option<f64> {
        let mut person_risk = 0.0;
        let data = self.data;

        if activity.unknown_person_count > 0 {
            let Some(location) = data.locations.get(&activity.location_id) else {
                warn!(activity = %activity.title, "activity references unknown location");
                return None;
            };
            let Some(per_person) = self.resolver.profile_risk(
                activity.unknown_person_profile,
                &location.district_id,
                activity.begin.date(),
            ) else {
                warn!(activity = %activity.title, "could not resolve unknown-person risk");
                return None;
            };
            person_risk += f64::from(activity.unknown_person_count) * per_person;
        }

        for person_id in &activity.known_person_ids {
            if Some(person_id.as_str()) == exclude {
                continue;
            }
            let Some(risk) = self.resolver.resolve(person_id, activity.begin.date()) else {
                warn!(person = %person_id, "could not resolve person risk");
                return None;
            };
            person_risk += risk;
        }

        let ctx = ActivityContext {
            interaction: Interaction::OneTime,
            duration_minutes,
            setting: activity.setting,
            distance: activity.distance,
            your_mask: activity.your_mask,
            their_mask: activity.their_mask,
            voice: activity.voice,
        };
        let multiplier = self.calculator.activity_multiplier(&ctx)?;

        Some(person_risk * multiplier)
    }

    /// Risk contributed by one cohabitation over its week-fraction of a day.
    fn cohabitation_risk(
        &mut self,
        cohabitation: &Cohabitation,
        week_fraction: f64,
        date: NaiveDate,
    ) -> Option<f64> {
        let Some(person_risk) = self.resolver.resolve(&cohabitation.person_id, date) else {
            warn!(person = %cohabitation.person_id, "could not resolve cohabitant risk");
            return None;
        };

        let interaction = if cohabitation.sleeping_together {
            Interaction::Partner
        } else {
            Interaction::Repeated
        };
        let multiplier = self
            .calculator
            .activity_multiplier(&ActivityContext::household(interaction))?;

        Some(person_risk * multiplier * week_fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::DAY_COUNT;
    use crate::incidence::IncidenceSnapshot;
    use crate::types::{Distance, Mask, PeerLink, Person, RiskProfile, Setting, Voice};
    use chrono::NaiveDateTime;

    /// Calculator with unit multipliers, so incoming risk equals the sum of
    /// resolved person risks and the convolution can be checked exactly.
    struct UnitCalculator;

    impl PointCalculator for UnitCalculator {
        fn activity_multiplier(&self, _ctx: &ActivityContext) -> Option<f64> {
            Some(1.0)
        }
        fn person_risk(&self, _p: RiskProfile, _s: &IncidenceSnapshot) -> Option<f64> {
            Some(1.0)
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 5, 30).unwrap()
    }

    fn at(date: NaiveDate, h: u32) -> NaiveDateTime {
        date.and_hms_opt(h, 0, 0).unwrap()
    }

    fn linked_person(id: &str) -> Person {
        Person {
            id: id.to_string(),
            name: id.to_string(),
            risk_profile: RiskProfile::Average,
            district_id: "03241".to_string(),
            peer: Some(PeerLink {
                peer_name: id.to_string(),
                public_key_pem: "pem".to_string(),
            }),
        }
    }

    fn activity_with(id: &str, person_id: &str, day: NaiveDate) -> Activity {
        Activity {
            id: id.to_string(),
            title: id.to_string(),
            begin: at(day, 10),
            end: at(day, 11),
            setting: Setting::Indoor,
            distance: Distance::Normal,
            your_mask: Mask::None,
            their_mask: Mask::None,
            voice: Voice::Normal,
            location_id: "l1".to_string(),
            known_person_ids: vec![person_id.to_string()],
            unknown_person_count: 0,
            unknown_person_profile: RiskProfile::Average,
        }
    }

    /// Data with one linked person whose certificate reports `value` on
    /// every covered day, and one activity with them `offset` days ago.
    fn impulse_fixture(
        value: u16,
        offset: u64,
    ) -> (ProfileData, HashMap<String, RiskCertificate>) {
        let mut data = ProfileData::default();
        data.persons.insert("alice".to_string(), linked_person("alice"));
        let day = today() - Days::new(offset);
        data.activities
            .insert("a1".to_string(), activity_with("a1", "alice", day));

        let mut certs = HashMap::new();
        // Anchored at today, so every offset up to 28 is covered.
        certs.insert(
            "alice".to_string(),
            RiskCertificate::new(today(), vec![value; DAY_COUNT]).unwrap(),
        );
        (data, certs)
    }

    #[test]
    fn test_series_is_newest_first() {
        let (data, certs) = impulse_fixture(100, 5);
        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);

        let series = engine.compute_series(today(), None);
        assert_eq!(series.len(), OUTGOING_WINDOW_DAYS);
        assert_eq!(series[0].date, today());
        assert_eq!(series[28].date, today() - Days::new(28));
    }

    #[test]
    fn test_impulse_response_follows_kernel() {
        let value = 1000u16;
        let k = 20u64;
        let (data, certs) = impulse_fixture(value, k);
        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);

        let series = engine.compute_series(today(), None);
        assert_eq!(series[k as usize].incoming_risk, f64::from(value));

        for (offset, day) in series.iter().enumerate() {
            let d = k as i64 - offset as i64;
            let expected = if (0..14).contains(&d) {
                f64::from(value) * TRANSMISSION_PROB[d as usize]
            } else {
                0.0
            };
            assert!(
                (day.outgoing_risk - expected).abs() < 1e-9,
                "offset {}: got {}, expected {}",
                offset,
                day.outgoing_risk,
                expected
            );
        }

        // k >= 13, so the full kernel lands inside the outgoing window.
        let total: f64 = series.iter().map(|d| d.outgoing_risk).sum();
        let kernel_sum: f64 = TRANSMISSION_PROB.iter().sum();
        assert!((total - f64::from(value) * kernel_sum).abs() < 1e-9);
    }

    #[test]
    fn test_activity_outside_window_is_ignored() {
        let (mut data, certs) = impulse_fixture(1000, 5);
        // Move the activity outside the 43-day incoming window.
        let old_day = today() - Days::new(60);
        data.activities
            .insert("a1".to_string(), activity_with("a1", "alice", old_day));

        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let series = engine.compute_series(today(), None);
        assert!(series.iter().all(|d| d.outgoing_risk == 0.0 && !d.has_error));
    }

    #[test]
    fn test_activity_without_participants_contributes_zero() {
        let mut data = ProfileData::default();
        let mut activity = activity_with("a1", "alice", today() - Days::new(5));
        activity.known_person_ids.clear();
        data.activities.insert("a1".to_string(), activity);

        let incidence = IncidenceTable::default();
        let certs = HashMap::new();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let series = engine.compute_series(today(), None);
        assert!(series.iter().all(|d| d.incoming_risk == 0.0 && !d.has_error));
    }

    #[test]
    fn test_unresolved_person_taints_only_overlapping_days() {
        let (mut data, certs) = impulse_fixture(1000, 20);
        // Second activity 5 days ago with a person nobody knows.
        data.activities.insert(
            "a2".to_string(),
            activity_with("a2", "stranger", today() - Days::new(5)),
        );

        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let series = engine.compute_series(today(), None);

        assert!(series[5].has_error);
        assert!(!series[4].has_error);
        assert!(!series[6].has_error);
        // The resolvable activity still accumulates.
        assert_eq!(series[20].incoming_risk, 1000.0);
    }

    #[test]
    fn test_partial_sum_with_mixed_activities_on_same_day() {
        let (mut data, certs) = impulse_fixture(1000, 5);
        data.activities.insert(
            "a2".to_string(),
            activity_with("a2", "stranger", today() - Days::new(5)),
        );

        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let series = engine.compute_series(today(), None);

        // Day is flagged but keeps the resolvable contribution.
        assert!(series[5].has_error);
        assert_eq!(series[5].incoming_risk, 1000.0);
    }

    #[test]
    fn test_exclude_person_removes_their_contributions() {
        let (mut data, mut certs) = impulse_fixture(1000, 5);
        data.persons.insert("bob".to_string(), linked_person("bob"));
        certs.insert(
            "bob".to_string(),
            RiskCertificate::new(today(), vec![500; DAY_COUNT]).unwrap(),
        );
        data.activities
            .get_mut("a1")
            .unwrap()
            .known_person_ids
            .push("bob".to_string());
        data.cohabitations.insert(
            "c1".to_string(),
            Cohabitation {
                id: "c1".to_string(),
                person_id: "bob".to_string(),
                begin: at(today() - Days::new(10), 0),
                end: at(today() - Days::new(8), 0),
                sleeping_together: false,
            },
        );

        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;

        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let full = engine.compute_series(today(), None);
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let without_bob = engine.compute_series(today(), Some("bob"));

        // Only alice remains on the shared activity, cohabitation is gone.
        assert_eq!(full[5].incoming_risk, 1500.0);
        assert_eq!(without_bob[5].incoming_risk, 1000.0);
        assert!(full[9].incoming_risk > 0.0);
        assert_eq!(without_bob[9].incoming_risk, 0.0);
    }

    #[test]
    fn test_cohabitation_week_fraction_weighting() {
        let mut data = ProfileData::default();
        data.persons.insert("bob".to_string(), linked_person("bob"));
        let day = today() - Days::new(5);
        data.cohabitations.insert(
            "c1".to_string(),
            Cohabitation {
                id: "c1".to_string(),
                person_id: "bob".to_string(),
                // Full day of overlap.
                begin: at(day, 0),
                end: at(day + Days::new(1), 0),
                sleeping_together: true,
            },
        );
        let mut certs = HashMap::new();
        certs.insert(
            "bob".to_string(),
            RiskCertificate::new(today(), vec![700; DAY_COUNT]).unwrap(),
        );

        let incidence = IncidenceTable::default();
        let calc = UnitCalculator;
        let mut engine = RiskPropagationEngine::new(&data, &incidence, &certs, &calc);
        let series = engine.compute_series(today(), None);

        // One full day = 1/7 of a week, unit multiplier.
        assert!((series[5].incoming_risk - 700.0 / 7.0).abs() < 1e-9);
    }
}
