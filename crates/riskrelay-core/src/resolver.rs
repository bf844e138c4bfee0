//! Per-person daily risk resolution
//!
//! Resolves the outgoing-risk contribution of one person on one day: from a
//! previously imported peer certificate when the person is linked, otherwise
//! from the risk-profile model driven by district incidence. Results are
//! memoized per (person, date) for the duration of one propagation pass,
//! since the same pair recurs across overlapping activities.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::calculator::PointCalculator;
use crate::certificate::RiskCertificate;
use crate::incidence::IncidenceTable;
use crate::types::{Person, RiskProfile};

/// Resolver for per-(person, day) risk values. Holds only borrowed inputs
/// plus the memo table; build a fresh one per propagation pass.
pub struct PersonRiskResolver<'a, C: PointCalculator> {
    persons: &'a HashMap<String, Person>,
    incidence: &'a IncidenceTable,
    /// Imported certificates keyed by person id.
    certificates: &'a HashMap<String, RiskCertificate>,
    calculator: &'a C,
    memo: HashMap<(String, NaiveDate), Option<f64>>,
}

impl<'a, C: PointCalculator> PersonRiskResolver<'a, C> {
    pub fn new(
        persons: &'a HashMap<String, Person>,
        incidence: &'a IncidenceTable,
        certificates: &'a HashMap<String, RiskCertificate>,
        calculator: &'a C,
    ) -> Self {
        Self {
            persons,
            incidence,
            certificates,
            calculator,
            memo: HashMap::new(),
        }
    }

    /// Daily risk of a known person. `None` means unresolved: unknown
    /// person id, no incidence data, or the calculator rejected the inputs.
    pub fn resolve(&mut self, person_id: &str, date: NaiveDate) -> Option<f64> {
        let key = (person_id.to_string(), date);
        if let Some(&cached) = self.memo.get(&key) {
            return cached;
        }
        let risk = self.resolve_uncached(person_id, date);
        self.memo.insert(key, risk);
        risk
    }

    fn resolve_uncached(&self, person_id: &str, date: NaiveDate) -> Option<f64> {
        let person = self.persons.get(person_id)?;

        // An imported certificate beats the generic model, but only for the
        // exact calendar days it covers.
        if person.peer.is_some() {
            if let Some(risk) = self
                .certificates
                .get(person_id)
                .and_then(|cert| cert.risk_on(date))
            {
                return Some(risk);
            }
            debug!(
                person = person_id,
                date = %date,
                "no imported certificate covers this day, using profile model"
            );
        }

        self.profile_risk(person.risk_profile, &person.district_id, date)
    }

    /// Risk of an anonymous person with the given profile in a district.
    /// Used for an activity's unknown-person head count.
    pub fn profile_risk(
        &self,
        profile: RiskProfile,
        district_id: &str,
        date: NaiveDate,
    ) -> Option<f64> {
        let snapshot = self.incidence.snapshot(district_id, date)?;
        self.calculator.person_risk(profile, &snapshot)
    }
}
