//! Core data model: profile entities and derived analysis days

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Where an activity took place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    Indoor,
    Outdoor,
    PartiallyEnclosed,
}

/// Typical distance kept to other participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Close,
    Normal,
    SixFeet,
    TenFeet,
}

/// Mask worn during the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mask {
    None,
    Cotton,
    Surgical,
    Ffp2,
}

/// Loudness of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Silent,
    Normal,
    Loud,
}

/// Behavioral risk profile of a person whose risk is not imported from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Average,
    Cautious,
    Isolated,
    Frontline,
    Symptomatic,
}

/// Linkage to a remote peer whose outgoing risk is imported via certificate
/// instead of estimated from the generic risk-profile model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLink {
    /// Peer identifier, used to key the imported certificate file.
    pub peer_name: String,
    /// Peer's RSA public key, SPKI PEM.
    pub public_key_pem: String,
}

/// A person known to the profile owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub risk_profile: RiskProfile,
    /// District whose incidence data drives the risk-profile model.
    pub district_id: String,
    /// Present when this person exchanges risk certificates with us.
    #[serde(default)]
    pub peer: Option<PeerLink>,
}

/// A place activities happen at, carrying the district reference used for
/// unknown-person risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub title: String,
    pub city: String,
    pub district_id: String,
}

/// A social activity with a time interval `[begin, end)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    pub setting: Setting,
    pub distance: Distance,
    pub your_mask: Mask,
    pub their_mask: Mask,
    pub voice: Voice,
    pub location_id: String,
    #[serde(default)]
    pub known_person_ids: Vec<String>,
    #[serde(default)]
    pub unknown_person_count: u32,
    pub unknown_person_profile: RiskProfile,
}

impl Activity {
    /// Check the interval invariant `begin < end`.
    pub fn validate(&self) -> RiskResult<()> {
        if self.begin >= self.end {
            return Err(RiskError::InvalidData(format!(
                "activity '{}' must begin before it ends",
                self.title
            )));
        }
        Ok(())
    }
}

/// Living together with one person over a time interval `[begin, end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cohabitation {
    pub id: String,
    pub person_id: String,
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Shared sleeping arrangement selects the closer interaction category.
    pub sleeping_together: bool,
}

impl Cohabitation {
    pub fn validate(&self) -> RiskResult<()> {
        if self.begin >= self.end {
            return Err(RiskError::InvalidData(format!(
                "cohabitation '{}' must begin before it ends",
                self.id
            )));
        }
        Ok(())
    }
}

/// One derived day of the risk analysis. Recomputed on demand, never
/// persisted except through export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDay {
    pub date: NaiveDate,
    pub incoming_risk: f64,
    pub outgoing_risk: f64,
    /// True when some contribution on this day could not be resolved. The
    /// partial sums are still present but must not be read as a lower bound.
    pub has_error: bool,
}

/// All entities of one profile, as loaded from the profile directory.
#[derive(Debug, Clone, Default)]
pub struct ProfileData {
    pub persons: HashMap<String, Person>,
    pub locations: HashMap<String, Location>,
    pub activities: HashMap<String, Activity>,
    pub cohabitations: HashMap<String, Cohabitation>,
}

impl ProfileData {
    /// Persons that have a peer linkage with a non-empty public key.
    pub fn linked_peers(&self) -> impl Iterator<Item = (&Person, &PeerLink)> {
        self.persons.values().filter_map(|person| {
            person
                .peer
                .as_ref()
                .filter(|link| !link.public_key_pem.is_empty())
                .map(|link| (person, link))
        })
    }
}
