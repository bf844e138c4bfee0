//! Profile-level risk service
//!
//! `RiskService` ties one profile's storage, incidence cache, exchange
//! channel and the propagation engine together. It is the entry point the
//! CLI (and tests) drive: analyze the last 29 days, publish certificates to
//! linked peers, and ingest what peers have published for us.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::calculator::BaselineCalculator;
use crate::certificate::RiskCertificate;
use crate::engine::RiskPropagationEngine;
use crate::error::RiskResult;
use crate::exchange::PeerExchangeChannel;
use crate::incidence::IncidenceTable;
use crate::store::ProfileStore;
use crate::transport::Transport;
use crate::types::{AnalysisDay, ProfileData};

/// One open profile with everything needed to compute and exchange risk.
pub struct RiskService {
    store: ProfileStore,
    data: ProfileData,
    incidence: IncidenceTable,
    channel: PeerExchangeChannel,
    calculator: BaselineCalculator,
}

impl RiskService {
    /// Open a profile under `root`, loading its entities and incidence
    /// cache and generating the keypair on first use.
    pub fn open(root: impl AsRef<Path>, profile: &str) -> RiskResult<Self> {
        let store = ProfileStore::open(root, profile)?;
        let data = store.load_data()?;
        let incidence = IncidenceTable::load(store.incidence_dir())?;
        let channel = PeerExchangeChannel::open(&store)?;
        debug!(
            profile,
            persons = data.persons.len(),
            activities = data.activities.len(),
            "profile opened"
        );
        Ok(Self {
            store,
            data,
            incidence,
            channel,
            calculator: BaselineCalculator,
        })
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn data(&self) -> &ProfileData {
        &self.data
    }

    /// Mutable entity access; call [`save`](Self::save) to persist changes.
    pub fn data_mut(&mut self) -> &mut ProfileData {
        &mut self.data
    }

    pub fn save(&self) -> RiskResult<()> {
        self.store.save_data(&self.data)
    }

    pub fn incidence(&self) -> &IncidenceTable {
        &self.incidence
    }

    /// This profile's public key PEM, for sharing with peers out of band.
    pub fn public_key_pem(&self) -> &str {
        self.channel.public_key_pem()
    }

    /// Decrypt and decode every cached peer import, keyed by person id.
    /// A failed import only drops that one peer's certificate; their risk
    /// then resolves through the profile model instead.
    fn load_certificates(&self) -> HashMap<String, RiskCertificate> {
        let mut certificates = HashMap::new();
        for (person, link) in self.data.linked_peers() {
            let sealed = match self.store.load_import(&link.peer_name) {
                Ok(Some(sealed)) => sealed,
                Ok(None) => continue,
                Err(e) => {
                    warn!(peer = %link.peer_name, error = %e, "could not read import");
                    continue;
                }
            };
            match self.channel.import_from(&link.public_key_pem, &sealed) {
                Ok(cert) => {
                    debug!(peer = %link.peer_name, anchor = %cert.anchor_date(), "certificate imported");
                    certificates.insert(person.id.clone(), cert);
                }
                Err(e) => {
                    warn!(peer = %link.peer_name, error = %e, "import failed, falling back to profile model");
                }
            }
        }
        certificates
    }

    /// The 29-day analysis series for this profile, newest first.
    pub fn analyze(&self, today: NaiveDate) -> Vec<AnalysisDay> {
        self.analyze_excluding(today, None)
    }

    /// Analysis series with one person's contributions removed, used when
    /// exporting to that person.
    pub fn analyze_excluding(&self, today: NaiveDate, exclude: Option<&str>) -> Vec<AnalysisDay> {
        let certificates = self.load_certificates();
        let mut engine = RiskPropagationEngine::new(
            &self.data,
            &self.incidence,
            &certificates,
            &self.calculator,
        );
        engine.compute_series(today, exclude)
    }

    /// Compute and publish: write the plaintext own-series export, then for
    /// every linked peer seal their exclusive series and transmit it.
    /// Per-peer failures are logged and do not stop the remaining exports.
    pub async fn export_all<T: Transport>(
        &self,
        transport: &T,
        today: NaiveDate,
    ) -> RiskResult<()> {
        let own_series = self.analyze(today);
        self.store.save_export(&own_series)?;

        for (person, link) in self.data.linked_peers() {
            let series = self.analyze_excluding(today, Some(&person.id));
            let sealed = match self.channel.export_for(&link.public_key_pem, &series) {
                Ok(sealed) => sealed,
                Err(e) => {
                    warn!(peer = %link.peer_name, error = %e, "export failed");
                    continue;
                }
            };
            let message_id = self.channel.push_id(&link.public_key_pem);
            match transport.transmit(&message_id, &sealed).await {
                Ok(()) => info!(peer = %link.peer_name, "certificate published"),
                Err(e) => warn!(peer = %link.peer_name, error = %e, "transmit failed"),
            }
        }
        Ok(())
    }

    /// Fetch every linked peer's latest certificate from the shared store
    /// and atomically replace the cached import files. Returns how many
    /// peers were updated; failures are logged and skipped.
    pub async fn fetch_imports<T: Transport>(&self, transport: &T) -> RiskResult<usize> {
        let mut updated = 0;
        for (_person, link) in self.data.linked_peers() {
            let message_id = self.channel.pull_id(&link.public_key_pem);
            match transport.retrieve(&message_id).await {
                Ok(Some(sealed)) => {
                    self.store.save_import(&link.peer_name, &sealed)?;
                    info!(peer = %link.peer_name, "certificate updated");
                    updated += 1;
                }
                Ok(None) => {
                    debug!(peer = %link.peer_name, "peer has published nothing yet");
                }
                Err(e) => {
                    warn!(peer = %link.peer_name, error = %e, "retrieve failed");
                }
            }
        }
        Ok(updated)
    }
}
