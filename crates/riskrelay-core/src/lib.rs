//! riskrelay core library
//!
//! Tracks personal exposure risk from social activities and produces a
//! daily contagiousness estimate ("outgoing risk") for the last 29 days,
//! which can be shared with specific contacts as an encrypted certificate
//! without revealing the underlying activity data.
//!
//! ## Overview
//!
//! - Activities and cohabitations are weighted by how much of each calendar
//!   day they overlap and by per-person risk, resolved from imported peer
//!   certificates or a district-incidence model.
//! - The 43-day incoming-risk series is convolved with a fixed
//!   transmission-probability kernel into the 29-day outgoing series.
//! - The series is encoded as a compact binary certificate, encrypted for
//!   one recipient, sealed with the sender's key, and exchanged through a
//!   shared store addressed by deterministic message ids.
//!
//! ## Quick Start
//!
//! ```ignore
//! use riskrelay_core::{RiskService, SystemClock, Clock, MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = RiskService::open("~/.riskrelay/data", "me")?;
//!     let today = SystemClock.today();
//!
//!     for day in service.analyze(today) {
//!         println!("{}: {:.1}", day.date, day.outgoing_risk);
//!     }
//!
//!     let transport = MemoryTransport::new();
//!     service.export_all(&transport, today).await?;
//!     Ok(())
//! }
//! ```

pub mod calculator;
pub mod certificate;
pub mod clock;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod incidence;
pub mod overlap;
pub mod refresh;
pub mod resolver;
pub mod service;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports
pub use calculator::{ActivityContext, BaselineCalculator, Interaction, PointCalculator};
pub use certificate::{RiskCertificate, DAY_COUNT, ENCODED_LEN, FORMAT_VERSION, MAGIC};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    RiskPropagationEngine, INCOMING_WINDOW_DAYS, OUTGOING_WINDOW_DAYS, TRANSMISSION_PROB,
};
pub use error::{RiskError, RiskResult};
pub use exchange::PeerExchangeChannel;
pub use incidence::{IncidenceSnapshot, IncidenceTable, AGE_GROUP_ALL};
pub use refresh::{run_refresh_loop, REFRESH_INTERVAL};
pub use resolver::PersonRiskResolver;
pub use service::RiskService;
pub use store::ProfileStore;
pub use transport::{HttpTransport, MemoryTransport, Transport};
pub use types::*;
