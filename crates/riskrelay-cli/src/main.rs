//! riskrelay CLI
//!
//! Thin wrapper around riskrelay-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show the 29-day risk analysis
//! riskrelay analyze
//!
//! # Publish certificates to all linked peers
//! riskrelay export
//!
//! # Fetch linked peers' certificates once
//! riskrelay fetch
//!
//! # Keep fetching on the hourly schedule
//! riskrelay watch
//!
//! # Show this profile's public key for out-of-band exchange
//! riskrelay key show
//!
//! # Manage entities
//! riskrelay person add "Carol" --district 03241 --risk-profile average
//! riskrelay person link <person_id> --peer-name carol --key-file carol.pem
//! riskrelay activity add "Dinner" --begin 2021-05-27T19:00 --end 2021-05-27T22:00 \
//!     --location <location_id> --with <person_id>
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use riskrelay_core::{
    run_refresh_loop, Activity, Clock, Cohabitation, Distance, HttpTransport, Location, Mask,
    PeerLink, Person, ProfileStore, RiskProfile, RiskService, Setting, SystemClock, Voice,
    REFRESH_INTERVAL,
};

/// riskrelay - personal exposure risk tracking and peer exchange
#[derive(Parser)]
#[command(name = "riskrelay")]
#[command(version = "0.1.0")]
#[command(about = "Personal exposure risk tracking and encrypted peer risk exchange")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.riskrelay/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Profile to operate on
    #[arg(short, long, global = true, default_value = "default")]
    profile: String,

    /// Base URL of the shared certificate store
    #[arg(
        short,
        long,
        global = true,
        env = "RISKRELAY_BASE_URL",
        default_value = "http://localhost:26843"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and print the 29-day risk analysis
    Analyze,

    /// Publish certificates to all linked peers and write export.json
    Export,

    /// Fetch linked peers' certificates once
    Fetch,

    /// Keep fetching peers' certificates on the hourly schedule
    Watch {
        /// Refresh period in seconds (default: 3600)
        #[arg(long)]
        period_secs: Option<u64>,
    },

    /// Keypair management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Profile management
    Profiles,

    /// Person management
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },

    /// Location management
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },

    /// Activity management
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },

    /// Cohabitation management
    Cohabitation {
        #[command(subcommand)]
        action: CohabitationAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Print this profile's public key PEM
    Show,
}

#[derive(Subcommand)]
enum PersonAction {
    /// List all persons
    List,
    /// Add a person
    Add {
        /// Display name
        name: String,
        /// District id for the incidence model
        #[arg(long)]
        district: String,
        /// Risk profile: average, cautious, isolated, frontline, symptomatic
        #[arg(long, default_value = "average")]
        risk_profile: String,
    },
    /// Link a person to a remote peer for certificate exchange
    Link {
        /// Person id
        person_id: String,
        /// Peer identifier used for the import file
        #[arg(long)]
        peer_name: String,
        /// Path to the peer's public key PEM
        #[arg(long)]
        key_file: PathBuf,
    },
    /// Remove a person
    Remove {
        /// Person id
        person_id: String,
    },
}

#[derive(Subcommand)]
enum LocationAction {
    /// List all locations
    List,
    /// Add a location
    Add {
        /// Display title
        title: String,
        #[arg(long)]
        city: String,
        /// District id for unknown-person risk
        #[arg(long)]
        district: String,
    },
    /// Remove a location
    Remove {
        /// Location id
        location_id: String,
    },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// List all activities
    List,
    /// Add an activity
    Add {
        /// Display title
        title: String,
        /// Begin, e.g. 2021-05-27T19:00
        #[arg(long)]
        begin: String,
        /// End, e.g. 2021-05-27T22:00
        #[arg(long)]
        end: String,
        /// Location id
        #[arg(long)]
        location: String,
        /// Known participant person ids (repeatable)
        #[arg(long = "with")]
        with: Vec<String>,
        /// Number of unknown participants
        #[arg(long, default_value = "0")]
        unknown_count: u32,
        /// Risk profile of unknown participants
        #[arg(long, default_value = "average")]
        unknown_profile: String,
        /// Setting: indoor, outdoor, partially-enclosed
        #[arg(long, default_value = "indoor")]
        setting: String,
        /// Distance: close, normal, six-feet, ten-feet
        #[arg(long, default_value = "normal")]
        distance: String,
        /// Your mask: none, cotton, surgical, ffp2
        #[arg(long, default_value = "none")]
        your_mask: String,
        /// Their mask: none, cotton, surgical, ffp2
        #[arg(long, default_value = "none")]
        their_mask: String,
        /// Voice: silent, normal, loud
        #[arg(long, default_value = "normal")]
        voice: String,
    },
    /// Remove an activity
    Remove {
        /// Activity id
        activity_id: String,
    },
}

#[derive(Subcommand)]
enum CohabitationAction {
    /// List all cohabitations
    List,
    /// Add a cohabitation
    Add {
        /// Person id of the cohabitant
        person_id: String,
        /// Begin, e.g. 2021-05-01T00:00
        #[arg(long)]
        begin: String,
        /// End, e.g. 2021-05-20T00:00
        #[arg(long)]
        end: String,
        /// Shared sleeping arrangement
        #[arg(long)]
        sleeping_together: bool,
    },
    /// Remove a cohabitation
    Remove {
        /// Cohabitation id
        cohabitation_id: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.riskrelay/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".riskrelay")
        .join("data")
}

fn parse_risk_profile(s: &str) -> Result<RiskProfile> {
    match s.to_lowercase().as_str() {
        "average" => Ok(RiskProfile::Average),
        "cautious" => Ok(RiskProfile::Cautious),
        "isolated" => Ok(RiskProfile::Isolated),
        "frontline" => Ok(RiskProfile::Frontline),
        "symptomatic" => Ok(RiskProfile::Symptomatic),
        _ => bail!(
            "Invalid risk profile '{}'. Must be one of: average, cautious, isolated, frontline, symptomatic",
            s
        ),
    }
}

fn parse_setting(s: &str) -> Result<Setting> {
    match s.to_lowercase().as_str() {
        "indoor" => Ok(Setting::Indoor),
        "outdoor" => Ok(Setting::Outdoor),
        "partially-enclosed" => Ok(Setting::PartiallyEnclosed),
        _ => bail!("Invalid setting '{}'", s),
    }
}

fn parse_distance(s: &str) -> Result<Distance> {
    match s.to_lowercase().as_str() {
        "close" => Ok(Distance::Close),
        "normal" => Ok(Distance::Normal),
        "six-feet" => Ok(Distance::SixFeet),
        "ten-feet" => Ok(Distance::TenFeet),
        _ => bail!("Invalid distance '{}'", s),
    }
}

fn parse_mask(s: &str) -> Result<Mask> {
    match s.to_lowercase().as_str() {
        "none" => Ok(Mask::None),
        "cotton" => Ok(Mask::Cotton),
        "surgical" => Ok(Mask::Surgical),
        "ffp2" => Ok(Mask::Ffp2),
        _ => bail!("Invalid mask '{}'", s),
    }
}

fn parse_voice(s: &str) -> Result<Voice> {
    match s.to_lowercase().as_str() {
        "silent" => Ok(Voice::Silent),
        "normal" => Ok(Voice::Normal),
        "loud" => Ok(Voice::Loud),
        _ => bail!("Invalid voice '{}'", s),
    }
}

/// Parse `2021-05-27T19:00` (seconds optional) or a bare date as midnight.
fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = s.parse::<NaiveDate>() {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date '{}'", s));
    }
    bail!("Invalid date/time '{}', expected e.g. 2021-05-27T19:00", s)
}

fn new_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

fn print_analysis(service: &RiskService, today: NaiveDate) {
    let series = service.analyze(today);

    println!("{:<12} {:>14} {:>14}", "date", "incoming", "outgoing");
    for day in &series {
        println!(
            "{:<12} {:>14.2} {:>14.2}  {}",
            day.date,
            day.incoming_risk,
            day.outgoing_risk,
            if day.has_error { "(!)" } else { "" }
        );
    }

    // Min/max must not silently average in unreliable days.
    let reliable: Vec<f64> = series
        .iter()
        .filter(|d| !d.has_error)
        .map(|d| d.outgoing_risk)
        .collect();
    let flagged = series.iter().filter(|d| d.has_error).count();
    if let (Some(min), Some(max)) = (
        reliable.iter().cloned().reduce(f64::min),
        reliable.iter().cloned().reduce(f64::max),
    ) {
        println!();
        println!("outgoing risk: min {:.2}, max {:.2}", min, max);
    }
    if flagged > 0 {
        println!(
            "warning: {} day(s) marked (!) could not be fully resolved and are excluded from min/max",
            flagged
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    if let Commands::Profiles = cli.command {
        for name in ProfileStore::list_profiles(&data_dir)? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut service = RiskService::open(&data_dir, &cli.profile)
        .with_context(|| format!("could not open profile '{}'", cli.profile))?;
    let today = SystemClock.today();

    match cli.command {
        Commands::Profiles => unreachable!("handled above"),

        Commands::Analyze => {
            print_analysis(&service, today);
        }

        Commands::Export => {
            let transport = HttpTransport::new(&cli.base_url);
            service.export_all(&transport, today).await?;
            println!("export complete");
        }

        Commands::Fetch => {
            let transport = HttpTransport::new(&cli.base_url);
            let updated = service.fetch_imports(&transport).await?;
            println!("updated {} peer certificate(s)", updated);
        }

        Commands::Watch { period_secs } => {
            let transport = HttpTransport::new(&cli.base_url);
            let period = period_secs.map_or(REFRESH_INTERVAL, Duration::from_secs);
            println!(
                "watching peer certificates every {}s (ctrl-c to stop)",
                period.as_secs()
            );
            run_refresh_loop(&service, &transport, period).await;
        }

        Commands::Key { action } => match action {
            KeyAction::Show => {
                print!("{}", service.public_key_pem());
            }
        },

        Commands::Person { action } => match action {
            PersonAction::List => {
                for person in service.data().persons.values() {
                    let linked = match &person.peer {
                        Some(link) => format!(" (peer: {})", link.peer_name),
                        None => String::new(),
                    };
                    println!(
                        "{}  {}  district {}{}",
                        person.id, person.name, person.district_id, linked
                    );
                }
            }
            PersonAction::Add {
                name,
                district,
                risk_profile,
            } => {
                let person = Person {
                    id: new_id(),
                    name,
                    risk_profile: parse_risk_profile(&risk_profile)?,
                    district_id: district,
                    peer: None,
                };
                println!("added person {}", person.id);
                service.data_mut().persons.insert(person.id.clone(), person);
                service.save()?;
            }
            PersonAction::Link {
                person_id,
                peer_name,
                key_file,
            } => {
                let pem = std::fs::read_to_string(&key_file)
                    .with_context(|| format!("could not read {}", key_file.display()))?;
                let person = service
                    .data_mut()
                    .persons
                    .get_mut(&person_id)
                    .ok_or_else(|| anyhow!("no person with id {}", person_id))?;
                person.peer = Some(PeerLink {
                    peer_name,
                    public_key_pem: pem,
                });
                service.save()?;
                println!("linked person {}", person_id);
            }
            PersonAction::Remove { person_id } => {
                if service.data_mut().persons.remove(&person_id).is_none() {
                    bail!("no person with id {}", person_id);
                }
                service.save()?;
                println!("removed person {}", person_id);
            }
        },

        Commands::Location { action } => match action {
            LocationAction::List => {
                for location in service.data().locations.values() {
                    println!(
                        "{}  {} ({}, district {})",
                        location.id, location.title, location.city, location.district_id
                    );
                }
            }
            LocationAction::Add {
                title,
                city,
                district,
            } => {
                let location = Location {
                    id: new_id(),
                    title,
                    city,
                    district_id: district,
                };
                println!("added location {}", location.id);
                service
                    .data_mut()
                    .locations
                    .insert(location.id.clone(), location);
                service.save()?;
            }
            LocationAction::Remove { location_id } => {
                if service.data_mut().locations.remove(&location_id).is_none() {
                    bail!("no location with id {}", location_id);
                }
                service.save()?;
                println!("removed location {}", location_id);
            }
        },

        Commands::Activity { action } => match action {
            ActivityAction::List => {
                for activity in service.data().activities.values() {
                    println!(
                        "{}  {}  {} .. {}  ({} known, {} unknown)",
                        activity.id,
                        activity.title,
                        activity.begin,
                        activity.end,
                        activity.known_person_ids.len(),
                        activity.unknown_person_count
                    );
                }
            }
            ActivityAction::Add {
                title,
                begin,
                end,
                location,
                with,
                unknown_count,
                unknown_profile,
                setting,
                distance,
                your_mask,
                their_mask,
                voice,
            } => {
                let activity = Activity {
                    id: new_id(),
                    title,
                    begin: parse_datetime(&begin)?,
                    end: parse_datetime(&end)?,
                    setting: parse_setting(&setting)?,
                    distance: parse_distance(&distance)?,
                    your_mask: parse_mask(&your_mask)?,
                    their_mask: parse_mask(&their_mask)?,
                    voice: parse_voice(&voice)?,
                    location_id: location,
                    known_person_ids: with,
                    unknown_person_count: unknown_count,
                    unknown_person_profile: parse_risk_profile(&unknown_profile)?,
                };
                activity.validate()?;
                println!("added activity {}", activity.id);
                service
                    .data_mut()
                    .activities
                    .insert(activity.id.clone(), activity);
                service.save()?;
            }
            ActivityAction::Remove { activity_id } => {
                if service.data_mut().activities.remove(&activity_id).is_none() {
                    bail!("no activity with id {}", activity_id);
                }
                service.save()?;
                println!("removed activity {}", activity_id);
            }
        },

        Commands::Cohabitation { action } => match action {
            CohabitationAction::List => {
                for cohabitation in service.data().cohabitations.values() {
                    let name = service
                        .data()
                        .persons
                        .get(&cohabitation.person_id)
                        .map(|p| p.name.as_str())
                        .unwrap_or("<unknown>");
                    println!(
                        "{}  with {}  {} .. {}{}",
                        cohabitation.id,
                        name,
                        cohabitation.begin.date(),
                        cohabitation.end.date(),
                        if cohabitation.sleeping_together {
                            "  (shared bed)"
                        } else {
                            ""
                        }
                    );
                }
            }
            CohabitationAction::Add {
                person_id,
                begin,
                end,
                sleeping_together,
            } => {
                if !service.data().persons.contains_key(&person_id) {
                    bail!("no person with id {}", person_id);
                }
                let cohabitation = Cohabitation {
                    id: new_id(),
                    person_id,
                    begin: parse_datetime(&begin)?,
                    end: parse_datetime(&end)?,
                    sleeping_together,
                };
                cohabitation.validate()?;
                println!("added cohabitation {}", cohabitation.id);
                service
                    .data_mut()
                    .cohabitations
                    .insert(cohabitation.id.clone(), cohabitation);
                service.save()?;
            }
            CohabitationAction::Remove { cohabitation_id } => {
                if service
                    .data_mut()
                    .cohabitations
                    .remove(&cohabitation_id)
                    .is_none()
                {
                    bail!("no cohabitation with id {}", cohabitation_id);
                }
                service.save()?;
                println!("removed cohabitation {}", cohabitation_id);
            }
        },
    }

    Ok(())
}
