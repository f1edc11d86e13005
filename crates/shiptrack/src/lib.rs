pub mod carriers;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalizer;
pub mod notifier;
pub mod orchestrator;
pub mod scheduler;
pub mod secrets;
pub mod session;
pub mod store;

pub use carriers::{AuxCredential, CarrierSet, TrackingSource};
pub use config::{load_config, Config};
pub use error::{CarrierError, ConfigError, Result, ShipTrackError, UnavailableCause};
pub use model::{Carrier, Shipment, ShipmentEdit, UnifiedEvent, UnifiedStatus, VendorEvent};
pub use normalizer::{normalize, StatusMapper};
pub use notifier::{ChangeNotice, Notifier};
pub use orchestrator::{AddOutcome, BatchReport, NewShipment, RefreshOrchestrator, RefreshOutcome};
pub use scheduler::RefreshScheduler;
pub use secrets::{resolve_secret, SecretError, SecretRef};
pub use session::SessionContext;
pub use store::{CreateOutcome, ShipmentStore};
