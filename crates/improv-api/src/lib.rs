// improv-api: Async HTTP client for the ESPHome captive portal

pub mod error;
pub mod portal;
pub mod transport;

pub use error::Error;
pub use portal::{
    DEFAULT_PORTAL_URL, PortalClient, SubmitOutcome, TransportDisposition,
    classify_status, classify_transport_failure,
};
pub use transport::TransportConfig;
