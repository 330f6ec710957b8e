pub mod agent;
pub mod geo;
pub mod ingest;

pub use agent::{AgentLabels, AgentParser};
pub use geo::{GeoResolver, MaxMindGeoResolver, StaticGeoResolver};
pub use ingest::{IngestError, IngestService};
