//! # vitalwatch-adapters
//!
//! Clients for the historical data services that feed the vitalwatch monitor.
//!
//! Adapters only know how to ask a service for the raw history of one
//! attribute. Interpreting the values (timestamps, units, alignment across
//! attributes) is left to the `vitalwatch` crate.
//!
//! ## Supported Services
//!
//! - **STH-Comet** - FIWARE short-term history, queried through its
//!   `contextEntities` attribute API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vitalwatch_adapters::sth::SthAdapter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = SthAdapter::builder()
//!         .endpoint("http://localhost:8666")
//!         .service("smart", "/")
//!         .entity("Sensor", "urn:ngsi-ld:bpm:032")
//!         .build()?;
//!
//!     let values = adapter.fetch("bpm", 30).await?;
//!     println!("Fetched {} samples", values.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod sth;

pub use error::AdapterError;
pub use sth::{HttpRequest, HttpResponse, RawSample, SthAdapter, Transport};

#[cfg(feature = "reqwest")]
pub use sth::ReqwestTransport;
