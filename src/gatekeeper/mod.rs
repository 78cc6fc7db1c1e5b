//! Response gatekeeper.
//!
//! Decides, per message, whether the local intent classifier can answer
//! from canned responses or the generative backend must be consulted.
//!
//! ## Design
//! - Canned answers only for confident, whitelisted low-stakes intents
//! - Generative calls are grounded on retrieved documents and bounded by a timeout
//! - Backend failures degrade to canned fallbacks, never to request errors
//! - Models are read from an immutable, versioned snapshot swapped atomically

pub mod brand;
pub mod picker;
pub mod router;
pub mod snapshot;

pub use brand::BrandNormalizer;
pub use picker::{FirstPicker, RandomPicker, ResponsePicker};
pub use router::{decide, ResponseRouter, ResponseType, Route, RouteOutcome};
pub use snapshot::{ModelSnapshot, SnapshotHandle};
