//! Wire types exchanged with callers and scoring backends

pub mod request;
pub mod response;

pub use request::DetectionRequest;
pub use response::{DetectionResponse, RiskLevel};
