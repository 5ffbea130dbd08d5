//! Execution venue adapters.
//!
//! One `ExchangeAdapter` per venue family. REST venues share the retrying
//! [`http::HttpExecutor`]; the FIX venue keeps its own TCP session.

pub mod cfd;
pub mod fix;
pub mod http;
pub mod spot;
pub mod status;

pub use cfd::CfdAdapter;
pub use fix::FixAdapter;
pub use spot::SpotAdapter;
