pub mod check_result;
pub mod config;

pub use check_result::{CheckOutcome, CheckStatus};
pub use config::{Config, DataRow, ExcludeRule, InheritedFields, ResponseExpectation, ServiceNode};
