pub mod checks;
pub mod cli;
pub mod commands;
pub mod criteria;
pub mod data;
pub mod error;
pub mod plot;
pub mod report;
pub mod utils;

// Re-export commonly used items
pub use criteria::{evaluate, AcceptanceRule, CheckResult, RuleSet, Verdict};
pub use data::{FitsContainer, HeaderValue};
pub use report::ReportDocument;
