pub mod run_qc;

pub use run_qc::run_qc;
