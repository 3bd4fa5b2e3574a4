pub mod options;
pub use options::BenchOptions;
