pub mod batch;
pub mod extraction;
pub mod import;
pub mod scoring;
