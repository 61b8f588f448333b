pub mod report;
pub mod rubric;
pub mod score;

pub use report::*;
pub use rubric::*;
pub use score::*;
