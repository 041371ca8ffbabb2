pub mod policies;
pub mod serve;
