pub mod cases;
pub mod jobs;
pub mod queue;
