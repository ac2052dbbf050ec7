pub mod callback;
pub mod normalize;
pub mod pipeline;
pub mod queue;
pub mod spool;
pub mod stages;
pub mod throttle;
pub mod worker;
