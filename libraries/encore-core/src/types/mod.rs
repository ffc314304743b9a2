mod ids;
mod queue_context;
mod track;

pub use ids::TrackId;
pub use queue_context::{QueueContext, RepeatMode};
pub use track::Track;
