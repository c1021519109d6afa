pub mod detail;
pub mod listing;
pub mod vtt;

pub use detail::{DetailExtractor, NadeDetail};
pub use listing::{extract_beginner_smoke_slugs, extract_recommended_slugs};
pub use vtt::Cue;
