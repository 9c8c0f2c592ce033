pub mod ids;
pub mod invite;
pub mod jam;
pub mod notice;
pub mod team;
pub mod window;

pub use ids::*;
pub use invite::*;
pub use jam::*;
pub use notice::*;
pub use team::*;
pub use window::*;
