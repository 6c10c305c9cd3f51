pub mod effects;
pub mod equipment;
pub mod flags;
pub mod player;
pub mod stats;
pub mod tables;
