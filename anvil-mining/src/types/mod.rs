pub mod difficulty;

pub use difficulty::Difficulty;
