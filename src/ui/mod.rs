pub mod icons;
pub mod progress;

pub use progress::{ResearchUI, round_lines, spinner, termination_line};
