pub mod audio;
pub mod quest;
pub mod story;
