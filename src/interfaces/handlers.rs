pub mod media;
pub mod system;
