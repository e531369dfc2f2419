pub mod scrubber;

pub use scrubber::{ScrubResult, SecretScrubber};
