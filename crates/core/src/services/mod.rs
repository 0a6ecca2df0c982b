mod applier;

pub use applier::*;
