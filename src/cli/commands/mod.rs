pub mod blast;
pub mod go_slim;
pub mod mash;
pub mod split;
