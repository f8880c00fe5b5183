pub mod notes;
pub mod sync;
pub mod transfer;
pub mod tree;
