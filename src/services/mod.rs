pub mod backend;
pub mod push;
pub mod reconcile;
pub mod upload;
