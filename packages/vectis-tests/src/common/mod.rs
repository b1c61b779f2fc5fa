pub mod chain;
pub mod common;
pub mod contracts;
pub mod relayer;
pub mod suite;
