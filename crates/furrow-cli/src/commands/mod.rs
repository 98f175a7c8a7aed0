pub mod annotate;
pub mod audit;
pub mod balance;
pub mod list;
pub mod record;
pub mod trace;
