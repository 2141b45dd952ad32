pub mod kr_market;
pub mod trigger;
