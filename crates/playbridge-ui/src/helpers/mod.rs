// crates/playbridge-ui/src/helpers/mod.rs

pub mod layout;
