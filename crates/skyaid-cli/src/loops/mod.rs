//! Background loops for continuous processing.

pub mod delivery_loop;
