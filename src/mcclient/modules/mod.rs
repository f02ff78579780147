//! Resource managers of the platform services this crate talks to.

pub mod compute;
pub mod image;
pub mod monitor;
