//! One-to-one messaging core: ordered message log, typing presence and
//! per-conversation event fan-out.

pub mod domain;
pub mod infra;
pub mod messaging;
#[cfg(test)]
mod test_support;
pub mod usecases;
