//! Integration test crate for Reelflow.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! Every scenario drives a `MainWorkflow` on top of the synthetic decoder
//! backend, end to end.

#[cfg(test)]
mod support;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod layering;

#[cfg(test)]
mod cancellation;

#[cfg(test)]
mod layout;
