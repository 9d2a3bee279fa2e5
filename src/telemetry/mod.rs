//! # Telemetry Module
//!
//! Both directions of data that is not part of the frame state machine.
//!
//! This module handles:
//! - Building link statistics frames and queueing them for the turnaround
//! - Recording received channel frames to rotating JSONL files

pub mod link_stats;
pub mod recorder;
