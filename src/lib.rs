//! # CRSF Bridge Library
//!
//! Half-duplex CRSF bridge between a handset and a radio link.
//!
//! This library provides the frame state machine that receives CRSF frames
//! byte by byte on a single-wire line, answers each received frame with queued
//! link statistics telemetry, and hands RC channel data on to the radio side.

pub mod channels;
pub mod config;
pub mod crsf;
pub mod error;
pub mod serial;
pub mod telemetry;
