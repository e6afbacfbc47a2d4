//! Turnstile - Fixed-Window Request Admission Service
//!
//! This crate implements an in-process request rate limiter for HTTP APIs.
//! Each caller key gets a fixed counting window per policy; requests beyond
//! the window's ceiling are answered with 429 until the window expires.
//! State is process-local and periodically swept; no external store is
//! involved.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
