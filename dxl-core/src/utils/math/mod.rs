//! Math utilities for the servo coordinator.
//!
//! This module provides position normalization and velocity encoding.

pub mod position;
