//! UI module root: exposes drawing functions for individual panels.

pub mod cards;
pub mod chart;
pub mod header;
pub mod util;
