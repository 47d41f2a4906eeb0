//! Full measurement sessions against the simulated drive.

mod common;
mod config_test;
mod rpm_test;
mod skew_test;
