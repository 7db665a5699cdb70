//! Integration test suites grouped by area

mod group_flows;
mod persistence;
mod queue_properties;
mod service_dispatch;
