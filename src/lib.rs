//! Subscriber dashboards over an OCS (Online Charging System) billing API.
//!
//! The OCS service owns every subscriber, package and usage record; this crate
//! forwards calls to it ([`proxy`], [`ocs`]), decodes the loosely typed
//! payloads ([`models`]) and turns them into display rows with cost, margin and
//! usage figures ([`metrics`], [`enrich`], [`columns`], [`report`], [`view`]).

pub mod columns;
pub mod config;
pub mod enrich;
pub mod error;
pub mod format;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod ocs;
pub mod proxy;
pub mod report;
pub mod view;
