//! Loading [`OperatorConfig`](placement_core::operator::OperatorConfig)
//! overrides and wiring up tracing for binaries that embed the operator core.
#![allow(missing_docs)]

pub mod loader;
pub mod telemetry;

pub use loader::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, OperatorConfigSource, load_from_env, load_from_file,
    load_from_lookup, parse_from_str, parse_json,
};
pub use telemetry::init_tracing;
