//! Integration test target: full detection wiring against mock sources.

mod detection;
mod mock_sources;
