//! Global constants shared across modules

/// Default port for the ingest gateway HTTP server
pub const PORT_INGEST: u16 = 40_080;

/// Default port for the query service HTTP server
pub const PORT_QUERY: u16 = 40_081;
