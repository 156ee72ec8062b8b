//! Event enrichment: the pipeline that turns a bare JSON payload into a distributed
//! RDF fact, plus the registries and capability seams it leans on.

pub mod enricher;
pub mod mapping;
pub mod service;
pub mod types;
pub mod validation;
